#![no_main]

use libfuzzer_sys::fuzz_target;
use ringwal::formats::SegmentName;
use ringwal::segment::Segment;
use ringwal::{Log, Options};

fuzz_target!(|data: &[u8]| {
    let Ok(tmp) = tempfile::tempdir() else { return };
    let name = SegmentName::new(0, true);
    if std::fs::write(tmp.path().join(name.to_string()), data).is_err() {
        return;
    }

    let mut seg = Segment::new(tmp.path(), name, data.len().max(64));
    let Ok(()) = seg.open(0o600) else { return };
    let n = seg.len() as i64;
    for id in 0..n {
        let _ = seg.read(id);
    }
    let _ = seg.close();

    // An active segment that opens cleanly must also recover as a log.
    let log = Log::open(tmp.path(), Options::default().with_file_mode(0o600)).unwrap();
    assert_eq!(log.len().unwrap(), n);
    let _ = log.close();
});
