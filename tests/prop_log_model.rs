//! Model-based property test: random write / truncate / sync / reopen sequences
//! against an in-memory queue of live blocks.

use proptest::prelude::*;
use ringwal::{Log, Options, WalError};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
enum Op {
    Write(Vec<u8>),
    /// Truncate to the live block at this position (or an arbitrary id if the log is empty).
    TruncateLive(prop::sample::Index),
    /// Truncate to an id that may or may not be live.
    TruncateAny(i64),
    Sync,
    Reopen,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => prop::collection::vec(any::<u8>(), 0..20).prop_map(Op::Write),
        2 => any::<prop::sample::Index>().prop_map(Op::TruncateLive),
        1 => (-1i64..14).prop_map(Op::TruncateAny),
        1 => Just(Op::Sync),
        1 => Just(Op::Reopen),
    ]
}

struct Model {
    modulus: i64,
    live: VecDeque<(i64, Vec<u8>)>,
}

impl Model {
    fn next_id(&self) -> Option<i64> {
        match self.live.back() {
            None => Some(0),
            Some(_) if self.live.len() as i64 == self.modulus => None,
            Some((last, _)) => Some((last + 1) % self.modulus),
        }
    }

    fn position(&self, id: i64) -> Option<usize> {
        self.live.iter().position(|(i, _)| *i == id)
    }

    fn truncate(&mut self, id: i64) {
        let pos = self.position(id).unwrap();
        self.live.drain(..pos);
    }
}

fn opts(modulus: i64, cache: usize) -> Options {
    Options::default()
        .with_segment_size(100)
        .with_block_id_modulus(modulus)
        .with_segment_cache_capacity(cache)
}

fn check_window(log: &Log, model: &Model) -> Result<(), TestCaseError> {
    prop_assert_eq!(log.len().unwrap(), model.live.len() as i64);
    prop_assert_eq!(log.first_block_id().unwrap(), model.live.front().map(|(i, _)| *i));
    prop_assert_eq!(log.last_block_id().unwrap(), model.live.back().map(|(i, _)| *i));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        failure_persistence: None,
        cases: 32,
        .. ProptestConfig::default()
    })]

    #[test]
    fn log_matches_queue_model(
        modulus in 3i64..12,
        cache in 0usize..3,
        ops in prop::collection::vec(arb_op(), 1..60),
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let mut log = Log::open(tmp.path(), opts(modulus, cache)).unwrap();
        let mut model = Model { modulus, live: VecDeque::new() };

        for op in ops {
            match op {
                Op::Write(p) => match model.next_id() {
                    Some(id) => {
                        prop_assert_eq!(log.write(&p).unwrap(), id);
                        model.live.push_back((id, p));
                    }
                    None => {
                        let full = matches!(log.write(&p), Err(WalError::WalFull));
                        prop_assert!(full);
                    }
                },
                Op::TruncateLive(idx) => {
                    if model.live.is_empty() {
                        let out = matches!(log.truncate(0), Err(WalError::OutOfRange { .. }));
                        prop_assert!(out);
                    } else {
                        let id = model.live[idx.index(model.live.len())].0;
                        log.truncate(id).unwrap();
                        model.truncate(id);
                    }
                }
                Op::TruncateAny(id) => {
                    if model.position(id).is_some() {
                        log.truncate(id).unwrap();
                        model.truncate(id);
                    } else {
                        let out = matches!(log.truncate(id), Err(WalError::OutOfRange { .. }));
                        prop_assert!(out, "truncate({}) should be out of range", id);
                    }
                }
                Op::Sync => log.sync().unwrap(),
                Op::Reopen => {
                    log.close().unwrap();
                    log = Log::open(tmp.path(), opts(modulus, cache)).unwrap();
                }
            }
            check_window(&log, &model)?;
        }

        for id in 0..modulus {
            match model.position(id) {
                Some(pos) => prop_assert_eq!(&log.read(id).unwrap(), &model.live[pos].1),
                None => {
                    let out = matches!(log.read(id), Err(WalError::OutOfRange { .. }));
                    prop_assert!(out, "read({}) should be out of range", id);
                }
            }
        }
        if let Some((last, _)) = model.live.back() {
            let through: Vec<(i64, Vec<u8>)> = model.live.iter().cloned().collect();
            prop_assert_eq!(log.read_through(*last).unwrap(), through);
        }
    }
}
