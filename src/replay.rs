//! Typed payload helpers and replay.
//!
//! The log stores opaque bytes; the key-value layer above it stores postcard-encoded
//! operations. These helpers keep the encode/decode plumbing out of consumers.

use crate::error::{WalError, WalResult};
use crate::log::{BlockId, Log};

impl Log {
    /// Append a postcard-encoded value, returning its block id.
    pub fn write_postcard<T: serde::Serialize>(&self, value: &T) -> WalResult<BlockId> {
        let bytes = postcard::to_allocvec(value).map_err(|e| WalError::Encode(e.to_string()))?;
        self.write(&bytes)
    }

    /// Read and decode a postcard-encoded value.
    pub fn read_postcard<T: serde::de::DeserializeOwned>(&self, block_id: BlockId) -> WalResult<T> {
        let bytes = self.read(block_id)?;
        postcard::from_bytes(&bytes).map_err(|e| WalError::Decode(e.to_string()))
    }
}

/// Replay every live block, decoded from postcard, in log order.
///
/// Returns the number of records applied.
pub fn replay_postcard<T: serde::de::DeserializeOwned>(
    log: &Log,
    mut apply: impl FnMut(BlockId, T) -> WalResult<()>,
) -> WalResult<u64> {
    let Some(last) = log.last_block_id()? else {
        return Ok(0);
    };
    let mut count = 0u64;
    for (id, bytes) in log.read_through(last)? {
        let v: T = postcard::from_bytes(&bytes).map_err(|e| WalError::Decode(e.to_string()))?;
        apply(id, v)?;
        count += 1;
    }
    Ok(count)
}

/// Replay postcard-decoded records from `since` (inclusive) through the last block.
///
/// This is the "snapshot + suffix" adapter: a key-value snapshot remembers the id
/// of the first block it does not cover, and only the suffix is re-applied.
pub fn replay_postcard_since<T: serde::de::DeserializeOwned>(
    log: &Log,
    since: BlockId,
    mut apply: impl FnMut(BlockId, T) -> WalResult<()>,
) -> WalResult<u64> {
    let (Some(first), Some(last)) = (log.first_block_id()?, log.last_block_id()?) else {
        return Ok(0);
    };
    let mut skipping = since != first;
    let mut count = 0u64;
    for (id, bytes) in log.read_through(last)? {
        if skipping {
            if id != since {
                continue;
            }
            skipping = false;
        }
        let v: T = postcard::from_bytes(&bytes).map_err(|e| WalError::Decode(e.to_string()))?;
        apply(id, v)?;
        count += 1;
    }
    if skipping {
        return Err(WalError::OutOfRange {
            block_id: since,
            first: Some(first),
            last: Some(last),
        });
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    enum Op {
        Put { key: String, value: Vec<u8> },
        Delete { key: String },
    }

    fn ops() -> Vec<Op> {
        vec![
            Op::Put {
                key: "a".into(),
                value: b"1".to_vec(),
            },
            Op::Put {
                key: "b".into(),
                value: b"2".to_vec(),
            },
            Op::Delete { key: "a".into() },
        ]
    }

    #[test]
    fn postcard_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let log = Log::open(tmp.path(), Options::default()).unwrap();
        let ids: Vec<BlockId> = ops().iter().map(|op| log.write_postcard(op).unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(log.read_postcard::<Op>(2).unwrap(), Op::Delete { key: "a".into() });
    }

    #[test]
    fn replay_applies_live_window_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let log = Log::open(tmp.path(), Options::default().with_segment_size(64)).unwrap();
        for op in ops() {
            log.write_postcard(&op).unwrap();
        }
        let mut seen = Vec::new();
        let n = replay_postcard::<Op>(&log, |id, op| {
            seen.push((id, op));
            Ok(())
        })
        .unwrap();
        assert_eq!(n, 3);
        assert_eq!(
            seen.into_iter().map(|(_, op)| op).collect::<Vec<_>>(),
            ops()
        );

        log.truncate(1).unwrap();
        let n = replay_postcard::<Op>(&log, |_, _| Ok(())).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn replay_since_skips_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let log = Log::open(tmp.path(), Options::default()).unwrap();
        for op in ops() {
            log.write_postcard(&op).unwrap();
        }
        let mut ids = Vec::new();
        let n = replay_postcard_since::<Op>(&log, 1, |id, _| {
            ids.push(id);
            Ok(())
        })
        .unwrap();
        assert_eq!(n, 2);
        assert_eq!(ids, vec![1, 2]);

        assert!(matches!(
            replay_postcard_since::<Op>(&log, 7, |_, _| Ok(())),
            Err(WalError::OutOfRange { block_id: 7, .. })
        ));
    }

    #[test]
    fn replay_of_empty_log_is_zero_and_bad_payload_is_decode_error() {
        let tmp = tempfile::tempdir().unwrap();
        let log = Log::open(tmp.path(), Options::default()).unwrap();
        assert_eq!(replay_postcard::<Op>(&log, |_, _| Ok(())).unwrap(), 0);

        log.write(&[0xff, 0xff, 0xff]).unwrap();
        assert!(matches!(
            replay_postcard::<Op>(&log, |_, _| Ok(())),
            Err(WalError::Decode(_))
        ));
    }
}
