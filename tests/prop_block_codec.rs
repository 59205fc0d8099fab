//! Property-based tests for block framing: round trip and single-byte corruption.

use proptest::prelude::*;
use ringwal::block::{decode, encode, Blocks};
use ringwal::formats::BLOCK_HEADER_SIZE;
use ringwal::WalError;

proptest! {
    #![proptest_config(ProptestConfig {
        failure_persistence: None,
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn decode_inverts_encode(payload in prop::collection::vec(any::<u8>(), 0..2048)) {
        let enc = encode(&payload);
        prop_assert_eq!(enc.len(), BLOCK_HEADER_SIZE + payload.len());
        let (got, consumed) = decode(&enc).unwrap();
        prop_assert_eq!(got, &payload[..]);
        prop_assert_eq!(consumed, enc.len());
    }

    #[test]
    fn any_single_byte_flip_is_detected(
        payload in prop::collection::vec(any::<u8>(), 0..512),
        idx in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let mut enc = encode(&payload);
        let i = idx.index(enc.len());
        enc[i] ^= mask;
        let is_corrupt = matches!(decode(&enc), Err(WalError::Corrupt { .. }));
        prop_assert!(is_corrupt, "flip at {} of {} bytes went unnoticed", i, enc.len());
    }

    #[test]
    fn any_strict_prefix_is_rejected(
        payload in prop::collection::vec(any::<u8>(), 0..256),
        cut in any::<prop::sample::Index>(),
    ) {
        let enc = encode(&payload);
        let n = cut.index(enc.len());
        let is_corrupt = matches!(decode(&enc[..n]), Err(WalError::Corrupt { .. }));
        prop_assert!(is_corrupt);
    }

    #[test]
    fn consecutive_blocks_walk_back_in_order(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..32),
    ) {
        let buf: Vec<u8> = payloads.iter().flat_map(|p| encode(p)).collect();
        let got: Vec<Vec<u8>> = Blocks::new(&buf).map(|r| r.unwrap().1.to_vec()).collect();
        prop_assert_eq!(got, payloads);
    }
}
