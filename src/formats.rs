//! On-disk format constants and segment file naming.
//!
//! ## Public invariants (must not change without a migration)
//!
//! - A segment file is named with the zero-padded decimal of its first block id,
//!   exactly [`SEGMENT_NAME_WIDTH`] digits, e.g. `0000000042`.
//! - The segment currently accepting writes carries [`ACTIVE_SUFFIX`].
//! - Files have no header or footer: the content is a concatenation of blocks
//!   (see [`crate::block`]).

use crate::error::{WalError, WalResult};
use std::fmt;

/// Bytes in a block header: `[length:8][checksum:16]`.
pub const BLOCK_HEADER_SIZE: usize = 8 + CHECKSUM_SIZE;
/// Bytes in a block checksum (MD5 digest).
pub const CHECKSUM_SIZE: usize = 16;
/// Width of the decimal start id in segment file names.
pub const SEGMENT_NAME_WIDTH: usize = 10;
/// Suffix marking the active segment.
pub const ACTIVE_SUFFIX: &str = ".active";
/// Suffix of in-flight rewrite files.
pub const TEMP_SUFFIX: &str = ".tmp";
/// Name of the directory lock file.
pub const LOCK_FILE_NAME: &str = ".lock";
/// Largest block-id modulus whose ids still fit [`SEGMENT_NAME_WIDTH`] digits.
pub const MAX_BLOCK_ID_MODULUS: i64 = 10_000_000_000;

/// Parsed segment file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentName {
    /// First block id stored in the segment.
    pub start: i64,
    /// Whether the name carries the active suffix.
    pub active: bool,
}

impl SegmentName {
    /// Build a name.
    pub fn new(start: i64, active: bool) -> Self {
        Self { start, active }
    }

    /// Parse a file name such as `0000000042` or `0000000042.active`.
    pub fn parse(name: &str) -> WalResult<Self> {
        let (digits, active) = match name.strip_suffix(ACTIVE_SUFFIX) {
            Some(d) => (d, true),
            None => (name, false),
        };
        if digits.len() != SEGMENT_NAME_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WalError::InvalidSegmentName(name.to_string()));
        }
        let start = digits
            .parse::<i64>()
            .map_err(|_| WalError::InvalidSegmentName(name.to_string()))?;
        Ok(Self { start, active })
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.start, width = SEGMENT_NAME_WIDTH)?;
        if self.active {
            f.write_str(ACTIVE_SUFFIX)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_fixed_width() {
        assert_eq!(SegmentName::new(0, true).to_string(), "0000000000.active");
        assert_eq!(SegmentName::new(42, false).to_string(), "0000000042");
        assert_eq!(
            SegmentName::new(MAX_BLOCK_ID_MODULUS - 1, false).to_string(),
            "9999999999"
        );
    }

    #[test]
    fn parse_accepts_both_forms() {
        assert_eq!(
            SegmentName::parse("0000000042").unwrap(),
            SegmentName::new(42, false)
        );
        assert_eq!(
            SegmentName::parse("0000000007.active").unwrap(),
            SegmentName::new(7, true)
        );
    }

    #[test]
    fn parse_rejects_malformed_names() {
        for bad in [
            "42",
            "00000000042",
            "000000004x",
            "0000000042.tmp",
            "+000000042",
            ".active",
            "",
        ] {
            assert!(
                matches!(SegmentName::parse(bad), Err(WalError::InvalidSegmentName(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
