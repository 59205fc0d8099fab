//! Construction options for [`crate::Log`].

use crate::error::{WalError, WalResult};
use crate::formats::{BLOCK_HEADER_SIZE, MAX_BLOCK_ID_MODULUS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest accepted segment size (segments are mirrored in memory).
pub const MAX_SEGMENT_SIZE: u64 = 1 << 30;

/// Policy for when written blocks reach stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// `fsync` the active segment before every `write` returns.
    #[default]
    Immediate,
    /// Leave blocks buffered; a background thread syncs every `sync_interval`,
    /// and callers may `sync()` explicitly.
    Deferred,
}

/// Options for opening a log directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Permission bits for a newly created log directory.
    pub dir_mode: u32,
    /// Permission bits for segment files.
    pub file_mode: u32,
    /// Size ceiling of one segment file, in bytes.
    pub segment_size: u64,
    /// Number of closed segments kept open in memory for reads.
    pub segment_cache_capacity: usize,
    /// When writes are synced.
    pub durability: Durability,
    /// Period of the background sync under [`Durability::Deferred`].
    pub sync_interval: Duration,
    /// Size of the circular block-id space.
    pub block_id_modulus: i64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_mode: 0o770,
            file_mode: 0o660,
            segment_size: 10 * 1024 * 1024,
            segment_cache_capacity: 3,
            durability: Durability::Immediate,
            sync_interval: Duration::from_secs(1),
            block_id_modulus: MAX_BLOCK_ID_MODULUS,
        }
    }
}

impl Options {
    /// Set the directory permission bits.
    pub fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    /// Set the segment file permission bits.
    pub fn with_file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    /// Set the per-segment size ceiling.
    pub fn with_segment_size(mut self, bytes: u64) -> Self {
        self.segment_size = bytes;
        self
    }

    /// Set how many closed segments stay cached.
    pub fn with_segment_cache_capacity(mut self, segments: usize) -> Self {
        self.segment_cache_capacity = segments;
        self
    }

    /// Set the durability policy.
    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Shorthand for [`Durability::Deferred`].
    pub fn no_sync(self) -> Self {
        self.with_durability(Durability::Deferred)
    }

    /// Set the background sync period.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Set the size of the circular block-id space.
    pub fn with_block_id_modulus(mut self, modulus: i64) -> Self {
        self.block_id_modulus = modulus;
        self
    }

    /// Reject invalid values.
    pub fn validate(&self) -> WalResult<()> {
        check_mode("dir_mode", self.dir_mode)?;
        check_mode("file_mode", self.file_mode)?;
        if self.segment_size < BLOCK_HEADER_SIZE as u64 || self.segment_size > MAX_SEGMENT_SIZE {
            return Err(WalError::InvalidConfig(format!(
                "segment_size must be in [{BLOCK_HEADER_SIZE}, {MAX_SEGMENT_SIZE}], got {}",
                self.segment_size
            )));
        }
        if self.durability == Durability::Deferred && self.sync_interval.is_zero() {
            return Err(WalError::InvalidConfig(
                "sync_interval must be non-zero for deferred durability".into(),
            ));
        }
        if !(2..=MAX_BLOCK_ID_MODULUS).contains(&self.block_id_modulus) {
            return Err(WalError::InvalidConfig(format!(
                "block_id_modulus must be in [2, {MAX_BLOCK_ID_MODULUS}], got {}",
                self.block_id_modulus
            )));
        }
        Ok(())
    }

    pub(crate) fn segment_size_bytes(&self) -> usize {
        self.segment_size as usize
    }
}

fn check_mode(field: &str, mode: u32) -> WalResult<()> {
    if mode == 0 || mode > 0o777 {
        return Err(WalError::InvalidConfig(format!(
            "{field} must be in (0, 0o777], got {mode:#o}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let o = Options::default();
        o.validate().unwrap();
        assert_eq!(o.segment_cache_capacity, 3);
        assert_eq!(o.durability, Durability::Immediate);
        assert_eq!(o.block_id_modulus, 10_000_000_000);
    }

    #[test]
    fn rejects_bad_modes() {
        for mode in [0, 0o1000, 0o7777] {
            assert!(matches!(
                Options::default().with_file_mode(mode).validate(),
                Err(WalError::InvalidConfig(_))
            ));
            assert!(matches!(
                Options::default().with_dir_mode(mode).validate(),
                Err(WalError::InvalidConfig(_))
            ));
        }
        Options::default().with_file_mode(0o777).validate().unwrap();
    }

    #[test]
    fn rejects_bad_sizes_and_modulus() {
        assert!(Options::default().with_segment_size(8).validate().is_err());
        assert!(Options::default()
            .with_segment_size(MAX_SEGMENT_SIZE + 1)
            .validate()
            .is_err());
        assert!(Options::default().with_block_id_modulus(1).validate().is_err());
        assert!(Options::default()
            .with_block_id_modulus(MAX_BLOCK_ID_MODULUS + 1)
            .validate()
            .is_err());
        Options::default()
            .with_segment_size(BLOCK_HEADER_SIZE as u64)
            .with_block_id_modulus(2)
            .validate()
            .unwrap();
    }

    #[test]
    fn deferred_requires_interval() {
        let o = Options::default()
            .no_sync()
            .with_sync_interval(Duration::ZERO);
        assert!(o.validate().is_err());
        // Immediate durability ignores the interval.
        Options::default()
            .with_sync_interval(Duration::ZERO)
            .validate()
            .unwrap();
    }
}
