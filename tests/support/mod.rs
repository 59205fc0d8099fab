//! Shared helpers for integration tests.
//!
//! Lives under `tests/support/` so it is not compiled as a standalone test target.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// Segment file names in `dir`, sorted, without the lock file.
pub fn segment_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n != ".lock")
        .collect();
    names.sort();
    names
}

/// Path of the segment file named `name` in `dir`.
pub fn seg(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

/// XOR one byte of a file in place.
pub fn flip_byte(path: &Path, offset: usize) {
    let mut bytes = fs::read(path).unwrap();
    bytes[offset] ^= 0x5a;
    fs::write(path, bytes).unwrap();
}

/// Length of a file in bytes.
pub fn file_len(path: &Path) -> u64 {
    fs::metadata(path).unwrap().len()
}

/// A payload that is recognisable per index.
pub fn payload(i: usize, len: usize) -> Vec<u8> {
    (0..len).map(|j| (i * 31 + j) as u8).collect()
}
