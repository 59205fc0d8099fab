//! One segment file and its in-memory mirror.
//!
//! ## Public invariants
//!
//! - `index[i]` is the byte range of block `start + i` inside `buffer`.
//! - `buffer[..next_byte_to_sync]` is on stable storage; the rest is pending.
//! - Truncation only removes from the front, and always re-anchors the file name
//!   to the new first block id (identity is derived from the name).
//!
//! ## Recovery posture
//!
//! Opening a segment replays every block through the codec; any checksum or framing
//! failure is returned as `Corrupt`. Writes only ever append whole blocks, so a
//! partial tail never exists by construction.

use crate::block::{self, Blocks};
use crate::error::{WalError, WalResult};
use crate::formats::{SegmentName, BLOCK_HEADER_SIZE};
use crate::storage;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// A segment file holding a contiguous run of blocks.
#[derive(Debug)]
pub struct Segment {
    dir: PathBuf,
    name: SegmentName,
    max_size: usize,
    file_mode: u32,
    file: Option<File>,
    buffer: Vec<u8>,
    index: Vec<Range<usize>>,
    next_byte_to_sync: usize,
    /// Makes the next `sync` with pending bytes fail, for exercising error paths.
    #[cfg(test)]
    pub(crate) fail_sync: bool,
}

impl Segment {
    /// Describe a segment in `dir`; nothing is touched on disk until [`Segment::open`].
    pub fn new(dir: impl Into<PathBuf>, name: SegmentName, max_size: usize) -> Self {
        Self {
            dir: dir.into(),
            name,
            max_size,
            file_mode: 0o660,
            file: None,
            buffer: Vec::new(),
            index: Vec::new(),
            next_byte_to_sync: 0,
            #[cfg(test)]
            fail_sync: false,
        }
    }

    /// Full path of the segment file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(self.name.to_string())
    }

    /// Current file name.
    pub fn name(&self) -> SegmentName {
        self.name
    }

    /// First block id stored in this segment.
    pub fn start_block_id(&self) -> i64 {
        self.name.start
    }

    /// Id the next appended block would get.
    pub fn next_block_id(&self) -> i64 {
        self.name.start + self.index.len() as i64
    }

    /// True once [`Segment::open`] succeeded and until [`Segment::close`].
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if the segment holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bytes held in the buffer (synced and pending).
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes written but not yet synced.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len() - self.next_byte_to_sync
    }

    /// Open (creating if absent) and load every block, rebuilding the index.
    pub fn open(&mut self, file_mode: u32) -> WalResult<()> {
        self.load(file_mode, true)
    }

    /// Like [`Segment::open`], but a missing file is an I/O error (`NotFound`).
    ///
    /// Closed segments must already exist on disk.
    pub fn open_existing(&mut self, file_mode: u32) -> WalResult<()> {
        self.load(file_mode, false)
    }

    fn load(&mut self, file_mode: u32, create: bool) -> WalResult<()> {
        if self.is_open() {
            return Ok(());
        }
        let mut file = storage::segment_open_options(file_mode)
            .create(create)
            .open(self.path())?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        let mut index = Vec::new();
        for item in Blocks::new(&buffer) {
            let (range, _) = item?;
            index.push(range);
        }

        self.file_mode = file_mode;
        self.next_byte_to_sync = buffer.len();
        self.buffer = buffer;
        self.index = index;
        self.file = Some(file);
        Ok(())
    }

    /// Append one block to the buffer. Nothing reaches the file until [`Segment::sync`].
    ///
    /// Fails with `SegmentFull` if the encoded block would push the segment past its
    /// size ceiling.
    pub fn write(&mut self, payload: &[u8]) -> WalResult<()> {
        if !self.is_open() {
            return Err(WalError::Closed);
        }
        if self.size() + block::encoded_len(payload.len()) > self.max_size {
            return Err(WalError::SegmentFull);
        }
        let start = self.buffer.len();
        self.buffer.extend_from_slice(&block::encode(payload));
        self.index.push(start..self.buffer.len());
        Ok(())
    }

    /// Write the pending byte range to the file and `fsync` it.
    pub fn sync(&mut self) -> WalResult<()> {
        if self.pending_bytes() == 0 {
            return Ok(());
        }
        let Some(file) = self.file.as_mut() else {
            return Err(WalError::Closed);
        };
        #[cfg(test)]
        if self.fail_sync {
            return Err(std::io::Error::other("injected sync failure").into());
        }
        file.write_all(&self.buffer[self.next_byte_to_sync..])?;
        file.sync_all()?;
        self.next_byte_to_sync = self.buffer.len();
        Ok(())
    }

    /// Payload of `block_id` (header skipped).
    pub fn read(&self, block_id: i64) -> WalResult<&[u8]> {
        let range = usize::try_from(block_id - self.name.start)
            .ok()
            .and_then(|i| self.index.get(i))
            .ok_or(WalError::NotFound(block_id))?;
        Ok(&self.buffer[range.start + BLOCK_HEADER_SIZE..range.end])
    }

    /// Drop every block before `block_id` and re-anchor the file name at `block_id`.
    ///
    /// The retained bytes (including any pending ones) are rewritten through a temp
    /// file and renamed into place, then the old name is removed. `block_id` may be
    /// one past the last block, which empties the segment. Returns the number of
    /// blocks that remain.
    pub fn truncate(&mut self, block_id: i64) -> WalResult<usize> {
        if !self.is_open() {
            return Err(WalError::Closed);
        }
        let offset = usize::try_from(block_id - self.name.start)
            .ok()
            .filter(|&i| i <= self.index.len())
            .ok_or(WalError::NotFound(block_id))?;
        let cut = self
            .index
            .get(offset)
            .map(|r| r.start)
            .unwrap_or(self.buffer.len());

        let old_path = self.path();
        let new_name = SegmentName::new(block_id, self.name.active);
        let new_path = self.dir.join(new_name.to_string());

        storage::atomic_write_durable(&new_path, &self.buffer[cut..], self.file_mode)?;
        self.file = Some(storage::segment_open_options(self.file_mode).open(&new_path)?);

        self.buffer.drain(..cut);
        self.index.drain(..offset);
        for r in &mut self.index {
            *r = r.start - cut..r.end - cut;
        }
        self.next_byte_to_sync = self.buffer.len();
        self.name = new_name;

        if new_path != old_path {
            remove_segment_file(&old_path)?;
            storage::sync_dir(&self.dir)?;
        }
        Ok(self.index.len())
    }

    /// Strip the active suffix from the file name.
    pub fn demote(&mut self) -> WalResult<()> {
        if !self.name.active {
            return Ok(());
        }
        let from = self.path();
        let demoted = SegmentName::new(self.name.start, false);
        storage::rename_durable(&from, &self.dir.join(demoted.to_string()))?;
        self.name = demoted;
        Ok(())
    }

    /// Sync, release the file handle and drop the in-memory mirror.
    pub fn close(&mut self) -> WalResult<()> {
        if !self.is_open() {
            return Ok(());
        }
        self.sync()?;
        self.file = None;
        self.buffer = Vec::new();
        self.index = Vec::new();
        self.next_byte_to_sync = 0;
        Ok(())
    }

    /// Delete the segment file without syncing pending bytes.
    pub fn remove(mut self) -> WalResult<()> {
        self.file = None;
        remove_segment_file(&self.path())
    }
}

/// Remove a segment file, tolerating one that is already gone.
pub(crate) fn remove_segment_file(path: &Path) -> WalResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
