//! The segmented log: recovery, append, read, truncate, close.
//!
//! ## Public invariants
//!
//! - Exactly one segment carries the active suffix once `open` returns.
//! - Segments never straddle the wrap point of the block-id space, so block
//!   `start + i` is always the `i`-th block of the segment starting at `start`.
//! - The active segment is never in the segment cache.
//! - Closed, corrupted and background-failed are terminal: once set they are never cleared.
//!
//! ## Recovery posture
//!
//! Rotation creates (and syncs) the new active segment *before* the old one loses
//! its suffix, so a crash in between leaves two active files. `open` keeps the one
//! with the highest start id and demotes the rest, unless that one ends at the
//! modulus and another starts at 0: then the rotation wrapped and 0 is newest.
//! Only the active segment is replayed at open time; closed segments are validated
//! lazily when first read (or at open, when they must be read to pick the active one).

use crate::block;
use crate::cache::SegmentCache;
use crate::error::{WalError, WalResult};
use crate::formats::SegmentName;
use crate::options::{Durability, Options};
use crate::range::BlockRange;
use crate::segment::{remove_segment_file, Segment};
use crate::storage::{self, DirLock};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Identifier of a block in the circular id space `[0, block_id_modulus)`.
pub type BlockId = i64;

/// A segmented, checksummed, crash-recoverable append log rooted at a directory.
///
/// All operations take `&self` and are serialized by one internal lock, so a `Log`
/// can be shared across threads behind an `Arc`.
pub struct Log {
    dir: PathBuf,
    state: Arc<Mutex<LogState>>,
    syncer: Mutex<Option<BackgroundSync>>,
}

struct LogState {
    dir: PathBuf,
    opts: Options,
    /// Start ids of every segment (the active one included), ascending.
    segments: Vec<BlockId>,
    active: Segment,
    cache: SegmentCache<BlockId, Segment>,
    range: Option<BlockRange>,
    closed: bool,
    corrupted: bool,
    background_failed: bool,
    dir_lock: Option<DirLock>,
}

impl Log {
    /// Open (or create) the log in `dir`, recovering its state.
    ///
    /// Takes an exclusive lock on the directory for the lifetime of the returned
    /// `Log`; a second open of the same directory fails with `DirLocked`.
    pub fn open(dir: impl AsRef<Path>, opts: Options) -> WalResult<Self> {
        opts.validate()?;
        let dir = dir.as_ref().to_path_buf();
        storage::ensure_dir(&dir, opts.dir_mode)?;
        let dir_lock = DirLock::acquire(&dir, opts.file_mode)?;

        let state = LogState::recover(dir.clone(), opts, dir_lock)?;
        let durability = state.opts.durability;
        let interval = state.opts.sync_interval;
        let state = Arc::new(Mutex::new(state));

        let syncer = match durability {
            Durability::Deferred => Some(BackgroundSync::spawn(state.clone(), interval)?),
            Durability::Immediate => None,
        };

        Ok(Self {
            dir,
            state,
            syncer: Mutex::new(syncer),
        })
    }

    /// Directory this log lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append `payload`, returning its block id.
    ///
    /// Under [`Durability::Immediate`] the block is on stable storage when this returns.
    /// Fails with `WalFull` when the id space is exhausted; truncate, then retry.
    pub fn write(&self, payload: &[u8]) -> WalResult<BlockId> {
        self.lock()?.write(payload)
    }

    /// Read the payload of a live block.
    pub fn read(&self, block_id: BlockId) -> WalResult<Vec<u8>> {
        let mut st = self.lock()?;
        st.check_state()?;
        st.check_range(block_id)?;
        st.read_block(block_id)
    }

    /// Read every live block from the first one through `block_id`, in log order.
    pub fn read_through(&self, block_id: BlockId) -> WalResult<Vec<(BlockId, Vec<u8>)>> {
        let mut st = self.lock()?;
        st.check_state()?;
        let range = st.check_range(block_id)?;
        let count = range.offset_of(block_id).map_or(0, |o| o as usize + 1);
        let mut out = Vec::with_capacity(count);
        for id in range.iter().take(count) {
            out.push((id, st.read_block(id)?));
        }
        Ok(out)
    }

    /// Flush and `fsync` any buffered blocks of the active segment.
    pub fn sync(&self) -> WalResult<()> {
        let mut st = self.lock()?;
        st.check_state()?;
        st.active.sync()
    }

    /// Drop every block before `block_id`, which must be live.
    pub fn truncate(&self, block_id: BlockId) -> WalResult<()> {
        self.lock()?.truncate(block_id)
    }

    /// Number of live blocks.
    pub fn len(&self) -> WalResult<i64> {
        let st = self.lock()?;
        st.check_state()?;
        Ok(st.range.map_or(0, |r| r.len()))
    }

    /// True if no block is live.
    pub fn is_empty(&self) -> WalResult<bool> {
        Ok(self.len()? == 0)
    }

    /// First live block id, if any.
    pub fn first_block_id(&self) -> WalResult<Option<BlockId>> {
        let st = self.lock()?;
        st.check_state()?;
        Ok(st.range.map(|r| r.first()))
    }

    /// Last live block id, if any.
    pub fn last_block_id(&self) -> WalResult<Option<BlockId>> {
        let st = self.lock()?;
        st.check_state()?;
        Ok(st.range.map(|r| r.last()))
    }

    /// Close every segment, release the directory and stop the background syncer.
    ///
    /// A second call fails with `Closed`.
    pub fn close(&self) -> WalResult<()> {
        {
            let mut st = self.lock()?;
            if st.closed {
                return Err(WalError::Closed);
            }
            st.close_segments()?;
            st.closed = true;
            if let Some(lock) = st.dir_lock.take() {
                tracing::trace!(path = %lock.path().display(), "released directory lock");
            }
        }
        let syncer = self
            .syncer
            .lock()
            .map_err(|e| WalError::LockFailed {
                resource: "background syncer".into(),
                reason: e.to_string(),
            })?
            .take();
        if let Some(syncer) = syncer {
            syncer.stop();
        }
        tracing::debug!(dir = %self.dir.display(), "log closed");
        Ok(())
    }

    fn lock(&self) -> WalResult<MutexGuard<'_, LogState>> {
        self.state.lock().map_err(|e| WalError::LockFailed {
            resource: format!("log state ({})", self.dir.display()),
            reason: e.to_string(),
        })
    }
}

impl Drop for Log {
    fn drop(&mut self) {
        match self.close() {
            Ok(()) | Err(WalError::Closed) => {}
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "failed to close log on drop")
            }
        }
    }
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Log").field("dir", &self.dir).finish_non_exhaustive()
    }
}

impl LogState {
    fn recover(dir: PathBuf, opts: Options, dir_lock: DirLock) -> WalResult<Self> {
        let modulus = opts.block_id_modulus;
        let mut names = storage::scan_segments(&dir)?;

        if let Some(bad) = names.iter().find(|n| n.start >= modulus) {
            return Err(WalError::InvalidConfig(format!(
                "segment {bad} is outside block_id_modulus {modulus}"
            )));
        }

        let actives: Vec<SegmentName> = names.iter().copied().filter(|n| n.active).collect();
        let active_name = match actives.as_slice() {
            [] => match newest_segment(&dir, &names, &opts)? {
                Some(newest) => {
                    tracing::warn!(dir = %dir.display(), start = newest.start, "no active segment on disk, promoting newest segment");
                    let promoted = SegmentName::new(newest.start, true);
                    storage::rename_durable(
                        &dir.join(newest.to_string()),
                        &dir.join(promoted.to_string()),
                    )?;
                    promoted
                }
                None => SegmentName::new(0, true),
            },
            [only] => *only,
            // A rotation cut short at the wrap point leaves the old segment ending at
            // the modulus and the new one at 0; the one at 0 is newer.
            [lowest, .., highest] => {
                if lowest.start == 0 && segment_end(&dir, *highest, &opts)? == modulus {
                    *lowest
                } else {
                    *highest
                }
            }
        };

        for stale in names.iter().filter(|n| n.active && **n != active_name) {
            tracing::warn!(dir = %dir.display(), start = stale.start, "demoting stale active segment");
            storage::rename_durable(
                &dir.join(stale.to_string()),
                &dir.join(SegmentName::new(stale.start, false).to_string()),
            )?;
        }
        names.retain(|n| n.start != active_name.start);
        let mut segments: Vec<BlockId> = names.iter().map(|n| n.start).collect();
        segments.push(active_name.start);
        segments.sort_unstable();

        let mut active = Segment::new(&dir, active_name, opts.segment_size_bytes());
        if let Err(e) = active.open(opts.file_mode) {
            if matches!(e, WalError::Corrupt { .. }) {
                tracing::error!(dir = %dir.display(), start = active_name.start, error = %e, "active segment is corrupt");
            }
            return Err(e);
        }
        if active.next_block_id() > modulus {
            return Err(WalError::InvalidConfig(format!(
                "active segment {active_name} holds ids beyond block_id_modulus {modulus}"
            )));
        }

        let mut state = Self {
            dir,
            cache: SegmentCache::new(opts.segment_cache_capacity),
            opts,
            segments,
            active,
            range: None,
            closed: false,
            corrupted: false,
            background_failed: false,
            dir_lock: Some(dir_lock),
        };
        state.range = state.locate_live_range();

        tracing::info!(
            dir = %state.dir.display(),
            segments = state.segments.len(),
            active = state.active.start_block_id(),
            first = ?state.range.map(|r| r.first()),
            last = ?state.range.map(|r| r.last()),
            "log opened"
        );
        Ok(state)
    }

    fn locate_live_range(&self) -> Option<BlockRange> {
        let modulus = self.opts.block_id_modulus;
        let active_start = self.active.start_block_id();
        let last = if !self.active.is_empty() {
            self.active.next_block_id() - 1
        } else if self.segments.len() > 1 {
            (active_start - 1).rem_euclid(modulus)
        } else {
            return None;
        };
        let first = self.live_order().first().copied().unwrap_or(active_start);
        Some(BlockRange::new(first, last, modulus))
    }

    /// Segment start ids from the oldest live one through the active one.
    fn live_order(&self) -> Vec<BlockId> {
        let split = self
            .segments
            .partition_point(|&s| s <= self.active.start_block_id());
        let mut order = self.segments[split..].to_vec();
        order.extend_from_slice(&self.segments[..split]);
        order
    }

    fn check_state(&self) -> WalResult<()> {
        if self.closed {
            return Err(WalError::Closed);
        }
        if self.corrupted {
            return Err(WalError::Corrupted);
        }
        if self.background_failed {
            return Err(WalError::BackgroundFailed);
        }
        Ok(())
    }

    fn check_range(&self, block_id: BlockId) -> WalResult<BlockRange> {
        match self.range {
            Some(r) if r.contains(block_id) => Ok(r),
            r => Err(WalError::OutOfRange {
                block_id,
                first: r.map(|r| r.first()),
                last: r.map(|r| r.last()),
            }),
        }
    }

    /// Start id of the segment owning `block_id` (rightmost start not above it).
    fn locate(&self, block_id: BlockId) -> WalResult<BlockId> {
        let idx = self.segments.partition_point(|&s| s <= block_id);
        idx.checked_sub(1)
            .map(|i| self.segments[i])
            .ok_or(WalError::NotFound(block_id))
    }

    fn closed_segment(&self, start: BlockId) -> Segment {
        Segment::new(
            &self.dir,
            SegmentName::new(start, false),
            self.opts.segment_size_bytes(),
        )
    }

    fn write(&mut self, payload: &[u8]) -> WalResult<BlockId> {
        self.check_state()?;
        let encoded = block::encoded_len(payload.len());
        if encoded > self.opts.segment_size_bytes() {
            return Err(WalError::InvalidParam(format!(
                "payload of {} bytes encodes to {encoded} bytes, above segment_size {}",
                payload.len(),
                self.opts.segment_size
            )));
        }

        let range = match self.range {
            Some(r) => r.extended().ok_or(WalError::WalFull)?,
            None => BlockRange::single(self.active.next_block_id(), self.opts.block_id_modulus),
        };
        let id = range.last();

        // Ids wrapped past the active segment's run: start a new segment at 0.
        if self.active.next_block_id() != id {
            self.rotate(id)?;
        }
        match self.active.write(payload) {
            Err(WalError::SegmentFull) => {
                self.rotate(id)?;
                self.active.write(payload)?;
            }
            other => other?,
        }
        self.range = Some(range);

        if self.opts.durability == Durability::Immediate {
            self.active.sync()?;
        }
        Ok(id)
    }

    /// Replace the active segment with a fresh one starting at `next`.
    fn rotate(&mut self, next: BlockId) -> WalResult<()> {
        // `close` drops the index, so decide now whether the old segment is worth keeping.
        let was_empty = self.active.is_empty();
        self.active.close()?;
        let mut fresh = Segment::new(
            &self.dir,
            SegmentName::new(next, true),
            self.opts.segment_size_bytes(),
        );
        let created = fresh
            .open(self.opts.file_mode)
            .and_then(|()| storage::sync_dir(&self.dir));
        if let Err(e) = created {
            // Keep the old active segment usable.
            self.active.open(self.opts.file_mode)?;
            return Err(e);
        }

        let mut old = std::mem::replace(&mut self.active, fresh);
        let old_name = old.name();
        if was_empty {
            old.remove()?;
            storage::sync_dir(&self.dir)?;
            self.segments.retain(|&s| s != old_name.start);
        } else {
            old.demote()?;
        }
        let pos = self.segments.partition_point(|&s| s < next);
        self.segments.insert(pos, next);
        tracing::debug!(dir = %self.dir.display(), from = %old_name, to = next, kept = !was_empty, "rotated active segment");
        Ok(())
    }

    fn read_block(&mut self, block_id: BlockId) -> WalResult<Vec<u8>> {
        let start = self.locate(block_id)?;
        if start == self.active.start_block_id() {
            return Ok(self.active.read(block_id)?.to_vec());
        }
        if let Some(seg) = self.cache.get(&start) {
            return Ok(seg.read(block_id)?.to_vec());
        }

        let mut seg = self.closed_segment(start);
        seg.open_existing(self.opts.file_mode)?;
        let payload = seg.read(block_id).map(<[u8]>::to_vec);
        if let Some(mut evicted) = self.cache.insert(start, seg) {
            evicted.close()?;
        }
        payload
    }

    fn truncate(&mut self, block_id: BlockId) -> WalResult<()> {
        self.check_state()?;
        let range = self.check_range(block_id)?;
        if block_id == range.first() {
            return Ok(());
        }
        let target = self.locate(block_id)?;

        for start in self.live_order() {
            if start == target {
                break;
            }
            self.drop_segment(start)?;
        }

        let active_start = self.active.start_block_id();
        let first = if target == active_start {
            self.active.truncate(block_id)?;
            self.active.sync()?;
            self.rename_start(target, block_id);
            block_id
        } else {
            let mut seg = match self.cache.remove(&target) {
                Some(seg) => seg,
                None => self.closed_segment(target),
            };
            let remaining = match seg
                .open_existing(self.opts.file_mode)
                .and_then(|()| seg.truncate(block_id))
            {
                Ok(n) => n,
                Err(e) => {
                    if matches!(e, WalError::Corrupt { .. }) {
                        tracing::error!(dir = %self.dir.display(), start = target, error = %e, "corrupt segment during truncate");
                        self.corrupted = true;
                    }
                    return Err(e);
                }
            };
            self.rename_start(target, block_id);
            if remaining == 0 {
                seg.remove()?;
                self.segments.retain(|&s| s != block_id);
                // Superseded: the next segment in log order now holds the first live block.
                self.live_order().first().copied().unwrap_or(active_start)
            } else {
                seg.close()?;
                block_id
            }
        };
        storage::sync_dir(&self.dir)?;

        self.range = Some(range.truncated(first));
        tracing::debug!(dir = %self.dir.display(), first, last = range.last(), "log truncated");
        Ok(())
    }

    fn drop_segment(&mut self, start: BlockId) -> WalResult<()> {
        match self.cache.remove(&start) {
            Some(seg) => seg.remove()?,
            None => remove_segment_file(&self.closed_segment(start).path())?,
        }
        self.segments.retain(|&s| s != start);
        Ok(())
    }

    fn rename_start(&mut self, from: BlockId, to: BlockId) {
        self.segments.retain(|&s| s != from);
        let pos = self.segments.partition_point(|&s| s < to);
        self.segments.insert(pos, to);
    }

    fn close_segments(&mut self) -> WalResult<()> {
        for (_, mut seg) in self.cache.drain() {
            seg.close()?;
        }
        self.active.close()
    }
}

/// Id one past the last block of an existing segment.
fn segment_end(dir: &Path, name: SegmentName, opts: &Options) -> WalResult<BlockId> {
    let mut seg = Segment::new(dir, name, opts.segment_size_bytes());
    seg.open_existing(opts.file_mode)?;
    let end = seg.next_block_id();
    seg.close()?;
    Ok(end)
}

/// The segment holding the newest blocks among `names` (sorted by start id).
///
/// That is the segment followed by a gap in circular id order, or the highest start
/// when the segments form an unbroken ring. Every segment is read to find its end.
fn newest_segment(
    dir: &Path,
    names: &[SegmentName],
    opts: &Options,
) -> WalResult<Option<SegmentName>> {
    for (i, name) in names.iter().enumerate() {
        let end = segment_end(dir, *name, opts)?;
        let next = names[(i + 1) % names.len()].start;
        if end % opts.block_id_modulus != next {
            return Ok(Some(*name));
        }
    }
    Ok(names.last().copied())
}

/// Deferred-durability syncer: wakes every interval and syncs the active segment.
///
/// Stops on the first sync failure (setting the background-failed flag) or when
/// signalled by `Log::close`.
struct BackgroundSync {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl BackgroundSync {
    fn spawn(state: Arc<Mutex<LogState>>, interval: Duration) -> WalResult<Self> {
        let (stop, stopped) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("ringwal-sync".into())
            .spawn(move || run_background_sync(&state, &stopped, interval))?;
        Ok(Self { stop, handle })
    }

    fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            tracing::error!("background sync thread panicked");
        }
    }
}

fn run_background_sync(
    state: &Mutex<LogState>,
    stopped: &mpsc::Receiver<()>,
    interval: Duration,
) {
    loop {
        match stopped.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
        let Ok(mut st) = state.lock() else {
            return;
        };
        if st.check_state().is_err() {
            return;
        }
        if let Err(e) = st.active.sync() {
            tracing::error!(dir = %st.dir.display(), error = %e, "background sync failed, log is now read-only");
            st.background_failed = true;
            return;
        }
    }
}
