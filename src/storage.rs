//! Filesystem helpers for the log directory.
//!
//! Vocabulary note:
//! - Writing bytes through a file handle is a visibility boundary, not a durability one.
//!   Stable storage requires `sync_all`/`fsync`, and a create or rename additionally
//!   requires syncing the parent directory before the *name* survives power loss.

use crate::error::{WalError, WalResult};
use crate::formats::{SegmentName, LOCK_FILE_NAME, TEMP_SUFFIX};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Open options for a segment file: create-or-append, readable, with `mode` on unix.
pub fn segment_open_options(mode: u32) -> OpenOptions {
    let mut opts = OpenOptions::new();
    opts.read(true).append(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    opts
}

/// Ensure `dir` exists as a directory, creating it (and parents) with `mode` if missing.
///
/// Fails with `InvalidParam` if the path exists but is not a directory.
pub fn ensure_dir(dir: &Path, mode: u32) -> WalResult<()> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(WalError::InvalidParam(format!(
                "{} exists and is not a directory",
                dir.display()
            )))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(dir)?;
    if let Some(parent) = dir.parent() {
        if !parent.as_os_str().is_empty() {
            sync_dir(parent)?;
        }
    }
    Ok(())
}

/// `fsync` a directory so that creates, renames and removals inside it are durable.
///
/// No-op on platforms where directories cannot be opened as files.
pub fn sync_dir(dir: &Path) -> WalResult<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

/// Atomically replace `path` with `data`, with explicit durability barriers.
///
/// Strategy:
/// - write `<path>.tmp`
/// - `sync_all` the temp file
/// - rename temp → final
/// - sync the parent directory
pub fn atomic_write_durable(path: &Path, data: &[u8], mode: u32) -> WalResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(TEMP_SUFFIX);
    let tmp = PathBuf::from(tmp);

    let result = (|| -> WalResult<()> {
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(mode);
        }
        let mut f = opts.open(&tmp)?;
        f.write_all(data)?;
        f.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    #[cfg(not(unix))]
    let _ = mode;

    match path.parent() {
        Some(parent) => sync_dir(parent),
        None => Ok(()),
    }
}

/// Rename `from` → `to` and sync the parent directory.
pub fn rename_durable(from: &Path, to: &Path) -> WalResult<()> {
    fs::rename(from, to)?;
    match to.parent() {
        Some(parent) => sync_dir(parent),
        None => Ok(()),
    }
}

/// Exclusive advisory lock on `<dir>/.lock`, held for the lifetime of a `Log`.
#[derive(Debug)]
pub struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    /// Take the lock, failing fast with `DirLocked` if another holder exists.
    pub fn acquire(dir: &Path, mode: u32) -> WalResult<Self> {
        let path = dir.join(LOCK_FILE_NAME);
        let mut opts = OpenOptions::new();
        opts.read(true).write(true).create(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;
        let file = opts.open(&path)?;
        if fs2::FileExt::try_lock_exclusive(&file).is_err() {
            return Err(WalError::DirLocked(dir.to_path_buf()));
        }
        Ok(Self { file, path })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release directory lock");
        }
    }
}

/// List the segment files in `dir`.
///
/// Subdirectories and the lock file are skipped. Leftover `*.tmp` files from an
/// interrupted rewrite are removed. Any other unparseable name is an error.
pub fn scan_segments(dir: &Path) -> WalResult<Vec<SegmentName>> {
    let mut out = Vec::new();
    let mut removed_tmp = false;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == LOCK_FILE_NAME {
            continue;
        }
        if name.ends_with(TEMP_SUFFIX) {
            tracing::warn!(file = %name, "removing leftover temp file");
            fs::remove_file(entry.path())?;
            removed_tmp = true;
            continue;
        }
        out.push(SegmentName::parse(&name)?);
    }
    if removed_tmp {
        sync_dir(dir)?;
    }
    out.sort();
    Ok(out)
}
