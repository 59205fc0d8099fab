//! `ringwal`: a segmented, checksummed, crash-recoverable write-ahead log.
//!
//! Built to sit under an embedded key-value store: every mutation is appended as an
//! opaque block before it is applied in memory, and the log is replayed on startup.
//!
//! Scope:
//! - block framing with an MD5 checksum (`block`)
//! - segment files named by their first block id (`segment`, `formats`)
//! - a bounded cache of closed segments (`cache`)
//! - the `Log` itself: recovery, rotation, circular block ids, truncation (`log`)
//! - postcard-typed helpers for the layer above (`replay`)
//!
//! Non-goal: the key-value map, network protocols, process supervision.
//!
//! ## Contract (what you can rely on)
//!
//! - **Integrity**: every block is checksummed; corruption is reported as an error,
//!   never masked as a shorter log.
//! - **Durability**: under [`Durability::Immediate`] a successful [`Log::write`] is on
//!   stable storage. Under [`Durability::Deferred`] blocks are synced by a background
//!   thread every `sync_interval`, on [`Log::sync`], on rotation and on [`Log::close`].
//! - **Crash recovery**: a crash mid-rotation leaves two active segments; [`Log::open`]
//!   resolves it in favour of the newest one without losing blocks.
//! - **Circular ids**: block ids run modulo `block_id_modulus`; when the live window
//!   would cover the whole id space, writes fail with [`WalError::WalFull`] until the
//!   caller truncates.
//!
//! ```no_run
//! use ringwal::{Log, Options};
//!
//! let log = Log::open("/var/lib/kv/wal", Options::default())?;
//! let id = log.write(b"put k v")?;
//! assert_eq!(log.read(id)?, b"put k v");
//! log.truncate(id)?;
//! log.close()?;
//! # Ok::<(), ringwal::WalError>(())
//! ```

pub mod block;
pub mod cache;
pub mod error;
pub mod formats;
pub mod log;
pub mod options;
pub mod range;
pub mod replay;
pub mod segment;
pub mod storage;

pub use error::{ErrorKind, WalError, WalResult};
pub use log::{BlockId, Log};
pub use options::{Durability, Options};
