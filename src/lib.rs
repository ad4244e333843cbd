//! pgbackrest-core — block-incremental delta engine, pluggable storage
//! backends, and a three-phase configuration resolver for a PostgreSQL
//! backup/restore system.
//!
//! Guarantees carried across every module:
//! - A block-map's index is the block's position in the *new* file; within
//!   one `Read`, super blocks stay in physical offset order and, within a
//!   super block, block-needs are strictly ascending by `no` (§3).
//! - Info files keep a `.copy` shadow and fail over to it on any format or
//!   checksum mismatch in the primary, preferring the primary when both are
//!   valid (§4.6).
//! - Option resolution always terminates: a dependency cycle is detected and
//!   reported as `ErrorKind::AssertError` rather than looped on forever
//!   (§4.4 "Determinism").

pub mod block_delta;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod info;
pub mod ini;
pub mod io;
pub mod lock;
pub mod perf;
pub mod storage;

pub use block_delta::{BlockDeltaCursor, BlockDeltaPlan, BlockMap, BlockMapItem, BlockNeed, ReadPlan, SuperBlockPlan, WriteRequest};
pub use config::{Command, OptionSource, OptionValue, ResolvedConfig};
pub use error::{ErrorKind, PgbrError, Result};
pub use info::{InfoArchive, InfoBackup, InfoHistoryRecord};
pub use lock::{LockHandle, LockType};
pub use storage::{InfoLevel, NewWriteOptions, Storage, StorageFeature, StorageInfo, StorageType};
