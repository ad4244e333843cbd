//! Storage interface & backends (§4.2).
//!
//! The source's struct-of-function-pointers driver interface becomes an
//! ordinary trait (§9 "Polymorphism via v-table structs"); the feature
//! bitset becomes a `const` associated value on each implementation.

pub mod azure;
pub mod posix;
pub mod read;
pub mod s3;
pub mod sftp;
pub mod write;

use crate::buffer::Buffer;
use crate::error::Result;
use crate::io::{IoRead, IoWrite};
pub use read::StorageRead;
pub use write::{RemoteSink, StorageWrite};

/// Capability bitset a backend advertises; generic code consults it before
/// invoking optional operations (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageFeature(u32);

impl StorageFeature {
    pub const PATH: StorageFeature = StorageFeature(0b0000_0001);
    pub const HARD_LINK: StorageFeature = StorageFeature(0b0000_0010);
    pub const SYM_LINK: StorageFeature = StorageFeature(0b0000_0100);
    pub const PATH_SYNC: StorageFeature = StorageFeature(0b0000_1000);
    pub const INFO_DETAIL: StorageFeature = StorageFeature(0b0001_0000);
    pub const NONE: StorageFeature = StorageFeature(0);

    pub const fn union(self, other: StorageFeature) -> StorageFeature {
        StorageFeature(self.0 | other.0)
    }

    pub const fn contains(self, other: StorageFeature) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for StorageFeature {
    type Output = StorageFeature;
    fn bitor(self, rhs: StorageFeature) -> StorageFeature {
        self.union(rhs)
    }
}

/// How much detail a caller needs from `info`/`list` — cheaper probes can
/// skip stat or attribute calls (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InfoLevel {
    Exists,
    Type,
    Basic,
    Detail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    File,
    Path,
    Link,
    Special,
}

#[derive(Debug, Clone, Default)]
pub struct StorageInfo {
    pub exists: bool,
    pub file_type: Option<StorageType>,
    pub size: u64,
    pub time_modified: i64,
    pub mode: u32,
    pub user: Option<String>,
    pub group: Option<String>,
    pub user_id: u32,
    pub group_id: u32,
    pub link_destination: Option<String>,
}

impl StorageInfo {
    pub fn missing() -> Self {
        StorageInfo { exists: false, ..Default::default() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewWriteOptions {
    pub mode_file: u32,
    pub mode_path: u32,
    pub user: Option<String>,
    pub group: Option<String>,
    pub time_modified: Option<i64>,
    pub create_path: bool,
    pub sync_file: bool,
    pub sync_path: bool,
    pub atomic: bool,
}

/// Uniform interface over Posix/SFTP/S3/Azure (§4.2). Callers that need to
/// hold one of several backends behind a single value generic over `S:
/// Storage` rather than a trait object, since `FEATURES` is an associated
/// constant and constants have no vtable slot; a repository/remote is
/// typically resolved to a concrete backend type once at startup.
pub trait Storage {
    const FEATURES: StorageFeature;

    fn info(&self, path: &str, level: InfoLevel, follow_link: bool) -> Result<StorageInfo>;
    fn list(&self, path: &str, level: InfoLevel) -> Result<Vec<(String, StorageInfo)>>;
    fn new_read(&self, path: &str, ignore_missing: bool, offset: u64, limit: Option<u64>) -> Result<StorageRead>;
    fn new_write(&self, path: &str, options: &NewWriteOptions) -> Result<StorageWrite>;
    fn path_create(&self, path: &str, error_on_exists: bool, no_parent_create: bool, mode: u32) -> Result<()>;
    fn path_remove(&self, path: &str, recurse: bool) -> Result<bool>;
    fn path_sync(&self, path: &str) -> Result<()>;
    fn remove(&self, path: &str, error_on_missing: bool) -> Result<()>;

    /// Move `source` to `dest` within this backend (§4.2). Returns
    /// `Ok(true)` when the backend completed an atomic rename, `Ok(false)`
    /// when it fell back to a copy + remove instead — e.g. Posix across
    /// devices, or any backend with no native rename at all. The default
    /// implementation always copies; `PosixStorage` overrides it to attempt
    /// a real rename first.
    fn storage_move(&self, source: &str, dest: &str) -> Result<bool> {
        copy_and_remove(self, source, dest)?;
        Ok(false)
    }
}

/// Copy `source` to `dest` through ordinary read/write, then remove
/// `source` — the fallback every backend's `storage_move` bottoms out to
/// when it cannot rename in place (§4.2, §8 "falls back to copy").
pub(crate) fn copy_and_remove<S: Storage>(storage: &S, source: &str, dest: &str) -> Result<()> {
    let mut reader = storage.new_read(source, false, 0, None)?;
    reader.open()?;
    let mut writer = storage.new_write(dest, &NewWriteOptions { create_path: true, ..Default::default() })?;
    writer.open()?;

    let mut buf = Buffer::new(64 * 1024);
    loop {
        buf.used_zero();
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write(&buf)?;
    }
    reader.close()?;
    writer.close()?;
    storage.remove(source, true)?;
    Ok(())
}

/// Expand a path expression's `<expr>/rest` prefix against a base path.
/// Absolute user paths must be contained within the base; relative ones are
/// resolved against it (§4.2 "Path expressions").
pub fn resolve_path(base: &str, user_path: &str) -> Result<String> {
    use crate::error::{err, ErrorKind};

    if let Some(rest) = user_path.strip_prefix('/') {
        let candidate = format!("/{}", rest);
        if !candidate.starts_with(base) {
            return Err(err!(ErrorKind::AssertError, "path '{}' is not contained in base path '{}'", candidate, base));
        }
        Ok(candidate)
    } else {
        Ok(format!("{}/{}", base.trim_end_matches('/'), user_path))
    }
}
