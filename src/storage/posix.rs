//! Local Posix storage backend (§4.2).
//!
//! Directory listing skips `.`/`..` and, below `InfoLevel::Exists`, `lstat`s
//! each entry — an entry that vanished between `readdir` and `stat` is
//! tolerated by dropping it, not erroring.

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::error::{err, ErrorKind, Result};
use crate::storage::{InfoLevel, NewWriteOptions, Storage, StorageFeature, StorageInfo, StorageRead, StorageType, StorageWrite};

pub struct PosixStorage {
    base: PathBuf,
}

impl PosixStorage {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        PosixStorage { base: base.into() }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix('/') {
            self.base.join(rest)
        } else {
            self.base.join(path)
        }
    }

    fn stat_info(meta: &fs::Metadata, level: InfoLevel) -> StorageInfo {
        let file_type = if meta.is_dir() {
            StorageType::Path
        } else if meta.file_type().is_symlink() {
            StorageType::Link
        } else if meta.is_file() {
            StorageType::File
        } else {
            StorageType::Special
        };

        let mut info = StorageInfo { exists: true, file_type: Some(file_type), ..Default::default() };
        if level >= InfoLevel::Basic {
            info.size = meta.len();
            info.time_modified = meta.mtime();
        }
        if level >= InfoLevel::Detail {
            info.mode = meta.permissions().mode() & 0o7777;
            info.user_id = meta.uid();
            info.group_id = meta.gid();
        }
        info
    }
}

impl Storage for PosixStorage {
    const FEATURES: StorageFeature =
        StorageFeature::PATH.union(StorageFeature::HARD_LINK).union(StorageFeature::SYM_LINK).union(StorageFeature::PATH_SYNC).union(StorageFeature::INFO_DETAIL);

    fn info(&self, path: &str, level: InfoLevel, follow_link: bool) -> Result<StorageInfo> {
        let full = self.full_path(path);
        let meta = if follow_link { fs::metadata(&full) } else { fs::symlink_metadata(&full) };
        match meta {
            Ok(m) => Ok(Self::stat_info(&m, level)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StorageInfo::missing()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, path: &str, level: InfoLevel) -> Result<Vec<(String, StorageInfo)>> {
        let full = self.full_path(path);
        let entries = match fs::read_dir(&full) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let name = entry.file_name().to_string_lossy().to_string();
            if name == "." || name == ".." {
                continue;
            }
            if level == InfoLevel::Exists {
                out.push((name, StorageInfo { exists: true, ..Default::default() }));
                continue;
            }
            // Entries may vanish between readdir and stat; drop them rather than error.
            match fs::symlink_metadata(entry.path()) {
                Ok(meta) => out.push((name, Self::stat_info(&meta, level))),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(out)
    }

    fn new_read(&self, path: &str, ignore_missing: bool, offset: u64, limit: Option<u64>) -> Result<StorageRead> {
        let full = self.full_path(path);
        match fs::File::open(&full) {
            Ok(f) => StorageRead::from_file(f, offset, limit),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && ignore_missing => Ok(StorageRead::from_bytes(Vec::new())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(err!(ErrorKind::FileMissingError, "unable to open '{}'", full.display())),
            Err(e) => Err(e.into()),
        }
    }

    fn new_write(&self, path: &str, options: &NewWriteOptions) -> Result<StorageWrite> {
        let full = self.full_path(path);
        if options.create_path {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
                if options.mode_path != 0 {
                    fs::set_permissions(parent, fs::Permissions::from_mode(options.mode_path))?;
                }
            }
        }
        Ok(StorageWrite::new(full, options.mode_file, options.sync_file, options.sync_path, options.atomic)
            .with_owner(options.user.clone(), options.group.clone())
            .with_time_modified(options.time_modified))
    }

    fn path_create(&self, path: &str, error_on_exists: bool, no_parent_create: bool, mode: u32) -> Result<()> {
        let full = self.full_path(path);
        let result = if no_parent_create { fs::create_dir(&full) } else { fs::create_dir_all(&full) };
        match result {
            Ok(()) => {
                fs::set_permissions(&full, fs::Permissions::from_mode(mode))?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && !error_on_exists => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(err!(ErrorKind::PathCreateError, "path '{}' already exists", full.display()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn path_remove(&self, path: &str, recurse: bool) -> Result<bool> {
        let full = self.full_path(path);
        if !full.exists() {
            return Ok(false);
        }
        if recurse {
            fs::remove_dir_all(&full)?;
        } else {
            fs::remove_dir(&full)?;
        }
        Ok(true)
    }

    fn path_sync(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        let dir = fs::File::open(&full)?;
        dir.sync_all()?;
        Ok(())
    }

    fn remove(&self, path: &str, error_on_missing: bool) -> Result<()> {
        let full = self.full_path(path);
        match fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !error_on_missing => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(err!(ErrorKind::FileMissingError, "unable to remove '{}'", full.display()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Attempt a real rename; fall back to copy + remove on `EXDEV`
    /// (source and destination on different devices), mirroring the
    /// source's `storagePosixMove`.
    fn storage_move(&self, source: &str, dest: &str) -> Result<bool> {
        let src_full = self.full_path(source);
        let dest_full = self.full_path(dest);
        if let Some(parent) = dest_full.parent() {
            fs::create_dir_all(parent)?;
        }

        match fs::rename(&src_full, &dest_full) {
            Ok(()) => Ok(true),
            Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
                crate::storage::copy_and_remove(self, source, dest)?;
                Ok(false)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(err!(ErrorKind::FileMissingError, "unable to move missing source '{}'", src_full.display()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Open the parent directory read-only and `fsync` the fd (§4.2 "Path sync").
pub fn sync_dir(path: &Path) -> Result<()> {
    let dir = fs::File::open(path)?;
    dir.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::io::{IoRead, IoWrite};

    #[test]
    fn write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PosixStorage::new(dir.path());

        let opts = NewWriteOptions { mode_file: 0o640, atomic: true, ..Default::default() };
        let mut w = storage.new_write("file.txt", &opts).unwrap();
        w.open().unwrap();
        let buf = Buffer::from_vec(b"hello posix".to_vec());
        w.write(&buf).unwrap();
        w.close().unwrap();

        let info = storage.info("file.txt", InfoLevel::Basic, true).unwrap();
        assert!(info.exists);
        assert_eq!(info.size, 11);

        let mut r = storage.new_read("file.txt", false, 0, None).unwrap();
        r.open().unwrap();
        let mut read_buf = Buffer::new(64);
        let n = r.read(&mut read_buf).unwrap();
        assert_eq!(&read_buf.as_slice()[..n], b"hello posix");
    }
}
