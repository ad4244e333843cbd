//! Storage write side: forward byte sink with atomic/sync-file/sync-path
//! guarantees (§3 "Storage write"). Lifecycle is new -> open -> write* ->
//! close; close is mandatory and the only point at which durability,
//! rename, and ownership/mtime application happen.
//!
//! Object-storage backends (S3, Azure) have no local path to rename into
//! place; they buffer the whole object in memory and hand it to a
//! `RemoteSink` on close, uploading in one request (§4.2).

use std::fs::{self, File, OpenOptions};
use std::io::Write as StdWrite;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::buffer::Buffer;
use crate::error::{err, ErrorKind, Result};
use crate::io::IoWrite;
use crate::perf::WriteBuffer;

/// One-shot upload sink backing a `StorageWrite` over a backend with no
/// rename-into-place semantic.
pub trait RemoteSink: Send {
    fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;
}

enum Backing {
    File {
        final_path: PathBuf,
        tmp_path: Option<PathBuf>,
        buffer: Option<WriteBuffer<File>>,
        mode_file: u32,
        sync_file: bool,
        sync_path: bool,
        user: Option<String>,
        group: Option<String>,
        time_modified: Option<i64>,
    },
    Remote {
        sink: Box<dyn RemoteSink>,
        key: String,
        buffer: Vec<u8>,
    },
}

pub struct StorageWrite {
    backing: Backing,
    closed: bool,
}

impl StorageWrite {
    pub fn new(final_path: PathBuf, mode_file: u32, sync_file: bool, sync_path: bool, atomic: bool) -> Self {
        let tmp_path = if atomic {
            Some({
                let mut p = final_path.clone();
                let name = format!("{}.tmp", p.file_name().unwrap_or_default().to_string_lossy());
                p.set_file_name(name);
                p
            })
        } else {
            None
        };
        StorageWrite {
            backing: Backing::File {
                final_path,
                tmp_path,
                buffer: None,
                mode_file,
                sync_file,
                sync_path,
                user: None,
                group: None,
                time_modified: None,
            },
            closed: false,
        }
    }

    /// A write sink that buffers the whole object and uploads it as one
    /// request on close — the only shape object storage backends can offer
    /// (§4.2).
    pub fn new_remote(sink: Box<dyn RemoteSink>, key: impl Into<String>) -> Self {
        StorageWrite { backing: Backing::Remote { sink, key: key.into(), buffer: Vec::new() }, closed: false }
    }

    /// Stage an owner change to apply once the file reaches its final path
    /// (§4.2 "optionally chown/fchmod/utime, then rename"). No-op on a
    /// remote backing.
    pub fn with_owner(mut self, user: Option<String>, group: Option<String>) -> Self {
        if let Backing::File { user: u, group: g, .. } = &mut self.backing {
            *u = user;
            *g = group;
        }
        self
    }

    /// Stage an mtime override to apply on close. No-op on a remote backing.
    pub fn with_time_modified(mut self, time_modified: Option<i64>) -> Self {
        if let Backing::File { time_modified: t, .. } = &mut self.backing {
            *t = time_modified;
        }
        self
    }
}

impl IoWrite for StorageWrite {
    fn open(&mut self) -> Result<()> {
        match &mut self.backing {
            Backing::File { tmp_path, final_path, mode_file, buffer, .. } => {
                let target: PathBuf = tmp_path.clone().unwrap_or_else(|| final_path.clone());
                let file = OpenOptions::new().create(true).truncate(true).write(true).mode(*mode_file).open(&target)?;
                *buffer = Some(WriteBuffer::new(file, 64 * 1024));
                Ok(())
            }
            Backing::Remote { .. } => Ok(()),
        }
    }

    fn write(&mut self, buf: &Buffer) -> Result<()> {
        match &mut self.backing {
            Backing::File { buffer, .. } => {
                let writer = buffer.as_mut().expect("write called before open");
                writer.write_all(buf.as_slice())?;
                Ok(())
            }
            Backing::Remote { buffer, .. } => {
                buffer.extend_from_slice(buf.as_slice());
                Ok(())
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        match &mut self.backing {
            Backing::File { final_path, tmp_path, buffer, mode_file, sync_file, sync_path, user, group, time_modified } => {
                let writer = buffer.take().expect("close called before open");
                let file = writer.into_inner()?;

                if *sync_file {
                    file.sync_all()?;
                }
                drop(file);

                let target: PathBuf = tmp_path.clone().unwrap_or_else(|| final_path.clone());
                fs::set_permissions(&target, fs::Permissions::from_mode(*mode_file))?;

                if let Some(tmp) = tmp_path.take() {
                    fs::rename(&tmp, &final_path)?;
                }

                apply_ownership(final_path, user.as_deref(), group.as_deref())?;
                apply_time_modified(final_path, *time_modified)?;

                if *sync_path {
                    if let Some(parent) = final_path.parent() {
                        let dir = File::open(parent)?;
                        dir.sync_all()?;
                    }
                }
            }
            Backing::Remote { sink, key, buffer } => {
                sink.put(key, std::mem::take(buffer))?;
            }
        }

        self.closed = true;
        Ok(())
    }
}

/// Resolve `user`/`group` names to ids and `chown` the file at `path`.
/// No-op when neither is set.
fn apply_ownership(path: &Path, user: Option<&str>, group: Option<&str>) -> Result<()> {
    if user.is_none() && group.is_none() {
        return Ok(());
    }
    use nix::unistd::{chown, Group, User};

    let uid = match user {
        Some(name) => Some(
            User::from_name(name)
                .map_err(|e| err!(ErrorKind::FileWriteError, "looking up user '{}': {}", name, e))?
                .ok_or_else(|| err!(ErrorKind::FileWriteError, "unknown user '{}'", name))?
                .uid,
        ),
        None => None,
    };
    let gid = match group {
        Some(name) => Some(
            Group::from_name(name)
                .map_err(|e| err!(ErrorKind::FileWriteError, "looking up group '{}': {}", name, e))?
                .ok_or_else(|| err!(ErrorKind::FileWriteError, "unknown group '{}'", name))?
                .gid,
        ),
        None => None,
    };

    chown(path, uid, gid).map_err(|e| err!(ErrorKind::FileWriteError, "chown '{}': {}", path.display(), e))
}

/// Set the file's mtime (atime follows it). No-op when `time_modified` is `None`.
fn apply_time_modified(path: &Path, time_modified: Option<i64>) -> Result<()> {
    let Some(secs) = time_modified else { return Ok(()) };
    use nix::sys::stat::utimes;
    use nix::sys::time::TimeVal;

    let tv = TimeVal::new(secs, 0);
    utimes(path, &tv, &tv).map_err(|e| err!(ErrorKind::FileWriteError, "setting mtime on '{}': {}", path.display(), e))
}
