//! Info-file persistence (§4.6): an ini store with a mandatory `[backrest]`
//! section carrying format/checksum, written atomically to a primary file
//! and a `.copy` shadow; load prefers the primary, falling back to the copy
//! on any format or checksum failure.

pub mod archive;
pub mod backup;

pub use archive::InfoArchive;
pub use backup::{InfoBackup, InfoHistoryRecord};

use sha2::{Digest, Sha256};

use crate::buffer::Buffer;
use crate::error::{err, ErrorKind, Result};
use crate::ini::{parse_ini, render_ini, Ini, IniValue};
use crate::io::{IoRead, IoWrite};
use crate::storage::{NewWriteOptions, Storage};

/// Current on-disk format version. Bumped whenever the `[backrest]` /
/// `[db]` layout changes incompatibly.
pub const FORMAT: i64 = 5;

const SECTION_BACKREST: &str = "backrest";
const KEY_FORMAT: &str = "backrest-format";
const KEY_VERSION: &str = "backrest-version";
const KEY_CHECKSUM: &str = "backrest-checksum";
const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hash everything except the checksum key itself — the checksum covers
/// "the remainder" of the store (§3 "Info file").
fn compute_checksum(ini: &Ini) -> String {
    let mut without = ini.clone();
    without.remove(SECTION_BACKREST, KEY_CHECKSUM);
    let body = render_ini(&without);
    hex::encode(Sha256::digest(body.as_bytes()))
}

/// Stamp `[backrest]` format/version/checksum and atomic-write to both
/// `file_name` and `file_name.copy` (§4.6 "Writing").
pub fn save<S: Storage>(storage: &S, file_name: &str, ini: &mut Ini) -> Result<()> {
    ini.set(SECTION_BACKREST, KEY_FORMAT, IniValue::Scalar(FORMAT.to_string()));
    ini.set(SECTION_BACKREST, KEY_VERSION, IniValue::Scalar(CRATE_VERSION.to_string()));
    ini.set(SECTION_BACKREST, KEY_CHECKSUM, IniValue::Scalar(compute_checksum(ini)));

    let text = render_ini(ini);
    write_file(storage, file_name, &text)?;
    write_file(storage, &format!("{}.copy", file_name), &text)?;
    Ok(())
}

fn write_file<S: Storage>(storage: &S, file_name: &str, text: &str) -> Result<()> {
    let opts = NewWriteOptions { mode_file: 0o640, create_path: true, sync_file: true, atomic: true, ..Default::default() };
    let mut w = storage.new_write(file_name, &opts)?;
    w.open()?;
    w.write(&Buffer::from_vec(text.as_bytes().to_vec()))?;
    w.close()?;
    Ok(())
}

/// Load `file_name`, falling back to `file_name.copy` when the primary is
/// missing or fails format/checksum validation (§4.6 "Reading"). When
/// `ignore_missing` is set, an absent pair returns an empty store instead of
/// erroring — callers such as stanza-create tolerate a first-ever run.
pub fn load<S: Storage>(storage: &S, file_name: &str, ignore_missing: bool) -> Result<Ini> {
    if let Some(text) = read_file(storage, file_name)? {
        if let Ok(ini) = parse_and_validate(&text) {
            return Ok(ini);
        }
    }

    let copy_name = format!("{}.copy", file_name);
    if let Some(text) = read_file(storage, &copy_name)? {
        return parse_and_validate(&text);
    }

    if ignore_missing {
        Ok(Ini::new())
    } else {
        Err(err!(ErrorKind::FileMissingError, "unable to open '{}' or '{}'", file_name, copy_name))
    }
}

fn parse_and_validate(text: &str) -> Result<Ini> {
    let ini = parse_ini(text)?;

    let format: i64 = ini
        .get(SECTION_BACKREST, KEY_FORMAT)?
        .as_scalar()
        .unwrap_or("")
        .parse()
        .map_err(|_| err!(ErrorKind::FormatError, "invalid '{}' value", KEY_FORMAT))?;
    if format != FORMAT {
        return Err(err!(ErrorKind::VersionNotSupportedError, "expected format {} but found {}", FORMAT, format));
    }

    let stored = ini.get(SECTION_BACKREST, KEY_CHECKSUM)?.as_scalar().unwrap_or("").to_string();
    let computed = compute_checksum(&ini);
    if stored != computed {
        return Err(err!(ErrorKind::FormatError, "invalid checksum, expected '{}' but found '{}'", computed, stored));
    }

    Ok(ini)
}

/// Read a whole file into memory. A zero-byte result (either a genuinely
/// empty file or the empty stream `new_read(ignore_missing=true)` returns
/// for a missing path) is reported as absent — an info file is never
/// legitimately empty, since `[backrest]` is mandatory.
fn read_file<S: Storage>(storage: &S, file_name: &str) -> Result<Option<String>> {
    let mut r = storage.new_read(file_name, true, 0, None)?;
    r.open()?;

    let mut data = Vec::new();
    let mut buf = Buffer::new(64 * 1024);
    loop {
        buf.used_zero();
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(buf.as_slice());
    }
    r.close()?;

    if data.is_empty() {
        Ok(None)
    } else {
        Ok(Some(String::from_utf8_lossy(&data).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::posix::PosixStorage;

    #[test]
    fn save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PosixStorage::new(dir.path());

        let mut ini = Ini::new();
        ini.set("db", "db-id", IniValue::Scalar("1".into()));
        save(&storage, "test.info", &mut ini).unwrap();

        let loaded = load(&storage, "test.info", false).unwrap();
        assert_eq!(loaded.get("db", "db-id").unwrap().as_scalar(), Some("1"));
        assert_eq!(loaded.get(SECTION_BACKREST, KEY_FORMAT).unwrap().as_scalar(), Some("5"));
    }

    #[test]
    fn falls_back_to_copy_when_main_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PosixStorage::new(dir.path());

        let mut ini = Ini::new();
        ini.set("db", "db-id", IniValue::Scalar("7".into()));
        save(&storage, "test.info", &mut ini).unwrap();

        // Clobber only the primary; a non-atomic write replaces it in place
        // while leaving `test.info.copy` untouched.
        let opts = NewWriteOptions { mode_file: 0o640, atomic: false, ..Default::default() };
        let mut w = storage.new_write("test.info", &opts).unwrap();
        w.open().unwrap();
        w.write(&Buffer::from_vec(b"[backrest]\nbackrest-format=5\n".to_vec())).unwrap();
        w.close().unwrap();

        let loaded = load(&storage, "test.info", false).unwrap();
        assert_eq!(loaded.get("db", "db-id").unwrap().as_scalar(), Some("7"));
    }

    #[test]
    fn missing_without_ignore_errors() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PosixStorage::new(dir.path());
        assert!(load(&storage, "absent.info", false).is_err());
    }

    #[test]
    fn missing_with_ignore_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PosixStorage::new(dir.path());
        let ini = load(&storage, "absent.info", true).unwrap();
        assert!(ini.section_list().is_empty());
    }
}
