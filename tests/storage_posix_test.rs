use pgbackrest_core::buffer::Buffer;
use pgbackrest_core::io::{IoRead, IoWrite};
use pgbackrest_core::storage::posix::PosixStorage;
use pgbackrest_core::storage::{InfoLevel, NewWriteOptions, Storage};

fn write_all(storage: &PosixStorage, path: &str, data: &[u8]) {
    let opts = NewWriteOptions { mode_file: 0o640, create_path: true, atomic: true, ..Default::default() };
    let mut w = storage.new_write(path, &opts).unwrap();
    w.open().unwrap();
    w.write(&Buffer::from_vec(data.to_vec())).unwrap();
    w.close().unwrap();
}

fn read_all(storage: &PosixStorage, path: &str) -> Vec<u8> {
    read_all_opt(storage, path, false)
}

fn read_all_opt(storage: &PosixStorage, path: &str, ignore_missing: bool) -> Vec<u8> {
    let mut r = storage.new_read(path, ignore_missing, 0, None).unwrap();
    r.open().unwrap();
    let mut out = Vec::new();
    let mut buf = Buffer::new(16);
    loop {
        buf.used_zero();
        let n = r.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(buf.as_slice());
    }
    r.close().unwrap();
    out
}

#[test]
fn write_then_read_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());

    write_all(&storage, "file.txt", b"hello from posix storage");
    assert_eq!(read_all(&storage, "file.txt"), b"hello from posix storage");
}

#[test]
fn info_reports_existence_and_size() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());

    let missing = storage.info("missing.txt", InfoLevel::Exists, false).unwrap();
    assert!(!missing.exists);

    write_all(&storage, "present.txt", b"12345");
    let present = storage.info("present.txt", InfoLevel::Basic, false).unwrap();
    assert!(present.exists);
    assert_eq!(present.size, 5);
}

#[test]
fn list_finds_written_files() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());

    write_all(&storage, "a.txt", b"a");
    write_all(&storage, "b.txt", b"b");

    let entries = storage.list("/", InfoLevel::Basic).unwrap();
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert!(names.contains(&"a.txt"));
    assert!(names.contains(&"b.txt"));
}

#[test]
fn remove_deletes_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());

    write_all(&storage, "gone.txt", b"temporary");
    storage.remove("gone.txt", true).unwrap();

    let info = storage.info("gone.txt", InfoLevel::Exists, false).unwrap();
    assert!(!info.exists);
}

#[test]
fn missing_read_without_ignore_missing_errors() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());
    assert!(storage.new_read("nope.txt", false, 0, None).is_err());
}

#[test]
fn missing_read_with_ignore_missing_yields_empty_stream() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());
    assert_eq!(read_all_opt(&storage, "still-nope.txt", true), Vec::<u8>::new());
}

#[test]
fn new_write_applies_the_requested_mtime() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());

    let opts = NewWriteOptions { mode_file: 0o640, atomic: true, time_modified: Some(1_000_000_000), ..Default::default() };
    let mut w = storage.new_write("stamped.txt", &opts).unwrap();
    w.open().unwrap();
    w.write(&Buffer::from_vec(b"stamped".to_vec())).unwrap();
    w.close().unwrap();

    let info = storage.info("stamped.txt", InfoLevel::Basic, true).unwrap();
    assert_eq!(info.time_modified, 1_000_000_000);
}

#[test]
fn new_write_applies_mode_path_to_created_parent() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());

    let opts = NewWriteOptions { mode_file: 0o640, create_path: true, mode_path: 0o750, ..Default::default() };
    let mut w = storage.new_write("another/nested/file.txt", &opts).unwrap();
    w.open().unwrap();
    w.close().unwrap();

    let meta = std::fs::metadata(dir.path().join("another/nested")).unwrap();
    use std::os::unix::fs::PermissionsExt;
    assert_eq!(meta.permissions().mode() & 0o777, 0o750);
}

#[test]
fn storage_move_renames_within_the_same_filesystem() {
    use pgbackrest_core::storage::Storage;
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());

    write_all(&storage, "src.txt", b"payload");
    let moved_directly = storage.storage_move("src.txt", "dest.txt").unwrap();

    assert!(moved_directly);
    assert!(!storage.info("src.txt", InfoLevel::Exists, false).unwrap().exists);
    assert_eq!(read_all(&storage, "dest.txt"), b"payload");
}
