use pgbackrest_core::info::{self, InfoArchive, InfoBackup};
use pgbackrest_core::storage::posix::PosixStorage;

#[test]
fn backup_info_round_trips_through_storage() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());

    let mut backup = InfoBackup::new("15", 7_111_222_333_444_555_666, 202209061);
    backup.push("15", 7_111_222_333_444_555_666, 202209061);

    let mut ini = backup.to_ini();
    info::save(&storage, "backup.info", &mut ini).unwrap();

    let loaded = info::load(&storage, "backup.info", false).unwrap();
    let restored = InfoBackup::from_ini(&loaded).unwrap();

    assert_eq!(restored.history.len(), 2);
    assert_eq!(restored.current().history_id, 2);
}

#[test]
fn archive_info_check_matches_the_saved_system_id() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());

    let archive = InfoArchive::new("15", 999, 202209061);
    let mut ini = archive.to_ini();
    info::save(&storage, "archive.info", &mut ini).unwrap();

    let loaded = info::load(&storage, "archive.info", false).unwrap();
    let restored = InfoArchive::from_ini(&loaded).unwrap();

    assert!(restored.check("15", 999).is_ok());
    assert!(restored.check("15", 1).is_err());
}

#[test]
fn a_tampered_primary_falls_back_to_the_copy() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());

    let backup = InfoBackup::new("15", 1, 1);
    let mut ini = backup.to_ini();
    info::save(&storage, "backup.info", &mut ini).unwrap();

    std::fs::write(dir.path().join("backup.info"), b"[db]\ndb-id=1\n").unwrap();

    let loaded = info::load(&storage, "backup.info", false).unwrap();
    let restored = InfoBackup::from_ini(&loaded).unwrap();
    assert_eq!(restored.current().db_id, 1);
}

#[test]
fn missing_pair_without_ignore_missing_errors() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());
    assert!(info::load(&storage, "nope.info", false).is_err());
}
