use pgbackrest_core::buffer::Buffer;
use pgbackrest_core::config::{self, Command};
use pgbackrest_core::info::{self, InfoBackup};
use pgbackrest_core::io::IoWrite;
use pgbackrest_core::storage::posix::PosixStorage;
use pgbackrest_core::storage::{InfoLevel, NewWriteOptions, Storage};

#[test]
fn repo_put_then_repo_ls_sees_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());

    let args: Vec<String> = vec!["repo-put".into(), "note.txt".into()];
    let resolved = config::parse(&args).unwrap();
    assert_eq!(resolved.command, Command::RepoPut);
    assert_eq!(resolved.command_params, vec!["note.txt".to_string()]);

    let opts = NewWriteOptions { mode_file: 0o640, create_path: true, atomic: true, ..Default::default() };
    let mut w = storage.new_write("note.txt", &opts).unwrap();
    w.open().unwrap();
    w.write(&Buffer::from_vec(b"hello".to_vec())).unwrap();
    w.close().unwrap();

    let entries = storage.list("/", InfoLevel::Basic).unwrap();
    assert!(entries.iter().any(|(name, _)| name == "note.txt"));
}

#[test]
fn info_round_trips_through_storage() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PosixStorage::new(dir.path());

    let backup = InfoBackup::new("14", 7_123_456_789_012_345_678, 202107181);
    let mut ini = backup.to_ini();
    info::save(&storage, "backup.info", &mut ini).unwrap();

    let loaded = info::load(&storage, "backup.info", false).unwrap();
    let restored = InfoBackup::from_ini(&loaded).unwrap();
    assert_eq!(restored.current().db_id, 7_123_456_789_012_345_678);
    assert_eq!(restored.current().db_version, "14");
}

#[test]
fn config_resolves_defaults_for_repo_ls() {
    let args: Vec<String> = vec!["repo-ls".into()];
    let resolved = config::parse(&args).unwrap();
    assert_eq!(resolved.command, Command::RepoLs);
    assert_eq!(resolved.get("repo-type").and_then(|v| v.as_str()), Some("posix"));
}

#[test]
fn help_and_version_need_no_stanza() {
    let help = config::parse(&["help".into()]).unwrap();
    assert_eq!(help.command, Command::Help);

    let version = config::parse(&["version".into()]).unwrap();
    assert_eq!(version.command, Command::Version);
}
