use std::io::{self, Read as StdRead, Write as StdWrite};

use pgbackrest_core::buffer::Buffer;
use pgbackrest_core::config::definition::{self, Command};
use pgbackrest_core::config::{self, OptionValue, ResolvedConfig};
use pgbackrest_core::error::{ErrorKind, PgbrError, Result};
use pgbackrest_core::info::{self, InfoArchive, InfoBackup};
use pgbackrest_core::io::{IoRead, IoWrite};
use pgbackrest_core::storage::posix::PosixStorage;
use pgbackrest_core::storage::{InfoLevel, NewWriteOptions, Storage, StorageType};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let code = match run(&args) {
        Ok(()) => 0,
        Err(e) => {
            // `--log-level-stderr=detail` appends the error's source location;
            // re-resolving here is cheap and avoids threading the flag through
            // every command's `Result<(), PgbrError>` return path.
            let detail = config::parse(&args).ok().and_then(|r| r.get("log-level-stderr").and_then(|v| v.as_str().map(str::to_string))).as_deref() == Some("detail");
            if detail {
                eprintln!("{}", e.detail());
            } else {
                eprintln!("{}: {}", e.kind, e.message);
            }
            e.kind.exit_code()
        }
    };

    std::process::exit(code);
}

fn run(args: &[String]) -> Result<()> {
    let resolved = config::parse(args)?;

    match resolved.command {
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Version => {
            println!("pgbackrest-core {}", VERSION);
            Ok(())
        }
        Command::RepoLs => repo_ls(&resolved),
        Command::RepoGet => repo_get(&resolved),
        Command::RepoPut => repo_put(&resolved),
        Command::Check => check(&resolved),
        Command::Info => info_command(&resolved),
        Command::Backup
        | Command::Restore
        | Command::ArchivePush
        | Command::ArchiveGet
        | Command::StanzaCreate
        | Command::Expire => Err(PgbrError::new(
            ErrorKind::CommandInvalidError,
            format!("'{}' requires a live PostgreSQL instance and is not built here", resolved.command.name()),
        )),
        Command::None => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("pgbackrest-core {}", VERSION);
    println!();
    println!("commands:");
    println!("  repo-ls    list a path in the repository");
    println!("  repo-get   stream a repository file to stdout");
    println!("  repo-put   stream stdin to a repository file");
    println!("  check      verify repository reachability and option resolution");
    println!("  info       report stanza backup/archive state");
    println!("  version    display version");
    println!("  help       display this help");
}

/// Only the posix backend is wired to the command line in this build;
/// `repo-type=sftp/s3/azure` resolve fine through the option layer but have
/// no constructor here (their connection parameters aren't part of the
/// representative option slice in `config::definition`).
fn build_storage(resolved: &ResolvedConfig) -> Result<PosixStorage> {
    let repo_type = resolved.get("repo-type").and_then(|v| v.as_str()).unwrap_or("posix");
    let repo_path = resolved.get("repo-path").and_then(|v| v.as_str()).unwrap_or("/var/lib/pgbackrest");

    match repo_type {
        "posix" => Ok(PosixStorage::new(repo_path)),
        other => Err(PgbrError::new(
            ErrorKind::OptionInvalidValueError,
            format!("repo-type '{}' has no command-line wiring in this build; only 'posix' does", other),
        )),
    }
}

fn command_path(resolved: &ResolvedConfig, command_name: &str) -> Result<String> {
    resolved
        .command_params
        .first()
        .cloned()
        .ok_or_else(|| PgbrError::new(ErrorKind::ParamRequiredError, format!("{} requires a repository path parameter", command_name)))
}

fn repo_ls(resolved: &ResolvedConfig) -> Result<()> {
    let storage = build_storage(resolved)?;
    let path = resolved.command_params.first().map(|s| s.as_str()).unwrap_or("/");

    let mut entries = storage.list(path, InfoLevel::Basic)?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, info) in entries {
        let kind = match info.file_type {
            Some(StorageType::Path) => "d",
            Some(StorageType::File) => "f",
            Some(StorageType::Link) => "l",
            Some(StorageType::Special) => "s",
            None => "?",
        };
        println!("{} {:>12} {}", kind, info.size, name);
    }
    Ok(())
}

fn repo_get(resolved: &ResolvedConfig) -> Result<()> {
    let storage = build_storage(resolved)?;
    let path = command_path(resolved, "repo-get")?;

    let mut reader = storage.new_read(&path, false, 0, None)?;
    reader.open()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut buf = Buffer::new(64 * 1024);

    loop {
        buf.used_zero();
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        // A broken pipe on stdout (e.g. piped into `head`) is this command's
        // own concern, not the repository's; stop quietly instead of
        // surfacing it as a storage error.
        if out.write_all(buf.as_slice()).is_err() {
            break;
        }
    }
    reader.close()?;
    Ok(())
}

fn repo_put(resolved: &ResolvedConfig) -> Result<()> {
    let storage = build_storage(resolved)?;
    let path = command_path(resolved, "repo-put")?;

    let opts = NewWriteOptions { mode_file: 0o640, create_path: true, sync_file: true, atomic: true, ..Default::default() };
    let mut writer = storage.new_write(&path, &opts)?;
    writer.open()?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut chunk = vec![0u8; 64 * 1024];

    loop {
        let n = input.read(&mut chunk).map_err(|e| PgbrError::new(ErrorKind::FileReadError, format!("reading stdin: {}", e)))?;
        if n == 0 {
            break;
        }
        writer.write(&Buffer::from_vec(chunk[..n].to_vec()))?;
    }
    writer.close()?;
    Ok(())
}

fn render_value(value: &OptionValue) -> String {
    match value {
        OptionValue::Bool(b) => if *b { "y" } else { "n" }.to_string(),
        OptionValue::Int(i) => i.to_string(),
        OptionValue::String(s) => s.clone(),
        OptionValue::List(l) => l.join(","),
        OptionValue::Hash(h) => h.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(","),
    }
}

/// Resolves the stanza's option set and probes repository reachability;
/// secure options render as a bare placeholder rather than their value,
/// per §9's Open Question disposition.
fn check(resolved: &ResolvedConfig) -> Result<()> {
    let storage = build_storage(resolved)?;
    let repo_path = resolved.get("repo-path").and_then(|v| v.as_str()).unwrap_or("/var/lib/pgbackrest");

    let info = storage.info(repo_path, InfoLevel::Exists, true)?;
    println!("repository check: '{}' reachable: {}", repo_path, info.exists);

    println!("resolved options:");
    for def in definition::OPTIONS {
        let Some(opt) = resolved.options.get(def.name) else { continue };
        let Some(value) = &opt.value else { continue };
        if def.secure {
            println!("  {} = <{}>", def.name, def.name);
        } else {
            println!("  {} = {}", def.name, render_value(value));
        }
    }
    Ok(())
}

/// Reports each stanza's current PostgreSQL version/system-id from
/// `backup.info`/`archive.info`, same layout the storage backends and
/// `info::load` already assume (`<repo-path>/backup/<stanza>/backup.info`,
/// `<repo-path>/archive/<stanza>/archive.info`).
fn info_command(resolved: &ResolvedConfig) -> Result<()> {
    let storage = build_storage(resolved)?;
    let repo_path = resolved.get("repo-path").and_then(|v| v.as_str()).unwrap_or("/var/lib/pgbackrest");
    let stanza_filter = resolved.get("stanza").and_then(|v| v.as_str());

    let stanzas: Vec<String> = match stanza_filter {
        Some(s) => vec![s.to_string()],
        None => {
            let backup_root = format!("{}/backup", repo_path);
            storage
                .list(&backup_root, InfoLevel::Type)?
                .into_iter()
                .filter(|(_, i)| i.file_type == Some(StorageType::Path))
                .map(|(name, _)| name)
                .collect()
        }
    };

    if stanzas.is_empty() {
        println!("no stanzas found under '{}'", repo_path);
        return Ok(());
    }

    for stanza in stanzas {
        println!("stanza: {}", stanza);

        let backup_path = format!("{}/backup/{}/backup.info", repo_path, stanza);
        match info::load(&storage, &backup_path, true) {
            Ok(ini) if !ini.section_list().is_empty() => match InfoBackup::from_ini(&ini) {
                Ok(backup) => {
                    let current = backup.current();
                    println!("    db (current): version {}, system-id {}", current.db_version, current.db_id);
                    println!("    backup history entries: {}", backup.history.len());
                }
                Err(e) => println!("    backup.info: {}", e.message),
            },
            Ok(_) => println!("    backup.info: not found"),
            Err(e) => println!("    backup.info: {}", e.message),
        }

        let archive_path = format!("{}/archive/{}/archive.info", repo_path, stanza);
        match info::load(&storage, &archive_path, true) {
            Ok(ini) if !ini.section_list().is_empty() => match InfoArchive::from_ini(&ini) {
                Ok(archive) => {
                    let current = archive.current();
                    println!("    archive (current): version {}, system-id {}", current.db_version, current.db_id);
                }
                Err(e) => println!("    archive.info: {}", e.message),
            },
            Ok(_) => println!("    archive.info: not found"),
            Err(e) => println!("    archive.info: {}", e.message),
        }
    }

    Ok(())
}
