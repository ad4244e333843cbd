//! Option and command registry (§4.4).
//!
//! A representative slice of pgBackRest's option set — enough to exercise
//! every mechanic the resolver must support (negate/reset, secure options,
//! dependency resolution, size/time parsing, allow-lists/ranges) without
//! reproducing the full few-hundred-option catalog `config/define.c`
//! generates from a code-gen table.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Command {
    Backup,
    Restore,
    ArchivePush,
    ArchiveGet,
    Check,
    Info,
    StanzaCreate,
    Expire,
    RepoLs,
    RepoGet,
    RepoPut,
    Help,
    Version,
    None,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::Backup => "backup",
            Command::Restore => "restore",
            Command::ArchivePush => "archive-push",
            Command::ArchiveGet => "archive-get",
            Command::Check => "check",
            Command::Info => "info",
            Command::StanzaCreate => "stanza-create",
            Command::Expire => "expire",
            Command::RepoLs => "repo-ls",
            Command::RepoGet => "repo-get",
            Command::RepoPut => "repo-put",
            Command::Help => "help",
            Command::Version => "version",
            Command::None => "none",
        }
    }

    pub fn from_name(name: &str) -> Option<Command> {
        Some(match name {
            "backup" => Command::Backup,
            "restore" => Command::Restore,
            "archive-push" => Command::ArchivePush,
            "archive-get" => Command::ArchiveGet,
            "check" => Command::Check,
            "info" => Command::Info,
            "stanza-create" => Command::StanzaCreate,
            "expire" => Command::Expire,
            "repo-ls" => Command::RepoLs,
            "repo-get" => Command::RepoGet,
            "repo-put" => Command::RepoPut,
            "help" => Command::Help,
            "version" => Command::Version,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    Boolean,
    Integer,
    Size,
    Time,
    String,
    List,
    Hash,
}

/// Where an option may legally be set from (§6 "Config files").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionSection {
    CommandLine,
    Global,
    Stanza,
}

#[derive(Debug, Clone, Copy)]
pub struct Depend {
    pub option: &'static str,
    /// Empty means "just needs the depend option to have any value".
    pub values: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct OptionDef {
    pub name: &'static str,
    pub option_type: OptionType,
    pub section: OptionSection,
    pub negatable: bool,
    pub secure: bool,
    pub required: bool,
    pub default: Option<&'static str>,
    pub allow_list: &'static [&'static str],
    pub allow_range: Option<(f64, f64)>,
    pub depend: Option<Depend>,
    /// Commands this option is valid for; empty means "all commands".
    pub valid_commands: &'static [Command],
}

const fn opt(name: &'static str, option_type: OptionType, section: OptionSection) -> OptionDef {
    OptionDef {
        name,
        option_type,
        section,
        negatable: false,
        secure: false,
        required: false,
        default: None,
        allow_list: &[],
        allow_range: None,
        depend: None,
        valid_commands: &[],
    }
}

pub static OPTIONS: &[OptionDef] = &[
    OptionDef { negatable: true, ..opt("config", OptionType::String, OptionSection::CommandLine) },
    opt("config-path", OptionType::String, OptionSection::CommandLine),
    opt("config-include-path", OptionType::String, OptionSection::CommandLine),
    // Not marked `required`: `info` (all stanzas) and `repo-ls`/`repo-get`/
    // `repo-put`/`check`/`help`/`version` all run with no stanza at all.
    opt("stanza", OptionType::String, OptionSection::Stanza),
    OptionDef { default: Some("1048576"), ..opt("buffer-size", OptionType::Size, OptionSection::Global) },
    OptionDef { negatable: true, default: Some("n"), ..opt("archive-async", OptionType::Boolean, OptionSection::Global) },
    OptionDef {
        depend: Some(Depend { option: "archive-async", values: &["1"] }),
        ..opt("spool-path", OptionType::String, OptionSection::Global)
    },
    OptionDef {
        default: Some("warn"),
        allow_list: &["off", "error", "warn", "info", "detail", "debug", "trace"],
        ..opt("log-level-stderr", OptionType::String, OptionSection::Global)
    },
    OptionDef {
        default: Some("posix"),
        allow_list: &["posix", "sftp", "s3", "azure"],
        ..opt("repo-type", OptionType::String, OptionSection::Global)
    },
    OptionDef {
        default: Some("1"),
        allow_range: Some((1.0, 999.0)),
        ..opt("process-max", OptionType::Integer, OptionSection::Global)
    },
    OptionDef {
        default: Some("gz"),
        allow_list: &["none", "gz", "bz2", "lz4", "zst"],
        ..opt("compress-type", OptionType::String, OptionSection::Global)
    },
    OptionDef { secure: true, ..opt("repo-s3-key-secret", OptionType::String, OptionSection::Global) },
    OptionDef { default: Some("60000"), ..opt("db-timeout", OptionType::Time, OptionSection::Global) },
    OptionDef { default: Some("/var/lib/pgbackrest"), ..opt("repo-path", OptionType::String, OptionSection::Global) },
    OptionDef { default: Some("/tmp/pgbackrest"), ..opt("lock-path", OptionType::String, OptionSection::Global) },
    OptionDef {
        default: Some("warn"),
        allow_list: &["off", "error", "warn", "info", "detail", "debug", "trace"],
        ..opt("log-level-console", OptionType::String, OptionSection::Global)
    },
];

pub fn find(name: &str) -> Option<&'static OptionDef> {
    OPTIONS.iter().find(|o| o.name == name)
}

pub fn valid_for(def: &OptionDef, command: Command) -> bool {
    def.valid_commands.is_empty() || def.valid_commands.contains(&command)
}
