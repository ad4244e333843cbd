//! Phase 1: command-line parsing (§4.4).
//!
//! Ported from `configParse()`'s `getopt_long` loop: the first non-flag
//! argument is the command, later ones are command parameters. Flags are
//! `--name=value`, `--name value`, `--no-name` (negate), `--reset-name`
//! (reset). Same-option rules mirror the original exactly: no double-negate,
//! no double-reset, negate and reset are mutually exclusive, set-and-negate
//! is an error.

use std::collections::BTreeMap;

use crate::config::definition::{self, Command};
use crate::error::{err, ErrorKind, Result};

#[derive(Debug, Clone, Default)]
pub struct CliOption {
    pub negate: bool,
    pub reset: bool,
    pub values: Vec<String>,
}

pub struct CliParse {
    pub command: Command,
    pub command_help: bool,
    pub command_params: Vec<String>,
    pub options: BTreeMap<&'static str, CliOption>,
}

/// `args` excludes argv[0] (the executable path).
pub fn parse(args: &[String]) -> Result<CliParse> {
    let mut command = Command::None;
    let mut command_set = false;
    let mut command_help = false;
    let mut command_params = Vec::new();
    let mut options: BTreeMap<&'static str, CliOption> = BTreeMap::new();

    let mut idx = 0;
    while idx < args.len() {
        let arg = &args[idx];

        if let Some(flag) = arg.strip_prefix("--") {
            let (negate, reset, name_part) = if let Some(rest) = flag.strip_prefix("no-") {
                (true, false, rest)
            } else if let Some(rest) = flag.strip_prefix("reset-") {
                (false, true, rest)
            } else {
                (false, false, flag)
            };

            let (name, inline_value) = match name_part.split_once('=') {
                Some((n, v)) => (n, Some(v.to_string())),
                None => (name_part, None),
            };

            let def = definition::find(name).ok_or_else(|| err!(ErrorKind::OptionInvalidError, "invalid option '--{}'", name))?;

            let needs_arg = matches!(
                def.option_type,
                definition::OptionType::String | definition::OptionType::Integer | definition::OptionType::Size | definition::OptionType::Time | definition::OptionType::List | definition::OptionType::Hash
            ) && !negate
                && !reset;

            let value = if let Some(v) = inline_value {
                Some(v)
            } else if needs_arg {
                idx += 1;
                if idx >= args.len() || args[idx].starts_with("--") {
                    return Err(err!(ErrorKind::OptionInvalidError, "option '{}' requires argument", name));
                }
                Some(args[idx].clone())
            } else {
                None
            };

            let entry = options.entry(def.name).or_default();

            if entry.negate && negate {
                return Err(err!(ErrorKind::OptionInvalidError, "option '{}' is negated multiple times", def.name));
            }
            if entry.reset && reset {
                return Err(err!(ErrorKind::OptionInvalidError, "option '{}' is reset multiple times", def.name));
            }
            if (entry.reset && negate) || (entry.negate && reset) {
                return Err(err!(ErrorKind::OptionInvalidError, "option '{}' cannot be negated and reset", def.name));
            }

            entry.negate = entry.negate || negate;
            entry.reset = entry.reset || reset;
            if let Some(v) = value {
                entry.values.push(v);
            }
        } else if !command_set {
            match Command::from_name(arg) {
                Some(Command::Help) => {
                    command_help = true;
                }
                Some(c) => {
                    command = c;
                    command_set = true;
                }
                None => return Err(err!(ErrorKind::CommandInvalidError, "invalid command '{}'", arg)),
            }
        } else {
            command_params.push(arg.clone());
        }

        idx += 1;
    }

    if !command_set && !command_help {
        if args.is_empty() {
            command_help = true;
        } else {
            return Err(err!(ErrorKind::CommandRequiredError, "no command found"));
        }
    }

    Ok(CliParse { command, command_help, command_params, options })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_and_flag_value() {
        let args: Vec<String> = vec!["backup".into(), "--stanza=main".into(), "--buffer-size".into(), "2MB".into()];
        let parsed = parse(&args).unwrap();
        assert_eq!(parsed.command, Command::Backup);
        assert_eq!(parsed.options.get("stanza").unwrap().values, vec!["main"]);
        assert_eq!(parsed.options.get("buffer-size").unwrap().values, vec!["2MB"]);
    }

    #[test]
    fn negate_then_negate_again_errors() {
        let args: Vec<String> = vec!["backup".into(), "--no-archive-async".into(), "--no-archive-async".into()];
        let err = parse(&args).unwrap_err();
        assert!(err.message.contains("negated multiple times"));
    }

    #[test]
    fn unknown_option_errors() {
        let args: Vec<String> = vec!["backup".into(), "--bogus-option".into()];
        assert!(parse(&args).is_err());
    }

    #[test]
    fn invalid_command_errors() {
        let args: Vec<String> = vec!["frobnicate".into()];
        assert!(parse(&args).is_err());
    }
}
