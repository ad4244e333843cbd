//! Phase 2: config file discovery and loading (§4.4), plus the size/time
//! string parsers used by Phase 3 (ported from `convertToByte()`).

use std::path::Path;

use crate::config::cli::CliOption;
use crate::error::{err, ErrorKind, Result};

const DEFAULT_CONFIG_PATH: &str = "/etc/pgbackrest/pgbackrest.conf";
const DEFAULT_CONFIG_INCLUDE_PATH: &str = "/etc/pgbackrest/conf.d";
const ORIG_CONFIG_PATH: &str = "/etc/pgbackrest.conf";

/// Mirrors `cfgFileLoad()`'s rules (see the original's doc comment, carried
/// forward verbatim in behavior): config-path overrides the base of both
/// defaults; --no-config drops the main file; --config alone (no
/// --config-include-path/--config-path) skips the include directory.
pub fn load_config_text(options: &std::collections::BTreeMap<&'static str, CliOption>) -> Result<Option<String>> {
    let config_opt = options.get("config");
    let config_include_opt = options.get("config-include-path");
    let config_path_opt = options.get("config-path");

    let config_found = config_opt.map(|o| !o.values.is_empty()).unwrap_or(false);
    let config_negated = config_opt.map(|o| o.negate).unwrap_or(false);
    let include_found = config_include_opt.map(|o| !o.values.is_empty()).unwrap_or(false);
    let path_found = config_path_opt.map(|o| !o.values.is_empty()).unwrap_or(false);

    let mut config_required = config_found;
    let mut include_required = include_found;

    let (mut config_default, mut include_default) = (DEFAULT_CONFIG_PATH.to_string(), DEFAULT_CONFIG_INCLUDE_PATH.to_string());
    let config_default_current = config_default.clone();

    if path_found {
        let base = &config_path_opt.unwrap().values[0];
        let file_name = Path::new(DEFAULT_CONFIG_PATH).file_name().unwrap().to_string_lossy().to_string();
        config_default = format!("{}/{}", base.trim_end_matches('/'), file_name);
        include_default = format!("{}/conf.d", base.trim_end_matches('/'));
    }

    let mut load_config = true;
    let mut load_include = true;

    if config_negated {
        load_config = false;
        config_required = false;
    }

    if config_found && !(include_found || path_found) {
        load_include = false;
        include_required = false;
    }

    let mut result: Option<String> = None;

    if load_config {
        let config_file = if config_found { config_opt.unwrap().values[0].clone() } else { config_default.clone() };

        match std::fs::read_to_string(&config_file) {
            Ok(text) => result = Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if config_required {
                    return Err(err!(ErrorKind::FileMissingError, "unable to open '{}'", config_file));
                }
                if config_file == config_default_current {
                    match std::fs::read_to_string(ORIG_CONFIG_PATH) {
                        Ok(text) => result = Some(text),
                        Err(e2) if e2.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e2) => return Err(e2.into()),
                    }
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    if load_include {
        if let Some(text) = &result {
            // Validate eagerly so a malformed main file fails before the
            // include files are even touched.
            crate::ini::parse_ini(text)?;
        }

        let include_path = if include_found { config_include_opt.unwrap().values[0].clone() } else { include_default };

        let entries = match std::fs::read_dir(&include_path) {
            Ok(e) => e.filter_map(|e| e.ok()).map(|e| e.file_name().to_string_lossy().to_string()).filter(|n| n.ends_with(".conf")).collect::<Vec<_>>(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if include_required {
                    return Err(err!(ErrorKind::PathMissingError, "unable to list '{}'", include_path));
                }
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let mut sorted = entries;
        sorted.sort();

        for name in sorted {
            let full = format!("{}/{}", include_path.trim_end_matches('/'), name);
            match std::fs::read_to_string(&full) {
                Ok(part) if !part.is_empty() => {
                    crate::ini::parse_ini(&part)?;
                    result = Some(match result {
                        Some(existing) => format!("{}\n{}", existing, part),
                        None => part,
                    });
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(result)
}

/// `<int>[kmgtp](b|ib|)?` -> bytes, base 1024 regardless of suffix spelling
/// (ported from `convertToByte()`; "kib"/"kb"/"k" are all the same multiplier).
pub fn convert_to_byte(value: &str) -> Result<i64> {
    let lower = value.to_lowercase();
    let digit_end = lower.find(|c: char| !c.is_ascii_digit()).unwrap_or(lower.len());
    let (digits, suffix) = lower.split_at(digit_end);

    if digits.is_empty() {
        return Err(err!(ErrorKind::FormatError, "value '{}' is not valid", value));
    }

    let multiplier: i64 = match suffix {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => 1024i64.pow(2),
        "g" | "gb" | "gib" => 1024i64.pow(3),
        "t" | "tb" | "tib" => 1024i64.pow(4),
        "p" | "pb" | "pib" => 1024i64.pow(5),
        _ => return Err(err!(ErrorKind::FormatError, "value '{}' is not valid", value)),
    };

    let n: i64 = digits.parse().map_err(|_| err!(ErrorKind::FormatError, "value '{}' is not valid", value))?;
    Ok(n * multiplier)
}

/// `<int>(ms|s|m|h|d|w)` -> milliseconds, analogous to `convert_to_byte` but
/// for the time-typed options spec.md §4.4 adds alongside the original's
/// size type.
pub fn convert_to_ms(value: &str) -> Result<i64> {
    let lower = value.to_lowercase();
    let digit_end = lower.find(|c: char| !c.is_ascii_digit()).unwrap_or(lower.len());
    let (digits, suffix) = lower.split_at(digit_end);

    if digits.is_empty() {
        return Err(err!(ErrorKind::FormatError, "value '{}' is not valid", value));
    }

    let multiplier: i64 = match suffix {
        "ms" => 1,
        "s" => 1000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 604_800_000,
        _ => return Err(err!(ErrorKind::FormatError, "value '{}' is not valid", value)),
    };

    let n: i64 = digits.parse().map_err(|_| err!(ErrorKind::FormatError, "value '{}' is not valid", value))?;
    Ok(n * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_size_parsing() {
        assert_eq!(convert_to_byte("2kib").unwrap(), 2048);
        assert_eq!(convert_to_byte("1GB").unwrap(), 1_073_741_824);
        assert_eq!(convert_to_byte("3p").unwrap(), 3 * 1024i64.pow(5));
        assert_eq!(convert_to_byte("10").unwrap(), 10);
        let e = convert_to_byte("1xb").unwrap_err();
        assert_eq!(e.message, "value '1xb' is not valid");
    }

    #[test]
    fn s2_time_parsing() {
        assert_eq!(convert_to_ms("500ms").unwrap(), 500);
        assert_eq!(convert_to_ms("30s").unwrap(), 30_000);
        assert_eq!(convert_to_ms("2m").unwrap(), 120_000);
        assert_eq!(convert_to_ms("1h").unwrap(), 3_600_000);
        assert_eq!(convert_to_ms("1w").unwrap(), 604_800_000);
    }
}
