//! Ini store: two-level `section -> (key -> value)` mapping (§3), plus
//! `parse_ini`/`render_ini` round-trip functions (§8 round-trip law).
//!
//! Parsing follows `iniParse()`: a line starting with `[` must end with `]`;
//! a non-blank, non-comment line outside any section is an error; every
//! key/value line must contain `=`; a zero-length key is an error. List
//! values (repeated keys within a section) are preserved in insertion order.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{err, ErrorKind, Result};

/// A key may hold a single scalar or an accumulated list (repeated key,
/// used by list/hash-typed options and config-file multi-value keys).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IniValue {
    Scalar(String),
    List(Vec<String>),
}

impl IniValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            IniValue::Scalar(s) => Some(s),
            IniValue::List(l) => l.last().map(|s| s.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ini {
    // BTreeMap gives stable sorted-section / sorted-key rendering for free
    // (§4.6 "render the ini store to text in sorted-section / sorted-key order").
    sections: BTreeMap<String, BTreeMap<String, IniValue>>,
}

impl Ini {
    pub fn new() -> Self {
        Ini::default()
    }

    pub fn get(&self, section: &str, key: &str) -> Result<&IniValue> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .ok_or_else(|| err!(ErrorKind::FormatError, "section '{}', key '{}' does not exist", section, key))
    }

    pub fn get_default<'a>(&'a self, section: &str, key: &str, default: &'a IniValue) -> &'a IniValue {
        self.sections.get(section).and_then(|s| s.get(key)).unwrap_or(default)
    }

    pub fn get_opt(&self, section: &str, key: &str) -> Option<&IniValue> {
        self.sections.get(section).and_then(|s| s.get(key))
    }

    pub fn section_key_list(&self, section: &str) -> Vec<&str> {
        self.sections
            .get(section)
            .map(|s| s.keys().map(|k| k.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn section_list(&self) -> Vec<&str> {
        self.sections.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    /// Set a scalar key, erroring on a duplicate within the same section
    /// (Phase 2's "duplicates within one section error").
    pub fn set_unique(&mut self, section: &str, key: &str, value: String) -> Result<()> {
        let entry = self.sections.entry(section.to_string()).or_default();
        if entry.contains_key(key) {
            return Err(err!(ErrorKind::FormatError, "section '{}', key '{}' already set", section, key));
        }
        entry.insert(key.to_string(), IniValue::Scalar(value));
        Ok(())
    }

    /// Set a key, overwriting any prior value (used when merging config data
    /// programmatically rather than parsing a file).
    pub fn set(&mut self, section: &str, key: &str, value: IniValue) {
        self.sections.entry(section.to_string()).or_default().insert(key.to_string(), value);
    }

    /// Remove a single key (used to exclude the checksum key itself before
    /// computing the checksum over the rest of the store, §4.6).
    pub fn remove(&mut self, section: &str, key: &str) {
        if let Some(keys) = self.sections.get_mut(section) {
            keys.remove(key);
        }
    }

    /// Add one occurrence to a list-typed key, accumulating repeats.
    pub fn add_list(&mut self, section: &str, key: &str, value: String) {
        let entry = self.sections.entry(section.to_string()).or_default();
        match entry.get_mut(key) {
            Some(IniValue::List(l)) => l.push(value),
            Some(IniValue::Scalar(s)) => {
                let prior = s.clone();
                entry.insert(key.to_string(), IniValue::List(vec![prior, value]));
            }
            None => {
                entry.insert(key.to_string(), IniValue::List(vec![value]));
            }
        }
    }
}

/// Parse ini text into a store. Ported from `iniParse()`.
pub fn parse_ini(text: &str) -> Result<Ini> {
    let mut ini = Ini::new();
    let mut section: Option<String> = None;

    for (lineno, raw) in text.lines().enumerate() {
        let line_num = lineno + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') {
            if !line.ends_with(']') {
                return Err(err!(ErrorKind::FormatError, "ini section should end with ] at line {}: {}", line_num, raw));
            }
            section = Some(line[1..line.len() - 1].to_string());
            continue;
        }

        let Some(ref sect) = section else {
            return Err(err!(ErrorKind::FormatError, "key/value found outside of section at line {}: {}", line_num, raw));
        };

        let Some(eq) = line.find('=') else {
            return Err(err!(ErrorKind::FormatError, "missing '=' in key/value at line {}: {}", line_num, raw));
        };

        let key = line[..eq].trim();
        let value = line[eq + 1..].trim();

        if key.is_empty() {
            return Err(err!(ErrorKind::FormatError, "key is zero-length at line {}: {}", line_num, raw));
        }

        ini.add_list(sect, key, value.to_string());
    }

    // Collapse single-element lists back into scalars: repeated keys become
    // lists, a key seen once stays a scalar.
    let sections: Vec<String> = ini.sections.keys().cloned().collect();
    for sect in sections {
        let keys: Vec<String> = ini.sections[&sect].keys().cloned().collect();
        for key in keys {
            if let Some(IniValue::List(l)) = ini.sections.get(&sect).and_then(|s| s.get(&key)) {
                if l.len() == 1 {
                    let v = l[0].clone();
                    ini.sections.get_mut(&sect).unwrap().insert(key, IniValue::Scalar(v));
                }
            }
        }
    }

    Ok(ini)
}

/// Render a store to text in sorted-section / sorted-key order (§4.6).
/// `BTreeMap` iteration already produces that order.
pub fn render_ini(ini: &Ini) -> String {
    let mut out = String::new();
    for (section, keys) in &ini.sections {
        let _ = writeln!(out, "[{}]", section);
        for (key, value) in keys {
            match value {
                IniValue::Scalar(v) => {
                    let _ = writeln!(out, "{}={}", key, v);
                }
                IniValue::List(vs) => {
                    for v in vs {
                        let _ = writeln!(out, "{}={}", key, v);
                    }
                }
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut ini = Ini::new();
        ini.set("global", "buffer-size", IniValue::Scalar("1048576".into()));
        ini.set("global:backup", "compress-type", IniValue::Scalar("zst".into()));
        let text = render_ini(&ini);
        let parsed = parse_ini(&text).unwrap();
        assert_eq!(parsed.get("global", "buffer-size").unwrap().as_scalar(), Some("1048576"));
        assert_eq!(parsed.get("global:backup", "compress-type").unwrap().as_scalar(), Some("zst"));
    }

    #[test]
    fn missing_equals_errors() {
        assert!(parse_ini("[global]\nbad-line\n").is_err());
    }

    #[test]
    fn outside_section_errors() {
        assert!(parse_ini("key=value\n").is_err());
    }

    #[test]
    fn unterminated_section_errors() {
        assert!(parse_ini("[global\n").is_err());
    }

    #[test]
    fn zero_length_key_errors() {
        assert!(parse_ini("[global]\n=value\n").is_err());
    }
}
