//! `InfoArchive`: the `[db]` / `[db:history:<id>]` section pair tracking
//! every PostgreSQL instance WAL was ever archived for (§3 "Info file").
//! The system-identifier field is named `db-id` on the wire inside history
//! sections — `backup.rs` names the identical semantic field `db-system-id`
//! instead (§9 Open Question); both still use `db-id` for the `[db]`
//! section's own current-history pointer, since that's a different field
//! occupying a different section.

use crate::error::{err, ErrorKind, Result};
use crate::info::backup::InfoHistoryRecord;
use crate::ini::{Ini, IniValue};

const SECTION_DB: &str = "db";
const KEY_CURRENT: &str = "db-id";
const KEY_SYSTEM_ID: &str = "db-id";
const KEY_VERSION: &str = "db-version";
const KEY_CATALOG_VERSION: &str = "db-catalog-version";

#[derive(Debug, Clone)]
pub struct InfoArchive {
    pub pg_id: u32,
    pub history: Vec<InfoHistoryRecord>,
}

impl InfoArchive {
    pub fn new(db_version: &str, db_id: i64, db_catalog_version: u32) -> Self {
        let history_id = 1;
        InfoArchive {
            pg_id: history_id,
            history: vec![InfoHistoryRecord { history_id, db_version: db_version.to_string(), db_id, db_catalog_version }],
        }
    }

    pub fn current(&self) -> &InfoHistoryRecord {
        self.history.iter().find(|h| h.history_id == self.pg_id).expect("pg_id always references an entry in history")
    }

    pub fn push(&mut self, db_version: &str, db_id: i64, db_catalog_version: u32) {
        let history_id = self.history.iter().map(|h| h.history_id).max().unwrap_or(0) + 1;
        self.history.push(InfoHistoryRecord { history_id, db_version: db_version.to_string(), db_id, db_catalog_version });
        self.pg_id = history_id;
    }

    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        let current = self.current();
        ini.set(SECTION_DB, KEY_CURRENT, IniValue::Scalar(self.pg_id.to_string()));
        ini.set(SECTION_DB, KEY_VERSION, IniValue::Scalar(current.db_version.clone()));
        ini.set(SECTION_DB, KEY_CATALOG_VERSION, IniValue::Scalar(current.db_catalog_version.to_string()));

        for record in &self.history {
            let section = format!("db:history:{}", record.history_id);
            ini.set(&section, KEY_SYSTEM_ID, IniValue::Scalar(record.db_id.to_string()));
            ini.set(&section, KEY_VERSION, IniValue::Scalar(record.db_version.clone()));
            ini.set(&section, KEY_CATALOG_VERSION, IniValue::Scalar(record.db_catalog_version.to_string()));
        }
        ini
    }

    pub fn from_ini(ini: &Ini) -> Result<Self> {
        let pg_id: u32 = ini
            .get(SECTION_DB, KEY_CURRENT)?
            .as_scalar()
            .unwrap_or("")
            .parse()
            .map_err(|_| err!(ErrorKind::FormatError, "invalid '{}' in section '{}'", KEY_CURRENT, SECTION_DB))?;

        let mut history = Vec::new();
        for section in ini.section_list() {
            let Some(suffix) = section.strip_prefix("db:history:") else { continue };
            let history_id: u32 =
                suffix.parse().map_err(|_| err!(ErrorKind::FormatError, "invalid history section '{}'", section))?;
            let db_id: i64 = ini
                .get(section, KEY_SYSTEM_ID)?
                .as_scalar()
                .unwrap_or("")
                .parse()
                .map_err(|_| err!(ErrorKind::FormatError, "invalid '{}' in section '{}'", KEY_SYSTEM_ID, section))?;
            let db_version = ini.get(section, KEY_VERSION)?.as_scalar().unwrap_or("").to_string();
            let db_catalog_version: u32 = ini
                .get(section, KEY_CATALOG_VERSION)?
                .as_scalar()
                .unwrap_or("")
                .parse()
                .map_err(|_| err!(ErrorKind::FormatError, "invalid '{}' in section '{}'", KEY_CATALOG_VERSION, section))?;
            history.push(InfoHistoryRecord { history_id, db_version, db_id, db_catalog_version });
        }

        if history.is_empty() {
            return Err(err!(ErrorKind::FormatError, "archive info file has no '[db:history:*]' sections"));
        }
        history.sort_by_key(|h| h.history_id);

        if !history.iter().any(|h| h.history_id == pg_id) {
            return Err(err!(ErrorKind::FormatError, "current db-id '{}' has no matching history entry", pg_id));
        }

        Ok(InfoArchive { pg_id, history })
    }

    /// Validate an incoming WAL segment's PostgreSQL system id / version
    /// against the current instance, per §7 `ArchiveMismatchError`.
    pub fn check(&self, db_version: &str, db_id: i64) -> Result<()> {
        let current = self.current();
        if current.db_version != db_version || current.db_id != db_id {
            return Err(err!(
                ErrorKind::ArchiveMismatchError,
                "WAL file system-id '{}' version '{}' does not match stanza system-id '{}' version '{}'",
                db_id,
                db_version,
                current.db_id,
                current.db_version
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_ini() {
        let info = InfoArchive::new("13", 6_812_526_097_235_885_210, 301);
        let ini = info.to_ini();
        let parsed = InfoArchive::from_ini(&ini).unwrap();
        assert_eq!(parsed.pg_id, 1);
        assert_eq!(parsed.current().db_id, 6_812_526_097_235_885_210);
    }

    #[test]
    fn check_rejects_system_id_mismatch() {
        let info = InfoArchive::new("13", 111, 301);
        assert!(info.check("13", 222).is_err());
        assert!(info.check("13", 111).is_ok());
    }
}
