use log::warn;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::DomainWatchError;

const AUTO_ENABLED_KEY: &str = "is_auto_enabled";

/// The process-wide auto-check switch.
///
/// Exactly one value exists; it lives in the `meta` table and defaults to
/// disabled when the database is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoCheckSetting {
    pub is_auto_enabled: bool,
}

impl AutoCheckSetting {
    pub fn get(conn: &Connection) -> Result<Self, DomainWatchError> {
        let value = Database::get_meta_value_locked(conn, AUTO_ENABLED_KEY)?;

        let is_auto_enabled = match value.as_deref() {
            Some("1") => true,
            Some("0") | None => false,
            Some(other) => {
                warn!(
                    "Invalid {} value in database: '{}', treating as disabled",
                    AUTO_ENABLED_KEY, other
                );
                false
            }
        };

        Ok(AutoCheckSetting { is_auto_enabled })
    }

    pub fn set(conn: &Connection, enabled: bool) -> Result<(), DomainWatchError> {
        Database::immediate_transaction(conn, |conn| {
            Database::set_meta_value_locked(conn, AUTO_ENABLED_KEY, if enabled { "1" } else { "0" })
        })
    }
}
