use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::database::Database;
use crate::error::DomainWatchError;
use crate::reputation::{Verdict, VerdictKind};

/// Labels of 1-63 alphanumeric/hyphen characters that neither start nor end
/// with a hyphen, joined by dots, ending in a 2-6 letter top-level label.
static DOMAIN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,6}$")
        .expect("domain regex is valid")
});

const MAX_DOMAIN_LEN: usize = 253;

const SELECT_COLUMNS: &str =
    "domain_id, domain, created_at, malicious, suspicious, checked_at";

/// A monitored domain and the outcome of its most recent check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainRecord {
    pub id: i64,
    pub domain: String,
    pub created_at: String,
    pub analysis_result: Option<Verdict>,
    pub checked_at: Option<String>,
    pub verdict: Option<VerdictKind>,
}

/// Formats a timestamp the way browsers' `Date.toISOString()` does
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Validates a hostname and returns its canonical (trimmed, lowercase) form
pub fn validate_domain(raw: &str) -> Result<String, DomainWatchError> {
    let domain = raw.trim();
    if domain.len() > MAX_DOMAIN_LEN || !DOMAIN_REGEX.is_match(domain) {
        return Err(DomainWatchError::InvalidDomain(domain.to_string()));
    }
    Ok(domain.to_ascii_lowercase())
}

/// Parses an ISO-8601 timestamp and normalizes it to UTC.
/// A timestamp without an offset is taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Result<String, DomainWatchError> {
    let trimmed = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(format_timestamp(ts.with_timezone(&Utc)));
    }

    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|ts| format_timestamp(ts.and_utc()))
        .map_err(|_| {
            DomainWatchError::InvalidInput(format!("'{}' is not an ISO-8601 timestamp", raw))
        })
}

impl DomainRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let malicious: Option<bool> = row.get(3)?;
        let suspicious: Option<bool> = row.get(4)?;
        let analysis_result = match (malicious, suspicious) {
            (Some(m), Some(s)) => Some(Verdict::new(m, s)),
            _ => None,
        };

        Ok(DomainRecord {
            id: row.get(0)?,
            domain: row.get(1)?,
            created_at: row.get(2)?,
            analysis_result,
            checked_at: row.get(5)?,
            verdict: analysis_result.map(|v| v.kind()),
        })
    }

    /// Registers a new domain. The name is validated before anything is written;
    /// a name that is already registered (in any letter case) is rejected.
    pub fn create(
        conn: &Connection,
        domain: &str,
        created_at: &str,
    ) -> Result<Self, DomainWatchError> {
        let domain = validate_domain(domain)?;
        let created_at = parse_timestamp(created_at)?;

        Database::immediate_transaction(conn, |conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT domain_id FROM domains WHERE domain = ?",
                    [&domain],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Err(DomainWatchError::DuplicateDomain(domain.clone()));
            }

            let record = conn
                .query_row(
                    &format!(
                        "INSERT INTO domains (domain, created_at) VALUES (?, ?) RETURNING {}",
                        SELECT_COLUMNS
                    ),
                    [&domain, &created_at],
                    Self::from_row,
                )
                .map_err(|e| match e {
                    rusqlite::Error::SqliteFailure(err, _)
                        if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        DomainWatchError::DuplicateDomain(domain.clone())
                    }
                    other => DomainWatchError::DatabaseError(other),
                })?;

            Ok(record)
        })
    }

    pub fn get_by_id(conn: &Connection, domain_id: i64) -> Result<Option<Self>, DomainWatchError> {
        conn.query_row(
            &format!("SELECT {} FROM domains WHERE domain_id = ?", SELECT_COLUMNS),
            [domain_id],
            Self::from_row,
        )
        .optional()
        .map_err(DomainWatchError::DatabaseError)
    }

    /// All registered domains in insertion order
    pub fn list(conn: &Connection) -> Result<Vec<Self>, DomainWatchError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM domains ORDER BY domain_id ASC",
            SELECT_COLUMNS
        ))?;

        let rows = stmt.query_map([], Self::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }

        Ok(records)
    }

    pub fn delete(conn: &Connection, domain_id: i64) -> Result<(), DomainWatchError> {
        Database::immediate_transaction(conn, |conn| {
            let rows = conn.execute("DELETE FROM domains WHERE domain_id = ?", [domain_id])?;
            if rows == 0 {
                return Err(DomainWatchError::DomainNotFound(domain_id));
            }
            Ok(())
        })
    }

    /// Stores the outcome of a completed check and returns the updated record
    pub fn update_result(
        conn: &Connection,
        domain_id: i64,
        verdict: Verdict,
        checked_at: DateTime<Utc>,
    ) -> Result<Self, DomainWatchError> {
        let checked_at = format_timestamp(checked_at);

        Database::immediate_transaction(conn, |conn| {
            conn.query_row(
                &format!(
                    "UPDATE domains SET malicious = ?, suspicious = ?, checked_at = ?
                     WHERE domain_id = ? RETURNING {}",
                    SELECT_COLUMNS
                ),
                rusqlite::params![
                    verdict.malicious(),
                    verdict.suspicious(),
                    checked_at,
                    domain_id
                ],
                Self::from_row,
            )
            .optional()?
            .ok_or(DomainWatchError::DomainNotFound(domain_id))
        })
    }
}
