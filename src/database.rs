use log::{debug, info};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DomainWatchError;
use crate::schema::{CREATE_SCHEMA_SQL, SCHEMA_VERSION};

const DB_FILENAME: &str = "domainwatch.db";
const POOL_SIZE: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Handle to the SQLite database backing the domain registry.
///
/// Cloning is cheap: every clone shares the same connection pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
    db_path: PathBuf,
}

impl Database {
    /// Opens (creating if necessary) the database file inside `db_dir` and
    /// makes sure the schema is present and current.
    pub fn open(db_dir: &Path) -> Result<Self, DomainWatchError> {
        fs::create_dir_all(db_dir)?;
        let db_path = db_dir.join(DB_FILENAME);

        let manager = SqliteConnectionManager::file(&db_path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
        });

        let pool = Pool::builder().max_size(POOL_SIZE).build(manager)?;

        let db = Database { pool, db_path };
        {
            let conn = db.get_connection()?;
            Self::ensure_schema(&conn)?;
        }

        info!("Database opened at: {}", db.db_path.display());
        Ok(db)
    }

    pub fn get_connection(&self) -> Result<PooledConnection, DomainWatchError> {
        Ok(self.pool.get()?)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken up front, so concurrent writers are serialized
    /// by SQLite rather than failing on lock upgrade. The transaction commits
    /// only if `f` succeeds; any error rolls it back.
    pub fn immediate_transaction<T, F>(conn: &Connection, f: F) -> Result<T, DomainWatchError>
    where
        F: FnOnce(&Connection) -> Result<T, DomainWatchError>,
    {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Reads a value from the `meta` table. Intended to be called with a
    /// transaction already open.
    pub fn get_meta_value_locked(
        conn: &Connection,
        key: &str,
    ) -> Result<Option<String>, DomainWatchError> {
        let value = conn
            .query_row("SELECT value FROM meta WHERE key = ?", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;

        Ok(value)
    }

    pub fn set_meta_value_locked(
        conn: &Connection,
        key: &str,
        value: &str,
    ) -> Result<(), DomainWatchError> {
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    pub fn get_schema_version(&self) -> Result<String, DomainWatchError> {
        let conn = self.get_connection()?;
        Self::get_meta_value_locked(&conn, "schema_version")?
            .ok_or_else(|| DomainWatchError::Error("Schema version missing".to_string()))
    }

    fn ensure_schema(conn: &Connection) -> Result<(), DomainWatchError> {
        let table_exists: bool = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='meta'",
                [],
                |row| row.get::<_, i32>(0),
            )
            .map(|count| count > 0)?;

        if !table_exists {
            debug!("Creating database schema (version {})", SCHEMA_VERSION);
            conn.execute_batch(CREATE_SCHEMA_SQL)?;
            return Ok(());
        }

        let stored_version = Self::get_meta_value_locked(conn, "schema_version")?;

        match stored_version.as_deref() {
            Some(SCHEMA_VERSION) => Ok(()),
            Some(other) => Err(DomainWatchError::Error(format!(
                "Schema version mismatch: database is at version {}, expected {}",
                other, SCHEMA_VERSION
            ))),
            None => Err(DomainWatchError::Error("Schema version missing".to_string())),
        }
    }
}
