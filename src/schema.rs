pub const SCHEMA_VERSION: &str = "1";

pub const CREATE_SCHEMA_SQL: &str = r#"
BEGIN TRANSACTION;

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', '1');
INSERT OR IGNORE INTO meta (key, value) VALUES ('is_auto_enabled', '0');

-- AUTOINCREMENT keeps deleted ids from being handed out again, so a check
-- that finishes after its domain was deleted can never update a newer row.
CREATE TABLE IF NOT EXISTS domains (
    domain_id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL UNIQUE COLLATE NOCASE,
    created_at TEXT NOT NULL,
    malicious BOOLEAN,              -- NULL until the first completed check
    suspicious BOOLEAN,             -- NULL until the first completed check
    checked_at TEXT
);

COMMIT;
"#;
