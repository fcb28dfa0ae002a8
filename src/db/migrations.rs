use crate::error::StoreError;
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

pub const SCHEMA_VERSION: i64 = 1;

pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        BEGIN;
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS products (
            product_id INTEGER PRIMARY KEY,
            product_name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS fs_items (
            id INTEGER PRIMARY KEY,
            product_id INTEGER NOT NULL,
            item_path TEXT NOT NULL,
            item_type TEXT NOT NULL,
            item_name TEXT NOT NULL,
            description TEXT,
            parent_path TEXT,
            updated_at INTEGER NOT NULL DEFAULT 0,
            UNIQUE(product_id, item_path),
            FOREIGN KEY(product_id) REFERENCES products(product_id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_fs_items_parent ON fs_items(product_id, parent_path);
        COMMIT;
        ",
    )?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                row.get::<_, String>(0)
                    .map(|v| v.parse::<i64>().unwrap_or(0))
            },
        )
        .optional()?;

    let existing = existing.unwrap_or(0);

    if existing > SCHEMA_VERSION {
        warn!(
            "database schema version {} is newer than supported version {}",
            existing, SCHEMA_VERSION
        );
        return Ok(());
    }

    if existing < SCHEMA_VERSION {
        info!("initialized description schema version {}", SCHEMA_VERSION);
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('schema_version', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [SCHEMA_VERSION.to_string()],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_version(conn: &Connection) -> String {
        conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        let indexed: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_fs_items_parent'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(indexed, 1);
        assert_eq!(schema_version(&conn), SCHEMA_VERSION.to_string());
    }

    #[test]
    fn newer_schema_is_left_alone() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "UPDATE meta SET value = '99' WHERE key = 'schema_version'",
            [],
        )
        .unwrap();
        migrate(&conn).unwrap();
        assert_eq!(schema_version(&conn), "99");
    }
}
