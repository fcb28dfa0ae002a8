use crate::config::Config;
use crate::error::StoreError;
use crate::model::{ItemType, Node, PathIdentity, Product, StoredItem};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

mod migrations;

pub use migrations::SCHEMA_VERSION;

/// SQLite caps bound parameters per statement; lookups are split into chunks.
const LOOKUP_CHUNK: usize = 500;

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

/// Persistence gateway for descriptions keyed by (product, path).
///
/// Writes go through a single connection behind a mutex, reads through a
/// pool. No connection is handed out to callers.
#[derive(Debug)]
pub struct DescriptionStore {
    db_path: PathBuf,
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl DescriptionStore {
    pub fn open(db_path: &Path, config: &Config) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!(
            "opening description store at {} (pool size: {}, min_idle: {})",
            db_path.display(),
            config.pool_size,
            config.pool_min_idle
        );

        // Open write connection first and run migrations
        let write_conn = Connection::open(db_path)?;
        write_conn.busy_timeout(Duration::from_secs(30))?;
        write_conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        migrations::migrate(&write_conn)?;

        let write_conn = Arc::new(Mutex::new(write_conn));

        let manager = SqliteConnectionManager::file(db_path);
        let read_pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .min_idle(Some(config.pool_min_idle.min(config.pool_size)))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
            write_conn,
            read_pool,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn read_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.read_pool.get()?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.write_conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Product row for `name`, created on first sight.
    pub fn ensure_product(&self, name: &str) -> Result<Product, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO products (product_name) VALUES (?)
             ON CONFLICT(product_name) DO NOTHING",
            params![name],
        )?;
        let id: i64 = conn.query_row(
            "SELECT product_id FROM products WHERE product_name = ?",
            params![name],
            |row| row.get(0),
        )?;
        debug!("product {} resolved to id {}", name, id);
        Ok(Product {
            id,
            name: name.to_string(),
        })
    }

    pub fn product_by_name(&self, name: &str) -> Result<Option<Product>, StoreError> {
        self.read_conn()?
            .query_row(
                "SELECT product_id, product_name FROM products WHERE product_name = ?",
                params![name],
                |row| {
                    Ok(Product {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Descriptions for `paths`. Every requested path is present in the
    /// result; `None` marks items that were never annotated (or stored
    /// without a description). An empty request never touches the database.
    pub fn get_many(
        &self,
        product_id: i64,
        paths: &[PathIdentity],
    ) -> Result<HashMap<PathIdentity, Option<String>>, StoreError> {
        let mut found: HashMap<PathIdentity, Option<String>> =
            paths.iter().map(|path| (path.clone(), None)).collect();
        if found.is_empty() {
            return Ok(found);
        }

        let conn = self.read_conn()?;
        for chunk in paths.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT item_path, description
                 FROM fs_items
                 WHERE product_id = ? AND item_path IN ({placeholders})"
            );
            let keys: Vec<&str> = chunk.iter().map(PathIdentity::as_str).collect();
            let mut params: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(keys.len() + 1);
            params.push(&product_id);
            for key in &keys {
                params.push(key as &dyn rusqlite::ToSql);
            }
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params.as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?;
            for row in rows {
                let (path, description) = row?;
                found.insert(PathIdentity::new(path), description);
            }
        }
        Ok(found)
    }

    /// Insert the node, or overwrite only the description of an existing
    /// row. Type and name of a stored row never change.
    pub fn upsert(&self, product_id: i64, node: &Node) -> Result<(), StoreError> {
        let parent = node.path.parent();
        self.conn()?.execute(
            "INSERT INTO fs_items
                (product_id, item_path, item_type, item_name, description, parent_path, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(product_id, item_path) DO UPDATE SET
                description = excluded.description,
                updated_at = excluded.updated_at",
            params![
                product_id,
                node.path.as_str(),
                node.item_type.as_str(),
                node.name,
                node.description,
                parent.as_ref().map(PathIdentity::as_str),
                unix_now(),
            ],
        )?;
        debug!("upserted description for {}", node.path);
        Ok(())
    }

    pub fn get_item(
        &self,
        product_id: i64,
        path: &PathIdentity,
    ) -> Result<Option<StoredItem>, StoreError> {
        self.read_conn()?
            .query_row(
                "SELECT item_path, item_name, item_type, description, parent_path, updated_at
                 FROM fs_items
                 WHERE product_id = ? AND item_path = ?",
                params![product_id, path.as_str()],
                stored_item_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Stored items directly below `parent`; `None` lists top-level items.
    pub fn children(
        &self,
        product_id: i64,
        parent: Option<&PathIdentity>,
    ) -> Result<Vec<StoredItem>, StoreError> {
        let conn = self.read_conn()?;
        let mut items = Vec::new();
        match parent {
            Some(parent) => {
                let mut stmt = conn.prepare(
                    "SELECT item_path, item_name, item_type, description, parent_path, updated_at
                     FROM fs_items
                     WHERE product_id = ? AND parent_path = ?
                     ORDER BY item_path",
                )?;
                let rows = stmt.query_map(
                    params![product_id, parent.as_str()],
                    stored_item_from_row,
                )?;
                for row in rows {
                    items.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT item_path, item_name, item_type, description, parent_path, updated_at
                     FROM fs_items
                     WHERE product_id = ? AND parent_path IS NULL
                     ORDER BY item_path",
                )?;
                let rows = stmt.query_map(params![product_id], stored_item_from_row)?;
                for row in rows {
                    items.push(row?);
                }
            }
        }
        Ok(items)
    }

    pub fn item_count(&self, product_id: i64) -> Result<i64, StoreError> {
        let count = self.read_conn()?.query_row(
            "SELECT COUNT(*) FROM fs_items WHERE product_id = ?",
            params![product_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn stored_item_from_row(row: &Row<'_>) -> rusqlite::Result<StoredItem> {
    let item_type: String = row.get(2)?;
    let parent: Option<String> = row.get(4)?;
    Ok(StoredItem {
        path: PathIdentity::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        item_type: item_type.parse().unwrap_or(ItemType::Unknown),
        description: row.get(3)?,
        parent_path: parent.map(PathIdentity::new),
        updated_at: row.get(5)?,
    })
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
