//! SQLite database layer for clipboard storage
//!
//! One `items` table keyed by a surrogate id, indexed by fingerprint and by
//! `updatedAt`. Uses r2d2 connection pooling to allow concurrent reads.
//!
//! Write helpers take a `&Connection` so the store can run them inside its
//! own `BEGIN IMMEDIATE` transaction.

use crate::interface::{ClipboardItem, ContentKind};
use crate::models::NewItem;
use chrono::{DateTime, TimeZone, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Fixed-width so that text order equals chronological order
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// How long a caller waits for a pooled connection or a locked database
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ITEM_COLUMNS: &str =
    "id, kind, content, blob, thumbnail, preview, isPinned, fingerprint, createdAt, updatedAt, sourceApp, colorRgba";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

pub(crate) fn format_db_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse timestamp string from database to DateTime<Utc>
fn parse_db_timestamp(timestamp_str: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or_else(|_| Utc::now())
}

/// Thread-safe database wrapper using connection pooling
///
/// WAL mode lets readers proceed while the single writer holds its transaction.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open or create a database at the given path with connection pooling
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                PRAGMA cache_size=-16000;
            ",
            )?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(8)
            .connection_timeout(BUSY_TIMEOUT)
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (tests, throwaway sessions)
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory();

        // In-memory needs single connection to maintain state
        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(BUSY_TIMEOUT)
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Get a connection from the pool
    pub(crate) fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                content TEXT NOT NULL,
                blob BLOB,
                thumbnail BLOB,
                preview TEXT NOT NULL,
                isPinned INTEGER NOT NULL DEFAULT 0,
                fingerprint TEXT NOT NULL,
                createdAt TEXT NOT NULL,
                updatedAt TEXT NOT NULL,
                sourceApp TEXT,
                colorRgba INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_items_fingerprint ON items(fingerprint);
            CREATE INDEX IF NOT EXISTS idx_items_updated ON items(updatedAt);
            CREATE INDEX IF NOT EXISTS idx_items_pinned_updated ON items(isPinned, updatedAt);
        "#,
        )?;
        Ok(())
    }

    /// Get the database size in bytes
    pub fn database_size(&self) -> DatabaseResult<i64> {
        let conn = self.get_conn()?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok(page_count * page_size)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection-level queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Get total number of items
    pub fn count_items(conn: &Connection) -> DatabaseResult<u64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Newest `updatedAt` in the table, used to seed the writer clock
    pub fn max_updated_at(conn: &Connection) -> DatabaseResult<Option<DateTime<Utc>>> {
        let newest: Option<String> =
            conn.query_row("SELECT MAX(updatedAt) FROM items", [], |row| row.get(0))?;
        Ok(newest.as_deref().map(parse_db_timestamp))
    }

    /// Find the live row for a fingerprint
    pub fn find_by_fingerprint(conn: &Connection, fingerprint: &str) -> DatabaseResult<Option<ClipboardItem>> {
        let sql = format!(
            "SELECT {} FROM items WHERE fingerprint = ?1 ORDER BY updatedAt DESC, id DESC LIMIT 1",
            ITEM_COLUMNS
        );
        Ok(conn.query_row(&sql, [fingerprint], Self::row_to_item).optional()?)
    }

    pub fn fetch_item(conn: &Connection, id: i64) -> DatabaseResult<Option<ClipboardItem>> {
        let sql = format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS);
        Ok(conn.query_row(&sql, [id], Self::row_to_item).optional()?)
    }

    /// Items newest first (`updatedAt` DESC, later insert wins ties), at most `limit`
    pub fn list_items(conn: &Connection, pinned_only: bool, limit: u32) -> DatabaseResult<Vec<ClipboardItem>> {
        let filter = if pinned_only { "WHERE isPinned = 1" } else { "" };
        let sql = format!(
            "SELECT {} FROM items {} ORDER BY updatedAt DESC, id DESC LIMIT ?1",
            ITEM_COLUMNS, filter
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let items = stmt
            .query_map([limit as i64], Self::row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Insert a new row; `createdAt` and `updatedAt` both start at `timestamp`
    pub fn insert_item(
        conn: &Connection,
        item: &NewItem,
        is_pinned: bool,
        timestamp: DateTime<Utc>,
    ) -> DatabaseResult<i64> {
        let timestamp_str = format_db_timestamp(timestamp);
        conn.execute(
            r#"INSERT INTO items (kind, content, blob, thumbnail, preview, isPinned, fingerprint, createdAt, updatedAt, sourceApp, colorRgba)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9, ?10)"#,
            params![
                item.kind.to_database_str(),
                item.content,
                item.blob,
                item.thumbnail,
                item.preview,
                is_pinned,
                item.fingerprint,
                timestamp_str,
                item.source_app,
                item.color_rgba,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Refresh `updatedAt`, optionally forcing the pin on. Never clears a pin.
    pub fn touch_item(conn: &Connection, id: i64, timestamp: DateTime<Utc>, pin: bool) -> DatabaseResult<()> {
        let timestamp_str = format_db_timestamp(timestamp);
        if pin {
            conn.execute(
                "UPDATE items SET updatedAt = ?1, isPinned = 1 WHERE id = ?2",
                params![timestamp_str, id],
            )?;
        } else {
            conn.execute(
                "UPDATE items SET updatedAt = ?1 WHERE id = ?2",
                params![timestamp_str, id],
            )?;
        }
        Ok(())
    }

    /// Delete one row. Returns the number of rows removed (0 or 1).
    pub fn delete_item(conn: &Connection, id: i64) -> DatabaseResult<usize> {
        Ok(conn.execute("DELETE FROM items WHERE id = ?1", [id])?)
    }

    pub fn delete_pinned(conn: &Connection) -> DatabaseResult<usize> {
        Ok(conn.execute("DELETE FROM items WHERE isPinned = 1", [])?)
    }

    pub fn delete_all(conn: &Connection) -> DatabaseResult<usize> {
        Ok(conn.execute("DELETE FROM items", [])?)
    }

    /// Delete the `count` oldest rows by `updatedAt` (earlier insert goes first on ties)
    pub fn delete_oldest(conn: &Connection, count: u64) -> DatabaseResult<usize> {
        if count == 0 {
            return Ok(0);
        }
        Ok(conn.execute(
            r#"DELETE FROM items WHERE id IN (
                SELECT id FROM items ORDER BY updatedAt ASC, id ASC LIMIT ?1
            )"#,
            [count as i64],
        )?)
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<ClipboardItem> {
        let kind: String = row.get(1)?;
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;

        Ok(ClipboardItem {
            id: row.get(0)?,
            kind: ContentKind::from_database_str(&kind),
            content: row.get(2)?,
            blob: row.get(3)?,
            thumbnail: row.get(4)?,
            preview: row.get(5)?,
            is_pinned: row.get(6)?,
            fingerprint: row.get(7)?,
            created_at: SystemTime::from(parse_db_timestamp(&created_at)),
            updated_at: SystemTime::from(parse_db_timestamp(&updated_at)),
            source_app: row.get(10)?,
            color_rgba: row.get(11)?,
        })
    }
}
