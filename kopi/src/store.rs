//! ItemStore - Main API for the host app
//!
//! Owns every persisted clipboard item. All mutations are serialized behind one
//! writer lock and run inside a `BEGIN IMMEDIATE` transaction, so the
//! find-by-fingerprint / insert-or-update decision can never race into two rows.
//! Reads go straight to the connection pool and see only committed state.
//!
//! After each commit that changed something, the change feeds are re-evaluated
//! while the writer lock is still held: feed deliveries follow commit order.

use crate::database::{Database, DatabaseError, DatabaseResult};
use crate::feed::{self, ChangeFeed, FeedHandle, FeedRegistry};
use crate::interface::{CapturedContent, ClipboardItem, FeedQuery, ItemListObserver, KopiError};
use crate::models::NewItem;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, TransactionBehavior};
use std::path::PathBuf;
use std::sync::Arc;

/// Issues strictly increasing write timestamps (microsecond resolution, as stored)
struct WriterClock {
    last: Option<DateTime<Utc>>,
}

impl WriterClock {
    fn next(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let next = match self.last {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last = Some(next);
        next
    }
}

/// Result of one upsert: the row after the write, and whether it was new
struct Upserted {
    item: ClipboardItem,
    inserted: bool,
}

/// Thread-safe clipboard item store backed by SQLite
///
/// Concurrency Model:
/// - Database uses r2d2 connection pool (concurrent reads)
/// - Writes take `writer` for their whole transaction plus feed refresh
#[derive(uniffi::Object)]
pub struct ItemStore {
    db: Database,
    writer: Mutex<WriterClock>,
    feeds: Arc<FeedRegistry>,
}

// Internal implementation (not exported via FFI)
impl ItemStore {
    fn from_database(db: Database) -> Result<Self, KopiError> {
        let last = {
            let conn = db.get_conn()?;
            Database::max_updated_at(&conn)?
        };
        Ok(Self {
            db,
            writer: Mutex::new(WriterClock { last }),
            feeds: Arc::new(FeedRegistry::default()),
        })
    }

    /// Run `op` as one serialized write transaction.
    /// `op` returns its value plus whether it changed any row.
    fn write<T>(
        &self,
        op: impl FnOnce(&Connection, &mut WriterClock) -> DatabaseResult<(T, bool)>,
    ) -> Result<T, KopiError> {
        let mut clock = self.writer.lock();
        let mut conn = self.db.get_conn()?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;
        let (value, changed) = op(&tx, &mut clock)?;
        tx.commit().map_err(DatabaseError::from)?;

        if changed {
            self.feeds.mark_dirty();
        }
        // The write is committed; a feed failure must not turn it into an error.
        // The commit stays pending and the next write or subscribe pushes it.
        self.refresh_feeds(&conn);
        Ok(value)
    }

    /// Push pending commits to the feeds. Caller holds the writer lock.
    fn refresh_feeds(&self, conn: &Connection) {
        if let Err(e) = self.feeds.refresh_if_dirty(conn) {
            tracing::warn!(error = %e, "change feed refresh failed, retrying on next write");
        }
    }

    /// Insert-or-update by fingerprint. `pin` forces `is_pinned`; otherwise the
    /// existing pin state is kept and new rows start unpinned.
    fn upsert(
        &self,
        content: &CapturedContent,
        thumbnail: Option<Vec<u8>>,
        pin: bool,
    ) -> Result<Upserted, KopiError> {
        if content.is_empty() {
            return Err(KopiError::InvalidInput("Empty clipboard content".into()));
        }
        let new_item = NewItem::from_content(content, thumbnail);

        let upserted = self.write(|conn, clock| {
            let timestamp = clock.next();
            let (id, inserted) = match Database::find_by_fingerprint(conn, &new_item.fingerprint)? {
                Some(existing) => {
                    Database::touch_item(conn, existing.id, timestamp, pin)?;
                    (existing.id, false)
                }
                None => (Database::insert_item(conn, &new_item, pin, timestamp)?, true),
            };
            let item = Database::fetch_item(conn, id)?
                .ok_or(DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows))?;
            Ok((Upserted { item, inserted }, true))
        })?;

        tracing::debug!(
            item_id = upserted.item.id,
            kind = ?upserted.item.kind,
            inserted = upserted.inserted,
            pinned = upserted.item.is_pinned,
            "clipboard item upserted"
        );
        Ok(upserted)
    }

    /// Subscribe to a tracked query. The first value is the current result.
    pub fn subscribe(&self, query: FeedQuery, limit: u32) -> Result<ChangeFeed, KopiError> {
        // Holding the writer lock keeps commits out between evaluation and registration
        let _clock = self.writer.lock();
        let conn = self.db.get_conn()?;
        self.refresh_feeds(&conn);
        let initial = feed::evaluate(&conn, query, limit)?;
        Ok(self.feeds.register(query, limit, initial))
    }

    /// Number of live change feed registrations
    pub fn active_feed_count(&self) -> usize {
        self.feeds.len()
    }
}

// FFI-exported constructors (must be in standalone impl block)
#[uniffi::export]
impl ItemStore {
    /// Create a new store with a database at the given path
    #[uniffi::constructor]
    pub fn new(db_path: String) -> Result<Self, KopiError> {
        let path = PathBuf::from(db_path);
        let db = Database::open(&path)?;
        tracing::info!(path = %path.display(), "item store opened");
        Self::from_database(db)
    }

    /// Create a store with an in-memory database
    #[uniffi::constructor]
    pub fn open_in_memory() -> Result<Self, KopiError> {
        Self::from_database(Database::open_in_memory()?)
    }
}

#[uniffi::export]
impl ItemStore {
    // ─────────────────────────────────────────────────────────────────────────
    // Write Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Pin content: reuse the row with the same fingerprint (setting `is_pinned`
    /// and refreshing `updated_at`) or insert a new pinned row.
    pub fn pin(
        &self,
        content: CapturedContent,
        thumbnail: Option<Vec<u8>>,
    ) -> Result<ClipboardItem, KopiError> {
        Ok(self.upsert(&content, thumbnail, true)?.item)
    }

    /// Passive capture: same upsert as `pin` but never changes the pin state.
    pub fn capture(
        &self,
        content: CapturedContent,
        thumbnail: Option<Vec<u8>>,
    ) -> Result<ClipboardItem, KopiError> {
        Ok(self.upsert(&content, thumbnail, false)?.item)
    }

    /// Delete one item. Deleting an item that is already gone is a no-op.
    pub fn delete(&self, item_id: i64) -> Result<(), KopiError> {
        let removed = self.write(|conn, _| {
            let removed = Database::delete_item(conn, item_id)?;
            Ok((removed, removed > 0))
        })?;
        tracing::debug!(item_id, removed, "delete item");
        Ok(())
    }

    /// Delete every pinned item. Returns how many were removed.
    pub fn delete_all_pinned(&self) -> Result<u64, KopiError> {
        let removed = self.write(|conn, _| {
            let removed = Database::delete_pinned(conn)?;
            Ok((removed as u64, removed > 0))
        })?;
        tracing::debug!(removed, "deleted pinned items");
        Ok(removed)
    }

    /// Delete every item. Returns how many were removed.
    pub fn delete_all(&self) -> Result<u64, KopiError> {
        let removed = self.write(|conn, _| {
            let removed = Database::delete_all(conn)?;
            Ok((removed as u64, removed > 0))
        })?;
        tracing::debug!(removed, "deleted all items");
        Ok(removed)
    }

    /// Evict the oldest items (by `updated_at`, pinned or not) until at most
    /// `max_items` remain. Returns how many were evicted.
    pub fn enforce_retention(&self, max_items: u32) -> Result<u64, KopiError> {
        let evicted = self.write(|conn, _| {
            let count = Database::count_items(conn)?;
            let excess = count.saturating_sub(max_items as u64);
            let evicted = Database::delete_oldest(conn, excess)? as u64;
            Ok((evicted, evicted > 0))
        })?;
        if evicted > 0 {
            tracing::debug!(evicted, max_items, "retention evicted items");
        }
        Ok(evicted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Pinned items, newest `updated_at` first, at most `limit`
    pub fn list_pinned(&self, limit: u32) -> Result<Vec<ClipboardItem>, KopiError> {
        let conn = self.db.get_conn()?;
        Ok(Database::list_items(&conn, true, limit)?)
    }

    /// All items, newest `updated_at` first, at most `limit`
    pub fn list_all(&self, limit: u32) -> Result<Vec<ClipboardItem>, KopiError> {
        let conn = self.db.get_conn()?;
        Ok(Database::list_items(&conn, false, limit)?)
    }

    /// Fetch one item by id
    pub fn get(&self, item_id: i64) -> Result<Option<ClipboardItem>, KopiError> {
        let conn = self.db.get_conn()?;
        Ok(Database::fetch_item(&conn, item_id)?)
    }

    /// Total number of items
    pub fn count(&self) -> Result<u64, KopiError> {
        let conn = self.db.get_conn()?;
        Ok(Database::count_items(&conn)?)
    }

    /// Get the database size in bytes
    pub fn database_size(&self) -> i64 {
        self.db.database_size().unwrap_or(0)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Change Feed
    // ─────────────────────────────────────────────────────────────────────────

    /// Push the current result of `query` to `observer`, then every changed
    /// result after later commits, until the returned handle is cancelled.
    pub fn observe(
        &self,
        query: FeedQuery,
        limit: u32,
        observer: Arc<dyn ItemListObserver>,
    ) -> Result<Arc<FeedHandle>, KopiError> {
        let feed = self.subscribe(query, limit)?;
        Ok(Arc::new(FeedHandle::spawn(feed, observer)))
    }
}
