//! Change Feed: push-on-change subscriptions over the item list
//!
//! The registry keeps, per subscription, its tracked query and the last result it
//! delivered. After every committed write the store marks the registry dirty and
//! calls [`FeedRegistry::refresh_if_dirty`] while still holding its writer lock;
//! results that differ from the last delivery are pushed into the subscription's
//! channel. A refresh that fails leaves the mark set for the next write or
//! subscribe. Channel order is commit order, so a subscriber never sees a
//! snapshot older than one it already has.

use crate::database::{Database, DatabaseResult};
use crate::interface::{ClipboardItem, FeedQuery, ItemListObserver};
use futures::Stream;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Subscription {
    query: FeedQuery,
    limit: u32,
    last_delivered: Vec<ClipboardItem>,
    sender: mpsc::UnboundedSender<Vec<ClipboardItem>>,
}

#[derive(Default)]
pub(crate) struct FeedRegistry {
    next_id: AtomicU64,
    subscriptions: Mutex<HashMap<u64, Subscription>>,
    /// A commit has not been pushed to the feeds yet
    dirty: AtomicBool,
}

/// Run the tracked query for a feed
pub(crate) fn evaluate(conn: &Connection, query: FeedQuery, limit: u32) -> DatabaseResult<Vec<ClipboardItem>> {
    Database::list_items(conn, query == FeedQuery::Pinned, limit)
}

impl FeedRegistry {
    /// Register a subscription whose first delivery is `initial`.
    /// Callers hold the store's writer lock so no commit slips in between.
    pub(crate) fn register(
        self: &Arc<Self>,
        query: FeedQuery,
        limit: u32,
        initial: Vec<ClipboardItem>,
    ) -> ChangeFeed {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail
        let _ = sender.send(initial.clone());

        self.subscriptions.lock().insert(
            id,
            Subscription { query, limit, last_delivered: initial, sender },
        );
        tracing::debug!(feed_id = id, ?query, limit, "change feed registered");

        ChangeFeed {
            id,
            query,
            receiver,
            registry: Arc::downgrade(self),
            cancelled: false,
        }
    }

    /// Record a commit that the feeds have not seen yet
    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Refresh if a commit is still pending. The pending mark is only cleared
    /// once a refresh went through, so a failed one is retried by the next call.
    pub(crate) fn refresh_if_dirty(&self, conn: &Connection) -> DatabaseResult<bool> {
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.refresh(conn)?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(true)
    }

    /// Re-evaluate every subscription against `conn` and push changed results.
    pub(crate) fn refresh(&self, conn: &Connection) -> DatabaseResult<()> {
        let tracked: Vec<(FeedQuery, u32)> = {
            let subs = self.subscriptions.lock();
            if subs.is_empty() {
                return Ok(());
            }
            subs.values().map(|s| (s.query, s.limit)).collect()
        };

        // Feeds sharing a query and limit share one evaluation
        let mut results: HashMap<(FeedQuery, u32), Vec<ClipboardItem>> = HashMap::new();
        for key in tracked {
            if !results.contains_key(&key) {
                results.insert(key, evaluate(conn, key.0, key.1)?);
            }
        }

        let mut subs = self.subscriptions.lock();
        subs.retain(|id, sub| {
            // Registered after the snapshot above; it already holds a fresh result
            let Some(current) = results.get(&(sub.query, sub.limit)) else {
                return true;
            };
            if *current == sub.last_delivered {
                return !sub.sender.is_closed();
            }
            match sub.sender.send(current.clone()) {
                Ok(()) => {
                    sub.last_delivered = current.clone();
                    true
                }
                Err(_) => {
                    tracing::debug!(feed_id = *id, "change feed receiver gone, dropping");
                    false
                }
            }
        });
        Ok(())
    }

    fn remove(&self, id: u64) {
        if self.subscriptions.lock().remove(&id).is_some() {
            tracing::debug!(feed_id = id, "change feed cancelled");
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

/// A live subscription to the item list.
///
/// The first value is the result at subscription time; each later value is the
/// result after a commit that changed it. Dropping the feed cancels it.
pub struct ChangeFeed {
    id: u64,
    query: FeedQuery,
    receiver: mpsc::UnboundedReceiver<Vec<ClipboardItem>>,
    registry: Weak<FeedRegistry>,
    cancelled: bool,
}

impl ChangeFeed {
    pub fn query(&self) -> FeedQuery {
        self.query
    }

    /// Wait for the next delivered snapshot. `None` once cancelled or the store is gone.
    pub async fn next(&mut self) -> Option<Vec<ClipboardItem>> {
        if self.cancelled {
            return None;
        }
        self.receiver.recv().await
    }

    /// Take the next snapshot if one is already queued
    pub fn try_next(&mut self) -> Option<Vec<ClipboardItem>> {
        if self.cancelled {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Drain everything queued and return only the newest snapshot
    pub fn latest(&mut self) -> Option<Vec<ClipboardItem>> {
        let mut latest = None;
        while let Some(items) = self.try_next() {
            latest = Some(items);
        }
        latest
    }

    /// Stop future deliveries and release the registration. Idempotent.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.receiver.close();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Stream for ChangeFeed {
    type Item = Vec<ClipboardItem>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancelled {
            return Poll::Ready(None);
        }
        self.receiver.poll_recv(cx)
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Host-side handle for a feed driving an [`ItemListObserver`]
#[derive(uniffi::Object)]
pub struct FeedHandle {
    feed_id: u64,
    registry: Weak<FeedRegistry>,
    token: CancellationToken,
}

impl FeedHandle {
    /// Forward every snapshot of `feed` to `observer` on a background task
    pub(crate) fn spawn(mut feed: ChangeFeed, observer: Arc<dyn ItemListObserver>) -> Self {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let feed_id = feed.id;
        let registry = feed.registry.clone();

        crate::runtime::runtime_handle().spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    next = feed.next() => match next {
                        Some(items) => observer.on_items_changed(items),
                        None => break,
                    },
                }
            }
            feed.cancel();
        });

        Self { feed_id, registry, token }
    }
}

#[uniffi::export]
impl FeedHandle {
    /// Stop delivering to the observer. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.feed_id);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::CapturedContent;
    use crate::models::NewItem;
    use chrono::Utc;

    fn insert(conn: &Connection, text: &str, pinned: bool) {
        let item = NewItem::from_content(&CapturedContent::text(text), None);
        Database::insert_item(conn, &item, pinned, Utc::now()).unwrap();
    }

    #[test]
    fn test_initial_snapshot_then_changes_only() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.get_conn().unwrap();
        let registry = Arc::new(FeedRegistry::default());

        let initial = evaluate(&conn, FeedQuery::All, 10).unwrap();
        let mut feed = registry.register(FeedQuery::All, 10, initial);
        assert_eq!(feed.try_next(), Some(Vec::new()));

        // Nothing changed: no delivery
        registry.refresh(&conn).unwrap();
        assert_eq!(feed.try_next(), None);

        insert(&conn, "hello", false);
        registry.refresh(&conn).unwrap();
        let items = feed.try_next().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content, "hello");
    }

    #[test]
    fn test_pinned_feed_ignores_unpinned_writes() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.get_conn().unwrap();
        let registry = Arc::new(FeedRegistry::default());
        let mut feed = registry.register(FeedQuery::Pinned, 10, Vec::new());
        feed.try_next();

        insert(&conn, "ephemeral", false);
        registry.refresh(&conn).unwrap();
        assert_eq!(feed.try_next(), None);

        insert(&conn, "keeper", true);
        registry.refresh(&conn).unwrap();
        assert_eq!(feed.try_next().unwrap()[0].content, "keeper");
    }

    #[test]
    fn test_cancel_releases_registration() {
        let registry = Arc::new(FeedRegistry::default());
        let mut feed = registry.register(FeedQuery::All, 5, Vec::new());
        assert_eq!(registry.len(), 1);

        feed.cancel();
        assert_eq!(registry.len(), 0);
        assert!(feed.is_cancelled());
        assert_eq!(feed.try_next(), None);

        // Idempotent
        feed.cancel();
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_drop_cancels() {
        let registry = Arc::new(FeedRegistry::default());
        let feed = registry.register(FeedQuery::All, 5, Vec::new());
        assert_eq!(registry.len(), 1);
        drop(feed);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_failed_refresh_is_retried() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.get_conn().unwrap();
        let registry = Arc::new(FeedRegistry::default());
        let mut feed = registry.register(FeedQuery::All, 10, Vec::new());
        feed.try_next();

        assert!(!registry.refresh_if_dirty(&conn).unwrap());

        insert(&conn, "pending", false);
        registry.mark_dirty();
        conn.execute_batch("ALTER TABLE items RENAME TO items_offline").unwrap();
        assert!(registry.refresh_if_dirty(&conn).is_err());
        assert_eq!(feed.try_next(), None);

        conn.execute_batch("ALTER TABLE items_offline RENAME TO items").unwrap();
        assert!(registry.refresh_if_dirty(&conn).unwrap());
        assert_eq!(feed.try_next().unwrap()[0].content, "pending");

        // Delivered once; nothing left pending
        assert!(!registry.refresh_if_dirty(&conn).unwrap());
        assert_eq!(feed.try_next(), None);
    }

    #[tokio::test]
    async fn test_feed_is_a_stream() {
        use futures::StreamExt;

        let db = Database::open_in_memory().unwrap();
        let conn = db.get_conn().unwrap();
        let registry = Arc::new(FeedRegistry::default());
        let mut feed = registry.register(FeedQuery::All, 10, Vec::new());

        insert(&conn, "streamed", false);
        registry.refresh(&conn).unwrap();

        assert_eq!(feed.next().await, Some(Vec::new()));
        let items = StreamExt::next(&mut feed).await.unwrap();
        assert_eq!(items[0].content, "streamed");

        feed.cancel();
        assert_eq!(StreamExt::next(&mut feed).await, None);
    }

    #[test]
    fn test_latest_drains_queue() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.get_conn().unwrap();
        let registry = Arc::new(FeedRegistry::default());
        let mut feed = registry.register(FeedQuery::All, 10, Vec::new());

        insert(&conn, "one", false);
        registry.refresh(&conn).unwrap();
        insert(&conn, "two", false);
        registry.refresh(&conn).unwrap();

        let latest = feed.latest().unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(feed.try_next(), None);
    }
}
