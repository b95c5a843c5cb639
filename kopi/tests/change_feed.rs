//! Change feeds: initial snapshot, push on commit, cancellation, and the
//! host-facing observer handle.

use kopi::{CapturedContent, ClipboardItem, FeedQuery, ItemListObserver, ItemStore};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> Arc<ItemStore> {
    let db_path = dir.path().join("feed.sqlite").to_string_lossy().to_string();
    Arc::new(ItemStore::new(db_path).unwrap())
}

struct ChannelObserver {
    sender: Mutex<mpsc::Sender<Vec<ClipboardItem>>>,
}

impl ItemListObserver for ChannelObserver {
    fn on_items_changed(&self, items: Vec<ClipboardItem>) {
        let _ = self.sender.lock().unwrap().send(items);
    }
}

fn observer() -> (Arc<ChannelObserver>, mpsc::Receiver<Vec<ClipboardItem>>) {
    let (sender, receiver) = mpsc::channel();
    (Arc::new(ChannelObserver { sender: Mutex::new(sender) }), receiver)
}

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn subscriber_sees_initial_result_then_each_change() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.capture(CapturedContent::text("existing"), None).unwrap();

    let mut feed = store.subscribe(FeedQuery::All, 10).unwrap();
    assert_eq!(feed.query(), FeedQuery::All);
    let initial = feed.next().await.unwrap();
    assert_eq!(initial.len(), 1);

    let writer = store.clone();
    tokio::task::spawn_blocking(move || {
        writer.capture(CapturedContent::text("new"), None).unwrap();
    })
    .await
    .unwrap();

    let updated = feed.next().await.unwrap();
    assert_eq!(updated.len(), 2);
    assert_eq!(updated[0].content, "new");
}

#[tokio::test]
async fn pinned_feed_only_fires_for_pinned_changes() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut feed = store.subscribe(FeedQuery::Pinned, 10).unwrap();
    assert_eq!(feed.next().await, Some(Vec::new()));

    store.capture(CapturedContent::text("unpinned"), None).unwrap();
    assert_eq!(feed.try_next(), None);

    store.pin(CapturedContent::text("unpinned"), None).unwrap();
    let pinned = feed.try_next().unwrap();
    assert_eq!(pinned.len(), 1);
    assert!(pinned[0].is_pinned);

    store.delete_all_pinned().unwrap();
    assert_eq!(feed.try_next(), Some(Vec::new()));
}

#[tokio::test]
async fn deliveries_are_never_older_than_earlier_ones() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let mut feed = store.subscribe(FeedQuery::All, 100).unwrap();
    feed.try_next();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..10 {
                    store
                        .capture(CapturedContent::text(format!("{t}-{i}")), None)
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut previous_len = 0;
    while let Some(items) = feed.try_next() {
        assert!(items.len() > previous_len);
        previous_len = items.len();
    }
    assert_eq!(previous_len, 40);
}

#[tokio::test]
async fn cancelled_feed_gets_nothing_more() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut feed = store.subscribe(FeedQuery::All, 10).unwrap();
    feed.try_next();
    feed.cancel();
    assert!(feed.is_cancelled());
    assert_eq!(store.active_feed_count(), 0);

    store.capture(CapturedContent::text("after cancel"), None).unwrap();
    assert_eq!(feed.next().await, None);

    {
        let _dropped = store.subscribe(FeedQuery::Pinned, 10).unwrap();
        assert_eq!(store.active_feed_count(), 1);
    }
    assert_eq!(store.active_feed_count(), 0);
}

#[test]
fn observer_receives_pushes_until_cancelled() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (obs, received) = observer();

    let handle = store.observe(FeedQuery::All, 10, obs).unwrap();
    assert_eq!(received.recv_timeout(WAIT).unwrap(), Vec::new());

    store.capture(CapturedContent::text("pushed"), None).unwrap();
    let items = received.recv_timeout(WAIT).unwrap();
    assert_eq!(items[0].content, "pushed");

    handle.cancel();
    assert!(handle.is_cancelled());
    assert_eq!(store.active_feed_count(), 0);

    store.capture(CapturedContent::text("not pushed"), None).unwrap();
    assert!(received.recv_timeout(Duration::from_millis(200)).is_err());
}
