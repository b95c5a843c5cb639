//! Capture Loop: polls the clipboard change ordinal and persists new content
//!
//! One tokio task per running loop. Ticks run one after another inside that
//! task; the store write of a tick is awaited on the blocking pool before the
//! next tick starts, so ticks never overlap. Failures inside a tick are logged
//! and swallowed; the change ordinal stays unseen, so the next tick retries.

use crate::interface::{CapturedContent, ClipboardItem, ClipboardSource, KopiError};
use crate::normalizer::normalize;
use crate::runtime::runtime_handle;
use crate::settings::CaptureSettings;
use crate::store::ItemStore;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Ordinal did not move; the clipboard was not read
    Unchanged,
    /// Ordinal moved but the clipboard held nothing usable
    Empty,
    /// New content became current but auto-capture is off
    Tracked,
    Captured { item_id: i64 },
    /// Reading or persisting failed; logged and swallowed
    Failed,
}

/// Most recently observed clipboard content
#[derive(Clone)]
struct Current {
    content: CapturedContent,
    thumbnail: Option<Vec<u8>>,
}

struct ActiveSettings {
    settings: CaptureSettings,
    interval: Duration,
}

impl ActiveSettings {
    fn new(settings: CaptureSettings) -> Result<Self, KopiError> {
        let interval = settings.polling_interval()?;
        Ok(Self { settings, interval })
    }
}

/// State shared between the loop handle and its task
struct LoopShared {
    store: Arc<ItemStore>,
    source: Arc<dyn ClipboardSource>,
    settings: RwLock<ActiveSettings>,
    last_ordinal: AtomicI64,
    current: Mutex<Option<Current>>,
    /// Held for a whole tick so the timer and `poll_once` never interleave
    tick_lock: tokio::sync::Mutex<()>,
}

impl LoopShared {
    /// Read the clipboard as it is right now, without persisting anything
    fn snapshot(&self) {
        self.last_ordinal.store(self.source.change_ordinal(), Ordering::SeqCst);
        match self.source.read_snapshot() {
            Ok(Some(raw)) => {
                if let Some(content) = normalize(&raw) {
                    *self.current.lock() = Some(Current { content, thumbnail: raw.thumbnail });
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "initial clipboard read failed"),
        }
    }

    async fn tick(&self) -> TickOutcome {
        let _ticking = self.tick_lock.lock().await;

        let ordinal = self.source.change_ordinal();
        if self.last_ordinal.load(Ordering::SeqCst) == ordinal {
            return TickOutcome::Unchanged;
        }

        // The ordinal is only marked as seen once the tick is done with it,
        // so a failed read or write is retried by the next tick.
        let outcome = self.handle_change(ordinal).await;
        if outcome != TickOutcome::Failed {
            self.last_ordinal.store(ordinal, Ordering::SeqCst);
        }
        outcome
    }

    async fn handle_change(&self, ordinal: i64) -> TickOutcome {
        let raw = match self.source.read_snapshot() {
            Ok(Some(raw)) => raw,
            Ok(None) => return TickOutcome::Empty,
            Err(e) => {
                tracing::warn!(error = %e, ordinal, "clipboard read failed");
                return TickOutcome::Failed;
            }
        };
        let Some(content) = normalize(&raw) else {
            return TickOutcome::Empty;
        };
        let current = Current { content, thumbnail: raw.thumbnail };
        *self.current.lock() = Some(current.clone());

        let (auto_capture, max_items) = {
            let active = self.settings.read();
            (active.settings.auto_capture_enabled, active.settings.max_items)
        };
        if !auto_capture {
            return TickOutcome::Tracked;
        }

        let store = Arc::clone(&self.store);
        let persisted = tokio::task::spawn_blocking(move || {
            let item = store.capture(current.content, current.thumbnail)?;
            store.enforce_retention(max_items)?;
            Ok::<_, KopiError>(item)
        })
        .await;

        match persisted {
            Ok(Ok(item)) => TickOutcome::Captured { item_id: item.id },
            Ok(Err(e)) => {
                tracing::warn!(error = %e, ordinal, "clipboard capture failed");
                TickOutcome::Failed
            }
            Err(e) => {
                tracing::warn!(error = %e, ordinal, "clipboard capture task failed");
                TickOutcome::Failed
            }
        }
    }
}

enum LoopState {
    Idle,
    Running { token: CancellationToken, interval: Duration },
}

/// Periodic clipboard poller feeding an [`ItemStore`]
#[derive(uniffi::Object)]
pub struct CaptureLoop {
    shared: Arc<LoopShared>,
    state: Mutex<LoopState>,
}

// Internal implementation (not exported via FFI)
impl CaptureLoop {
    /// Run one tick now, independent of the timer
    pub async fn poll_once(&self) -> TickOutcome {
        self.shared.tick().await
    }

    pub fn settings(&self) -> CaptureSettings {
        self.shared.settings.read().settings.clone()
    }

    fn set_interval(&self, interval_seconds: f64) -> Result<(), KopiError> {
        self.update_settings(CaptureSettings {
            polling_interval_seconds: interval_seconds,
            ..self.settings()
        })
    }
}

#[uniffi::export]
impl CaptureLoop {
    #[uniffi::constructor]
    pub fn new(
        store: Arc<ItemStore>,
        source: Arc<dyn ClipboardSource>,
        settings: CaptureSettings,
    ) -> Result<Self, KopiError> {
        let settings = ActiveSettings::new(settings)?;
        Ok(Self {
            shared: Arc::new(LoopShared {
                store,
                source,
                settings: RwLock::new(settings),
                last_ordinal: AtomicI64::new(0),
                current: Mutex::new(None),
                tick_lock: tokio::sync::Mutex::new(()),
            }),
            state: Mutex::new(LoopState::Idle),
        })
    }

    /// Start polling. The clipboard's current content becomes `current_content`
    /// but is not persisted. No-op if already running.
    pub fn start(&self) {
        let mut state = self.state.lock();
        if matches!(*state, LoopState::Running { .. }) {
            return;
        }

        self.shared.snapshot();

        let interval = self.shared.settings.read().interval;
        let token = CancellationToken::new();
        let task_token = token.clone();
        let shared = Arc::clone(&self.shared);

        runtime_handle().spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; start() already looked at the clipboard
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        shared.tick().await;
                    }
                }
            }
            tracing::debug!("capture loop task exited");
        });

        tracing::info!(interval_ms = interval.as_millis() as u64, "capture loop started");
        *state = LoopState::Running { token, interval };
    }

    /// Stop polling. A tick already in progress finishes its write.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if let LoopState::Running { token, .. } = std::mem::replace(&mut *state, LoopState::Idle) {
            token.cancel();
            tracing::info!("capture loop stopped");
        }
    }

    pub fn restart(&self) {
        self.stop();
        self.start();
    }

    /// `start` with a new polling interval, which is kept in the settings.
    /// A loop already running switches to the new interval.
    pub fn start_with_interval(&self, interval_seconds: f64) -> Result<(), KopiError> {
        self.set_interval(interval_seconds)?;
        self.start();
        Ok(())
    }

    pub fn restart_with_interval(&self, interval_seconds: f64) -> Result<(), KopiError> {
        self.stop();
        self.start_with_interval(interval_seconds)
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), LoopState::Running { .. })
    }

    /// Most recent normalized clipboard content seen by the loop
    pub fn current_content(&self) -> Option<CapturedContent> {
        self.shared.current.lock().as_ref().map(|c| c.content.clone())
    }

    /// Pin whatever is currently on the clipboard. `None` if nothing is.
    pub fn pin_current(&self) -> Result<Option<ClipboardItem>, KopiError> {
        let Some(current) = self.shared.current.lock().clone() else {
            return Ok(None);
        };
        self.shared.store.pin(current.content, current.thumbnail).map(Some)
    }

    /// Swap settings. A running loop restarts if the polling interval changed.
    pub fn update_settings(&self, settings: CaptureSettings) -> Result<(), KopiError> {
        let active = ActiveSettings::new(settings)?;
        let interval = active.interval;
        *self.shared.settings.write() = active;

        let interval_changed = matches!(
            *self.state.lock(),
            LoopState::Running { interval: running, .. } if running != interval
        );
        if interval_changed {
            self.restart();
        }
        Ok(())
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
