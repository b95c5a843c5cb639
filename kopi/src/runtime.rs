//! Tokio runtime selection for background work (capture loop, feed forwarding)

use once_cell::sync::Lazy;

/// Global fallback Tokio runtime for when the host calls in from a thread with no runtime.
/// Shared across all stores and loops and never dropped.
static FALLBACK_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("kopi-worker")
        .enable_all()
        .build()
        .expect("Failed to create fallback tokio runtime")
});

/// Current runtime if available, otherwise the global fallback
pub(crate) fn runtime_handle() -> tokio::runtime::Handle {
    tokio::runtime::Handle::try_current().unwrap_or_else(|_| FALLBACK_RUNTIME.handle().clone())
}
