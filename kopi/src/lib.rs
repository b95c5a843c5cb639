//! Kopi Core - clipboard history capture, deduplication and retention
//!
//! The host app supplies the OS clipboard through [`ClipboardSource`] and renders
//! the item list it receives from change feeds. Everything in between lives here:
//! normalizing raw clipboard snapshots, fingerprinting content, persisting items
//! in SQLite, bounding the history, and polling the clipboard for changes.
//!
//! Types are exported via UniFFI proc-macros (#[derive(uniffi::Record/Enum/Object)]).

pub mod capture;
pub mod database;
pub mod feed;
pub mod fingerprint;
pub mod interface;
pub mod logging;
pub mod models;
pub mod normalizer;
mod runtime;
pub mod settings;
mod store;

pub use capture::{CaptureLoop, TickOutcome};
pub use feed::{ChangeFeed, FeedHandle};
pub use interface::*;
pub use logging::init_logging;
pub use settings::CaptureSettings;
pub use store::ItemStore;

uniffi::setup_scaffolding!("kopi");
