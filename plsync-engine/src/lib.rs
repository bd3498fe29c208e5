//! plsync engine library
//!
//! Incremental playlist sync: scans source playlists and followed artists'
//! releases, works out what has not been seen before, and appends it to a
//! destination playlist without creating duplicates.

pub mod history;
pub mod novelty;
pub mod orchestrator;
pub mod play_counts;
pub mod provider;
pub mod reconciler;
pub mod releases;
pub mod scanner;
pub mod services;

pub use history::{HistoryStore, KnownSet, ARTIST_RELEASES_KEY};
pub use orchestrator::{RunPlan, RunReport, SyncEngine, SyncError};
pub use provider::{CollectionProvider, ProviderError, ProviderResult};
pub use reconciler::{WriteReport, WriteStatus};
