//! History store
//!
//! Durable record of every track identity already seen per source playlist, plus
//! the followed-artist release feed under [`ARTIST_RELEASES_KEY`]. The file is a
//! JSON object mapping each key to a sorted array of identities; in memory the
//! arrays become sets.
//!
//! Loading fails open (a broken or missing file means "nothing seen yet", which
//! only causes redundant rediscovery) and saving is atomic. Concurrent runs
//! against one file are not supported; callers serialize runs.

use plsync_common::config::write_atomic;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// History key for the followed-artist release feed
pub const ARTIST_RELEASES_KEY: &str = "__artist_releases__";

/// History store errors
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid history document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to write history: {0}")]
    Write(#[from] plsync_common::Error),
}

/// Identities already processed, per source key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownSet {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl KnownSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty (but present) entry for every configured source
    pub fn with_empty_sources(sources: &[String]) -> Self {
        Self {
            entries: sources
                .iter()
                .map(|s| (s.clone(), BTreeSet::new()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn replace(&mut self, key: &str, identities: BTreeSet<String>) {
        self.entries.insert(key.to_string(), identities);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total identities across all keys
    pub fn total_identities(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    fn to_document(&self) -> BTreeMap<&str, Vec<&str>> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.iter().map(String::as_str).collect()))
            .collect()
    }

    fn from_document(document: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            entries: document
                .into_iter()
                .map(|(k, v)| (k, v.into_iter().collect()))
                .collect(),
        }
    }
}

/// JSON-file backed history
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Strict load: `Ok(None)` when the file does not exist
    pub fn try_load(&self) -> Result<Option<KnownSet>, HistoryError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let document: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)?;
        Ok(Some(KnownSet::from_document(document)))
    }

    /// Fail-open load
    ///
    /// A missing, unreadable or unparsable file yields an empty entry for every
    /// configured source instead of an error.
    pub fn load(&self, sources: &[String]) -> KnownSet {
        match self.try_load() {
            Ok(Some(known)) => {
                debug!(
                    path = %self.path.display(),
                    keys = known.len(),
                    identities = known.total_identities(),
                    "Loaded history"
                );
                known
            }
            Ok(None) => {
                info!(path = %self.path.display(), "No history file found, starting empty");
                KnownSet::with_empty_sources(sources)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to load history, starting empty");
                KnownSet::with_empty_sources(sources)
            }
        }
    }

    /// Atomically replace the history file
    pub fn save(&self, known: &KnownSet) -> Result<(), HistoryError> {
        let bytes = serde_json::to_vec_pretty(&known.to_document())?;
        write_atomic(&self.path, &bytes)?;
        debug!(
            path = %self.path.display(),
            keys = known.len(),
            identities = known.total_identities(),
            "Saved history"
        );
        Ok(())
    }
}
