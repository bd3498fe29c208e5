//! Collection provider interface
//!
//! The remote catalog is reached only through [`CollectionProvider`]. The sync
//! engine relies on three contracts:
//! - collection pages arrive newest-insertion-first
//! - pagination continues through an opaque cursor until `next` is `None`
//! - `append_items` rejects more than [`MAX_APPEND_BATCH`] identities per call
//!
//! Calls are awaited one at a time; the engine never retries them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard cap on identities per `append_items` call
pub const MAX_APPEND_BATCH: usize = 100;

/// Page size used when listing collection items
pub const COLLECTION_PAGE_SIZE: u32 = 100;

/// Page size used when listing followed artists
pub const ARTIST_PAGE_SIZE: u32 = 50;

/// Provider errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Batch of {0} items exceeds the append limit of 100")]
    BatchTooLarge(usize),
}

impl ProviderError {
    /// Not-found or permission failure: a misconfigured ID rather than a blip
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Forbidden(_))
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A track as the provider describes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackItem {
    /// Globally unique identity (e.g. `spotify:track:...`)
    pub uri: String,
    pub name: String,
    /// Artist names in credit order
    pub artists: Vec<String>,
}

impl TrackItem {
    /// Artist names joined for display
    pub fn artist_display(&self) -> String {
        self.artists.join(", ")
    }
}

impl std::fmt::Display for TrackItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.name, self.artist_display())
    }
}

/// One row of a collection listing
///
/// `track` is `None` when the provider returned a row without a usable identity
/// (removed or local-only tracks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEntry {
    pub track: Option<TrackItem>,
    /// Insertion timestamp as reported (ISO 8601), if any
    pub added_at: Option<String>,
}

/// A followed artist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
}

/// An album or single published by an artist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Work {
    pub id: String,
    pub name: String,
    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`
    pub release_date: Option<String>,
}

/// A track played by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayEvent {
    pub track: TrackItem,
    pub played_at: Option<String>,
}

/// Period covered by the provider's top-tracks ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    /// Roughly the last four weeks
    #[default]
    ShortTerm,
    /// Roughly the last six months
    MediumTerm,
    /// Several years
    LongTerm,
}

impl TimeRange {
    /// Value of the `time_range` API parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "short_term",
            TimeRange::MediumTerm => "medium_term",
            TimeRange::LongTerm => "long_term",
        }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "short" | "short_term" => Ok(TimeRange::ShortTerm),
            "medium" | "medium_term" => Ok(TimeRange::MediumTerm),
            "long" | "long_term" => Ok(TimeRange::LongTerm),
            other => Err(format!(
                "Unknown time range '{}' (expected short, medium or long)",
                other
            )),
        }
    }
}

/// A track from the provider's top-tracks ranking, best first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopTrack {
    pub track: TrackItem,
    /// Provider popularity score (0-100)
    pub popularity: u32,
}

/// One page of a cursor-paginated listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Opaque continuation cursor; `None` when exhausted
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Paginated read and batched write access to the remote catalog
#[async_trait]
pub trait CollectionProvider: Send + Sync {
    /// One page of a collection, newest insertion first
    async fn collection_page(
        &self,
        collection_id: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> ProviderResult<Page<CollectionEntry>>;

    /// One page of the artists the user follows
    async fn followed_artists_page(
        &self,
        page_size: u32,
        cursor: Option<&str>,
    ) -> ProviderResult<Page<ArtistRef>>;

    /// Albums and singles published by an artist
    async fn artist_works(&self, artist_id: &str) -> ProviderResult<Vec<Work>>;

    /// Tracks contained in an album or single
    async fn work_tracks(&self, work_id: &str) -> ProviderResult<Vec<TrackItem>>;

    /// Append identities to a collection
    ///
    /// Fails the whole call when `uris.len() > MAX_APPEND_BATCH`.
    async fn append_items(&self, collection_id: &str, uris: &[String]) -> ProviderResult<()>;

    /// Display name of a collection, `None` if it does not exist
    async fn collection_name(&self, collection_id: &str) -> ProviderResult<Option<String>>;

    /// Most recently played tracks, newest first
    async fn recently_played(&self, limit: u32) -> ProviderResult<Vec<PlayEvent>>;

    /// The user's most played tracks over `time_range`, best first
    async fn top_tracks(&self, time_range: TimeRange, limit: u32) -> ProviderResult<Vec<TopTrack>>;
}
