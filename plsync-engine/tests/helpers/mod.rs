//! Test Helper Utilities
//!
//! In-memory provider for exercising the sync engine without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plsync_engine::provider::{
    ArtistRef, CollectionEntry, CollectionProvider, Page, PlayEvent, ProviderError,
    ProviderResult, TimeRange, TopTrack, TrackItem, Work, MAX_APPEND_BATCH,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Fixed "now" used across the engine tests
pub const NOW: &str = "2024-06-15T12:00:00Z";

pub fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(NOW).unwrap().with_timezone(&Utc)
}

pub fn ids(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn track(uri: &str) -> TrackItem {
    TrackItem {
        uri: uri.to_string(),
        name: format!("Track {}", uri),
        artists: vec!["Artist".to_string()],
    }
}

/// Collection row added at `added_at`
pub fn entry(uri: &str, added_at: &str) -> CollectionEntry {
    CollectionEntry {
        track: Some(track(uri)),
        added_at: Some(added_at.to_string()),
    }
}

/// Collection row without an insertion timestamp
pub fn undated(uri: &str) -> CollectionEntry {
    CollectionEntry {
        track: Some(track(uri)),
        added_at: None,
    }
}

pub fn work(id: &str, release_date: Option<&str>) -> Work {
    Work {
        id: id.to_string(),
        name: format!("Album {}", id),
        release_date: release_date.map(str::to_string),
    }
}

#[derive(Default)]
struct MockState {
    /// Collection rows, newest first
    collections: HashMap<String, Vec<CollectionEntry>>,
    names: HashMap<String, String>,
    failing_collections: HashMap<String, ProviderError>,
    artists: Vec<ArtistRef>,
    works: HashMap<String, Vec<Work>>,
    work_tracks: HashMap<String, Vec<TrackItem>>,
    failing_artists: HashSet<String>,
    artist_listing_error: Option<ProviderError>,
    /// 0-based append call index that fails
    failing_append: Option<usize>,
    append_calls: usize,
    appends: Vec<(String, Vec<String>)>,
    page_requests: Vec<(String, Option<String>)>,
    work_requests: Vec<String>,
    plays: Vec<PlayEvent>,
    plays_error: Option<ProviderError>,
    top_tracks: Vec<TopTrack>,
    top_tracks_error: Option<ProviderError>,
    top_requests: Vec<(TimeRange, u32)>,
    /// Play-related calls in order ("recently_played" / "top_tracks")
    play_calls: Vec<&'static str>,
}

/// In-memory [`CollectionProvider`]
///
/// Cursors are row offsets. Appended identities land at the newest end of the
/// destination, like a real playlist append.
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_collection(&self, id: &str, rows: Vec<CollectionEntry>) {
        self.state
            .lock()
            .unwrap()
            .collections
            .insert(id.to_string(), rows);
    }

    pub fn set_name(&self, id: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .names
            .insert(id.to_string(), name.to_string());
    }

    pub fn fail_collection(&self, id: &str, error: ProviderError) {
        self.state
            .lock()
            .unwrap()
            .failing_collections
            .insert(id.to_string(), error);
    }

    pub fn heal_collection(&self, id: &str) {
        self.state.lock().unwrap().failing_collections.remove(id);
    }

    /// Follow an artist with the given works and their tracks
    pub fn add_artist(&self, id: &str, works: Vec<(Work, Vec<&str>)>) {
        let mut state = self.state.lock().unwrap();
        state.artists.push(ArtistRef {
            id: id.to_string(),
            name: format!("Artist {}", id),
        });
        let mut artist_works = Vec::new();
        for (work, uris) in works {
            state
                .work_tracks
                .insert(work.id.clone(), uris.into_iter().map(track).collect());
            artist_works.push(work);
        }
        state.works.insert(id.to_string(), artist_works);
    }

    pub fn fail_artist(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_artists
            .insert(id.to_string());
    }

    pub fn fail_artist_listing(&self, error: ProviderError) {
        self.state.lock().unwrap().artist_listing_error = Some(error);
    }

    pub fn fail_append_call(&self, index: usize) {
        self.state.lock().unwrap().failing_append = Some(index);
    }

    pub fn set_plays(&self, plays: Vec<PlayEvent>) {
        self.state.lock().unwrap().plays = plays;
    }

    pub fn fail_plays(&self, error: ProviderError) {
        self.state.lock().unwrap().plays_error = Some(error);
    }

    /// Ranking served for every time range, best first
    pub fn set_top_tracks(&self, tracks: Vec<(&str, u32)>) {
        self.state.lock().unwrap().top_tracks = tracks
            .into_iter()
            .map(|(uri, popularity)| TopTrack {
                track: track(uri),
                popularity,
            })
            .collect();
    }

    pub fn fail_top_tracks(&self, error: ProviderError) {
        self.state.lock().unwrap().top_tracks_error = Some(error);
    }

    /// Top-tracks requests as (time range, limit)
    pub fn top_requests(&self) -> Vec<(TimeRange, u32)> {
        self.state.lock().unwrap().top_requests.clone()
    }

    pub fn play_calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().play_calls.clone()
    }

    /// Successful append calls as (collection, identities)
    pub fn appends(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().appends.clone()
    }

    /// Every identity appended, in write order
    pub fn appended(&self) -> Vec<String> {
        self.appends()
            .into_iter()
            .flat_map(|(_, uris)| uris)
            .collect()
    }

    /// Cursors requested for one collection
    pub fn page_requests(&self, id: &str) -> Vec<Option<String>> {
        self.state
            .lock()
            .unwrap()
            .page_requests
            .iter()
            .filter(|(collection, _)| collection == id)
            .map(|(_, cursor)| cursor.clone())
            .collect()
    }

    pub fn work_requests(&self) -> Vec<String> {
        self.state.lock().unwrap().work_requests.clone()
    }

    /// Identities currently in a collection, newest first
    pub fn contents(&self, id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(id)
            .map(|rows| {
                rows.iter()
                    .filter_map(|r| r.track.as_ref().map(|t| t.uri.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl CollectionProvider for MockProvider {
    async fn collection_page(
        &self,
        collection_id: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> ProviderResult<Page<CollectionEntry>> {
        let mut state = self.state.lock().unwrap();
        state
            .page_requests
            .push((collection_id.to_string(), cursor.map(str::to_string)));

        if let Some(error) = state.failing_collections.get(collection_id) {
            return Err(error.clone());
        }
        let rows = state
            .collections
            .get(collection_id)
            .ok_or_else(|| ProviderError::NotFound(format!("playlist {}", collection_id)))?;

        let start = match cursor {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| ProviderError::Parse(raw.to_string()))?,
            None => 0,
        };
        let end = (start + page_size as usize).min(rows.len());
        let items = rows.get(start..end).unwrap_or_default().to_vec();
        let next = (end < rows.len()).then(|| end.to_string());

        Ok(Page { items, next })
    }

    async fn followed_artists_page(
        &self,
        page_size: u32,
        cursor: Option<&str>,
    ) -> ProviderResult<Page<ArtistRef>> {
        let state = self.state.lock().unwrap();
        if let Some(error) = &state.artist_listing_error {
            return Err(error.clone());
        }

        let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + page_size as usize).min(state.artists.len());
        Ok(Page {
            items: state.artists[start..end].to_vec(),
            next: (end < state.artists.len()).then(|| end.to_string()),
        })
    }

    async fn artist_works(&self, artist_id: &str) -> ProviderResult<Vec<Work>> {
        let state = self.state.lock().unwrap();
        if state.failing_artists.contains(artist_id) {
            return Err(ProviderError::Api(500, format!("artist {}", artist_id)));
        }
        Ok(state.works.get(artist_id).cloned().unwrap_or_default())
    }

    async fn work_tracks(&self, work_id: &str) -> ProviderResult<Vec<TrackItem>> {
        let mut state = self.state.lock().unwrap();
        state.work_requests.push(work_id.to_string());
        Ok(state.work_tracks.get(work_id).cloned().unwrap_or_default())
    }

    async fn append_items(&self, collection_id: &str, uris: &[String]) -> ProviderResult<()> {
        if uris.len() > MAX_APPEND_BATCH {
            return Err(ProviderError::BatchTooLarge(uris.len()));
        }

        let mut state = self.state.lock().unwrap();
        let call = state.append_calls;
        state.append_calls += 1;
        if state.failing_append == Some(call) {
            return Err(ProviderError::Network("connection reset".to_string()));
        }

        let rows = state
            .collections
            .entry(collection_id.to_string())
            .or_default();
        for uri in uris {
            rows.insert(
                0,
                CollectionEntry {
                    track: Some(track(uri)),
                    added_at: Some(NOW.to_string()),
                },
            );
        }
        state
            .appends
            .push((collection_id.to_string(), uris.to_vec()));
        Ok(())
    }

    async fn collection_name(&self, collection_id: &str) -> ProviderResult<Option<String>> {
        Ok(self.state.lock().unwrap().names.get(collection_id).cloned())
    }

    async fn recently_played(&self, limit: u32) -> ProviderResult<Vec<PlayEvent>> {
        let mut state = self.state.lock().unwrap();
        state.play_calls.push("recently_played");
        if let Some(error) = &state.plays_error {
            return Err(error.clone());
        }
        Ok(state.plays.iter().take(limit as usize).cloned().collect())
    }

    async fn top_tracks(&self, time_range: TimeRange, limit: u32) -> ProviderResult<Vec<TopTrack>> {
        let mut state = self.state.lock().unwrap();
        state.play_calls.push("top_tracks");
        state.top_requests.push((time_range, limit));
        if let Some(error) = &state.top_tracks_error {
            return Err(error.clone());
        }
        Ok(state.top_tracks.iter().take(limit as usize).cloned().collect())
    }
}
