//! Local play-count tracking
//!
//! The provider only exposes the last 50 plays, so counts are accumulated in
//! `play_counts.json` each time they are refreshed. This file is independent of
//! the sync history; nothing in a sync run reads it.

use crate::provider::{CollectionProvider, PlayEvent, ProviderResult, TimeRange, TrackItem};
use chrono::{DateTime, FixedOffset};
use plsync_common::config::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

/// Plays fetched per refresh (provider maximum)
pub const RECENTLY_PLAYED_LIMIT: u32 = 50;

/// Largest top-tracks ranking the provider returns in one request
pub const TOP_TRACKS_LIMIT: u32 = 50;

#[derive(Debug, Error)]
pub enum PlayCountError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid play count document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to write play counts: {0}")]
    Write(#[from] plsync_common::Error),
}

/// Accumulated plays of one track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayRecord {
    pub name: String,
    pub artists: String,
    pub play_count: u64,
    pub first_played: String,
    pub last_played: String,
}

/// Play records keyed by track identity
pub type PlayCounts = BTreeMap<String, PlayRecord>;

/// JSON-file backed play counts
#[derive(Debug, Clone)]
pub struct PlayCountStore {
    path: PathBuf,
}

impl PlayCountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Fail-open load: missing or broken files yield no records
    pub fn load(&self) -> PlayCounts {
        if !self.path.exists() {
            return PlayCounts::new();
        }
        let loaded = std::fs::read_to_string(&self.path)
            .map_err(PlayCountError::from)
            .and_then(|content| serde_json::from_str(&content).map_err(PlayCountError::from));
        match loaded {
            Ok(counts) => counts,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to load play counts");
                PlayCounts::new()
            }
        }
    }

    pub fn save(&self, counts: &PlayCounts) -> Result<(), PlayCountError> {
        let bytes = serde_json::to_vec_pretty(counts)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}

fn parse_instant(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw).ok()
}

/// Fold play events into `counts`
///
/// A play is counted once: events not later than the track's recorded
/// `last_played` were seen by an earlier refresh. Events without a timestamp
/// are stamped with `fallback_time`. Returns the number of plays counted.
pub fn record_plays(counts: &mut PlayCounts, events: &[PlayEvent], fallback_time: &str) -> usize {
    let mut counted = 0;

    // Oldest first, so last_played ends on the newest play
    for event in events.iter().rev() {
        if event.track.uri.is_empty() {
            continue;
        }
        let played_at = event.played_at.as_deref().unwrap_or(fallback_time);

        let record = counts
            .entry(event.track.uri.clone())
            .or_insert_with(|| PlayRecord {
                name: event.track.name.clone(),
                artists: event.track.artist_display(),
                play_count: 0,
                first_played: played_at.to_string(),
                last_played: played_at.to_string(),
            });

        if record.play_count > 0 {
            if let (Some(previous), Some(current)) =
                (parse_instant(&record.last_played), parse_instant(played_at))
            {
                if current <= previous {
                    continue;
                }
            }
        }

        record.play_count += 1;
        record.last_played = played_at.to_string();
        counted += 1;
    }

    counted
}

/// Refresh stored counts from the provider's recently played list
///
/// A provider failure leaves the stored counts untouched.
pub async fn update_play_counts<P>(
    provider: &P,
    store: &PlayCountStore,
    now: &str,
) -> PlayCounts
where
    P: CollectionProvider + ?Sized,
{
    let mut counts = store.load();

    let events = match provider.recently_played(RECENTLY_PLAYED_LIMIT).await {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "Could not fetch recently played tracks");
            return counts;
        }
    };

    let counted = record_plays(&mut counts, &events, now);
    info!(fetched = events.len(), counted, "Updated play counts");

    if let Err(e) = store.save(&counts) {
        warn!(error = %e, "Failed to save play counts");
    }
    counts
}

/// Most played tracks, ties broken by name
pub fn top_played(counts: &PlayCounts, limit: usize) -> Vec<(&str, &PlayRecord)> {
    let mut ranked: Vec<(&str, &PlayRecord)> =
        counts.iter().map(|(uri, r)| (uri.as_str(), r)).collect();
    ranked.sort_by(|a, b| {
        b.1.play_count
            .cmp(&a.1.play_count)
            .then_with(|| a.1.name.cmp(&b.1.name))
    });
    ranked.truncate(limit);
    ranked
}

/// A provider top track joined with its local play count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopTrackCount {
    /// 1-based position in the provider ranking
    pub rank: usize,
    pub track: TrackItem,
    /// Local count; 0 for tracks never seen in recently played
    pub play_count: u64,
    pub popularity: u32,
}

/// Provider top tracks for `time_range`, each with its local play count
///
/// Counts are refreshed from recently played first. A refresh failure is
/// logged and the stored counts are used; a top-tracks failure is returned.
pub async fn top_tracks_with_counts<P>(
    provider: &P,
    store: &PlayCountStore,
    time_range: TimeRange,
    limit: u32,
    now: &str,
) -> ProviderResult<Vec<TopTrackCount>>
where
    P: CollectionProvider + ?Sized,
{
    let counts = update_play_counts(provider, store, now).await;

    let top = provider
        .top_tracks(time_range, limit.min(TOP_TRACKS_LIMIT))
        .await?;
    info!(time_range = %time_range, fetched = top.len(), "Fetched top tracks");

    Ok(top
        .into_iter()
        .take(limit as usize)
        .enumerate()
        .map(|(index, top)| TopTrackCount {
            rank: index + 1,
            play_count: counts
                .get(&top.track.uri)
                .map(|r| r.play_count)
                .unwrap_or(0),
            track: top.track,
            popularity: top.popularity,
        })
        .collect())
}
