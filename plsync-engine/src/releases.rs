//! Release scanner
//!
//! Walks every followed artist's albums and singles and collects the tracks of
//! works released inside the release window. One artist failing never aborts
//! the scan: its partial results are dropped, it is logged and counted, and the
//! walk moves on. Only failing to list the followed artists ends the scan.

use crate::provider::{ArtistRef, CollectionProvider, ProviderResult, TrackItem, ARTIST_PAGE_SIZE};
use chrono::TimeZone;
use plsync_common::time::{parse_release_date, TimeWindow};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// A track from a recent release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseItem {
    pub track: TrackItem,
    /// Containing album or single
    pub album: String,
    /// Release date as published
    pub release_date: String,
}

impl std::fmt::Display for ReleaseItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}) - {}", self.track, self.album, self.release_date)
    }
}

/// Result of a release scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseScan {
    /// Release tracks, each identity once, in artist order
    pub releases: Vec<ReleaseItem>,
    /// Followed artists found
    pub artists_total: usize,
    /// Artists whose catalog was checked successfully
    pub artists_checked: usize,
    /// Artists skipped because a provider call failed
    pub artists_failed: usize,
    /// Works skipped for a missing or invalid release date
    pub invalid_dates: usize,
}

impl ReleaseScan {
    pub fn identities(&self) -> Vec<String> {
        self.releases.iter().map(|r| r.track.uri.clone()).collect()
    }

    pub fn release(&self, uri: &str) -> Option<&ReleaseItem> {
        self.releases.iter().find(|r| r.track.uri == uri)
    }

    /// Releases keyed by track identity, for repeated lookups
    pub fn by_uri(&self) -> HashMap<&str, &ReleaseItem> {
        self.releases
            .iter()
            .map(|r| (r.track.uri.as_str(), r))
            .collect()
    }
}

/// All followed artists, following the cursor until exhausted
pub async fn followed_artists<P>(provider: &P) -> ProviderResult<Vec<ArtistRef>>
where
    P: CollectionProvider + ?Sized,
{
    let mut artists = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = provider
            .followed_artists_page(ARTIST_PAGE_SIZE, cursor.as_deref())
            .await?;
        artists.extend(page.items);

        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(artists)
}

/// Collect tracks released by followed artists within `window`
pub async fn scan_releases<P, Tz>(provider: &P, window: &TimeWindow<Tz>) -> ProviderResult<ReleaseScan>
where
    P: CollectionProvider + ?Sized,
    Tz: TimeZone,
{
    let artists = followed_artists(provider).await?;
    info!(
        artists = artists.len(),
        window_days = window.days(),
        "Checking followed artists for new releases"
    );

    let mut scan = ReleaseScan {
        artists_total: artists.len(),
        ..ReleaseScan::default()
    };
    let mut seen = HashSet::new();

    for artist in &artists {
        match artist_releases(provider, artist, window, &mut scan.invalid_dates).await {
            Ok(releases) => {
                scan.artists_checked += 1;
                if !releases.is_empty() {
                    info!(
                        artist = %artist.name,
                        releases = releases.len(),
                        "Found new releases"
                    );
                }
                for release in releases {
                    if seen.insert(release.track.uri.clone()) {
                        scan.releases.push(release);
                    }
                }
            }
            Err(e) => {
                scan.artists_failed += 1;
                warn!(
                    artist_id = %artist.id,
                    artist = %artist.name,
                    error = %e,
                    "Failed to check artist, skipping"
                );
            }
        }

        if scan.artists_checked > 0 && scan.artists_checked % 10 == 0 {
            debug!(
                checked = scan.artists_checked,
                total = scan.artists_total,
                "Release scan progress"
            );
        }
    }

    info!(
        releases = scan.releases.len(),
        checked = scan.artists_checked,
        failed = scan.artists_failed,
        "Release scan finished"
    );

    Ok(scan)
}

/// In-window release tracks of one artist
///
/// Any provider failure fails the whole artist.
async fn artist_releases<P, Tz>(
    provider: &P,
    artist: &ArtistRef,
    window: &TimeWindow<Tz>,
    invalid_dates: &mut usize,
) -> ProviderResult<Vec<ReleaseItem>>
where
    P: CollectionProvider + ?Sized,
    Tz: TimeZone,
{
    let mut releases = Vec::new();

    for work in provider.artist_works(&artist.id).await? {
        let Some(raw_date) = work.release_date.as_deref().filter(|d| !d.is_empty()) else {
            *invalid_dates += 1;
            continue;
        };
        let Some(date) = parse_release_date(raw_date) else {
            *invalid_dates += 1;
            continue;
        };
        if !window.contains_date(date) {
            continue;
        }

        for track in provider.work_tracks(&work.id).await? {
            if track.uri.is_empty() {
                continue;
            }
            releases.push(ReleaseItem {
                track,
                album: work.name.clone(),
                release_date: raw_date.to_string(),
            });
        }
    }

    Ok(releases)
}
