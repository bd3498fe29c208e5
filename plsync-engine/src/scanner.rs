//! Window scanner
//!
//! Reads only the recent end of a playlist. Pages arrive newest-insertion-first,
//! so the first entry inserted before the window cutoff ends the scan: no later
//! entry on that page and no further page is requested.
//!
//! Entries without an identity, or with an unparseable insertion timestamp, are
//! skipped one by one. Entries with no timestamp at all are kept (see DESIGN.md:
//! this may admit stale tracks, and is preserved deliberately).

use crate::provider::{CollectionProvider, ProviderResult, TrackItem, COLLECTION_PAGE_SIZE};
use chrono::TimeZone;
use plsync_common::time::{TimeWindow, WindowPosition};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Result of scanning one playlist's recent window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowScan {
    /// In-window tracks, newest first, each identity once
    pub tracks: Vec<TrackItem>,
    /// Entries dropped for a missing identity or unparseable timestamp
    pub skipped: usize,
    /// Entries kept despite having no insertion timestamp
    pub undated: usize,
    /// Pages requested
    pub pages: usize,
    /// True if the scan ended on an entry older than the cutoff
    pub reached_cutoff: bool,
}

impl WindowScan {
    /// Scanned identities in scan order
    pub fn identities(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.uri.clone()).collect()
    }

    pub fn track(&self, uri: &str) -> Option<&TrackItem> {
        self.tracks.iter().find(|t| t.uri == uri)
    }

    /// Tracks keyed by identity, for repeated lookups
    pub fn by_uri(&self) -> HashMap<&str, &TrackItem> {
        self.tracks.iter().map(|t| (t.uri.as_str(), t)).collect()
    }
}

/// Scan the tracks inserted into `collection_id` within `window`
pub async fn scan_window<P, Tz>(
    provider: &P,
    collection_id: &str,
    window: &TimeWindow<Tz>,
) -> ProviderResult<WindowScan>
where
    P: CollectionProvider + ?Sized,
    Tz: TimeZone,
{
    let mut scan = WindowScan::default();
    let mut seen = HashSet::new();
    let mut cursor: Option<String> = None;

    'pages: loop {
        let page = provider
            .collection_page(collection_id, COLLECTION_PAGE_SIZE, cursor.as_deref())
            .await?;
        scan.pages += 1;

        for entry in page.items {
            let Some(track) = entry.track.filter(|t| !t.uri.is_empty()) else {
                scan.skipped += 1;
                continue;
            };

            match window.position(entry.added_at.as_deref()) {
                WindowPosition::Inside => {}
                WindowPosition::Undated => scan.undated += 1,
                WindowPosition::Unparseable => {
                    scan.skipped += 1;
                    continue;
                }
                WindowPosition::Before => {
                    scan.reached_cutoff = true;
                    break 'pages;
                }
            }

            if seen.insert(track.uri.clone()) {
                scan.tracks.push(track);
            }
        }

        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    debug!(
        collection_id = %collection_id,
        tracks = scan.tracks.len(),
        skipped = scan.skipped,
        undated = scan.undated,
        pages = scan.pages,
        reached_cutoff = scan.reached_cutoff,
        "Window scan finished"
    );

    Ok(scan)
}

/// Every identity currently in `collection_id`, following all pages
pub async fn scan_all<P>(provider: &P, collection_id: &str) -> ProviderResult<HashSet<String>>
where
    P: CollectionProvider + ?Sized,
{
    let mut identities = HashSet::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = provider
            .collection_page(collection_id, COLLECTION_PAGE_SIZE, cursor.as_deref())
            .await?;

        identities.extend(
            page.items
                .into_iter()
                .filter_map(|entry| entry.track)
                .map(|track| track.uri)
                .filter(|uri| !uri.is_empty()),
        );

        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(identities)
}
