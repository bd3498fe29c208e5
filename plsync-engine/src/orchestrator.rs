//! Sync run orchestrator
//!
//! One run walks the phases in order:
//!
//! SCAN_SOURCES → RESOLVE_NOVELTY → SCAN_RELEASES (optional) → DEDUPLICATE →
//! RECONCILE_DESTINATION → PERSIST_HISTORY
//!
//! Settings and "now" are parameters of [`SyncEngine::run`]; nothing is read from
//! ambient state. A failing source or artist only skips that unit. History is
//! saved once, at the end, whatever the destination write achieved: "have we
//! seen it" is tracked independently of "did we deliver it". A run cancelled
//! between phases saves nothing.

use crate::history::{HistoryStore, KnownSet, ARTIST_RELEASES_KEY};
use crate::novelty::{dedupe, resolve};
use crate::provider::{CollectionProvider, TrackItem};
use crate::reconciler::{reconcile, WriteReport};
use crate::releases::{scan_releases, ReleaseItem};
use crate::scanner::{scan_window, WindowScan};
use chrono::{DateTime, TimeZone};
use plsync_common::config::SyncSettings;
use plsync_common::time::TimeWindow;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reasons a run, or one of its feeds, cannot start
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("No destination playlist configured")]
    NoDestination,

    #[error("No source playlists configured")]
    NoSources,
}

/// Run phases, for progress and cancellation reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ScanSources,
    ResolveNovelty,
    ScanReleases,
    Deduplicate,
    ReconcileDestination,
    PersistHistory,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::ScanSources => "SCAN_SOURCES",
            Phase::ResolveNovelty => "RESOLVE_NOVELTY",
            Phase::ScanReleases => "SCAN_RELEASES",
            Phase::Deduplicate => "DEDUPLICATE",
            Phase::ReconcileDestination => "RECONCILE_DESTINATION",
            Phase::PersistHistory => "PERSIST_HISTORY",
        };
        f.write_str(name)
    }
}

/// Which feeds a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    pub sources: bool,
    pub releases: bool,
}

impl RunPlan {
    pub fn playlists_only() -> Self {
        Self {
            sources: true,
            releases: false,
        }
    }

    pub fn releases_only() -> Self {
        Self {
            sources: false,
            releases: true,
        }
    }

    /// Source playlists, plus releases when the settings enable them
    pub fn everything(settings: &SyncSettings) -> Self {
        Self {
            sources: true,
            releases: settings.check_artist_releases,
        }
    }
}

/// What happened to one source playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Scanned {
        /// Tracks inside the window
        window_tracks: usize,
        /// Entries skipped for malformed data
        skipped: usize,
    },
    /// Not found or access denied: likely a misconfigured ID
    Unavailable { cause: String },
    /// Any other provider failure
    Failed { cause: String },
}

/// Per-source section of a [`RunReport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source_id: String,
    pub name: Option<String>,
    pub outcome: SourceOutcome,
    /// Tracks not seen in this source before, newest first
    pub new_tracks: Vec<TrackItem>,
}

/// Release section of a [`RunReport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseReport {
    Scanned {
        artists_checked: usize,
        artists_failed: usize,
        /// Release tracks inside the window
        releases: usize,
        new_releases: Vec<ReleaseItem>,
    },
    Failed {
        cause: String,
    },
}

/// Everything a run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    pub releases: Option<ReleaseReport>,
    /// Candidates before deduplication
    pub candidates: usize,
    /// Candidates dropped as cross-source duplicates
    pub duplicates_removed: usize,
    pub write: Option<WriteReport>,
    pub history_saved: bool,
    pub history_error: Option<String>,
    /// Why the source playlists were not scanned, when the rest of the run went ahead
    pub sources_skipped: Option<SyncError>,
    /// Set when the run was cancelled before this phase
    pub cancelled_before: Option<Phase>,
}

impl RunReport {
    fn empty() -> Self {
        Self {
            sources: Vec::new(),
            releases: None,
            candidates: 0,
            duplicates_removed: 0,
            write: None,
            history_saved: false,
            history_error: None,
            sources_skipped: None,
            cancelled_before: None,
        }
    }

    fn cancelled(mut self, phase: Phase) -> Self {
        info!(phase = %phase, "Run cancelled, history not saved");
        self.cancelled_before = Some(phase);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled_before.is_some()
    }

    /// Total tracks found new across sources and releases
    pub fn new_items(&self) -> usize {
        let from_sources: usize = self.sources.iter().map(|s| s.new_tracks.len()).sum();
        let from_releases = match &self.releases {
            Some(ReleaseReport::Scanned { new_releases, .. }) => new_releases.len(),
            _ => 0,
        };
        from_sources + from_releases
    }
}

/// Runs sync passes against one provider and one history file
pub struct SyncEngine<P> {
    provider: P,
    history: HistoryStore,
}

impl<P: CollectionProvider> SyncEngine<P> {
    pub fn new(provider: P, history: HistoryStore) -> Self {
        Self { provider, history }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Execute one sync run
    ///
    /// Returns `Err` only when the run cannot start: no destination, or no
    /// sources for a plan with nothing else to do. History is then left
    /// untouched. Without sources, a plan that also covers releases runs the
    /// release feed alone and records the skip in the report.
    pub async fn run<Tz: TimeZone>(
        &self,
        settings: &SyncSettings,
        mut plan: RunPlan,
        now: &DateTime<Tz>,
        cancel: &CancellationToken,
    ) -> Result<RunReport, SyncError> {
        let Some(destination) = settings.destination.as_deref() else {
            error!("No destination playlist configured, aborting run");
            return Err(SyncError::NoDestination);
        };

        let mut report = RunReport::empty();
        if plan.sources && settings.sources.is_empty() {
            if !plan.releases {
                error!("No source playlists configured, aborting run");
                return Err(SyncError::NoSources);
            }
            warn!("No source playlists configured, checking releases only");
            plan.sources = false;
            report.sources_skipped = Some(SyncError::NoSources);
        }

        info!(
            sources = if plan.sources { settings.sources.len() } else { 0 },
            releases = plan.releases,
            destination = %destination,
            "Starting sync run"
        );

        let mut known = self.history.load(&settings.sources);
        let mut candidates: Vec<String> = Vec::new();

        if plan.sources {
            if cancel.is_cancelled() {
                return Ok(report.cancelled(Phase::ScanSources));
            }
            let window = TimeWindow::trailing_days(now, settings.track_window_days);
            let scans = self.scan_sources(&settings.sources, &window).await;

            if cancel.is_cancelled() {
                return Ok(report.cancelled(Phase::ResolveNovelty));
            }
            report.sources = resolve_sources(&mut known, scans, &mut candidates);
        }

        if plan.releases {
            if cancel.is_cancelled() {
                return Ok(report.cancelled(Phase::ScanReleases));
            }
            let window = TimeWindow::trailing_days(now, settings.release_window_days);
            report.releases = Some(self.scan_release_feed(&mut known, &window, &mut candidates).await);
        }

        if cancel.is_cancelled() {
            return Ok(report.cancelled(Phase::Deduplicate));
        }
        let unique = dedupe(&candidates);
        report.candidates = candidates.len();
        report.duplicates_removed = candidates.len() - unique.len();
        if report.duplicates_removed > 0 {
            info!(
                duplicates = report.duplicates_removed,
                "Removed tracks found in more than one source"
            );
        }

        if cancel.is_cancelled() {
            return Ok(report.cancelled(Phase::ReconcileDestination));
        }
        report.write = Some(reconcile(&self.provider, &unique, destination).await);

        match self.history.save(&known) {
            Ok(()) => report.history_saved = true,
            Err(e) => {
                error!(
                    path = %self.history.path().display(),
                    error = %e,
                    "Failed to save history; the next run will rediscover these tracks"
                );
                report.history_error = Some(e.to_string());
            }
        }

        info!(
            new_items = report.new_items(),
            written = report.write.as_ref().map(|w| w.written).unwrap_or(0),
            history_saved = report.history_saved,
            "Sync run finished"
        );

        Ok(report)
    }

    /// SCAN_SOURCES: each source independently, failures contained
    async fn scan_sources<Tz: TimeZone>(
        &self,
        sources: &[String],
        window: &TimeWindow<Tz>,
    ) -> Vec<SourceScan> {
        let mut scans = Vec::with_capacity(sources.len());

        for (index, source_id) in sources.iter().enumerate() {
            let name = match self.provider.collection_name(source_id).await {
                Ok(name) => name,
                Err(e) => {
                    debug!(source_id = %source_id, error = %e, "Playlist name unavailable");
                    None
                }
            };

            info!(
                source = index + 1,
                of = sources.len(),
                source_id = %source_id,
                name = name.as_deref().unwrap_or("unknown"),
                window_days = window.days(),
                "Scanning source playlist"
            );

            let result = scan_window(&self.provider, source_id, window).await;
            if let Err(e) = &result {
                if e.is_unavailable() {
                    warn!(source_id = %source_id, error = %e, "Source playlist unavailable, check the ID and permissions");
                } else {
                    warn!(source_id = %source_id, error = %e, "Failed to scan source playlist, skipping");
                }
            }

            scans.push(SourceScan {
                source_id: source_id.clone(),
                name,
                result,
            });
        }

        scans
    }

    /// SCAN_RELEASES plus novelty under the synthetic release key
    async fn scan_release_feed<Tz: TimeZone>(
        &self,
        known: &mut KnownSet,
        window: &TimeWindow<Tz>,
        candidates: &mut Vec<String>,
    ) -> ReleaseReport {
        let scan = match scan_releases(&self.provider, window).await {
            Ok(scan) => scan,
            Err(e) => {
                warn!(error = %e, "Could not list followed artists, skipping releases");
                return ReleaseReport::Failed {
                    cause: e.to_string(),
                };
            }
        };

        let resolution = resolve(&scan.identities(), known.get(ARTIST_RELEASES_KEY));
        if resolution.changed {
            known.replace(ARTIST_RELEASES_KEY, resolution.updated_known);
        }

        let by_uri = scan.by_uri();
        let new_releases: Vec<ReleaseItem> = resolution
            .new_items
            .iter()
            .filter_map(|uri| by_uri.get(uri.as_str()).map(|r| (*r).clone()))
            .collect();
        for release in &new_releases {
            debug!(release = %release, "New release");
        }
        info!(new_releases = new_releases.len(), "Release novelty resolved");
        candidates.extend(resolution.new_items);

        ReleaseReport::Scanned {
            artists_checked: scan.artists_checked,
            artists_failed: scan.artists_failed,
            releases: scan.releases.len(),
            new_releases,
        }
    }
}

/// Raw result of scanning one source
struct SourceScan {
    source_id: String,
    name: Option<String>,
    result: crate::provider::ProviderResult<WindowScan>,
}

/// RESOLVE_NOVELTY: update known sets and collect candidates in source order
fn resolve_sources(
    known: &mut KnownSet,
    scans: Vec<SourceScan>,
    candidates: &mut Vec<String>,
) -> Vec<SourceReport> {
    scans
        .into_iter()
        .map(|scan| {
            let window = match scan.result {
                Ok(window) => window,
                Err(e) => {
                    let cause = e.to_string();
                    let outcome = if e.is_unavailable() {
                        SourceOutcome::Unavailable { cause }
                    } else {
                        SourceOutcome::Failed { cause }
                    };
                    return SourceReport {
                        source_id: scan.source_id,
                        name: scan.name,
                        outcome,
                        new_tracks: Vec::new(),
                    };
                }
            };

            let resolution = resolve(&window.identities(), known.get(&scan.source_id));
            if resolution.changed {
                known.replace(&scan.source_id, resolution.updated_known);
            }

            let by_uri = window.by_uri();
            let new_tracks: Vec<TrackItem> = resolution
                .new_items
                .iter()
                .filter_map(|uri| by_uri.get(uri.as_str()).map(|t| (*t).clone()))
                .collect();
            info!(
                source_id = %scan.source_id,
                window_tracks = window.tracks.len(),
                new = new_tracks.len(),
                "Resolved source novelty"
            );
            candidates.extend(resolution.new_items);

            SourceReport {
                source_id: scan.source_id,
                name: scan.name,
                outcome: SourceOutcome::Scanned {
                    window_tracks: window.tracks.len(),
                    skipped: window.skipped,
                },
                new_tracks,
            }
        })
        .collect()
}
