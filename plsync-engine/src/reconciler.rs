//! Destination reconciler
//!
//! Before writing, the destination playlist is read in full and everything it
//! already holds is dropped from the candidates. This check is independent of
//! the history store, so a crash after writing but before saving history, or a
//! manual edit of the destination, never produces duplicates.
//!
//! Writes go out sequentially in chunks of at most [`MAX_APPEND_BATCH`]. The
//! first failing chunk stops the writes for this run; the outcome is always a
//! [`WriteReport`], never an error.

use crate::provider::{CollectionProvider, ProviderError, MAX_APPEND_BATCH};
use crate::scanner::scan_all;
use std::collections::HashSet;
use tracing::{info, warn};

/// How far delivery got
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStatus {
    /// No candidate was missing from the destination
    NothingToWrite,
    /// Every missing candidate was written
    Delivered,
    /// A chunk failed; `written` says how much got through before it
    Partial { cause: String },
    /// The destination could not be read, so nothing was written
    NotAttempted {
        cause: String,
        /// Not found or access denied rather than a transient failure
        unavailable: bool,
    },
}

/// Outcome of one reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    /// Candidates received
    pub candidates: usize,
    /// Candidates already in the destination
    pub already_present: usize,
    /// Identities written
    pub written: usize,
    /// Identities still to deliver, in order
    pub pending: Vec<String>,
    /// Chunks written successfully
    pub batches_written: usize,
    pub status: WriteStatus,
}

impl WriteReport {
    fn not_attempted(candidates: &[String], error: &ProviderError) -> Self {
        Self {
            candidates: candidates.len(),
            already_present: 0,
            written: 0,
            pending: candidates.to_vec(),
            batches_written: 0,
            status: WriteStatus::NotAttempted {
                cause: error.to_string(),
                unavailable: error.is_unavailable(),
            },
        }
    }

    /// True when nothing is left pending
    pub fn is_complete(&self) -> bool {
        matches!(
            self.status,
            WriteStatus::NothingToWrite | WriteStatus::Delivered
        )
    }
}

/// Candidates not present in `existing`, order preserved
pub fn missing_from(candidates: &[String], existing: &HashSet<String>) -> Vec<String> {
    candidates
        .iter()
        .filter(|id| !existing.contains(*id))
        .cloned()
        .collect()
}

/// Add the candidates missing from `destination` to it
pub async fn reconcile<P>(provider: &P, candidates: &[String], destination: &str) -> WriteReport
where
    P: CollectionProvider + ?Sized,
{
    if candidates.is_empty() {
        return WriteReport {
            candidates: 0,
            already_present: 0,
            written: 0,
            pending: Vec::new(),
            batches_written: 0,
            status: WriteStatus::NothingToWrite,
        };
    }

    let existing = match scan_all(provider, destination).await {
        Ok(existing) => existing,
        Err(e) => {
            warn!(
                destination = %destination,
                error = %e,
                "Could not read destination playlist, skipping writes"
            );
            return WriteReport::not_attempted(candidates, &e);
        }
    };

    let to_write = missing_from(candidates, &existing);
    let already_present = candidates.len() - to_write.len();
    info!(
        destination = %destination,
        destination_size = existing.len(),
        candidates = candidates.len(),
        already_present,
        to_write = to_write.len(),
        "Checked candidates against destination"
    );

    let mut report = WriteReport {
        candidates: candidates.len(),
        already_present,
        written: 0,
        pending: Vec::new(),
        batches_written: 0,
        status: WriteStatus::NothingToWrite,
    };
    if to_write.is_empty() {
        return report;
    }

    let batch_total = to_write.len().div_ceil(MAX_APPEND_BATCH);
    for (index, batch) in to_write.chunks(MAX_APPEND_BATCH).enumerate() {
        let start = index * MAX_APPEND_BATCH;
        if let Err(e) = provider.append_items(destination, batch).await {
            warn!(
                destination = %destination,
                batch = index + 1,
                batch_total,
                written = report.written,
                error = %e,
                "Batch write failed, stopping writes for this run"
            );
            report.pending = to_write[start..].to_vec();
            report.status = WriteStatus::Partial {
                cause: e.to_string(),
            };
            return report;
        }

        report.written += batch.len();
        report.batches_written += 1;
        info!(
            destination = %destination,
            batch = index + 1,
            batch_total,
            range_start = start + 1,
            range_end = start + batch.len(),
            of = to_write.len(),
            "Batch written"
        );
    }

    report.status = WriteStatus::Delivered;
    report
}
