//! Novelty resolution and cross-source deduplication
//!
//! Both functions are pure; the orchestrator decides what to persist.

use std::collections::{BTreeSet, HashSet};

/// Outcome of comparing a scanned window with the known set for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Scanned identities not yet known, in scan order
    pub new_items: Vec<String>,
    /// Known set to persist for the key
    pub updated_known: BTreeSet<String>,
    /// False when the stored known set should be left untouched
    pub changed: bool,
}

/// Split a scanned window into new items and the next known set
///
/// - something new: known set becomes `known ∪ scanned`
/// - nothing new, key never seen: known set is bootstrapped to `scanned`
/// - nothing new, key known: unchanged (a window-limited view never replaces
///   broader history)
///
/// The known set never shrinks.
pub fn resolve(scanned: &[String], known: Option<&BTreeSet<String>>) -> Resolution {
    let empty = BTreeSet::new();
    let previous = known.unwrap_or(&empty);

    let mut seen = HashSet::new();
    let new_items: Vec<String> = scanned
        .iter()
        .filter(|id| !previous.contains(*id) && seen.insert(id.as_str()))
        .cloned()
        .collect();

    if !new_items.is_empty() {
        let mut updated_known = previous.clone();
        updated_known.extend(scanned.iter().cloned());
        return Resolution {
            new_items,
            updated_known,
            changed: true,
        };
    }

    match known {
        Some(known) => Resolution {
            new_items,
            updated_known: known.clone(),
            changed: false,
        },
        None => Resolution {
            new_items,
            updated_known: scanned.iter().cloned().collect(),
            changed: true,
        },
    }
}

/// Drop repeated identities, keeping the first occurrence and the input order
pub fn dedupe(candidates: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(candidates.len());
    candidates
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}
