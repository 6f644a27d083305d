//! # Match Reporter
//!
//! Counts, per flashlist type, how many rows resolved to an entity, how many
//! did not, and how many resolved but could not be applied. Entries of
//! id-list columns are counted apart from the rows that carry them.
//! Totals accumulate for the lifetime of the reporter, which is the lifetime of
//! the aggregator that owns it.
//!
//! The reporter is shared as an `Arc<MatchReporter>`. Its counters sit behind
//! a mutex so health tooling can take a snapshot while a cycle is running.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::flashlist::FlashlistType;

/// Running totals for one flashlist type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingStats {
    /// Rows seen: matched plus missing.
    pub total: u64,
    /// Rows that resolved to no entity on any route.
    pub missing: u64,
    /// Matched entities whose update was rejected as malformed.
    pub failed: u64,
    /// Ids listed in id-list columns. Not part of `total`.
    pub list_entries: u64,
    /// Listed ids that are not in the topology.
    pub missing_list_entries: u64,
}

impl MappingStats {
    /// Rows that resolved to an entity.
    pub fn matched(&self) -> u64 {
        self.total - self.missing
    }
}

/// Shared match accounting.
#[derive(Debug, Default)]
pub struct MatchReporter {
    stats: Mutex<BTreeMap<FlashlistType, MappingStats>>,
}

impl MatchReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Record Outcome
    ///
    /// Adds one dispatched flashlist's row counts to the running totals of
    /// `flashlist_type`.
    pub fn record_outcome(&self, flashlist_type: FlashlistType, matched: usize, unmatched: usize) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = stats.entry(flashlist_type).or_default();
        entry.total += (matched + unmatched) as u64;
        entry.missing += unmatched as u64;
    }

    /// Counts the entries of id-list columns. They never touch the row totals.
    pub fn record_list_entries(&self, flashlist_type: FlashlistType, matched: usize, unmatched: usize) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = stats.entry(flashlist_type).or_default();
        entry.list_entries += (matched + unmatched) as u64;
        entry.missing_list_entries += unmatched as u64;
    }

    /// # Record Failures
    ///
    /// Counts matched entities whose update returned an error.
    pub fn record_failures(&self, flashlist_type: FlashlistType, failed: usize) {
        if failed == 0 {
            return;
        }
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.entry(flashlist_type).or_default().failed += failed as u64;
    }

    /// Totals for one type; zero when the type was never recorded.
    pub fn stats(&self, flashlist_type: FlashlistType) -> MappingStats {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.get(&flashlist_type).copied().unwrap_or_default()
    }

    /// A copy of every recorded type's totals.
    pub fn snapshot(&self) -> BTreeMap<FlashlistType, MappingStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// # Log Summary
    ///
    /// Writes one line per type. Types with missing or failed units are logged
    /// at warn level, the rest at debug.
    pub fn log_summary(&self) {
        for (flashlist_type, stats) in self.snapshot() {
            if stats.missing > 0 || stats.failed > 0 {
                log::warn!(
                    "{}: {} of {} unmatched, {} failed",
                    flashlist_type,
                    stats.missing,
                    stats.total,
                    stats.failed
                );
            } else {
                log::debug!("{}: all {} matched", flashlist_type, stats.total);
            }
            if stats.missing_list_entries > 0 {
                log::warn!(
                    "{}: {} of {} listed ids not in the topology",
                    flashlist_type,
                    stats.missing_list_entries,
                    stats.list_entries
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn totals_accumulate_per_type() {
        let reporter = MatchReporter::new();
        reporter.record_outcome(FlashlistType::Ru, 3, 1);
        reporter.record_outcome(FlashlistType::Ru, 2, 0);
        reporter.record_failures(FlashlistType::Ru, 1);
        reporter.record_outcome(FlashlistType::Bu, 0, 2);

        let ru = reporter.stats(FlashlistType::Ru);
        assert_eq!(ru, MappingStats { total: 6, missing: 1, failed: 1, ..MappingStats::default() });
        assert_eq!(ru.matched(), 5);
        assert_eq!(reporter.stats(FlashlistType::Evm), MappingStats::default());
        assert_eq!(reporter.snapshot().len(), 2);
    }

    #[test]
    fn list_entries_stay_out_of_the_row_totals() {
        let reporter = MatchReporter::new();
        reporter.record_outcome(FlashlistType::Ru, 1, 0);
        reporter.record_list_entries(FlashlistType::Ru, 2, 1);

        let ru = reporter.stats(FlashlistType::Ru);
        assert_eq!((ru.total, ru.missing), (1, 0));
        assert_eq!((ru.list_entries, ru.missing_list_entries), (3, 1));
    }

    #[test]
    fn readable_from_other_threads() {
        let reporter = Arc::new(MatchReporter::new());
        let writer = Arc::clone(&reporter);
        std::thread::spawn(move || writer.record_outcome(FlashlistType::FmmInput, 4, 0))
            .join()
            .unwrap();
        assert_eq!(reporter.stats(FlashlistType::FmmInput).total, 4);
    }
}
