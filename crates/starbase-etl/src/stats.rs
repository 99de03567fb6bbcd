use serde::Serialize;
use std::fmt;

use starbase_core::reconcile::{LinkOutcome, PairOutcome, UpsertOutcome};

use crate::error::IngestError;

/// Per-pass counters, reported once at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub linked: usize,
    pub unchanged: usize,
    pub not_found: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunStats {
    pub fn upserted(&mut self, outcome: &UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated(_) => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    /// Count a fill-if-null merge by the columns it changed.
    pub fn filled(&mut self, changed: &[String]) {
        if changed.is_empty() {
            self.unchanged += 1;
        } else {
            self.updated += 1;
        }
    }

    pub fn cast(&mut self, outcome: LinkOutcome) {
        match outcome {
            LinkOutcome::Inserted => self.linked += 1,
            LinkOutcome::Updated | LinkOutcome::ClaimedBlank => self.updated += 1,
            LinkOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn paired(&mut self, outcome: PairOutcome) {
        match outcome {
            PairOutcome::Inserted => self.linked += 1,
            PairOutcome::AlreadyPresent => self.unchanged += 1,
        }
    }

    /// Count an error caught at the per-record boundary.
    pub fn errored(&mut self, err: &IngestError) {
        if err.is_not_found() {
            self.not_found += 1;
        } else if matches!(
            err,
            IngestError::Database(starbase_core::Error::Integrity { .. })
        ) {
            self.skipped += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn absorb(&mut self, other: &Self) {
        self.processed += other.processed;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.linked += other.linked;
        self.unchanged += other.unchanged;
        self.not_found += other.not_found;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed: {} inserted, {} updated, {} linked, {} unchanged, \
             {} not found, {} skipped, {} failed",
            self.processed,
            self.inserted,
            self.updated,
            self.linked,
            self.unchanged,
            self.not_found,
            self.skipped,
            self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_buckets() {
        let mut stats = RunStats::default();
        stats.errored(&IngestError::Timeout {
            url: "http://stapi.co".to_string(),
        });
        stats.errored(&IngestError::NotFound {
            entity: "performer".to_string(),
            key: "Q".to_string(),
        });
        stats.errored(&IngestError::Database(starbase_core::Error::Integrity {
            context: "Character_Ships".to_string(),
            message: "FOREIGN KEY constraint failed".to_string(),
        }));
        assert_eq!((stats.failed, stats.not_found, stats.skipped), (1, 1, 1));
    }

    #[test]
    fn test_absorb_and_display() {
        let mut total = RunStats::default();
        let mut pass = RunStats::default();
        pass.processed = 3;
        pass.cast(LinkOutcome::ClaimedBlank);
        pass.upserted(&UpsertOutcome::Inserted);
        total.absorb(&pass);
        total.absorb(&pass);
        assert_eq!(total.processed, 6);
        assert_eq!(total.updated, 2);
        assert!(total.to_string().starts_with("6 processed: 2 inserted"));
    }
}
