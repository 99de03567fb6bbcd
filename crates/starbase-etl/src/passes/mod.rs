//! Ingestion passes.
//!
//! Every pass is idempotent: rows are inserted only when absent and merged
//! fill-if-null otherwise, so a pass can be re-run after a partial failure.
//! Errors are handled per record; only fatal storage errors end a pass.
//!
//! Passes that talk to the record source take `&mut Database` so their
//! futures stay `Send`; all database work happens in synchronous helpers
//! between awaits.

pub mod cast;
pub mod enrich;
pub mod episodes;
pub mod link;
pub mod seed;

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use starbase_core::reconcile::AliasTable;
use starbase_core::schema::{CommitBatch, Database};

use crate::error::{IngestError, IngestResult};
use crate::source::{fetch_all, Endpoint, RecordSource};
use crate::stats::RunStats;

pub use cast::{apply_cast, CastEntry};
pub use enrich::EnrichTarget;
pub use episodes::{import_episodes, load_episodes};

/// Runs the network-backed passes against one record source.
#[derive(Clone)]
pub struct Driver {
    source: Arc<dyn RecordSource>,
    aliases: AliasTable,
    commit_every: usize,
    max_pages: Option<u32>,
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("source", &self.source)
            .field("aliases", &self.aliases.len())
            .field("commit_every", &self.commit_every)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl Driver {
    #[must_use]
    pub fn new(source: Arc<dyn RecordSource>, aliases: AliasTable) -> Self {
        Self {
            source,
            aliases,
            commit_every: 100,
            max_pages: None,
        }
    }

    #[must_use]
    pub fn with_commit_every(mut self, every: usize) -> Self {
        self.commit_every = every;
        self
    }

    #[must_use]
    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    #[must_use]
    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub(crate) fn source(&self) -> &dyn RecordSource {
        self.source.as_ref()
    }

    /// All search results for `endpoint`; a failed first page is counted
    /// and yields nothing.
    pub(crate) async fn records(&self, endpoint: Endpoint, stats: &mut RunStats) -> Vec<Value> {
        match fetch_all(self.source(), endpoint, self.max_pages).await {
            Ok(records) => records,
            Err(e) => {
                log::warn!("Could not list {endpoint}: {e}");
                stats.errored(&e);
                Vec::new()
            }
        }
    }

    pub(crate) fn batch(&self) -> CommitBatch {
        CommitBatch::new(self.commit_every)
    }
}

/// Apply `apply` to every record inside one batched transaction.
///
/// A non-fatal error skips that record and is counted; a fatal one commits
/// what is pending and ends the run.
pub(crate) fn apply_all<T, F>(
    db: &Database,
    mut batch: CommitBatch,
    label: &str,
    records: &[T],
    mut apply: F,
) -> IngestResult<RunStats>
where
    T: Describe,
    F: FnMut(&T, &mut RunStats) -> IngestResult<()>,
{
    let mut stats = RunStats::default();
    batch.start(db)?;
    for record in records {
        stats.processed += 1;
        if let Err(e) = apply(record, &mut stats) {
            if let Err(fatal) = contain(label, &record.describe(), e, &mut stats) {
                batch.finish(db)?;
                return Err(fatal);
            }
        }
        batch.tick(db)?;
    }
    batch.finish(db)?;
    log::info!("{label}: {stats}");
    Ok(stats)
}

/// Absorb a per-record error into `stats`, handing back only fatal ones.
pub(crate) fn contain(
    label: &str,
    what: &str,
    err: IngestError,
    stats: &mut RunStats,
) -> IngestResult<()> {
    if err.is_fatal() {
        return Err(err);
    }
    report(label, what, &err);
    stats.errored(&err);
    Ok(())
}

/// Log an error caught at the per-record boundary.
pub(crate) fn report(label: &str, what: &str, err: &IngestError) {
    if err.is_not_found() {
        log::debug!("{label}: {what}: {err}");
    } else {
        log::warn!("{label}: skipped {what}: {err}");
    }
}

/// A short description of a record for log lines.
pub(crate) trait Describe {
    fn describe(&self) -> String;
}

impl Describe for Value {
    fn describe(&self) -> String {
        ["name", "title", "uid"]
            .iter()
            .find_map(|k| crate::record::text(self, k))
            .unwrap_or("<unnamed>")
            .to_string()
    }
}
