//! treadle stages wrapping the network-backed passes.
//!
//! Each stage opens its own connection inside `execute`; the connection is
//! owned by the future and handed to the pass as `&mut Database`.

use std::path::{Path, PathBuf};

use treadle::{Stage, StageContext, StageOutcome, SubTask};

use starbase_core::schema::Database;

use crate::error::IngestError;
use crate::passes::{Driver, EnrichTarget};
use crate::stats::RunStats;

fn open_db(path: &Path) -> treadle::Result<Database> {
    Database::open(path).map_err(|e| {
        treadle::TreadleError::StageExecution(format!("Failed to open database: {e}"))
    })
}

fn stage_error(stage: &str, e: &IngestError) -> treadle::TreadleError {
    treadle::TreadleError::StageExecution(format!("{stage} failed: {e}"))
}

fn finish(stage: &str, stats: &RunStats) -> StageOutcome {
    log::info!("{stage}: {stats}");
    StageOutcome::Complete
}

/// Inserts the core rows from the source's listings.
#[derive(Debug)]
pub struct SeedStage {
    driver: Driver,
    db_path: PathBuf,
}

impl SeedStage {
    #[must_use]
    pub const fn new(driver: Driver, db_path: PathBuf) -> Self {
        Self { driver, db_path }
    }
}

#[async_trait::async_trait]
impl Stage for SeedStage {
    fn name(&self) -> &str {
        "seed"
    }

    async fn execute(
        &self,
        item: &dyn treadle::WorkItem,
        _ctx: &mut StageContext,
    ) -> treadle::Result<StageOutcome> {
        log::info!("Seeding for {}", item.id());
        let mut db = open_db(&self.db_path)?;
        let stats = self
            .driver
            .seed(&mut db)
            .await
            .map_err(|e| stage_error("seed", &e))?;
        Ok(finish("seed", &stats))
    }
}

/// Fills the associative tables.
#[derive(Debug)]
pub struct LinkStage {
    driver: Driver,
    db_path: PathBuf,
}

impl LinkStage {
    #[must_use]
    pub const fn new(driver: Driver, db_path: PathBuf) -> Self {
        Self { driver, db_path }
    }
}

#[async_trait::async_trait]
impl Stage for LinkStage {
    fn name(&self) -> &str {
        "link"
    }

    async fn execute(
        &self,
        _item: &dyn treadle::WorkItem,
        _ctx: &mut StageContext,
    ) -> treadle::Result<StageOutcome> {
        let mut db = open_db(&self.db_path)?;
        let stats = self
            .driver
            .link(&mut db)
            .await
            .map_err(|e| stage_error("link", &e))?;
        Ok(finish("link", &stats))
    }
}

/// Fan-out enrichment: one subtask per [`EnrichTarget`], so a failing
/// target can be retried without repeating the others.
#[derive(Debug)]
pub struct EnrichStage {
    driver: Driver,
    db_path: PathBuf,
}

impl EnrichStage {
    #[must_use]
    pub const fn new(driver: Driver, db_path: PathBuf) -> Self {
        Self { driver, db_path }
    }
}

#[async_trait::async_trait]
impl Stage for EnrichStage {
    fn name(&self) -> &str {
        "enrich"
    }

    async fn execute(
        &self,
        item: &dyn treadle::WorkItem,
        ctx: &mut StageContext,
    ) -> treadle::Result<StageOutcome> {
        let Some(subtask) = ctx.subtask_name.as_deref() else {
            let subtasks: Vec<SubTask> = EnrichTarget::all()
                .map(|t| SubTask::new(t.as_str().to_string()))
                .collect();
            log::info!("Enriching {} with {} subtasks", item.id(), subtasks.len());
            return Ok(StageOutcome::FanOut(subtasks));
        };

        let target: EnrichTarget = subtask.parse().map_err(|_| {
            treadle::TreadleError::StageExecution(format!("Unknown enrichment subtask: {subtask}"))
        })?;
        let mut db = open_db(&self.db_path)?;
        let label = format!("enrich {target}");
        let stats = self
            .driver
            .enrich(&mut db, target)
            .await
            .map_err(|e| stage_error(&label, &e))?;
        Ok(finish(&label, &stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureSource;
    use serde_json::json;
    use starbase_core::reconcile::AliasTable;
    use std::sync::Arc;

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct TestItem {
        id: String,
    }

    impl treadle::WorkItem for TestItem {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn item() -> TestItem {
        TestItem {
            id: "test-item".to_string(),
        }
    }

    fn driver(source: FixtureSource) -> Driver {
        Driver::new(Arc::new(source), AliasTable::default())
    }

    #[tokio::test]
    async fn test_seed_stage_writes_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("startrek.db");
        let source = FixtureSource::new().with_records(
            crate::source::Endpoint::Species,
            vec![json!({"uid": "SPMA1", "name": "Ferengi"})],
        );
        let stage = SeedStage::new(driver(source), db_path.clone());
        assert_eq!(stage.name(), "seed");

        let mut ctx = StageContext::new("seed".to_string());
        let outcome = stage.execute(&item(), &mut ctx).await.unwrap();
        assert!(matches!(outcome, StageOutcome::Complete));

        let db = Database::open(&db_path).unwrap();
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM Species", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_enrich_stage_fan_out() {
        let stage = EnrichStage::new(driver(FixtureSource::new()), PathBuf::from("/tmp/test.db"));
        let mut ctx = StageContext::new("enrich".to_string());

        match stage.execute(&item(), &mut ctx).await.unwrap() {
            StageOutcome::FanOut(subtasks) => {
                let ids: Vec<&str> = subtasks.iter().map(|s| s.id.as_str()).collect();
                assert_eq!(ids, ["characters", "actors", "organizations", "ships"]);
            }
            _ => panic!("Expected FanOut outcome"),
        }
    }

    #[tokio::test]
    async fn test_enrich_stage_subtask() {
        let dir = tempfile::tempdir().unwrap();
        let stage = EnrichStage::new(driver(FixtureSource::new()), dir.path().join("startrek.db"));
        let mut ctx = StageContext::new("enrich".to_string()).with_subtask("ships");
        let outcome = stage.execute(&item(), &mut ctx).await.unwrap();
        assert!(matches!(outcome, StageOutcome::Complete));
    }

    #[tokio::test]
    async fn test_enrich_stage_unknown_subtask() {
        let stage = EnrichStage::new(driver(FixtureSource::new()), PathBuf::from("/tmp/test.db"));
        let mut ctx = StageContext::new("enrich".to_string()).with_subtask("planets");
        assert!(stage.execute(&item(), &mut ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_stage_reports_unopenable_database() {
        let dir = tempfile::tempdir().unwrap();
        let stage = LinkStage::new(driver(FixtureSource::new()), dir.path().to_path_buf());
        let mut ctx = StageContext::new("link".to_string());
        assert!(stage.execute(&item(), &mut ctx).await.is_err());
    }
}
