use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use starbase_core::reconcile::AliasTable;
use starbase_etl::{
    apply_cast, build_pipeline, import_episodes, load_episodes, CastEntry, Config, Driver,
    EnrichTarget, IngestJob, RunStats, StapiClient,
};

use super::open_database;

fn aliases(config: &Config) -> Result<AliasTable> {
    AliasTable::load_or_default(&config.aliases_path)
        .with_context(|| format!("Failed to load aliases from {}", config.aliases_path.display()))
}

fn driver(config: &Config) -> Result<Driver> {
    let client = StapiClient::from_config(config).context("Failed to create STAPI client")?;
    Ok(Driver::new(Arc::new(client), aliases(config)?)
        .with_commit_every(config.commit_every)
        .with_max_pages(config.max_pages))
}

fn summary(pass: &str, stats: &RunStats) {
    println!("  ✓ [{pass}] {stats}");
}

/// Run seed → link → enrich as a treadle workflow.
pub async fn run_populate(config: &Config) -> Result<()> {
    println!("\n🖖 Starbase Population Pipeline\n");
    println!("  Source: {}", config.stapi_base_url);
    println!("  Database: {}", config.database_path.display());
    println!();

    let workflow = build_pipeline(&driver(config)?, config.database_path.clone())
        .context("Failed to build pipeline")?;

    let parent = config
        .database_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
    let state_path = parent.join("pipeline.db");
    let mut store = treadle::SqliteStateStore::open(&state_path)
        .await
        .context("Failed to open pipeline state store")?;

    let job = IngestJob::new("populate");

    // Subscribe to events for progress display
    let mut events = workflow.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                treadle::WorkflowEvent::StageStarted { stage, .. } => {
                    println!("  ⏳ [{stage}] Starting...");
                }
                treadle::WorkflowEvent::StageCompleted { stage, .. } => {
                    println!("  ✓ [{stage}] Complete");
                }
                treadle::WorkflowEvent::StageFailed { stage, error, .. } => {
                    eprintln!("  ✗ [{stage}] FAILED: {error}");
                }
                _ => {}
            }
        }
    });

    log::info!("Starting {job}");
    workflow
        .advance(&job, &mut store)
        .await
        .context("Pipeline execution failed")?;

    println!("\n✓ Population pipeline complete!");
    println!("\nNext steps:");
    println!("  - Run 'starbase status' to see row counts");
    println!("  - Run 'starbase cast <file>' to assign primary actors");

    Ok(())
}

pub async fn run_seed(config: &Config) -> Result<()> {
    let driver = driver(config)?;
    let mut db = open_database(config)?;
    let stats = driver.seed(&mut db).await.context("Seed failed")?;
    summary("seed", &stats);
    Ok(())
}

pub async fn run_link(config: &Config) -> Result<()> {
    let driver = driver(config)?;
    let mut db = open_database(config)?;
    let stats = driver.link(&mut db).await.context("Link failed")?;
    summary("link", &stats);
    Ok(())
}

pub async fn run_enrich(config: &Config, targets: Vec<EnrichTarget>) -> Result<()> {
    let targets = if targets.is_empty() {
        EnrichTarget::all().collect()
    } else {
        targets
    };
    let driver = driver(config)?;
    let mut db = open_database(config)?;
    for target in targets {
        let stats = driver
            .enrich(&mut db, target)
            .await
            .with_context(|| format!("Enrich {target} failed"))?;
        summary(&format!("enrich {target}"), &stats);
    }
    Ok(())
}

pub fn run_cast(config: &Config, file: &Path) -> Result<()> {
    let entries = CastEntry::load_all(file)?;
    let db = open_database(config)?;
    let stats = apply_cast(&db, &aliases(config)?, &entries, config.commit_every)
        .context("Cast assignment failed")?;
    summary("cast", &stats);
    Ok(())
}

pub fn run_import_episodes(config: &Config, file: &Path) -> Result<()> {
    let records = load_episodes(file)?;
    let db = open_database(config)?;
    let stats = import_episodes(&db, &records, config.commit_every)
        .context("Episode import failed")?;
    summary("import episodes", &stats);
    Ok(())
}
