use std::path::PathBuf;
use treadle::Workflow;

use crate::passes::Driver;
use crate::stages::{EnrichStage, LinkStage, SeedStage};

/// Build the seed → link → enrich workflow behind `starbase populate`.
///
/// # Errors
/// Returns an error if the workflow cannot be built.
pub fn build_pipeline(driver: &Driver, db_path: PathBuf) -> treadle::Result<Workflow> {
    Workflow::builder()
        .stage("seed", SeedStage::new(driver.clone(), db_path.clone()))
        .stage("link", LinkStage::new(driver.clone(), db_path.clone()))
        .stage("enrich", EnrichStage::new(driver.clone(), db_path))
        .dependency("link", "seed")
        .dependency("enrich", "link")
        .build()
}
