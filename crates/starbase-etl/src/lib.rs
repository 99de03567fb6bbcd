//! Ingestion driver for the starbase trivia database.
//!
//! Pulls records from a paginated source (STAPI in production, an
//! in-memory fixture in tests), reconciles them against the stored rows
//! and fills the database in idempotent passes. The network-backed passes
//! are also exposed as treadle stages.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod cache;
pub mod config;
pub mod error;
pub mod fixture;
pub mod passes;
pub mod pipeline;
pub mod record;
pub mod source;
pub mod stages;
pub mod stapi;
pub mod stats;
pub mod throttle;
pub mod work_item;

pub use cache::UidCache;
pub use config::Config;
pub use error::{IngestError, IngestResult};
pub use fixture::FixtureSource;
pub use passes::{apply_cast, import_episodes, load_episodes, CastEntry, Driver, EnrichTarget};
pub use pipeline::build_pipeline;
pub use source::{Endpoint, RecordSource, SearchPage};
pub use stages::{EnrichStage, LinkStage, SeedStage};
pub use stapi::StapiClient;
pub use stats::RunStats;
pub use throttle::Throttle;
pub use work_item::IngestJob;
