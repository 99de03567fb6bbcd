pub mod audit;
pub mod db;
pub mod evolve;
pub mod ident;
pub mod migrations;

pub use audit::{audit_duplicates, remove_duplicates, DuplicateGroup, DuplicateKey};
pub use db::{ActorCredit, CommitBatch, Database};
pub use evolve::{
    apply_descriptor, ensure_column, ensure_columns, ensure_index, rebuild_table, ColumnChange,
    ColumnSpec, DefaultValue, InboundKey, MigrationDescriptor, RebuildPlan, RebuildReport, TableShape,
};
pub use migrations::{Migration, MIGRATIONS, TABLES};
