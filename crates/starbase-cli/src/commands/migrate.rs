use anyhow::{Context, Result};
use std::path::Path;

use starbase_core::schema::{
    apply_descriptor, ensure_column, ColumnChange, ColumnSpec, Database, DefaultValue,
    MigrationDescriptor,
};
use starbase_etl::Config;

use super::{confirm, open_database};

pub fn add_column(
    config: &Config,
    table: &str,
    column: &str,
    sql_type: &str,
    default: Option<String>,
) -> Result<()> {
    let db = open_database(config)?;
    let mut spec = ColumnSpec::new(column, sql_type);
    if let Some(raw) = default {
        spec = spec.with_default(DefaultValue::parse_literal(&raw));
    }
    match ensure_column(db.conn(), table, &spec)? {
        ColumnChange::Added => println!("✓ Added {table}.{column}"),
        ColumnChange::AlreadyPresent => println!("{table}.{column} already exists"),
    }
    Ok(())
}

pub fn drop_columns(
    config: &Config,
    table: &str,
    columns: Vec<String>,
    yes: bool,
    dry_run: bool,
) -> Result<()> {
    let desc = columns
        .into_iter()
        .fold(MigrationDescriptor::new(table), MigrationDescriptor::drop_column);
    run(config, &[desc], yes, dry_run)
}

pub fn rename_column(
    config: &Config,
    table: &str,
    from: &str,
    to: &str,
    yes: bool,
    dry_run: bool,
) -> Result<()> {
    let desc = MigrationDescriptor::new(table).rename_column(from, to);
    run(config, &[desc], yes, dry_run)
}

pub fn apply_file(config: &Config, file: &Path, yes: bool, dry_run: bool) -> Result<()> {
    let descriptors = MigrationDescriptor::load_all(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    if descriptors.is_empty() {
        println!("No [[migration]] entries in {}", file.display());
        return Ok(());
    }
    run(config, &descriptors, yes, dry_run)
}

/// Plan every descriptor before touching anything, so a bad entry late in
/// a file aborts the whole run.
fn run(config: &Config, descriptors: &[MigrationDescriptor], yes: bool, dry_run: bool) -> Result<()> {
    let db = open_database(config)?;
    for desc in descriptors.iter().filter(|d| d.is_destructive()) {
        let plan = desc.plan(db.conn())?;
        println!("Rebuild of {} (via {}):", plan.table, plan.shadow);
        for statement in plan.statements()? {
            println!("  {statement};");
        }
    }
    for desc in descriptors.iter().filter(|d| !d.add.is_empty()) {
        for spec in &desc.add {
            println!("Add column {}.{}", desc.table, spec.definition()?);
        }
    }
    if dry_run {
        println!("\nDry run: nothing changed.");
        return Ok(());
    }

    let destructive = descriptors.iter().any(MigrationDescriptor::is_destructive);
    if destructive && !yes && !confirm("Rebuild the tables above?")? {
        println!("Aborted.");
        return Ok(());
    }

    for desc in descriptors {
        apply(&db, desc)?;
    }
    Ok(())
}

fn apply(db: &Database, desc: &MigrationDescriptor) -> Result<()> {
    let report = apply_descriptor(db, desc)
        .with_context(|| format!("Migration of {} failed", desc.table))?;
    match report {
        Some(report) => {
            println!(
                "✓ Rebuilt {}: {} rows, {} indexes",
                desc.table, report.rows, report.indexes
            );
            if report.foreign_key_violations > 0 {
                println!(
                    "  ⚠ {} foreign key violations; see the log",
                    report.foreign_key_violations
                );
            }
        }
        None => println!("✓ {}: columns ensured", desc.table),
    }
    Ok(())
}
