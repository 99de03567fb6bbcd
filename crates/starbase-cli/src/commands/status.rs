use anyhow::Result;

use starbase_core::schema::{audit_duplicates, remove_duplicates, DuplicateKey};
use starbase_etl::Config;

use super::{confirm, open_database};

/// Create the database file and bring its schema up to date.
pub fn init_database(config: &Config) -> Result<()> {
    let db = open_database(config)?;
    println!(
        "✓ Database ready: {} (schema version {})",
        config.database_path.display(),
        db.schema_version()?
    );
    Ok(())
}

pub fn show_status(config: &Config) -> Result<()> {
    let db = open_database(config)?;

    println!("\n📊 Starbase Status\n");
    println!("  Database: {}", config.database_path.display());
    println!("  Schema version: {}\n", db.schema_version()?);

    let counts = db.table_counts()?;
    let width = counts.iter().map(|(t, _)| t.len()).max().unwrap_or(0);
    for (table, count) in &counts {
        println!("  {table:<width$}  {count:>7}");
    }

    if counts.iter().all(|(_, count)| *count == 0) {
        println!("\n  Run `starbase populate` to fill the database");
    }

    Ok(())
}

pub fn show_top_actors(config: &Config, limit: usize) -> Result<()> {
    let db = open_database(config)?;
    let credits = db.top_actors(limit)?;
    if credits.is_empty() {
        println!("No casting links yet. Run `starbase link` first.");
        return Ok(());
    }
    for (rank, credit) in credits.iter().enumerate() {
        println!(
            "{:>3}. {} ({} characters)",
            rank + 1,
            credit.name,
            credit.characters
        );
    }
    Ok(())
}

/// Report duplicate groups and optionally collapse them.
pub fn show_duplicates(config: &Config, remove: bool, yes: bool, json: bool) -> Result<()> {
    let db = open_database(config)?;
    let groups = audit_duplicates(db.conn())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
    } else if groups.is_empty() {
        println!("✓ No duplicates found");
    } else {
        for group in &groups {
            println!("  {}: {} (ids {:?})", group.key, group.label, group.ids);
        }
        println!("\n{} duplicate groups", groups.len());
    }

    if !remove || groups.is_empty() {
        return Ok(());
    }
    if !yes && !confirm("Delete duplicates, keeping the lowest id of each group?")? {
        println!("Aborted.");
        return Ok(());
    }

    for key in DuplicateKey::ALL {
        let deleted = remove_duplicates(db.conn(), *key)?;
        if deleted > 0 {
            println!("✓ {key}: deleted {deleted} rows");
        }
    }
    Ok(())
}
