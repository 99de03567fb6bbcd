use anyhow::{Context, Result};
use starbase_core::reconcile::AliasTable;
use starbase_etl::Config;

/// Write the built-in alias table so it can be edited.
pub fn init_aliases(config: &Config, force: bool) -> Result<()> {
    let path = &config.aliases_path;
    if path.exists() && !force {
        println!("Alias file already exists: {}", path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = AliasTable::default().to_toml()?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("✓ Wrote alias file: {}", path.display());
    Ok(())
}

pub fn show_path(config: &Config) {
    println!("{}", config.aliases_path.display());
}

/// Parse the alias file, failing loudly on a malformed one.
pub fn validate(config: &Config) -> Result<()> {
    let path = &config.aliases_path;
    if !path.exists() {
        println!("No alias file at {}; built-in aliases are used.", path.display());
        return Ok(());
    }
    let table = AliasTable::load_or_default(path)
        .with_context(|| format!("Invalid alias file {}", path.display()))?;
    println!("✓ {}: {} aliases", path.display(), table.len());
    Ok(())
}
