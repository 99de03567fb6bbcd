use anyhow::Result;
use starbase_etl::{config, Config};

/// Show the current effective configuration.
pub fn show_config() -> Result<()> {
    let config = Config::load()?;
    let config_path = config::config_file_path();

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config_path.display());
    let exists = config_path.exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    println!("  database_path: {}", config.database_path.display());
    println!("  stapi_base_url: {}", config.stapi_base_url);
    println!("  page_size: {}", config.page_size);
    println!("  request_delay_ms: {}", config.request_delay_ms);
    println!("  request_timeout_secs: {}", config.request_timeout_secs);
    println!("  commit_every: {}", config.commit_every);
    println!(
        "  max_pages: {}",
        config
            .max_pages
            .map_or_else(|| "<all>".to_string(), |n| n.to_string())
    );
    println!("  aliases_path: {}", config.aliases_path.display());

    println!("\nPriority: CLI args > ENV vars (STARBASE_*) > Config file > Defaults");

    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    println!("{}", config::config_file_path().display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure starbase.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
