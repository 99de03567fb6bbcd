use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use starbase_etl::{Config, EnrichTarget};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "starbase", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the database (default: ~/.local/share/starbase/startrek.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Create the database and apply schema migrations
    Init,
    /// Show schema version and row counts
    Status,
    /// Run seed, link and enrich as one resumable pipeline
    ///
    /// Pipeline state is kept in `pipeline.db` next to the database, so an
    /// interrupted run picks up at the first stage that did not complete.
    /// Every pass is idempotent: rows are only inserted when absent and
    /// merged fill-if-null otherwise, so re-running never overwrites data.
    Populate,
    /// Insert series, species, organizations, performers, characters,
    /// ships and episodes from STAPI
    Seed,
    /// Link characters to actors, organizations, ships and episodes
    ///
    /// Actor links carry the series they were credited for, with first and
    /// last appearance and episode count when STAPI lists the episodes.
    Link,
    /// Fill blank attributes from STAPI detail records
    Enrich {
        /// Targets to enrich (default: all)
        #[arg(value_parser = parse_target)]
        targets: Vec<EnrichTarget>,
    },
    /// Assign primary actors from a regular-cast JSON file
    ///
    /// The file is an array of `{"series", "actor", "character"}` objects.
    /// Adds `Characters.primary_actor_id` if the database predates it.
    Cast {
        file: PathBuf,
    },
    /// Merge scraped episode details (IMDb ids, ratings, credits) from a
    /// JSON file
    ImportEpisodes {
        file: PathBuf,
    },
    /// Evolve table schemas
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Report rows that share an identity key
    Duplicates {
        /// Collapse each group onto its lowest id
        #[arg(long)]
        remove: bool,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Actors by number of distinct characters played
    TopActors {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Manage the name alias file
    Aliases {
        #[command(subcommand)]
        action: AliasesAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Subcommand)]
enum MigrateAction {
    /// Add a column if it is missing
    AddColumn {
        table: String,
        column: String,
        /// Declared SQL type, e.g. TEXT or DECIMAL(3,1)
        sql_type: String,
        /// Default value: NULL, a number, or text
        #[arg(long)]
        default: Option<String>,
    },
    /// Drop columns by rebuilding the table
    DropColumns {
        table: String,
        #[arg(required = true)]
        columns: Vec<String>,
        #[arg(long)]
        yes: bool,
        /// Print the rebuild plan without running it
        #[arg(long)]
        dry_run: bool,
    },
    /// Rename a column by rebuilding the table
    RenameColumn {
        table: String,
        from: String,
        to: String,
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Apply every `[[migration]]` in a TOML file
    Apply {
        file: PathBuf,
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, clap::Subcommand)]
enum AliasesAction {
    /// Write the built-in aliases to the alias file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show the alias file path
    Path,
    /// Parse the alias file and report its size
    Validate,
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show the config file path
    Path,
    /// Create a config file with defaults
    Init,
    /// Print an example config file
    Example,
}

fn parse_target(s: &str) -> Result<EnrichTarget, String> {
    s.parse().map_err(|e| format!("{e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Config { action } = &cli.command {
        return match action {
            ConfigAction::Show => commands::config::show_config(),
            ConfigAction::Path => commands::config::show_path(),
            ConfigAction::Init => commands::config::init_config(),
            ConfigAction::Example => commands::config::show_example(),
        };
    }

    let config = match cli.db {
        Some(db_path) => Config::load_with_db_path(db_path)?,
        None => Config::load()?,
    };

    // Ensure database directory exists
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match cli.command {
        Commands::Init => commands::status::init_database(&config)?,
        Commands::Status => commands::status::show_status(&config)?,
        Commands::Populate => commands::ingest::run_populate(&config).await?,
        Commands::Seed => commands::ingest::run_seed(&config).await?,
        Commands::Link => commands::ingest::run_link(&config).await?,
        Commands::Enrich { targets } => commands::ingest::run_enrich(&config, targets).await?,
        Commands::Cast { file } => commands::ingest::run_cast(&config, &file)?,
        Commands::ImportEpisodes { file } => commands::ingest::run_import_episodes(&config, &file)?,
        Commands::Migrate { action } => match action {
            MigrateAction::AddColumn {
                table,
                column,
                sql_type,
                default,
            } => commands::migrate::add_column(&config, &table, &column, &sql_type, default)?,
            MigrateAction::DropColumns {
                table,
                columns,
                yes,
                dry_run,
            } => commands::migrate::drop_columns(&config, &table, columns, yes, dry_run)?,
            MigrateAction::RenameColumn {
                table,
                from,
                to,
                yes,
                dry_run,
            } => commands::migrate::rename_column(&config, &table, &from, &to, yes, dry_run)?,
            MigrateAction::Apply { file, yes, dry_run } => {
                commands::migrate::apply_file(&config, &file, yes, dry_run)?;
            }
        },
        Commands::Duplicates { remove, yes, json } => {
            commands::status::show_duplicates(&config, remove, yes, json)?;
        }
        Commands::TopActors { limit } => commands::status::show_top_actors(&config, limit)?,
        Commands::Aliases { action } => match action {
            AliasesAction::Init { force } => commands::aliases::init_aliases(&config, force)?,
            AliasesAction::Path => commands::aliases::show_path(&config),
            AliasesAction::Validate => commands::aliases::validate(&config)?,
        },
        Commands::Config { .. } => {}
    }

    Ok(())
}
