use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings shared by every starbase command.
///
/// Later layers win: built-in defaults, then `config.toml` in the
/// platform config directory, then `STARBASE_*` environment variables,
/// then `--db` on the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Trivia database file. Overridden by `--db` and
    /// `STARBASE_DATABASE_PATH`; defaults to `startrek.db` under the
    /// platform data directory.
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,

    /// Root of the STAPI REST API.
    #[serde(default = "default_stapi_base_url")]
    pub stapi_base_url: String,

    /// Records requested per search page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Pause after every request, in milliseconds.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Records processed between commits.
    #[serde(default = "default_commit_every")]
    pub commit_every: usize,

    /// Stop paging an endpoint after this many pages. Unlimited when unset.
    #[serde(default)]
    pub max_pages: Option<u32>,

    /// Curated name aliases used by the reconciler.
    #[serde(default = "default_aliases_path")]
    pub aliases_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            stapi_base_url: default_stapi_base_url(),
            page_size: default_page_size(),
            request_delay_ms: default_request_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            commit_every: default_commit_every(),
            max_pages: None,
            aliases_path: default_aliases_path(),
        }
    }
}

impl Config {
    /// Layer the config file (when present) and `STARBASE_*` variables
    /// over the defaults.
    ///
    /// # Errors
    ///
    /// Fails when the file or an environment value does not parse.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("starbase");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;

        Ok(config)
    }

    /// [`Config::load`], then point at `db_path` instead.
    pub fn load_with_db_path(db_path: PathBuf) -> Result<Self> {
        let mut config = Self::load()?;
        config.database_path = db_path;
        Ok(config)
    }

    #[must_use]
    pub const fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("starbase")
        .join("startrek.db")
}

fn default_stapi_base_url() -> String {
    "http://stapi.co/api/v1/rest".to_string()
}

const fn default_page_size() -> u32 {
    100
}

const fn default_request_delay_ms() -> u64 {
    300
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_commit_every() -> usize {
    100
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("starbase")
}

fn default_aliases_path() -> PathBuf {
    config_dir().join("aliases.toml")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/starbase/config.toml
/// - macOS: ~/Library/Application Support/starbase/config.toml
/// - Windows: %APPDATA%\starbase\config.toml
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Commented template written by `starbase config init`.
pub fn example_config() -> &'static str {
    r#"# Starbase Configuration File
#
# Every setting is optional. STARBASE_* environment variables override
# this file, and --db overrides database_path.

# Path to the SQLite database
#
# Can also be set via:
# - CLI: starbase --db /custom/path.db status
# - Environment: STARBASE_DATABASE_PATH=/custom/path.db
#
# Default: startrek.db in the platform data directory
#database_path = "/path/to/custom/startrek.db"

# STAPI endpoint and paging
#stapi_base_url = "http://stapi.co/api/v1/rest"
#page_size = 100
#max_pages = 5

# Fixed pause after every request, and the per-request timeout
#request_delay_ms = 300
#request_timeout_secs = 30

# Records processed between commits during ingestion
#commit_every = 100

# Curated aliases for names the sources spell differently
# (create one with: starbase aliases init)
#aliases_path = "/path/to/aliases.toml"
"#
}

/// Write [`example_config`] unless a config file is already there.
/// `Ok(false)` means the existing file was left alone.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.database_path.as_os_str().is_empty());
        assert_eq!(config.page_size, 100);
        assert_eq!(config.commit_every, 100);
        assert_eq!(config.request_delay(), Duration::from_millis(300));
        assert!(config.max_pages.is_none());
    }

    #[test]
    fn test_config_load() {
        let result = Config::load();
        assert!(result.is_ok());
    }

    #[test]
    fn test_config_with_custom_db_path() {
        let custom_path = PathBuf::from("/tmp/test.db");
        let config = Config::load_with_db_path(custom_path.clone());
        assert!(config.is_ok());
        assert_eq!(config.unwrap().database_path, custom_path);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{"page_size": 50}"#).unwrap();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.stapi_base_url, default_stapi_base_url());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_example_config_is_all_comments() {
        assert!(example_config()
            .lines()
            .all(|l| l.trim().is_empty() || l.trim_start().starts_with('#')));
    }
}
