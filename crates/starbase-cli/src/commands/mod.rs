pub mod aliases;
pub mod config;
pub mod ingest;
pub mod migrate;
pub mod status;

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

use starbase_core::schema::Database;
use starbase_etl::Config;

fn open_database(config: &Config) -> Result<Database> {
    Database::open(&config.database_path)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))
}

/// Ask a yes/no question on stdin. Anything but "y" or "yes" is a no.
fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} (y/n) ");
    io::stdout().flush()?;
    read_answer(io::stdin().lock())
}

fn read_answer(mut input: impl BufRead) -> Result<bool> {
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_answer() {
        assert!(read_answer("y\n".as_bytes()).unwrap());
        assert!(read_answer("YES\n".as_bytes()).unwrap());
        assert!(!read_answer("n\n".as_bytes()).unwrap());
        assert!(!read_answer("".as_bytes()).unwrap());
    }
}
