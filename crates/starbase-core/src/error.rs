use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The shadow table did not receive every row of the original. The
    /// original table is untouched and the shadow is left for inspection.
    #[error(
        "row count mismatch rebuilding {table}: original has {original} rows, \
         shadow {shadow} has {copied}; original left untouched"
    )]
    RowCountMismatch {
        table: String,
        original: i64,
        copied: i64,
        shadow: String,
    },

    /// A shadow table from an earlier, unfinished rebuild is still present.
    #[error("shadow table {shadow} for {table} already exists; inspect and drop it first")]
    ShadowExists { table: String, shadow: String },

    /// A uniqueness or foreign-key constraint rejected a single write.
    #[error("integrity violation ({context}): {message}")]
    Integrity { context: String, message: String },
}

impl Error {
    /// Returns `true` for errors that must stop a whole run rather than a
    /// single record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RowCountMismatch { .. } | Self::ShadowExists { .. })
    }

    /// Re-tag a constraint violation coming from SQLite as [`Error::Integrity`],
    /// leaving every other error as it was.
    pub fn with_integrity_context(self, context: impl Into<String>) -> Self {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(err, message))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Integrity {
                    context: context.into(),
                    message: message.unwrap_or_else(|| err.to_string()),
                }
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_migration_errors_are_fatal() {
        let mismatch = Error::RowCountMismatch {
            table: "Species".to_string(),
            original: 10,
            copied: 9,
            shadow: "Species_new".to_string(),
        };
        assert!(mismatch.is_fatal());
        assert!(!Error::InvalidData("x".to_string()).is_fatal());
        assert!(!Error::Integrity {
            context: "Character_Actors".to_string(),
            message: "UNIQUE constraint failed".to_string(),
        }
        .is_fatal());
    }

    #[test]
    fn test_constraint_violation_becomes_integrity() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT UNIQUE); INSERT INTO t VALUES ('Q');")
            .unwrap();
        let err: Error = conn
            .execute("INSERT INTO t VALUES ('Q')", [])
            .unwrap_err()
            .into();
        match err.with_integrity_context("t") {
            Error::Integrity { context, message } => {
                assert_eq!(context, "t");
                assert!(message.contains("UNIQUE"));
            }
            other => panic!("expected integrity error, got {other:?}"),
        }
    }
}
