//! Ingestion error types.

use thiserror::Error;

/// Errors raised while fetching and applying external records.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The record source answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The request did not complete within the configured timeout.
    #[error("timed out requesting {url}")]
    Timeout { url: String },

    /// A response body could not be understood.
    #[error("parse error for {endpoint}: {message}")]
    Parse { endpoint: String, message: String },

    /// No record exists for the requested name or uid.
    #[error("not found: {entity} '{key}'")]
    NotFound { entity: String, key: String },

    /// An error propagated from `reqwest`.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// An error propagated from the core storage layer.
    #[error("database error: {0}")]
    Database(#[from] starbase_core::Error),

    /// A local input file could not be read or decoded.
    #[error("input error: {0}")]
    Input(String),
}

impl IngestError {
    /// Network failures that affect a single record.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Timeout { .. } | Self::Request(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
            || matches!(self, Self::Database(starbase_core::Error::NotFound { .. }))
    }

    /// Errors that must end the whole run instead of skipping one record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Database(e) if e.is_fatal())
    }

    pub(crate) fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }
}

/// Convenience alias for ingestion results.
pub type IngestResult<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let http = IngestError::Http {
            status: 503,
            url: "http://stapi.co".to_string(),
        };
        assert!(http.is_transient());
        assert!(!http.is_fatal());

        let missing = IngestError::not_found("character", "Q");
        assert!(missing.is_not_found());
        assert!(!missing.is_transient());

        let fatal = IngestError::from(starbase_core::Error::ShadowExists {
            table: "Ships".to_string(),
            shadow: "Ships_new".to_string(),
        });
        assert!(fatal.is_fatal());
    }
}
