use serde::{Deserialize, Serialize};
use std::fmt;
use treadle::WorkItem;

/// One ingestion run flowing through the seed → link → enrich stages.
///
/// The passes work on the whole database, so a run is identified only by
/// a fresh id and a label for logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    id: String,
    pub label: String,
}

impl IngestJob {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
        }
    }
}

impl WorkItem for IngestJob {
    fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for IngestJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_get_distinct_ids() {
        let a = IngestJob::new("populate");
        let b = IngestJob::new("populate");
        assert_ne!(a.id(), b.id());
        assert!(uuid::Uuid::parse_str(a.id()).is_ok());
    }

    #[test]
    fn test_display() {
        let job = IngestJob::new("populate");
        assert!(job.to_string().starts_with("populate ("));
    }
}
