//! An in-memory [`RecordSource`] that serves canned listings and details,
//! used as the test double for every pass, stage and the integration tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{IngestError, IngestResult};
use crate::source::{detail_from_json, Endpoint, RecordSource, SearchPage};

/// Serves canned records, paged the way the live API pages them.
#[derive(Debug, Default)]
pub struct FixtureSource {
    records: HashMap<Endpoint, Vec<Value>>,
    details: HashMap<(Endpoint, String), Value>,
    failing: Vec<(Endpoint, String)>,
    page_size: usize,
    detail_calls: AtomicUsize,
}

impl FixtureSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            page_size: 100,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Search results for `endpoint`.
    #[must_use]
    pub fn with_records(mut self, endpoint: Endpoint, records: Vec<Value>) -> Self {
        self.records.entry(endpoint).or_default().extend(records);
        self
    }

    /// The detail record served for `uid`.
    #[must_use]
    pub fn with_detail(mut self, endpoint: Endpoint, uid: &str, detail: Value) -> Self {
        self.details.insert((endpoint, uid.to_string()), detail);
        self
    }

    /// Make the detail lookup for `uid` fail with a 503.
    #[must_use]
    pub fn with_failing_detail(mut self, endpoint: Endpoint, uid: &str) -> Self {
        self.failing.push((endpoint, uid.to_string()));
        self
    }

    /// How many detail lookups have been served or refused.
    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RecordSource for FixtureSource {
    async fn search_page(&self, endpoint: Endpoint, page: u32) -> IngestResult<SearchPage> {
        let records = self.records.get(&endpoint).map_or(&[][..], Vec::as_slice);
        let total_pages = records.len().div_ceil(self.page_size).max(1);
        let start = (page as usize) * self.page_size;
        let items: Vec<Value> = records
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect();

        let body = json!({
            (endpoint.plural()): items,
            "page": {
                "pageNumber": page,
                "totalPages": total_pages,
                "lastPage": page as usize + 1 >= total_pages,
            }
        });
        Ok(SearchPage::from_json(endpoint, &body))
    }

    async fn detail(&self, endpoint: Endpoint, uid: &str) -> IngestResult<Value> {
        self.detail_calls.fetch_add(1, Ordering::Relaxed);
        if self.failing.iter().any(|(e, u)| *e == endpoint && u == uid) {
            return Err(IngestError::Http {
                status: 503,
                url: format!("fixture://{endpoint}?uid={uid}"),
            });
        }
        let body = json!({ (endpoint.path()): self.details.get(&(endpoint, uid.to_string())) });
        detail_from_json(endpoint, uid, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fetch_all;

    fn crew(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| json!({"uid": format!("CH{i}"), "name": format!("Crewman {i}")}))
            .collect()
    }

    #[tokio::test]
    async fn test_pages_until_last() {
        let source = FixtureSource::new()
            .with_page_size(2)
            .with_records(Endpoint::Character, crew(5));
        let all = fetch_all(&source, Endpoint::Character, None).await.unwrap();
        assert_eq!(all.len(), 5);

        let capped = fetch_all(&source, Endpoint::Character, Some(2)).await.unwrap();
        assert_eq!(capped.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_endpoint() {
        let source = FixtureSource::new();
        let all = fetch_all(&source, Endpoint::Species, None).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_detail_lookup() {
        let source = FixtureSource::new()
            .with_detail(Endpoint::Character, "CH1", json!({"name": "Garak"}))
            .with_failing_detail(Endpoint::Character, "CH2");

        assert_eq!(
            source.detail(Endpoint::Character, "CH1").await.unwrap()["name"],
            "Garak"
        );
        assert!(source
            .detail(Endpoint::Character, "CH2")
            .await
            .unwrap_err()
            .is_transient());
        assert!(source
            .detail(Endpoint::Character, "CH3")
            .await
            .unwrap_err()
            .is_not_found());
        assert_eq!(source.detail_calls(), 3);
    }
}
