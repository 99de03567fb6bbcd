use serde_json::Value;
use std::collections::HashMap;

use starbase_core::reconcile::normalize::fold;

use crate::error::IngestResult;
use crate::record;
use crate::source::{fetch_all, Endpoint, RecordSource};

/// Name to source-uid lookup for one endpoint.
///
/// Built once per pass and handed to the code that needs it. Keys are
/// folded names, so "René" and "Rene" share an entry; the first uid seen
/// for a name wins. Records carrying a `registry` are also indexed by
/// (name, registry), since ship names repeat across refits.
#[derive(Debug, Clone, Default)]
pub struct UidCache {
    endpoint: Option<Endpoint>,
    by_name: HashMap<String, String>,
    by_registry: HashMap<(String, String), String>,
}

impl UidCache {
    /// Page through `endpoint` and index every record that has a uid.
    pub async fn build(
        source: &dyn RecordSource,
        endpoint: Endpoint,
        max_pages: Option<u32>,
    ) -> IngestResult<Self> {
        let records = fetch_all(source, endpoint, max_pages).await?;
        let cache = Self::from_records(endpoint, &records);
        log::info!("Cached {} {} uids", cache.len(), endpoint);
        Ok(cache)
    }

    pub fn from_records(endpoint: Endpoint, records: &[Value]) -> Self {
        let mut by_name = HashMap::new();
        let mut by_registry = HashMap::new();
        for rec in records {
            let (Some(name), Some(uid)) = (
                record::text(rec, endpoint.name_field()),
                record::text(rec, "uid"),
            ) else {
                continue;
            };
            if let Some(registry) = record::text(rec, "registry") {
                by_registry
                    .entry((fold(name), fold(registry)))
                    .or_insert_with(|| uid.to_string());
            }
            by_name.entry(fold(name)).or_insert_with(|| uid.to_string());
        }
        Self {
            endpoint: Some(endpoint),
            by_name,
            by_registry,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.by_name.get(&fold(name)).map(String::as_str)
    }

    /// Look up by name and registry; without a registry this is [`get`].
    ///
    /// [`get`]: Self::get
    pub fn get_registered(&self, name: &str, registry: Option<&str>) -> Option<&str> {
        match registry {
            Some(registry) => self
                .by_registry
                .get(&(fold(name), fold(registry)))
                .map(String::as_str),
            None => self.get(name),
        }
    }

    pub const fn endpoint(&self) -> Option<Endpoint> {
        self.endpoint
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
