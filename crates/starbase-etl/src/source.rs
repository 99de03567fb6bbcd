//! The record-source boundary: paged search plus detail-by-uid lookup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{IngestError, IngestResult};
use crate::record;

/// A searchable collection on the record source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Series,
    Species,
    Organization,
    Performer,
    Character,
    Spacecraft,
    Episode,
}

impl Endpoint {
    /// Path segment, which is also the key wrapping a detail response.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Species => "species",
            Self::Organization => "organization",
            Self::Performer => "performer",
            Self::Character => "character",
            Self::Spacecraft => "spacecraft",
            Self::Episode => "episode",
        }
    }

    /// The list key search responses normally use.
    #[must_use]
    pub const fn plural(self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Species => "species",
            Self::Organization => "organizations",
            Self::Performer => "performers",
            Self::Character => "characters",
            Self::Spacecraft => "spacecrafts",
            Self::Episode => "episodes",
        }
    }

    /// Field that names a record of this endpoint.
    #[must_use]
    pub const fn name_field(self) -> &'static str {
        match self {
            Self::Series | Self::Episode => "title",
            _ => "name",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub items: Vec<Value>,
    pub page_number: u32,
    pub total_pages: Option<u32>,
    pub last: bool,
}

impl SearchPage {
    /// Parse a search response.
    ///
    /// The list may sit under the plural key, the singular key or the
    /// singular plus `s`; none of them present means an empty page. Without
    /// a `page` object the page is taken to be the last one.
    pub fn from_json(endpoint: Endpoint, body: &Value) -> Self {
        let singular = endpoint.path();
        let suffixed = format!("{singular}s");
        let items = record::list(body, &[endpoint.plural(), singular, &suffixed]).to_vec();

        let Some(page) = body.get("page").filter(|p| p.is_object()) else {
            return Self {
                items,
                last: true,
                ..Self::default()
            };
        };

        let page_number = record::integer(page, "pageNumber")
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);
        let total_pages = record::integer(page, "totalPages").and_then(|n| u32::try_from(n).ok());
        let last = match page.get("lastPage").and_then(Value::as_bool) {
            Some(last) => last,
            None => total_pages.map_or(true, |total| page_number + 1 >= total),
        };

        Self {
            items,
            page_number,
            total_pages,
            last,
        }
    }
}

/// Unwrap a detail response `{"<endpoint>": {...}}`.
pub fn detail_from_json(endpoint: Endpoint, uid: &str, mut body: Value) -> IngestResult<Value> {
    match body.get_mut(endpoint.path()).map(Value::take) {
        Some(detail) if detail.is_object() => Ok(detail),
        _ => Err(IngestError::not_found(endpoint.path(), uid)),
    }
}

/// Something that can be searched page by page and queried by uid.
#[async_trait]
pub trait RecordSource: Send + Sync + fmt::Debug {
    async fn search_page(&self, endpoint: Endpoint, page: u32) -> IngestResult<SearchPage>;

    /// The detail record for `uid`, already unwrapped.
    async fn detail(&self, endpoint: Endpoint, uid: &str) -> IngestResult<Value>;
}

/// Collect every record of `endpoint`, stopping at the last page, at an
/// empty page, or after `max_pages`.
///
/// A failure on the first page is returned; a later failure ends paging
/// with the records gathered so far.
pub async fn fetch_all(
    source: &dyn RecordSource,
    endpoint: Endpoint,
    max_pages: Option<u32>,
) -> IngestResult<Vec<Value>> {
    let mut all = Vec::new();
    let mut page_number = 0;

    loop {
        if max_pages.is_some_and(|max| page_number >= max) {
            break;
        }
        let page = match source.search_page(endpoint, page_number).await {
            Ok(page) => page,
            Err(e) if page_number == 0 => return Err(e),
            Err(e) => {
                log::warn!("{endpoint} page {page_number} failed, keeping {} records: {e}", all.len());
                break;
            }
        };
        if page.items.is_empty() {
            break;
        }
        log::debug!(
            "{endpoint} page {page_number}: {} records{}",
            page.items.len(),
            page.total_pages
                .map(|t| format!(" of {t} pages"))
                .unwrap_or_default()
        );
        all.extend(page.items);
        if page.last {
            break;
        }
        page_number += 1;
    }

    log::info!("Fetched {} {} records", all.len(), endpoint);
    Ok(all)
}
