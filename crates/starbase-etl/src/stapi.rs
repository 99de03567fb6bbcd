use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;
use crate::error::{IngestError, IngestResult};
use crate::source::{detail_from_json, Endpoint, RecordSource, SearchPage};
use crate::throttle::Throttle;

const USER_AGENT: &str = concat!("starbase/", env!("CARGO_PKG_VERSION"));

/// STAPI (Star Trek API) REST client.
///
/// Every request goes through the [`Throttle`]. Failures are reported to
/// the caller and never retried.
#[derive(Debug, Clone)]
pub struct StapiClient {
    http: Client,
    base_url: String,
    page_size: u32,
    throttle: Throttle,
}

impl StapiClient {
    /// Create a new STAPI client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        base_url: impl Into<String>,
        page_size: u32,
        timeout: Duration,
        throttle: Throttle,
    ) -> IngestResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size: page_size.max(1),
            throttle,
        })
    }

    pub fn from_config(config: &Config) -> IngestResult<Self> {
        Self::new(
            config.stapi_base_url.clone(),
            config.page_size,
            config.request_timeout(),
            Throttle::new(config.request_delay()),
        )
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json(&self, url: String, query: &[(&str, String)]) -> IngestResult<Value> {
        self.throttle
            .run(async {
                let response = self
                    .http
                    .get(&url)
                    .query(query)
                    .send()
                    .await
                    .map_err(|e| classify(e, &url))?;

                let status = response.status();
                if status == StatusCode::NOT_FOUND {
                    return Err(IngestError::not_found("resource", url.clone()));
                }
                if !status.is_success() {
                    return Err(IngestError::Http {
                        status: status.as_u16(),
                        url: url.clone(),
                    });
                }

                response.json::<Value>().await.map_err(|e| {
                    if e.is_timeout() {
                        IngestError::Timeout { url: url.clone() }
                    } else {
                        IngestError::Parse {
                            endpoint: url.clone(),
                            message: e.to_string(),
                        }
                    }
                })
            })
            .await
    }
}

fn classify(err: reqwest::Error, url: &str) -> IngestError {
    if err.is_timeout() {
        IngestError::Timeout {
            url: url.to_string(),
        }
    } else {
        IngestError::Request(err)
    }
}

#[async_trait]
impl RecordSource for StapiClient {
    async fn search_page(&self, endpoint: Endpoint, page: u32) -> IngestResult<SearchPage> {
        let url = format!("{}/{}/search", self.base_url, endpoint.path());
        let query = [
            ("pageNumber", page.to_string()),
            ("pageSize", self.page_size.to_string()),
        ];
        let body = self.get_json(url, &query).await?;
        Ok(SearchPage::from_json(endpoint, &body))
    }

    async fn detail(&self, endpoint: Endpoint, uid: &str) -> IngestResult<Value> {
        let url = format!("{}/{}", self.base_url, endpoint.path());
        let body = self.get_json(url, &[("uid", uid.to_string())]).await?;
        detail_from_json(endpoint, uid, body)
    }
}
