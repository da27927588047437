//! HTTP dataset source.
//!
//! Fetches dataset documents relative to a base URL with a blocking client.
//! Every request carries `Cache-Control: no-store` and `Pragma: no-cache` so
//! an edited dataset is picked up on the next load. Requests are not retried.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};

use crate::error::{Result, TravelRouteError};
use crate::loader::{sanitize_relative_path, DatasetSource};

#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    client: Client,
}

impl HttpSource {
    /// Create a source for documents below `base_url`.
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| TravelRouteError::Http {
                message: e.to_string(),
                status_code: None,
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of a dataset document.
    pub fn url_for(&self, path: &str) -> Result<String> {
        Ok(format!("{}/{}", self.base_url, sanitize_relative_path(path)?))
    }
}

impl DatasetSource for HttpSource {
    fn fetch_text(&self, path: &str) -> Result<String> {
        let url = self.url_for(path)?;
        log::debug!("[HttpSource] GET {}", url);

        let response = self.client.get(&url).send().map_err(|e| {
            TravelRouteError::DocumentUnavailable {
                path: path.to_string(),
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TravelRouteError::DocumentUnavailable {
                path: path.to_string(),
                message: status.to_string(),
            });
        }
        if !status.is_success() {
            return Err(TravelRouteError::Http {
                message: format!("GET {} failed", url),
                status_code: Some(status.as_u16()),
            });
        }

        response.text().map_err(|e| TravelRouteError::DocumentUnavailable {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}
