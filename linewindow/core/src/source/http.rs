//! HTTP Byte Source
//!
//! Opens a streaming GET request per session:
//!
//! ```text
//! GET {base_url}{endpoint_path}?{category_param}={value}
//! ```
//!
//! The response body is consumed as raw chunks with no overall timeout,
//! since feeds are long-lived. Only connection establishment is bounded.
//! Dropping the returned stream drops the response, which closes the
//! connection. A non-2xx answer becomes [`SourceError::Status`] carrying at
//! most [`HttpSource::MAX_ERROR_BODY`] bytes of the body.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::{ByteSource, ByteStream, SourceError};
use crate::category::Category;

/// Streaming HTTP source
#[derive(Clone, Debug)]
pub struct HttpSource {
    base_url: String,
    endpoint_path: String,
    category_param: String,
    /// Per-category query values, for backends keyed by other labels
    category_values: HashMap<Category, String>,
    http_client: reqwest::Client,
}

impl HttpSource {
    /// Default streaming endpoint path
    pub const DEFAULT_ENDPOINT: &'static str = "/read_dataset";
    /// Default name of the category query parameter
    pub const DEFAULT_CATEGORY_PARAM: &'static str = "attack_type";
    /// Longest prefix of an error response body kept in [`SourceError::Status`]
    pub const MAX_ERROR_BODY: usize = 4096;

    /// Create a source with default endpoint and parameter names
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SourceError> {
        Self::builder(base_url).build()
    }

    /// Start building a customised source
    pub fn builder(base_url: impl Into<String>) -> HttpSourceBuilder {
        HttpSourceBuilder {
            base_url: base_url.into(),
            endpoint_path: Self::DEFAULT_ENDPOINT.to_string(),
            category_param: Self::DEFAULT_CATEGORY_PARAM.to_string(),
            category_values: HashMap::new(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Full URL of the streaming endpoint, without query
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint_path
        )
    }

    /// Query value sent for `category`
    #[must_use]
    pub fn category_value(&self, category: Category) -> &str {
        self.category_values
            .get(&category)
            .map_or(category.name(), String::as_str)
    }
}

/// Builder for [`HttpSource`]
#[derive(Clone, Debug)]
pub struct HttpSourceBuilder {
    base_url: String,
    endpoint_path: String,
    category_param: String,
    category_values: HashMap<Category, String>,
    connect_timeout: Duration,
}

impl HttpSourceBuilder {
    /// Set the endpoint path (a leading `/` is added if missing)
    #[must_use]
    pub fn endpoint_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.endpoint_path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    /// Set the query parameter carrying the category
    #[must_use]
    pub fn category_param(mut self, param: impl Into<String>) -> Self {
        self.category_param = param.into();
        self
    }

    /// Override the query value sent for one category
    #[must_use]
    pub fn category_value(mut self, category: Category, value: impl Into<String>) -> Self {
        self.category_values.insert(category, value.into());
        self
    }

    /// Bound connection establishment
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build the source
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] if the HTTP client cannot be built.
    pub fn build(self) -> Result<HttpSource, SourceError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(HttpSource {
            base_url: self.base_url,
            endpoint_path: self.endpoint_path,
            category_param: self.category_param,
            category_values: self.category_values,
            http_client,
        })
    }
}

#[async_trait]
impl ByteSource for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn open(&self, category: Category) -> Result<ByteStream, SourceError> {
        let url = self.endpoint_url();
        let value = self.category_value(category);

        tracing::debug!(url = %url, param = %self.category_param, value = %value, "Opening HTTP stream");

        let response = self
            .http_client
            .get(&url)
            .query(&[(self.category_param.as_str(), value)])
            .send()
            .await
            .map_err(|e| SourceError::Connect {
                url: url.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = error_body(response).await;
            return Err(SourceError::Status { status, body });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| SourceError::Read(e.to_string())));

        Ok(stream.boxed())
    }
}

/// Read at most [`HttpSource::MAX_ERROR_BODY`] bytes of a failed response
async fn error_body(mut response: reqwest::Response) -> String {
    let mut body = Vec::new();
    while body.len() < HttpSource::MAX_ERROR_BODY {
        match response.chunk().await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Error body truncated by read failure");
                break;
            }
        }
    }
    body.truncate(HttpSource::MAX_ERROR_BODY);
    String::from_utf8_lossy(&body).into_owned()
}
