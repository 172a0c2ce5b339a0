//! Query/response relay to the remote query service.
//!
//! A relay cycle is two sequential requests: the user's text is submitted to
//! the query endpoint, and only once that succeeded is the answer fetched
//! from the response endpoint. Each cycle carries a correlation id which the
//! response endpoint is expected to echo back in the `X-Correlation-Id`
//! header.
//!
//! Errors are typed here; deciding what to do about them (log, nothing else)
//! is up to the widget.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::config::RelayConfig;

/// Header carrying the correlation id in both directions.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Payload of `POST /query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// The user's raw input.
    pub data: String,
    /// Identifies the cycle this query belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl Query {
    /// A query with a fresh correlation id.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            correlation_id: Some(Uuid::new_v4()),
        }
    }
}

/// Failure of a single request.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Transport failure, including client timeouts.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid endpoint URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The endpoint answered with a non-success status.
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// The response belongs to a different cycle, or could not be attributed.
    #[error("correlation mismatch: expected {expected}, got {}", .received.as_deref().unwrap_or("none"))]
    CorrelationMismatch {
        expected: Uuid,
        received: Option<String>,
    },
}

/// Failure of a relay cycle, by stage.
///
/// The `Display` output is what ends up in the diagnostic log.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Query Error: {0}")]
    Query(#[source] RelayError),

    #[error("Response Error: {0}")]
    Response(#[source] RelayError),
}

/// The two endpoints of the remote query service.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Submit a query. The response body is not inspected.
    async fn submit_query(&self, query: &Query) -> Result<(), RelayError>;

    /// Fetch the answer for the cycle identified by `correlation_id`.
    async fn fetch_response(&self, correlation_id: Option<Uuid>) -> Result<String, RelayError>;
}

/// Run one relay cycle: submit, then fetch.
///
/// The fetch is never issued unless the submission succeeded.
pub async fn run_cycle(backend: &dyn QueryBackend, query: &Query) -> Result<String, CycleError> {
    backend.submit_query(query).await.map_err(CycleError::Query)?;
    backend
        .fetch_response(query.correlation_id)
        .await
        .map_err(CycleError::Response)
}

/// [`QueryBackend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    http: reqwest::Client,
    query_url: Url,
    response_url: Url,
    require_correlation: bool,
}

impl HttpRelay {
    /// Build a relay from configuration.
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Self::with_client(config, builder.build()?)
    }

    /// Build a relay with a custom reqwest client.
    pub fn with_client(config: &RelayConfig, http: reqwest::Client) -> Result<Self, RelayError> {
        let base = Url::parse(&config.base_url)?;
        Ok(Self {
            http,
            query_url: base.join(&config.query_path)?,
            response_url: base.join(&config.response_path)?,
            require_correlation: config.require_correlation,
        })
    }

    pub fn query_url(&self) -> &Url {
        &self.query_url
    }

    pub fn response_url(&self) -> &Url {
        &self.response_url
    }

    fn check_status(url: &Url, status: StatusCode) -> Result<(), RelayError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(RelayError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }

    fn check_correlation(
        &self,
        expected: Option<Uuid>,
        received: Option<&str>,
    ) -> Result<(), RelayError> {
        let Some(expected) = expected else {
            return Ok(());
        };
        match received {
            Some(echo) if echo.parse::<Uuid>().ok() == Some(expected) => Ok(()),
            None if !self.require_correlation => Ok(()),
            _ => Err(RelayError::CorrelationMismatch {
                expected,
                received: received.map(str::to_string),
            }),
        }
    }
}

#[async_trait]
impl QueryBackend for HttpRelay {
    async fn submit_query(&self, query: &Query) -> Result<(), RelayError> {
        debug!(
            name: "relay.query.submit",
            url = %self.query_url,
            correlation_id = ?query.correlation_id,
            "Submitting query"
        );

        let response = self
            .http
            .post(self.query_url.clone())
            .json(query)
            .send()
            .await?;
        Self::check_status(&self.query_url, response.status())
    }

    async fn fetch_response(&self, correlation_id: Option<Uuid>) -> Result<String, RelayError> {
        debug!(
            name: "relay.response.fetch",
            url = %self.response_url,
            correlation_id = ?correlation_id,
            "Fetching response"
        );

        let mut request = self.http.get(self.response_url.clone());
        if let Some(id) = correlation_id {
            request = request.header(CORRELATION_HEADER, id.to_string());
        }
        let response = request.send().await?;
        Self::check_status(&self.response_url, response.status())?;

        let echo = response
            .headers()
            .get(CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.check_correlation(correlation_id, echo.as_deref())?;

        Ok(response.text().await?)
    }
}
