//! HTTP pipeline shared by every client.
//!
//! A [`Pipeline`] owns a `reqwest::Client`, an optional [`Credential`] and
//! the per-service options.  For each attempt it stamps the standard
//! headers (`x-ms-version` or the `api-version` query parameter, `x-ms-date`,
//! `x-ms-client-request-id`, `User-Agent`), authorizes the request, sends it,
//! and records metrics.  Transient failures are retried with exponential
//! backoff or the service's `Retry-After` hint.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use http::header::{HeaderValue, USER_AGENT};
use http::{HeaderMap, StatusCode};
use rand::Rng;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::Credential;
use crate::errors::{Error, Result};
use crate::metrics;
use crate::xml::{self, XmlNode};

/// `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("azsdk-rust/", env!("CARGO_PKG_VERSION"));

/// How the service expects its API version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiVersion {
    /// `x-ms-version` header (storage).
    Header(String),
    /// `api-version` query parameter (Cognitive Services, ARM, Service Bus).
    Query(String),
    /// Version is part of the URL path.
    None,
}

/// Retry behaviour for transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(800),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryOptions {
    /// Delay before retry number `attempt` (0-based), with +/-20% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff);
        let jitter: f64 = rand::thread_rng().gen_range(0.8..1.2);
        base.mul_f64(jitter).min(self.max_backoff)
    }
}

/// Per-service pipeline options.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub api_version: ApiVersion,
    pub user_agent: String,
    pub retry: RetryOptions,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl PipelineOptions {
    pub fn new(api_version: ApiVersion) -> Self {
        Self {
            api_version,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry: RetryOptions::default(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Caller-facing client options.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub retry: RetryOptions,
    /// Per-attempt timeout; defaults to 60 seconds.
    pub timeout: Option<Duration>,
    /// Override the service's default API version.
    pub api_version: Option<String>,
}

impl ClientOptions {
    pub(crate) fn pipeline_options(&self, default: ApiVersion) -> PipelineOptions {
        let api_version = match (default, &self.api_version) {
            (ApiVersion::Header(_), Some(v)) => ApiVersion::Header(v.clone()),
            (ApiVersion::Query(_), Some(v)) => ApiVersion::Query(v.clone()),
            (default, _) => default,
        };
        let mut options = PipelineOptions::new(api_version).with_retry(self.retry.clone());
        if let Some(timeout) = self.timeout {
            options = options.with_timeout(timeout);
        }
        options
    }
}

/// A buffered successful response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parse a header value.
    pub fn parse_header<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.header(name).and_then(|v| v.trim().parse().ok())
    }

    /// Required header; missing is a decode error.
    pub fn require_header(&self, name: &str) -> Result<&str> {
        self.header(name)
            .ok_or_else(|| Error::decode(format!("response is missing the {} header", name)))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn xml(&self) -> Result<XmlNode> {
        xml::parse_body(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Shared HTTP pipeline.  Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    client: reqwest::Client,
    credential: Option<Arc<dyn Credential>>,
    options: Arc<PipelineOptions>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("options", &self.options)
            .field("authorized", &self.credential.is_some())
            .finish()
    }
}

impl Pipeline {
    pub fn new(credential: Option<Arc<dyn Credential>>, options: PipelineOptions) -> Self {
        Self::with_client(reqwest::Client::new(), credential, options)
    }

    pub fn with_client(
        client: reqwest::Client,
        credential: Option<Arc<dyn Credential>>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            client,
            credential,
            options: Arc::new(options),
        }
    }

    /// The underlying client, for building requests.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Send a request built with [`Pipeline::client`]; only 2xx succeeds.
    pub async fn send(&self, builder: reqwest::RequestBuilder) -> Result<RawResponse> {
        self.send_request(builder.build()?, |_| false).await
    }

    /// Send a request, additionally accepting statuses for which `accept` returns true.
    pub async fn send_accepting(
        &self,
        builder: reqwest::RequestBuilder,
        accept: impl Fn(StatusCode) -> bool,
    ) -> Result<RawResponse> {
        self.send_request(builder.build()?, accept).await
    }

    /// Run the retry loop for a prepared request.
    pub async fn send_request(
        &self,
        request: reqwest::Request,
        accept: impl Fn(StatusCode) -> bool,
    ) -> Result<RawResponse> {
        let method = request.method().as_str().to_string();
        let retry = &self.options.retry;
        let mut attempt: u32 = 0;

        loop {
            let mut req = request
                .try_clone()
                .ok_or_else(|| Error::invalid("request body is a stream and cannot be retried"))?;
            self.prepare(&mut req).await?;
            debug!("{} {} (attempt {})", method, redact(req.url()), attempt + 1);

            let start = Instant::now();
            let outcome = match self.client.execute(req).await {
                Ok(resp) => {
                    let status = resp.status();
                    let headers = resp.headers().clone();
                    resp.bytes().await.map(|body| (status, headers, body))
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok((status, headers, body)) => {
                    metrics::record_request(&method, Some(status.as_u16()), start.elapsed());
                    if status.is_success() || accept(status) {
                        return Ok(RawResponse {
                            status,
                            headers,
                            body,
                        });
                    }
                    if is_retryable_status(status) && attempt < retry.max_retries {
                        let delay =
                            retry_after(&headers).unwrap_or_else(|| retry.backoff(attempt));
                        warn!(
                            "{} returned {}, retrying in {:?} ({}/{})",
                            method,
                            status,
                            delay,
                            attempt + 1,
                            retry.max_retries
                        );
                        metrics::record_retry(status.as_str());
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::from_response(status, &headers, &body));
                }
                Err(e) => {
                    metrics::record_request(&method, None, start.elapsed());
                    if is_retryable_transport(&e) && attempt < retry.max_retries {
                        let delay = retry.backoff(attempt);
                        warn!(
                            "{} transport error: {}, retrying in {:?} ({}/{})",
                            method,
                            e,
                            delay,
                            attempt + 1,
                            retry.max_retries
                        );
                        metrics::record_retry("transport");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::Transport(e));
                }
            }
        }
    }

    async fn prepare(&self, req: &mut reqwest::Request) -> Result<()> {
        match &self.options.api_version {
            ApiVersion::Header(version) => {
                req.headers_mut()
                    .insert("x-ms-version", header_value(version)?);
            }
            ApiVersion::Query(version) => {
                let present = req.url().query_pairs().any(|(k, _)| k == "api-version");
                if !present {
                    req.url_mut()
                        .query_pairs_mut()
                        .append_pair("api-version", version);
                }
            }
            ApiVersion::None => {}
        }

        let headers = req.headers_mut();
        headers.insert(
            "x-ms-date",
            header_value(&httpdate::fmt_http_date(SystemTime::now()))?,
        );
        if !headers.contains_key("x-ms-client-request-id") {
            headers.insert(
                "x-ms-client-request-id",
                header_value(&uuid::Uuid::new_v4().to_string())?,
            );
        }
        headers.insert(USER_AGENT, header_value(&self.options.user_agent)?);
        *req.timeout_mut() = Some(self.options.timeout);

        if let Some(credential) = &self.credential {
            credential.authorize(req).await?;
        }
        Ok(())
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::invalid(format!("invalid header value: {}", e)))
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_transport(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request() || e.is_body()
}

/// Parse `retry-after-ms`, `x-ms-retry-after-ms`, or `Retry-After` (seconds or HTTP date).
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    for name in ["retry-after-ms", "x-ms-retry-after-ms"] {
        if let Some(ms) = get(name).and_then(|v| v.trim().parse::<u64>().ok()) {
            return Some(Duration::from_millis(ms));
        }
    }
    let value = get("retry-after")?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = httpdate::parse_http_date(value).ok()?;
    Some(
        when.duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}

/// URL without its query string, so SAS signatures stay out of logs.
fn redact(url: &url::Url) -> String {
    let mut shown = url.clone();
    if shown.query().is_some() {
        shown.set_query(Some("..."));
    }
    shown.to_string()
}
