//! Long-running operation polling.
//!
//! Services that run work asynchronously answer the initial request with
//! `202 Accepted` and an `Operation-Location` header.  A [`Poller`] GETs that
//! URL until the job reaches a terminal state, then hands the final body to
//! its [`LroHandler`] to build the typed result.  A poller can be suspended
//! into a continuation token and resumed later, possibly in another process.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::{Error, Result};
use crate::metrics;
use crate::pipeline::{retry_after, Pipeline, RawResponse};

/// State of a long-running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LroStatus {
    NotStarted,
    Running,
    Succeeded,
    PartiallySucceeded,
    Failed,
    Cancelled,
}

impl LroStatus {
    /// Parse a service status string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "notstarted" => Some(LroStatus::NotStarted),
            "running" | "inprogress" | "cancelling" => Some(LroStatus::Running),
            "succeeded" => Some(LroStatus::Succeeded),
            "partiallysucceeded" | "partiallycompleted" => Some(LroStatus::PartiallySucceeded),
            "failed" => Some(LroStatus::Failed),
            "cancelled" | "canceled" => Some(LroStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, LroStatus::NotStarted | LroStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LroStatus::NotStarted => "notStarted",
            LroStatus::Running => "running",
            LroStatus::Succeeded => "succeeded",
            LroStatus::PartiallySucceeded => "partiallySucceeded",
            LroStatus::Failed => "failed",
            LroStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for LroStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service-specific behaviour plugged into a [`Poller`].
pub trait LroHandler: Send + Sync {
    type Output: Send;

    /// Read the status from a status-monitor body.
    fn status(&self, body: &Value) -> Result<LroStatus> {
        let raw = body
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::decode("operation status is missing"))?;
        LroStatus::parse(raw).ok_or_else(|| Error::decode(format!("unknown status '{}'", raw)))
    }

    /// URL to GET for the next status check.
    fn poll_url(&self, operation_location: &url::Url) -> url::Url {
        operation_location.clone()
    }

    /// Called with every status body, before the terminal check.
    fn on_progress(&mut self, _body: &Value) {}

    /// Build the final result from the terminal body.
    fn finish<'a>(&'a self, pipeline: &'a Pipeline, body: Value) -> BoxFuture<'a, Result<Self::Output>>;

    /// Extra state to carry in continuation tokens.
    fn continuation_state(&self) -> Value {
        Value::Null
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContinuationToken {
    operation_location: String,
    #[serde(default)]
    state: Value,
}

/// Decode a continuation token into the operation URL and handler state.
pub fn decode_continuation_token(token: &str) -> Result<(url::Url, Value)> {
    let raw = BASE64_STANDARD
        .decode(token.trim())
        .map_err(|e| Error::invalid(format!("invalid continuation token: {}", e)))?;
    let parsed: ContinuationToken = serde_json::from_slice(&raw)
        .map_err(|e| Error::invalid(format!("invalid continuation token: {}", e)))?;
    let url = url::Url::parse(&parsed.operation_location)
        .map_err(|e| Error::invalid(format!("invalid operation location: {}", e)))?;
    Ok((url, parsed.state))
}

/// Drives one long-running operation.
pub struct Poller<H: LroHandler> {
    pipeline: Pipeline,
    operation_location: url::Url,
    handler: H,
    status: LroStatus,
    last_body: Option<Value>,
    polling_interval: Duration,
    next_delay: Option<Duration>,
}

impl<H: LroHandler> std::fmt::Debug for Poller<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("operation_location", &self.operation_location.as_str())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl<H: LroHandler> Poller<H> {
    pub fn new(
        pipeline: Pipeline,
        operation_location: url::Url,
        handler: H,
        polling_interval: Duration,
    ) -> Self {
        Self {
            pipeline,
            operation_location,
            handler,
            status: LroStatus::NotStarted,
            last_body: None,
            polling_interval,
            next_delay: None,
        }
    }

    /// Start from the initial `202 Accepted` response.
    pub fn from_response(
        pipeline: Pipeline,
        response: &RawResponse,
        handler: H,
        polling_interval: Duration,
    ) -> Result<Self> {
        let location = response
            .header("operation-location")
            .ok_or_else(|| Error::decode("response is missing the Operation-Location header"))?;
        let url = url::Url::parse(location)
            .map_err(|e| Error::decode(format!("invalid Operation-Location: {}", e)))?;
        let mut poller = Self::new(pipeline, url, handler, polling_interval);
        poller.next_delay = retry_after(&response.headers);
        info!("Started long-running operation at {}", poller.operation_location.path());
        Ok(poller)
    }

    pub fn status(&self) -> LroStatus {
        self.status
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn operation_location(&self) -> &url::Url {
        &self.operation_location
    }

    /// Body of the most recent status check.
    pub fn last_response(&self) -> Option<&Value> {
        self.last_body.as_ref()
    }

    /// Opaque token that resumes this operation.
    pub fn continuation_token(&self) -> Result<String> {
        let token = ContinuationToken {
            operation_location: self.operation_location.to_string(),
            state: self.handler.continuation_state(),
        };
        Ok(BASE64_STANDARD.encode(serde_json::to_vec(&token)?))
    }

    /// Perform one status check.
    pub async fn poll(&mut self) -> Result<LroStatus> {
        let url = self.handler.poll_url(&self.operation_location);
        let response = self.pipeline.send(self.pipeline.client().get(url)).await?;
        let body: Value = response.json()?;

        self.handler.on_progress(&body);
        let status = self.handler.status(&body)?;
        if status != self.status {
            info!("Operation status changed: {} -> {}", self.status, status);
        }
        metrics::record_poll(status.as_str());
        self.status = status;
        self.next_delay = retry_after(&response.headers);
        self.last_body = Some(body);
        Ok(status)
    }

    /// Poll until the operation is terminal and build its result.
    pub async fn result(mut self) -> Result<H::Output> {
        loop {
            if self.status.is_terminal() && self.last_body.is_some() {
                break;
            }
            if self.last_body.is_some() {
                let delay = self.next_delay.unwrap_or(self.polling_interval);
                debug!("Operation still {}; sleeping {:?}", self.status, delay);
                tokio::time::sleep(delay).await;
            }
            self.poll().await?;
        }

        let body = self.last_body.take().unwrap_or(Value::Null);
        match self.status {
            LroStatus::Failed | LroStatus::Cancelled => {
                let (code, message) = operation_error(&body);
                Err(Error::OperationFailed {
                    status: self.status.to_string(),
                    code,
                    message: message
                        .unwrap_or_else(|| format!("operation {}", self.status.as_str())),
                })
            }
            _ => self.handler.finish(&self.pipeline, body).await,
        }
    }
}

/// First `(code, message)` in a failed status body.
fn operation_error(body: &Value) -> (Option<String>, Option<String>) {
    let candidates = [
        body.get("error"),
        body.get("errors").and_then(|e| e.get(0)),
        body.pointer("/analyzeResult/errors/0"),
    ];
    for err in candidates.into_iter().flatten() {
        let code = err.get("code").and_then(Value::as_str).map(str::to_string);
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        if code.is_some() || message.is_some() {
            return (code, message);
        }
    }
    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(LroStatus::parse("notStarted"), Some(LroStatus::NotStarted));
        assert_eq!(LroStatus::parse("RUNNING"), Some(LroStatus::Running));
        assert_eq!(
            LroStatus::parse("partiallyCompleted"),
            Some(LroStatus::PartiallySucceeded)
        );
        assert_eq!(LroStatus::parse("canceled"), Some(LroStatus::Cancelled));
        assert_eq!(LroStatus::parse("cancelled"), Some(LroStatus::Cancelled));
        assert_eq!(LroStatus::parse("cancelling"), Some(LroStatus::Running));
        assert_eq!(LroStatus::parse("bogus"), None);
        assert!(LroStatus::Failed.is_terminal());
        assert!(!LroStatus::NotStarted.is_terminal());
    }

    #[test]
    fn test_continuation_token_round_trip() {
        let token = ContinuationToken {
            operation_location: "https://lang.example.com/jobs/1".to_string(),
            state: serde_json::json!({"docIdOrder": ["1", "2"]}),
        };
        let encoded = BASE64_STANDARD.encode(serde_json::to_vec(&token).unwrap());
        let (url, state) = decode_continuation_token(&encoded).unwrap();
        assert_eq!(url.path(), "/jobs/1");
        assert_eq!(state["docIdOrder"][1], "2");
        assert!(decode_continuation_token("not-a-token").is_err());
    }

    #[test]
    fn test_operation_error_shapes() {
        let ta = serde_json::json!({"status": "failed", "errors": [{"code": "InvalidRequest", "message": "bad"}]});
        assert_eq!(
            operation_error(&ta),
            (Some("InvalidRequest".into()), Some("bad".into()))
        );
        let fr = serde_json::json!({"status": "failed", "analyzeResult": {"errors": [{"code": "2005", "message": "unreadable"}]}});
        assert_eq!(operation_error(&fr).0.as_deref(), Some("2005"));
        assert_eq!(operation_error(&serde_json::json!({})), (None, None));
    }
}
