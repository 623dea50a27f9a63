//! Client error types.
//!
//! Every failed service call surfaces as an [`Error`].  HTTP failures are
//! classified by service error code first and by status second, so callers
//! can match on `ResourceNotFound`, `ResourceExists` and friends instead of
//! inspecting raw status codes.

use http::{HeaderMap, StatusCode};
use thiserror::Error;

use crate::xml;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Details of a non-success HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseError {
    /// HTTP status returned by the service.
    pub status: StatusCode,
    /// Service error code (`x-ms-error-code` header or body), if any.
    pub code: Option<String>,
    /// Human readable message from the body, or the status reason.
    pub message: String,
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({}): {}", self.status, code, self.message),
            None => write!(f, "{}: {}", self.status, self.message),
        }
    }
}

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The addressed resource does not exist (404 or a `*NotFound` code).
    #[error("resource not found: {0}")]
    ResourceNotFound(ResponseError),

    /// The resource already exists (409 or a `*AlreadyExists` code).
    #[error("resource already exists: {0}")]
    ResourceExists(ResponseError),

    /// A precondition (etag, lease, sequence number) did not hold.
    #[error("resource modified: {0}")]
    ResourceModified(ResponseError),

    /// Conditional read matched the current version (304).
    #[error("resource not modified: {0}")]
    ResourceNotModified(ResponseError),

    /// Credentials were missing, invalid or lacked permission.
    #[error("authentication failed: {0}")]
    ClientAuthentication(ResponseError),

    /// Any other non-success response.
    #[error("http response error: {0}")]
    HttpResponse(ResponseError),

    /// A caller-supplied argument was rejected before any request was sent.
    #[error("{0}")]
    InvalidArgument(String),

    /// A long-running operation finished in a failed or cancelled state.
    #[error("operation {status}: {message}")]
    OperationFailed {
        status: String,
        code: Option<String>,
        message: String,
    },

    /// An Avro schema could not be parsed or is not a record schema.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Content could not be encoded or decoded with its schema.
    #[error("invalid content: {0}")]
    InvalidContent(String),

    /// A buffered producer failed to deliver a batch.
    #[error("failed to send events to partition {partition_id}: {message}")]
    EventSend {
        partition_id: String,
        message: String,
    },

    /// A response body did not have the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// XML could not be parsed.
    #[error("xml error: {0}")]
    Xml(String),

    /// The HTTP transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build an error from a failed response.
    pub fn from_response(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Self {
        let (body_code, body_message) = parse_error_body(headers, body);
        let code = headers
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or(body_code);
        let message = body_message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string()
        });
        let detail = ResponseError {
            status,
            code,
            message,
        };

        if let Some(kind) = detail.code.as_deref().and_then(kind_for_code) {
            return kind.wrap(detail);
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::ClientAuthentication(detail),
            StatusCode::NOT_FOUND => Error::ResourceNotFound(detail),
            StatusCode::CONFLICT => Error::ResourceExists(detail),
            StatusCode::PRECONDITION_FAILED => Error::ResourceModified(detail),
            StatusCode::NOT_MODIFIED => Error::ResourceNotModified(detail),
            _ => Error::HttpResponse(detail),
        }
    }

    /// The HTTP response details, when this error came from the service.
    pub fn response(&self) -> Option<&ResponseError> {
        match self {
            Error::ResourceNotFound(r)
            | Error::ResourceExists(r)
            | Error::ResourceModified(r)
            | Error::ResourceNotModified(r)
            | Error::ClientAuthentication(r)
            | Error::HttpResponse(r) => Some(r),
            _ => None,
        }
    }

    /// HTTP status of the failed response, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(|r| r.status)
    }

    /// Service error code of the failed response, if any.
    pub fn error_code(&self) -> Option<&str> {
        self.response().and_then(|r| r.code.as_deref())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ResourceNotFound(_))
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub(crate) fn decode(message: impl std::fmt::Display) -> Self {
        Error::Decode(message.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    NotFound,
    Exists,
    Modified,
    Authentication,
}

impl Kind {
    fn wrap(self, detail: ResponseError) -> Error {
        match self {
            Kind::NotFound => Error::ResourceNotFound(detail),
            Kind::Exists => Error::ResourceExists(detail),
            Kind::Modified => Error::ResourceModified(detail),
            Kind::Authentication => Error::ClientAuthentication(detail),
        }
    }
}

/// Storage error codes whose meaning is more specific than their status.
fn kind_for_code(code: &str) -> Option<Kind> {
    match code {
        "ConditionNotMet" | "SourceConditionNotMet" | "TargetConditionNotMet" => {
            Some(Kind::Modified)
        }
        "AuthenticationFailed"
        | "AuthorizationFailure"
        | "AuthorizationPermissionMismatch"
        | "InsufficientAccountPermissions"
        | "InvalidAuthenticationInfo" => Some(Kind::Authentication),
        _ if code.ends_with("NotFound") => Some(Kind::NotFound),
        _ if code.ends_with("AlreadyExists") || code.ends_with("BeingCreated") => {
            Some(Kind::Exists)
        }
        _ => None,
    }
}

/// Extract `(code, message)` from an XML or JSON error body.
fn parse_error_body(headers: &HeaderMap, body: &[u8]) -> (Option<String>, Option<String>) {
    if body.is_empty() {
        return (None, None);
    }
    let content_type = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim_start();

    if content_type.contains("json") || trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
            let err = value.get("error").unwrap_or(&value);
            let code = err.get("code").and_then(|c| c.as_str()).map(str::to_string);
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string);
            return (code, message);
        }
    }

    if trimmed.starts_with('<') {
        if let Ok(root) = xml::parse_document(&text) {
            let code = root.child_text("Code").map(str::to_string);
            let message = root
                .child_text("Message")
                .or_else(|| root.child_text("Detail"))
                .map(|m| m.lines().next().unwrap_or(m).to_string());
            return (code, message);
        }
    }

    (None, Some(text.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, v.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_status_mapping() {
        let empty = HeaderMap::new();
        assert!(Error::from_response(StatusCode::NOT_FOUND, &empty, b"").is_not_found());
        assert!(matches!(
            Error::from_response(StatusCode::CONFLICT, &empty, b""),
            Error::ResourceExists(_)
        ));
        assert!(matches!(
            Error::from_response(StatusCode::FORBIDDEN, &empty, b""),
            Error::ClientAuthentication(_)
        ));
        assert!(matches!(
            Error::from_response(StatusCode::PRECONDITION_FAILED, &empty, b""),
            Error::ResourceModified(_)
        ));
        assert!(matches!(
            Error::from_response(StatusCode::BAD_REQUEST, &empty, b""),
            Error::HttpResponse(_)
        ));
    }

    #[test]
    fn test_code_header_overrides_status() {
        let h = headers(&[("x-ms-error-code", "ShareNotFound")]);
        let err = Error::from_response(StatusCode::BAD_REQUEST, &h, b"");
        assert!(err.is_not_found());
        assert_eq!(err.error_code(), Some("ShareNotFound"));
    }

    #[test]
    fn test_condition_not_met_is_modified() {
        let h = headers(&[("x-ms-error-code", "ConditionNotMet")]);
        let err = Error::from_response(StatusCode::NOT_MODIFIED, &h, b"");
        assert!(matches!(err, Error::ResourceModified(_)));
    }

    #[test]
    fn test_xml_error_body() {
        let body = b"<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>LeaseIdMismatchWithFileOperation</Code><Message>The lease ID specified did not match.\nRequestId:abc</Message></Error>";
        let h = headers(&[("content-type", "application/xml")]);
        let err = Error::from_response(StatusCode::PRECONDITION_FAILED, &h, body);
        let resp = err.response().unwrap();
        assert_eq!(resp.code.as_deref(), Some("LeaseIdMismatchWithFileOperation"));
        assert_eq!(resp.message, "The lease ID specified did not match.");
        assert!(matches!(err, Error::ResourceModified(_)));
    }

    #[test]
    fn test_json_error_body() {
        let body = br#"{"error":{"code":"InvalidDocumentBatch","message":"Batch request contains too many records."}}"#;
        let h = headers(&[("content-type", "application/json")]);
        let err = Error::from_response(StatusCode::BAD_REQUEST, &h, body);
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.error_code(), Some("InvalidDocumentBatch"));
        assert!(err.to_string().contains("too many records"));
    }

    #[test]
    fn test_already_exists_code() {
        let h = headers(&[("x-ms-error-code", "PathAlreadyExists")]);
        let err = Error::from_response(StatusCode::BAD_REQUEST, &h, b"");
        assert!(matches!(err, Error::ResourceExists(_)));
    }
}
