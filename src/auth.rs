//! Request credentials.
//!
//! Every client authorizes its requests through a [`Credential`], which
//! mutates the outgoing `reqwest::Request` just before it is sent.  The
//! pipeline calls it once per attempt so signatures always cover the final
//! headers (including a fresh `x-ms-date`).
//!
//! Supported schemes:
//! - Storage Shared Key (`Authorization: SharedKey {account}:{signature}`)
//! - SAS tokens appended to the query string
//! - OAuth bearer tokens from a [`TokenCredential`], cached until close to expiry
//! - API keys sent in a fixed header (`Ocp-Apim-Subscription-Key`)
//! - Service Bus shared access signatures

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::BoxFuture;
use hmac::{Hmac, Mac};
use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use sha2::Sha256;
use tracing::debug;

use crate::errors::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Bearer tokens are refreshed when they expire within this window.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// Something that can authorize an outgoing request.
pub trait Credential: Send + Sync + 'static {
    /// Add authorization material to `request`.
    fn authorize<'a>(&'a self, request: &'a mut reqwest::Request) -> BoxFuture<'a, Result<()>>;
}

/// HMAC-SHA256 of `data` keyed with `key`, base64 encoded.
pub fn hmac_sha256_base64(key: &[u8], data: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::invalid(format!("HMAC key error: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::invalid(format!("invalid header value: {}", e)))
}

// ── Shared Key ──────────────────────────────────────────────────────

/// Storage account name and key.
#[derive(Clone)]
pub struct SharedKeyCredential {
    account: String,
    key: Vec<u8>,
}

impl std::fmt::Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl SharedKeyCredential {
    /// Build from an account name and its base64 encoded key.
    pub fn new(account: impl Into<String>, key_base64: &str) -> Result<Self> {
        let key = BASE64_STANDARD
            .decode(key_base64.trim())
            .map_err(|e| Error::invalid(format!("account key is not valid base64: {}", e)))?;
        Ok(Self {
            account: account.into(),
            key,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Sign an arbitrary string-to-sign with the account key.
    pub fn sign(&self, string_to_sign: &str) -> Result<String> {
        hmac_sha256_base64(&self.key, string_to_sign)
    }

    /// Build the Shared Key string-to-sign for a request.
    ///
    /// ```text
    /// VERB\n
    /// Content-Encoding\n
    /// Content-Language\n
    /// Content-Length\n
    /// Content-MD5\n
    /// Content-Type\n
    /// Date\n
    /// If-Modified-Since\n
    /// If-Match\n
    /// If-None-Match\n
    /// If-Unmodified-Since\n
    /// Range\n
    /// CanonicalizedHeaders
    /// CanonicalizedResource
    /// ```
    pub fn string_to_sign(&self, request: &reqwest::Request) -> String {
        let headers = request.headers();
        let get = |name: &str| -> &str {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
        };

        let content_length = match headers.get(http::header::CONTENT_LENGTH) {
            Some(v) => v.to_str().unwrap_or("").to_string(),
            None => request
                .body()
                .and_then(|b| b.as_bytes())
                .map(|b| b.len().to_string())
                .unwrap_or_default(),
        };
        let content_length = if content_length == "0" {
            ""
        } else {
            content_length.as_str()
        };

        let mut sts = format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n",
            request.method().as_str(),
            get("content-encoding"),
            get("content-language"),
            content_length,
            get("content-md5"),
            get("content-type"),
            get("date"),
            get("if-modified-since"),
            get("if-match"),
            get("if-none-match"),
            get("if-unmodified-since"),
            get("range"),
        );

        let mut ms_headers: Vec<(String, String)> = headers
            .iter()
            .filter(|(k, _)| k.as_str().starts_with("x-ms-"))
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or("").trim().to_string(),
                )
            })
            .collect();
        ms_headers.sort_by(|a, b| a.0.cmp(&b.0));
        for (k, v) in &ms_headers {
            sts.push_str(&format!("{}:{}\n", k, v));
        }

        sts.push_str(&self.canonicalized_resource(request.url()));
        sts
    }

    fn canonicalized_resource(&self, url: &url::Url) -> String {
        let mut resource = format!("/{}{}", self.account, url.path());
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in url.query_pairs() {
            params
                .entry(k.to_lowercase())
                .or_default()
                .push(v.into_owned());
        }
        for (k, mut values) in params {
            values.sort();
            resource.push_str(&format!("\n{}:{}", k, values.join(",")));
        }
        resource
    }
}

impl Credential for SharedKeyCredential {
    fn authorize<'a>(&'a self, request: &'a mut reqwest::Request) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let signature = self.sign(&self.string_to_sign(request))?;
            let value = header_value(&format!("SharedKey {}:{}", self.account, signature))?;
            request.headers_mut().insert(AUTHORIZATION, value);
            Ok(())
        })
    }
}

// ── SAS ─────────────────────────────────────────────────────────────

/// A shared access signature appended to every request URL.
#[derive(Debug, Clone)]
pub struct SasCredential {
    params: Vec<(String, String)>,
}

impl SasCredential {
    /// Build from a SAS token (with or without the leading `?`).
    pub fn new(token: &str) -> Self {
        let token = token.strip_prefix('?').unwrap_or(token);
        let params = url::form_urlencoded::parse(token.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { params }
    }

    /// Append the SAS parameters the URL does not already carry.
    pub fn apply(&self, url: &mut url::Url) {
        let existing: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        let missing: Vec<&(String, String)> = self
            .params
            .iter()
            .filter(|(k, _)| !existing.iter().any(|e| e == k))
            .collect();
        if missing.is_empty() {
            return;
        }
        let mut pairs = url.query_pairs_mut();
        for (k, v) in missing {
            pairs.append_pair(k, v);
        }
    }
}

impl Credential for SasCredential {
    fn authorize<'a>(&'a self, request: &'a mut reqwest::Request) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.apply(request.url_mut());
            Ok(())
        })
    }
}

// ── Bearer tokens ───────────────────────────────────────────────────

/// An OAuth access token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

/// A source of OAuth access tokens.
pub trait TokenCredential: Send + Sync + 'static {
    fn get_token<'a>(&'a self, scopes: &'a [String]) -> BoxFuture<'a, Result<AccessToken>>;
}

/// A fixed token, for tests and for tokens obtained out of band.
#[derive(Debug, Clone)]
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    /// A token valid for one hour from now.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken {
                token: token.into(),
                expires_on: Utc::now() + ChronoDuration::hours(1),
            },
        }
    }

    pub fn with_expiry(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: AccessToken {
                token: token.into(),
                expires_on,
            },
        }
    }
}

impl TokenCredential for StaticTokenCredential {
    fn get_token<'a>(&'a self, _scopes: &'a [String]) -> BoxFuture<'a, Result<AccessToken>> {
        Box::pin(async move { Ok(self.token.clone()) })
    }
}

/// Sends `Authorization: Bearer {token}` for a fixed set of scopes.
pub struct BearerTokenCredential {
    inner: Arc<dyn TokenCredential>,
    scopes: Vec<String>,
    cache: tokio::sync::Mutex<Option<AccessToken>>,
}

impl BearerTokenCredential {
    pub fn new(inner: Arc<dyn TokenCredential>, scope: impl Into<String>) -> Self {
        Self {
            inner,
            scopes: vec![scope.into()],
            cache: tokio::sync::Mutex::new(None),
        }
    }

    async fn token(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;
        let fresh = cache.as_ref().is_some_and(|t| {
            t.expires_on - Utc::now() > ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS)
        });
        if !fresh {
            debug!("Refreshing bearer token for scopes {:?}", self.scopes);
            *cache = Some(self.inner.get_token(&self.scopes).await?);
        }
        cache
            .as_ref()
            .map(|t| t.token.clone())
            .ok_or_else(|| Error::invalid("token credential returned no token"))
    }
}

impl Credential for BearerTokenCredential {
    fn authorize<'a>(&'a self, request: &'a mut reqwest::Request) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let token = self.token().await?;
            let value = header_value(&format!("Bearer {}", token))?;
            request.headers_mut().insert(AUTHORIZATION, value);
            Ok(())
        })
    }
}

// ── API key ─────────────────────────────────────────────────────────

/// Default header used by Cognitive Services endpoints.
pub const SUBSCRIPTION_KEY_HEADER: &str = "ocp-apim-subscription-key";

/// An API key sent in a fixed header.
#[derive(Debug, Clone)]
pub struct KeyCredential {
    header: HeaderName,
    key: String,
}

impl KeyCredential {
    /// Key sent as `Ocp-Apim-Subscription-Key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            header: HeaderName::from_static(SUBSCRIPTION_KEY_HEADER),
            key: key.into(),
        }
    }

    pub fn with_header(header: HeaderName, key: impl Into<String>) -> Self {
        Self {
            header,
            key: key.into(),
        }
    }
}

impl Credential for KeyCredential {
    fn authorize<'a>(&'a self, request: &'a mut reqwest::Request) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let value = header_value(&self.key)?;
            request.headers_mut().insert(self.header.clone(), value);
            Ok(())
        })
    }
}

/// OAuth scope for Cognitive Services (Language, Form Recognizer).
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

/// Credential accepted by Cognitive Services clients: an API key or AAD tokens.
#[derive(Clone)]
pub enum CognitiveCredential {
    Key(String),
    Token(Arc<dyn TokenCredential>),
}

impl std::fmt::Debug for CognitiveCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CognitiveCredential::Key(_) => f.write_str("CognitiveCredential::Key(..)"),
            CognitiveCredential::Token(_) => f.write_str("CognitiveCredential::Token(..)"),
        }
    }
}

impl CognitiveCredential {
    pub(crate) fn into_credential(self) -> Arc<dyn Credential> {
        match self {
            CognitiveCredential::Key(key) => Arc::new(KeyCredential::new(key)),
            CognitiveCredential::Token(inner) => {
                Arc::new(BearerTokenCredential::new(inner, COGNITIVE_SERVICES_SCOPE))
            }
        }
    }
}

// ── Service Bus SAS ─────────────────────────────────────────────────

/// Service Bus shared access key, turned into a short-lived signature per request.
#[derive(Clone)]
pub struct ServiceBusSasCredential {
    key_name: String,
    key: String,
    ttl: std::time::Duration,
}

impl std::fmt::Debug for ServiceBusSasCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBusSasCredential")
            .field("key_name", &self.key_name)
            .finish_non_exhaustive()
    }
}

impl ServiceBusSasCredential {
    pub fn new(key_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key_name: key_name.into(),
            key: key.into(),
            ttl: std::time::Duration::from_secs(3600),
        }
    }

    pub fn with_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Build the `SharedAccessSignature ...` header value for `uri` expiring at `expiry` (unix seconds).
    pub fn signature_for(&self, uri: &str, expiry: i64) -> Result<String> {
        let encoded_uri: String = url::form_urlencoded::byte_serialize(uri.as_bytes()).collect();
        let signature =
            hmac_sha256_base64(self.key.as_bytes(), &format!("{}\n{}", encoded_uri, expiry))?;
        let encoded_sig: String =
            url::form_urlencoded::byte_serialize(signature.as_bytes()).collect();
        let encoded_name: String =
            url::form_urlencoded::byte_serialize(self.key_name.as_bytes()).collect();
        Ok(format!(
            "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
            encoded_uri, encoded_sig, expiry, encoded_name
        ))
    }
}

impl Credential for ServiceBusSasCredential {
    fn authorize<'a>(&'a self, request: &'a mut reqwest::Request) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let url = request.url();
            let uri = format!(
                "{}://{}{}",
                url.scheme(),
                url.host_str().unwrap_or_default(),
                url.path()
            );
            let expiry = Utc::now().timestamp() + self.ttl.as_secs() as i64;
            let value = header_value(&self.signature_for(&uri, expiry)?)?;
            request.headers_mut().insert(AUTHORIZATION, value);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "dGVzdGtleQ=="; // "testkey"

    fn request(method: reqwest::Method, url: &str) -> reqwest::Request {
        reqwest::Request::new(method, url::Url::parse(url).unwrap())
    }

    #[test]
    fn test_shared_key_rejects_bad_base64() {
        assert!(SharedKeyCredential::new("acct", "not base64!").is_err());
    }

    #[test]
    fn test_string_to_sign_layout() {
        let cred = SharedKeyCredential::new("acct", KEY).unwrap();
        let mut req = request(
            reqwest::Method::PUT,
            "https://acct.file.core.windows.net/share/dir/file.txt?comp=range",
        );
        req.headers_mut()
            .insert("x-ms-version", HeaderValue::from_static("2023-11-03"));
        req.headers_mut().insert(
            "x-ms-date",
            HeaderValue::from_static("Mon, 24 Feb 2026 12:34:56 GMT"),
        );
        req.headers_mut()
            .insert("x-ms-range", HeaderValue::from_static("bytes=0-511"));
        req.headers_mut().insert(
            "content-type",
            HeaderValue::from_static("application/octet-stream"),
        );
        *req.body_mut() = Some(reqwest::Body::from(vec![0u8; 512]));

        let sts = cred.string_to_sign(&req);
        let expected = "PUT\n\n\n512\n\napplication/octet-stream\n\n\n\n\n\n\n\
x-ms-date:Mon, 24 Feb 2026 12:34:56 GMT\n\
x-ms-range:bytes=0-511\n\
x-ms-version:2023-11-03\n\
/acct/share/dir/file.txt\n\
comp:range";
        assert_eq!(sts, expected);
    }

    #[test]
    fn test_string_to_sign_zero_length_is_empty() {
        let cred = SharedKeyCredential::new("acct", KEY).unwrap();
        let mut req = request(reqwest::Method::PUT, "https://acct.blob.core.windows.net/c");
        *req.body_mut() = Some(reqwest::Body::from(Vec::<u8>::new()));
        let sts = cred.string_to_sign(&req);
        assert!(sts.starts_with("PUT\n\n\n\n"));
    }

    #[test]
    fn test_canonicalized_resource_sorts_and_lowercases_query() {
        let cred = SharedKeyCredential::new("acct", KEY).unwrap();
        let url = url::Url::parse(
            "https://acct.blob.core.windows.net/c?restype=container&comp=list&Include=metadata&include=snapshots",
        )
        .unwrap();
        assert_eq!(
            cred.canonicalized_resource(&url),
            "/acct/c\ncomp:list\ninclude:metadata,snapshots\nrestype:container"
        );
    }

    #[tokio::test]
    async fn test_shared_key_sets_authorization() {
        let cred = SharedKeyCredential::new("acct", KEY).unwrap();
        let mut req = request(reqwest::Method::GET, "https://acct.blob.core.windows.net/c/b");
        cred.authorize(&mut req).await.unwrap();
        let auth = req.headers().get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert!(auth.starts_with("SharedKey acct:"));
        let sig = auth.trim_start_matches("SharedKey acct:");
        assert_eq!(BASE64_STANDARD.decode(sig).unwrap().len(), 32);
    }

    #[test]
    fn test_sas_does_not_duplicate_parameters() {
        let sas = SasCredential::new("?sv=2023-11-03&sig=abc%2Bdef&sp=r");
        let mut url = url::Url::parse("https://acct.blob.core.windows.net/c/b?sp=rw").unwrap();
        sas.apply(&mut url);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs.iter().filter(|(k, _)| k == "sp").count(), 1);
        assert!(pairs.contains(&("sig".to_string(), "abc+def".to_string())));
        assert!(pairs.contains(&("sp".to_string(), "rw".to_string())));
    }

    #[tokio::test]
    async fn test_bearer_token_is_cached_until_expiry() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counting(AtomicUsize, i64);
        impl TokenCredential for Counting {
            fn get_token<'a>(
                &'a self,
                _scopes: &'a [String],
            ) -> BoxFuture<'a, Result<AccessToken>> {
                Box::pin(async move {
                    let n = self.0.fetch_add(1, Ordering::SeqCst);
                    Ok(AccessToken {
                        token: format!("token-{}", n),
                        expires_on: Utc::now() + ChronoDuration::seconds(self.1),
                    })
                })
            }
        }

        let long_lived = Arc::new(Counting(AtomicUsize::new(0), 3600));
        let cred = BearerTokenCredential::new(long_lived.clone(), "scope/.default");
        for _ in 0..3 {
            let mut req = request(reqwest::Method::GET, "https://example.com/");
            cred.authorize(&mut req).await.unwrap();
            assert_eq!(req.headers().get(AUTHORIZATION).unwrap(), "Bearer token-0");
        }
        assert_eq!(long_lived.0.load(Ordering::SeqCst), 1);

        // Tokens inside the refresh margin are fetched again every time.
        let short_lived = Arc::new(Counting(AtomicUsize::new(0), 60));
        let cred = BearerTokenCredential::new(short_lived.clone(), "scope/.default");
        for _ in 0..2 {
            let mut req = request(reqwest::Method::GET, "https://example.com/");
            cred.authorize(&mut req).await.unwrap();
        }
        assert_eq!(short_lived.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_key_credential_header() {
        let cred = KeyCredential::new("secret");
        let mut req = request(reqwest::Method::POST, "https://lang.example.com/");
        cred.authorize(&mut req).await.unwrap();
        assert_eq!(req.headers().get(SUBSCRIPTION_KEY_HEADER).unwrap(), "secret");
    }

    #[test]
    fn test_service_bus_signature_format() {
        let cred = ServiceBusSasCredential::new("RootManageSharedAccessKey", "key");
        let sig = cred
            .signature_for("https://ns.servicebus.windows.net/queue", 1_700_000_000)
            .unwrap();
        assert!(sig.starts_with(
            "SharedAccessSignature sr=https%3A%2F%2Fns.servicebus.windows.net%2Fqueue&sig="
        ));
        assert!(sig.ends_with("&se=1700000000&skn=RootManageSharedAccessKey"));
    }
}
