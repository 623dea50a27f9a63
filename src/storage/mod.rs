//! Azure Storage clients.
//!
//! File shares, page blobs, Data Lake file systems and the blob change feed
//! all speak the storage REST dialect: `x-ms-version` header, Shared Key or
//! SAS authentication, `x-ms-meta-*` metadata headers and XML bodies.  The
//! helpers here are shared by every storage client.

pub mod changefeed;
pub mod datalake;
pub mod file_share;
pub mod lease;
pub mod models;
pub mod page_blob;
pub mod sas;

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use md5::{Digest, Md5};

use crate::auth::{
    BearerTokenCredential, Credential, SasCredential, SharedKeyCredential, TokenCredential,
};
use crate::connection_string::StorageConnectionString;
use crate::errors::{Error, Result};
use crate::pipeline::{ApiVersion, ClientOptions, Pipeline};

/// Storage REST API version used for all requests.
pub const STORAGE_API_VERSION: &str = "2023-11-03";

/// OAuth scope for storage data-plane requests.
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

/// Encode everything except unreserved characters and `/`.
const PATH_ENCODE_SET: percent_encoding::AsciiSet = percent_encoding::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Percent-encode a resource path, leaving `/` separators intact.
pub(crate) fn encode_path(path: &str) -> String {
    percent_encoding::utf8_percent_encode(path.trim_matches('/'), &PATH_ENCODE_SET).to_string()
}

/// How a storage client authenticates.
#[derive(Clone)]
pub enum StorageCredential {
    SharedKey(SharedKeyCredential),
    /// SAS token, with or without the leading `?`.
    Sas(String),
    Token(Arc<dyn TokenCredential>),
    Anonymous,
}

impl std::fmt::Debug for StorageCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageCredential::SharedKey(k) => write!(f, "SharedKey({})", k.account()),
            StorageCredential::Sas(_) => f.write_str("Sas"),
            StorageCredential::Token(_) => f.write_str("Token"),
            StorageCredential::Anonymous => f.write_str("Anonymous"),
        }
    }
}

impl StorageCredential {
    /// Pick the credential a connection string carries (account key wins over SAS).
    pub fn from_connection_string(cs: &StorageConnectionString) -> Result<Self> {
        match (&cs.account_name, &cs.account_key, &cs.sas_token) {
            (Some(name), Some(key), _) => Ok(StorageCredential::SharedKey(
                SharedKeyCredential::new(name.clone(), key)?,
            )),
            (_, _, Some(sas)) => Ok(StorageCredential::Sas(sas.clone())),
            _ => Ok(StorageCredential::Anonymous),
        }
    }
}

/// Pipeline plus the account key when one is available (for SAS generation).
#[derive(Clone, Debug)]
pub(crate) struct StorageTransport {
    pub pipeline: Pipeline,
    pub shared_key: Option<SharedKeyCredential>,
}

impl StorageTransport {
    pub fn new(
        resource_url: &url::Url,
        credential: StorageCredential,
        options: &ClientOptions,
    ) -> Result<Self> {
        let mut shared_key = None;
        let auth: Option<Arc<dyn Credential>> = match credential {
            StorageCredential::SharedKey(key) => {
                shared_key = Some(key.clone());
                Some(Arc::new(key))
            }
            StorageCredential::Sas(token) => {
                if resource_url.query_pairs().any(|(k, _)| k == "sig") {
                    return Err(Error::invalid(
                        "cannot use a SAS credential when the resource URL already contains a shared access signature",
                    ));
                }
                Some(Arc::new(SasCredential::new(&token)))
            }
            StorageCredential::Token(token) => {
                Some(Arc::new(BearerTokenCredential::new(token, STORAGE_SCOPE)))
            }
            StorageCredential::Anonymous => None,
        };
        let pipeline_options =
            options.pipeline_options(ApiVersion::Header(STORAGE_API_VERSION.to_string()));
        Ok(Self {
            pipeline: Pipeline::new(auth, pipeline_options),
            shared_key,
        })
    }
}

/// Parse an account URL, dropping any trailing `/`.
pub(crate) fn parse_account_url(account_url: &str) -> Result<url::Url> {
    let trimmed = account_url.trim_end_matches('/');
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    url::Url::parse(&with_scheme)
        .map_err(|e| Error::invalid(format!("invalid account URL '{}': {}", account_url, e)))
}

/// Append encoded path segments to a base URL, keeping the base query.
pub(crate) fn resource_url(base: &url::Url, path: &str) -> Result<url::Url> {
    let mut url = base.clone();
    let base_path = url.path().trim_end_matches('/').to_string();
    let encoded = encode_path(path);
    let full = if encoded.is_empty() {
        base_path
    } else {
        format!("{}/{}", base_path, encoded)
    };
    url.set_path(if full.is_empty() { "/" } else { &full });
    Ok(url)
}

/// Account name from a standard `{account}.{service}.core.windows.net` host
/// or an emulator `/{account}` path.
pub(crate) fn account_name_from_url(url: &url::Url) -> Option<String> {
    let host = url.host_str()?;
    if host.parse::<std::net::IpAddr>().is_ok() || host == "localhost" {
        return url
            .path_segments()
            .and_then(|mut s| s.next())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }
    host.split('.').next().map(str::to_string)
}

/// Map a Data Lake (`.dfs.`) endpoint to its blob (`.blob.`) counterpart.
pub(crate) fn dfs_to_blob_url(url: &url::Url) -> url::Url {
    let mut out = url.clone();
    if let Some(host) = url.host_str() {
        if host.contains(".dfs.") {
            let _ = out.set_host(Some(&host.replacen(".dfs.", ".blob.", 1)));
        }
    }
    out
}

/// Mark a body-less write request with `Content-Length: 0`.
pub(crate) fn empty_body(builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    builder.header(http::header::CONTENT_LENGTH, "0")
}

/// Add `x-ms-meta-{name}` headers.
pub(crate) fn with_metadata(
    mut builder: reqwest::RequestBuilder,
    metadata: &HashMap<String, String>,
) -> reqwest::RequestBuilder {
    for (k, v) in metadata {
        builder = builder.header(format!("x-ms-meta-{}", k), v);
    }
    builder
}

/// Collect `x-ms-meta-*` headers.
pub(crate) fn parse_metadata(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| {
            let name = k.as_str().strip_prefix("x-ms-meta-")?;
            Some((name.to_string(), v.to_str().ok()?.to_string()))
        })
        .collect()
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub(crate) fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    header_str(headers, name).map(str::to_string)
}

pub(crate) fn header_parse<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    header_str(headers, name).and_then(|v| v.trim().parse().ok())
}

/// RFC 1123 date header as a UTC timestamp.
pub(crate) fn header_date(headers: &HeaderMap, name: &str) -> Option<DateTime<Utc>> {
    header_str(headers, name).and_then(parse_http_date)
}

pub(crate) fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    httpdate::parse_http_date(value.trim())
        .ok()
        .map(DateTime::<Utc>::from)
}

pub(crate) fn format_http_date(value: &DateTime<Utc>) -> String {
    httpdate::fmt_http_date((*value).into())
}

/// ISO 8601 timestamps as the storage service writes them (file SMB times use 7 fractional digits).
pub(crate) fn parse_iso8601(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Seconds-precision UTC timestamp (`2026-01-02T03:04:05Z`).
pub(crate) fn format_iso8601(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// `bytes={start}-{end}` for `length` bytes at `offset`, or open-ended.
pub(crate) fn range_header(offset: u64, length: Option<u64>) -> String {
    match length {
        Some(len) => format!("bytes={}-{}", offset, offset + len.saturating_sub(1)),
        None => format!("bytes={}-", offset),
    }
}

/// Parse `Content-Range: bytes {start}-{end}/{total}`.
pub(crate) fn parse_content_range(value: &str) -> Option<(u64, u64, u64)> {
    let rest = value.trim().strip_prefix("bytes")?.trim();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    Some((
        start.trim().parse().ok()?,
        end.trim().parse().ok()?,
        total.trim().parse().ok()?,
    ))
}

/// Base64 MD5 digest, as sent in `Content-MD5`.
pub(crate) fn content_md5(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Reject offsets and lengths that are not multiples of 512.
pub(crate) fn check_512_alignment(offset: u64, length: u64) -> Result<()> {
    if offset % 512 != 0 {
        return Err(Error::invalid(
            "offset must be an integer that aligns with 512 bytes",
        ));
    }
    if length % 512 != 0 {
        return Err(Error::invalid(
            "length must be an integer that aligns with 512 bytes",
        ));
    }
    Ok(())
}
