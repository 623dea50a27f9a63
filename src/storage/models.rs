//! Storage resource models shared by the file, blob and Data Lake clients.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use http::HeaderMap;

use super::{
    format_http_date, format_iso8601, header_date, header_parse, header_str, header_string,
    parse_iso8601, parse_metadata,
};
use crate::errors::{Error, Result};
use crate::xml::{XmlNode, XmlWriter};

/// Standard HTTP content headers of a file or blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSettings {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    /// Base64 MD5 of the whole content.
    pub content_md5: Option<String>,
}

impl ContentSettings {
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            ..Default::default()
        }
    }

    /// Write the settings as `{prefix}content-type`, `{prefix}cache-control`, ...
    pub(crate) fn apply(
        &self,
        mut builder: reqwest::RequestBuilder,
        prefix: &str,
    ) -> reqwest::RequestBuilder {
        let fields = [
            ("content-type", &self.content_type),
            ("content-encoding", &self.content_encoding),
            ("content-language", &self.content_language),
            ("content-disposition", &self.content_disposition),
            ("cache-control", &self.cache_control),
            ("content-md5", &self.content_md5),
        ];
        for (name, value) in fields {
            if let Some(v) = value {
                builder = builder.header(format!("{}{}", prefix, name), v);
            }
        }
        builder
    }

    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            content_type: header_string(headers, "content-type"),
            content_encoding: header_string(headers, "content-encoding"),
            content_language: header_string(headers, "content-language"),
            content_disposition: header_string(headers, "content-disposition"),
            cache_control: header_string(headers, "cache-control"),
            content_md5: header_string(headers, "content-md5")
                .or_else(|| header_string(headers, "x-ms-blob-content-md5"))
                .or_else(|| header_string(headers, "x-ms-content-md5")),
        }
    }
}

/// `If-*` conditions on the target resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifiedAccessConditions {
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

impl ModifiedAccessConditions {
    pub(crate) fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        self.apply_with_prefix(builder, "")
    }

    /// Apply as `x-ms-source-if-*` headers for copy sources.
    pub(crate) fn apply_source(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        self.apply_with_prefix(builder, "x-ms-source-")
    }

    fn apply_with_prefix(
        &self,
        mut builder: reqwest::RequestBuilder,
        prefix: &str,
    ) -> reqwest::RequestBuilder {
        if let Some(v) = &self.if_match {
            builder = builder.header(format!("{}if-match", prefix), v);
        }
        if let Some(v) = &self.if_none_match {
            builder = builder.header(format!("{}if-none-match", prefix), v);
        }
        if let Some(v) = &self.if_modified_since {
            builder = builder.header(format!("{}if-modified-since", prefix), format_http_date(v));
        }
        if let Some(v) = &self.if_unmodified_since {
            builder = builder.header(
                format!("{}if-unmodified-since", prefix),
                format_http_date(v),
            );
        }
        builder
    }
}

/// Lease state reported on a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaseProperties {
    /// `locked` or `unlocked`.
    pub status: Option<String>,
    /// `available`, `leased`, `expired`, `breaking` or `broken`.
    pub state: Option<String>,
    /// `infinite` or `fixed`.
    pub duration: Option<String>,
}

impl LeaseProperties {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            status: header_string(headers, "x-ms-lease-status"),
            state: header_string(headers, "x-ms-lease-state"),
            duration: header_string(headers, "x-ms-lease-duration"),
        }
    }
}

/// State of the last copy operation whose destination is this resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyProperties {
    pub id: Option<String>,
    /// `pending`, `success`, `aborted` or `failed`.
    pub status: Option<String>,
    pub source: Option<String>,
    /// `{copied}/{total}` bytes.
    pub progress: Option<String>,
    pub completion_time: Option<DateTime<Utc>>,
    pub status_description: Option<String>,
    pub incremental_copy: Option<bool>,
    pub destination_snapshot: Option<String>,
}

impl CopyProperties {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            id: header_string(headers, "x-ms-copy-id"),
            status: header_string(headers, "x-ms-copy-status"),
            source: header_string(headers, "x-ms-copy-source"),
            progress: header_string(headers, "x-ms-copy-progress"),
            completion_time: header_date(headers, "x-ms-copy-completion-time"),
            status_description: header_string(headers, "x-ms-copy-status-description"),
            incremental_copy: header_parse(headers, "x-ms-incremental-copy"),
            destination_snapshot: header_string(headers, "x-ms-copy-destination-snapshot"),
        }
    }
}

/// Common result of write operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseInfo {
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_md5: Option<String>,
    pub request_server_encrypted: Option<bool>,
    pub version_id: Option<String>,
    pub blob_sequence_number: Option<i64>,
    pub request_id: Option<String>,
}

impl ResponseInfo {
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            etag: header_string(headers, "etag"),
            last_modified: header_date(headers, "last-modified"),
            content_md5: header_string(headers, "content-md5"),
            request_server_encrypted: header_parse(headers, "x-ms-request-server-encrypted"),
            version_id: header_string(headers, "x-ms-version-id"),
            blob_sequence_number: header_parse(headers, "x-ms-blob-sequence-number"),
            request_id: header_string(headers, "x-ms-request-id"),
        }
    }
}

/// A byte range (inclusive end).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub(crate) fn from_xml(node: &XmlNode) -> Result<Self> {
        let start = node
            .parse_child("Start")
            .ok_or_else(|| Error::decode("range is missing Start"))?;
        let end = node
            .parse_child("End")
            .ok_or_else(|| Error::decode("range is missing End"))?;
        Ok(Self { start, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Stored access policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    pub permission: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub expiry: Option<DateTime<Utc>>,
}

/// Named access policy referenced by `si` in a SAS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIdentifier {
    pub id: String,
    pub access_policy: Option<AccessPolicy>,
}

impl SignedIdentifier {
    pub fn new(id: impl Into<String>, access_policy: AccessPolicy) -> Self {
        Self {
            id: id.into(),
            access_policy: Some(access_policy),
        }
    }
}

/// Render `<SignedIdentifiers>`.
pub(crate) fn signed_identifiers_to_xml(identifiers: &[SignedIdentifier]) -> Result<String> {
    let mut w = XmlWriter::new();
    w.start("SignedIdentifiers", &[]);
    for identifier in identifiers {
        w.start("SignedIdentifier", &[]).text_element("Id", &identifier.id);
        if let Some(policy) = &identifier.access_policy {
            w.start("AccessPolicy", &[])
                .opt_element("Start", policy.start.as_ref().map(format_iso8601))
                .opt_element("Expiry", policy.expiry.as_ref().map(format_iso8601))
                .opt_element("Permission", policy.permission.as_deref())
                .end("AccessPolicy");
        }
        w.end("SignedIdentifier");
    }
    w.end("SignedIdentifiers");
    w.finish()
}

/// Parse `<SignedIdentifiers>`.
pub(crate) fn signed_identifiers_from_xml(root: &XmlNode) -> Vec<SignedIdentifier> {
    root.children_named("SignedIdentifier")
        .map(|node| SignedIdentifier {
            id: node.child_text("Id").unwrap_or_default().to_string(),
            access_policy: node.child("AccessPolicy").map(|p| AccessPolicy {
                permission: p.child_text("Permission").map(str::to_string),
                start: p.child_text("Start").and_then(parse_iso8601),
                expiry: p.child_text("Expiry").and_then(parse_iso8601),
            }),
        })
        .collect()
}

/// Anonymous read access level of a container / file system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicAccess {
    /// Blobs (files) are readable, listing is not.
    Blob,
    /// Blobs and listing are readable.
    Container,
}

impl PublicAccess {
    pub fn as_str(self) -> &'static str {
        match self {
            PublicAccess::Blob => "blob",
            PublicAccess::Container => "container",
        }
    }

    pub(crate) fn from_headers(headers: &HeaderMap) -> Option<Self> {
        match header_str(headers, "x-ms-blob-public-access") {
            Some("blob") => Some(PublicAccess::Blob),
            Some("container") => Some(PublicAccess::Container),
            _ => None,
        }
    }
}

/// Properties shared by containers, file systems and shares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerProperties {
    pub name: String,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
    pub lease: LeaseProperties,
    pub public_access: Option<PublicAccess>,
    pub has_immutability_policy: Option<bool>,
    pub has_legal_hold: Option<bool>,
}

impl ContainerProperties {
    pub(crate) fn from_headers(name: &str, headers: &HeaderMap) -> Self {
        Self {
            name: name.to_string(),
            etag: header_string(headers, "etag"),
            last_modified: header_date(headers, "last-modified"),
            metadata: parse_metadata(headers),
            lease: LeaseProperties::from_headers(headers),
            public_access: PublicAccess::from_headers(headers),
            has_immutability_policy: header_parse(headers, "x-ms-has-immutability-policy"),
            has_legal_hold: header_parse(headers, "x-ms-has-legal-hold"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;
    use chrono::TimeZone;

    #[test]
    fn test_signed_identifiers_round_trip() {
        let ids = vec![
            SignedIdentifier::new(
                "testid",
                AccessPolicy {
                    permission: Some("r".into()),
                    start: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
                    expiry: Some(Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap()),
                },
            ),
            SignedIdentifier {
                id: "empty".into(),
                access_policy: None,
            },
        ];
        let xml = signed_identifiers_to_xml(&ids).unwrap();
        assert!(xml.contains("<Start>2026-01-01T00:00:00Z</Start>"));
        let parsed = signed_identifiers_from_xml(&parse_document(&xml).unwrap());
        assert_eq!(parsed, ids);
    }

    #[test]
    fn test_copy_properties_from_headers() {
        let mut h = HeaderMap::new();
        h.insert("x-ms-copy-id", "abc".parse().unwrap());
        h.insert("x-ms-copy-status", "pending".parse().unwrap());
        h.insert("x-ms-copy-progress", "0/1024".parse().unwrap());
        let copy = CopyProperties::from_headers(&h);
        assert_eq!(copy.id.as_deref(), Some("abc"));
        assert_eq!(copy.status.as_deref(), Some("pending"));
        assert_eq!(copy.progress.as_deref(), Some("0/1024"));
        assert!(copy.completion_time.is_none());
    }

    #[test]
    fn test_byte_range_from_xml() {
        let node = parse_document("<Range><Start>512</Start><End>1023</End></Range>").unwrap();
        let range = ByteRange::from_xml(&node).unwrap();
        assert_eq!(range, ByteRange { start: 512, end: 1023 });
        assert_eq!(range.len(), 512);
        assert!(ByteRange::from_xml(&parse_document("<Range/>").unwrap()).is_err());
    }
}
