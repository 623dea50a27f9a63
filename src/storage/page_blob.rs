//! Page blobs.
//!
//! A page blob is a sparse array of 512-byte pages.  Writes and clears must
//! be page aligned; range listings can be diffed against an earlier
//! snapshot of the same blob or, for managed disks, a snapshot URL.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use http::{HeaderMap, StatusCode};
use tracing::{debug, info};

use super::lease::{LeaseClient, LeaseTarget};
use super::models::{
    ByteRange, ContentSettings, CopyProperties, LeaseProperties, ModifiedAccessConditions,
    ResponseInfo,
};
use super::sas::{generate_blob_sas, SasOptions};
use super::{
    account_name_from_url, check_512_alignment, content_md5, empty_body, header_date,
    header_parse, header_str, header_string, parse_account_url, parse_content_range,
    parse_metadata, range_header, resource_url, with_metadata, StorageCredential,
    StorageTransport,
};
use crate::connection_string::StorageConnectionString;
use crate::errors::{Error, Result};
use crate::pager::{Page, Pager};
use crate::pipeline::{ClientOptions, RawResponse};

/// Page size in bytes.
pub const PAGE_SIZE: u64 = 512;

/// Chunk size used by `upload_blob`.
pub const DEFAULT_PAGE_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Premium storage disk tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PremiumPageBlobTier {
    P4,
    P6,
    P10,
    P15,
    P20,
    P30,
    P40,
    P50,
    P60,
    P70,
    P80,
}

impl PremiumPageBlobTier {
    pub fn as_str(self) -> &'static str {
        match self {
            PremiumPageBlobTier::P4 => "P4",
            PremiumPageBlobTier::P6 => "P6",
            PremiumPageBlobTier::P10 => "P10",
            PremiumPageBlobTier::P15 => "P15",
            PremiumPageBlobTier::P20 => "P20",
            PremiumPageBlobTier::P30 => "P30",
            PremiumPageBlobTier::P40 => "P40",
            PremiumPageBlobTier::P50 => "P50",
            PremiumPageBlobTier::P60 => "P60",
            PremiumPageBlobTier::P70 => "P70",
            PremiumPageBlobTier::P80 => "P80",
        }
    }
}

/// `x-ms-sequence-number-action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceNumberAction {
    /// Set to the larger of the current and supplied values.
    Max,
    /// Set to the supplied value.
    Update,
    /// Add one to the current value.
    Increment,
}

impl SequenceNumberAction {
    fn as_str(self) -> &'static str {
        match self {
            SequenceNumberAction::Max => "max",
            SequenceNumberAction::Update => "update",
            SequenceNumberAction::Increment => "increment",
        }
    }
}

/// `x-ms-delete-snapshots`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteSnapshots {
    /// Delete the blob and all its snapshots.
    Include,
    /// Delete only the snapshots.
    Only,
}

/// Sequence number preconditions on page writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceNumberConditions {
    pub if_sequence_number_lte: Option<i64>,
    pub if_sequence_number_lt: Option<i64>,
    pub if_sequence_number_eq: Option<i64>,
}

impl SequenceNumberConditions {
    fn apply(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let fields = [
            ("x-ms-if-sequence-number-le", self.if_sequence_number_lte),
            ("x-ms-if-sequence-number-lt", self.if_sequence_number_lt),
            ("x-ms-if-sequence-number-eq", self.if_sequence_number_eq),
        ];
        for (name, value) in fields {
            if let Some(v) = value {
                builder = builder.header(name, v.to_string());
            }
        }
        builder
    }
}

/// Lease and `If-*` conditions on the blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobConditions {
    pub lease_id: Option<String>,
    pub modified: ModifiedAccessConditions,
}

impl BlobConditions {
    fn apply(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(lease) = &self.lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        self.modified.apply(builder)
    }
}

/// Options for [`BlobClient::create_page_blob`].
#[derive(Debug, Clone, Default)]
pub struct CreatePageBlobOptions {
    pub content_settings: ContentSettings,
    pub metadata: HashMap<String, String>,
    pub sequence_number: Option<i64>,
    pub premium_page_blob_tier: Option<PremiumPageBlobTier>,
    /// `Some(false)` fails with `ResourceExists` if the blob exists.
    pub overwrite: Option<bool>,
    pub conditions: BlobConditions,
}

/// Options for page writes and clears.
#[derive(Debug, Clone, Default)]
pub struct UploadPageOptions {
    pub validate_content: bool,
    pub conditions: BlobConditions,
    pub sequence_number: SequenceNumberConditions,
}

/// Options for [`BlobClient::upload_pages_from_url`].
#[derive(Debug, Clone, Default)]
pub struct UploadPagesFromUrlOptions {
    pub conditions: BlobConditions,
    pub sequence_number: SequenceNumberConditions,
    pub source_conditions: ModifiedAccessConditions,
    /// Base64 MD5 the source range must match.
    pub source_content_md5: Option<String>,
    /// `Authorization` value for the copy source, e.g. `Bearer {token}`.
    pub source_authorization: Option<String>,
}

/// Options for [`BlobClient::upload_blob`].
#[derive(Debug, Clone)]
pub struct UploadPageBlobOptions {
    pub create: CreatePageBlobOptions,
    pub validate_content: bool,
    pub max_concurrency: usize,
    /// Must be a multiple of 512.
    pub chunk_size: usize,
}

impl Default for UploadPageBlobOptions {
    fn default() -> Self {
        Self {
            create: CreatePageBlobOptions::default(),
            validate_content: false,
            max_concurrency: 1,
            chunk_size: DEFAULT_PAGE_CHUNK_SIZE,
        }
    }
}

/// Options for page range queries.
#[derive(Debug, Clone, Default)]
pub struct PageRangeOptions {
    pub offset: Option<u64>,
    pub length: Option<u64>,
    /// Diff against this snapshot of the same blob.
    pub previous_snapshot: Option<String>,
    /// Diff against a managed disk snapshot URL.
    pub previous_snapshot_url: Option<String>,
    /// Page size for `list_page_ranges`.
    pub results_per_page: Option<u32>,
    pub conditions: BlobConditions,
}

/// One entry of `list_page_ranges`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u64,
    pub end: u64,
    /// Cleared since the previous snapshot.
    pub cleared: bool,
}

/// Blob properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobProperties {
    pub name: String,
    pub container: String,
    pub snapshot: Option<String>,
    pub blob_type: Option<String>,
    pub size: u64,
    pub content_settings: ContentSettings,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub creation_time: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
    pub lease: LeaseProperties,
    pub copy: CopyProperties,
    pub blob_sequence_number: Option<i64>,
    pub server_encrypted: Option<bool>,
    pub blob_tier: Option<String>,
    pub is_incremental_copy: Option<bool>,
}

/// Downloaded content plus the blob's properties.
#[derive(Debug, Clone)]
pub struct DownloadedBlob {
    pub properties: BlobProperties,
    pub content: Bytes,
}

/// Client for one blob, exposing the page blob surface.
#[derive(Debug, Clone)]
pub struct BlobClient {
    transport: StorageTransport,
    account_url: url::Url,
    container_name: String,
    blob_name: String,
    snapshot: Option<String>,
}

impl BlobClient {
    pub fn new(
        account_url: &str,
        container_name: impl Into<String>,
        blob_name: impl Into<String>,
        credential: StorageCredential,
        options: &ClientOptions,
    ) -> Result<Self> {
        let account_url = parse_account_url(account_url)?;
        let transport = StorageTransport::new(&account_url, credential, options)?;
        Ok(Self {
            transport,
            account_url,
            container_name: container_name.into(),
            blob_name: blob_name.into().trim_matches('/').to_string(),
            snapshot: None,
        })
    }

    /// Build from a full blob URL, e.g. `https://acct.blob.core.windows.net/c/dir/b?snapshot=...`.
    pub fn from_blob_url(
        blob_url: &str,
        credential: StorageCredential,
        options: &ClientOptions,
    ) -> Result<Self> {
        let url = url::Url::parse(blob_url)
            .map_err(|e| Error::invalid(format!("invalid blob URL '{}': {}", blob_url, e)))?;
        let mut segments: Vec<String> = url
            .path_segments()
            .map(|s| {
                s.map(|seg| {
                    percent_encoding::percent_decode_str(seg)
                        .decode_utf8_lossy()
                        .into_owned()
                })
                .collect()
            })
            .unwrap_or_default();
        let mut account_url = url.clone();
        account_url.set_query(None);
        let path_style = url
            .host_str()
            .map(|h| h.parse::<std::net::IpAddr>().is_ok() || h == "localhost")
            .unwrap_or(false);
        if path_style && !segments.is_empty() {
            let account = segments.remove(0);
            account_url.set_path(&account);
        } else {
            account_url.set_path("");
        }
        if segments.len() < 2 || segments[0].is_empty() {
            return Err(Error::invalid(format!(
                "blob URL '{}' must name a container and a blob",
                blob_url
            )));
        }
        let container = segments.remove(0);
        let blob = segments.join("/");
        let snapshot = url
            .query_pairs()
            .find(|(k, _)| k == "snapshot")
            .map(|(_, v)| v.into_owned());
        let mut client = Self::new(account_url.as_str(), container, blob, credential, options)?;
        client.snapshot = snapshot;
        Ok(client)
    }

    pub fn from_connection_string(
        connection_string: &str,
        container_name: impl Into<String>,
        blob_name: impl Into<String>,
        options: &ClientOptions,
    ) -> Result<Self> {
        let cs = StorageConnectionString::parse(connection_string)?;
        let credential = StorageCredential::from_connection_string(&cs)?;
        Self::new(&cs.blob_endpoint, container_name, blob_name, credential, options)
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn blob_name(&self) -> &str {
        &self.blob_name
    }

    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    pub fn account_name(&self) -> Option<String> {
        account_name_from_url(&self.account_url)
    }

    /// Same blob, bound to a snapshot.
    pub fn with_snapshot(&self, snapshot: impl Into<String>) -> Self {
        Self {
            snapshot: Some(snapshot.into()),
            ..self.clone()
        }
    }

    pub fn url(&self) -> url::Url {
        self.url_with(&[])
    }

    fn url_with(&self, params: &[(&str, &str)]) -> url::Url {
        let mut url = resource_url(
            &self.account_url,
            &format!("{}/{}", self.container_name, self.blob_name),
        )
        .unwrap_or_else(|_| self.account_url.clone());
        if self.snapshot.is_some() || !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (k, v) in params {
                query.append_pair(k, v);
            }
            if let Some(s) = &self.snapshot {
                query.append_pair("snapshot", s);
            }
        }
        url
    }

    fn client(&self) -> &reqwest::Client {
        self.transport.pipeline.client()
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<RawResponse> {
        self.transport.pipeline.send(builder).await
    }

    /// Create a page blob of `size` bytes (a multiple of 512).
    pub async fn create_page_blob(
        &self,
        size: u64,
        options: &CreatePageBlobOptions,
    ) -> Result<ResponseInfo> {
        if size % PAGE_SIZE != 0 {
            return Err(Error::invalid(
                "page blob size must be aligned to a 512-byte boundary",
            ));
        }
        let mut builder = empty_body(self.client().put(self.url()))
            .header("x-ms-blob-type", "PageBlob")
            .header("x-ms-blob-content-length", size.to_string());
        builder = options.content_settings.apply(builder, "x-ms-blob-");
        builder = with_metadata(builder, &options.metadata);
        if let Some(seq) = options.sequence_number {
            builder = builder.header("x-ms-blob-sequence-number", seq.to_string());
        }
        if let Some(tier) = options.premium_page_blob_tier {
            builder = builder.header("x-ms-access-tier", tier.as_str());
        }
        if options.overwrite == Some(false) {
            builder = builder.header(http::header::IF_NONE_MATCH, "*");
        }
        builder = options.conditions.apply(builder);
        let response = self.send(builder).await?;
        debug!(
            "Created page blob {}/{} ({} bytes)",
            self.container_name, self.blob_name, size
        );
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    /// Write 512-aligned `data` at `offset`.
    pub async fn upload_page(
        &self,
        data: Bytes,
        offset: u64,
        options: &UploadPageOptions,
    ) -> Result<ResponseInfo> {
        let length = data.len() as u64;
        if length == 0 {
            return Err(Error::invalid("page data must not be empty"));
        }
        check_512_alignment(offset, length)?;
        let mut builder = self
            .client()
            .put(self.url_with(&[("comp", "page")]))
            .header("x-ms-page-write", "update")
            .header("x-ms-range", range_header(offset, Some(length)));
        if options.validate_content {
            builder = builder.header("content-md5", content_md5(&data));
        }
        builder = options.sequence_number.apply(options.conditions.apply(builder));
        let response = self.send(builder.body(data)).await?;
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    /// Write pages read from `source_url`.
    pub async fn upload_pages_from_url(
        &self,
        source_url: &str,
        offset: u64,
        length: u64,
        source_offset: u64,
        options: &UploadPagesFromUrlOptions,
    ) -> Result<ResponseInfo> {
        check_512_alignment(offset, length)?;
        if source_offset % PAGE_SIZE != 0 {
            return Err(Error::invalid(
                "source_offset must be an integer that aligns with 512 bytes",
            ));
        }
        let mut builder = empty_body(self.client().put(self.url_with(&[("comp", "page")])))
            .header("x-ms-page-write", "update")
            .header("x-ms-copy-source", source_url)
            .header("x-ms-range", range_header(offset, Some(length)))
            .header("x-ms-source-range", range_header(source_offset, Some(length)));
        if let Some(md5) = &options.source_content_md5 {
            builder = builder.header("x-ms-source-content-md5", md5);
        }
        if let Some(auth) = &options.source_authorization {
            builder = builder.header("x-ms-copy-source-authorization", auth);
        }
        builder = options.source_conditions.apply_source(builder);
        builder = options.sequence_number.apply(options.conditions.apply(builder));
        let response = self.send(builder).await?;
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    /// Clear a 512-aligned range of pages.
    pub async fn clear_page(
        &self,
        offset: u64,
        length: u64,
        options: &UploadPageOptions,
    ) -> Result<ResponseInfo> {
        check_512_alignment(offset, length)?;
        let mut builder = empty_body(self.client().put(self.url_with(&[("comp", "page")])))
            .header("x-ms-page-write", "clear")
            .header("x-ms-range", range_header(offset, Some(length)));
        builder = options.sequence_number.apply(options.conditions.apply(builder));
        let response = self.send(builder).await?;
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    /// Valid and (for diffs) cleared page ranges.
    pub async fn get_page_ranges(
        &self,
        options: &PageRangeOptions,
    ) -> Result<(Vec<ByteRange>, Vec<ByteRange>)> {
        let request = page_list_request(self, options, None)?;
        let response = self.send(request).await?;
        let root = response.xml()?;
        let ranges = root
            .children_named("PageRange")
            .map(ByteRange::from_xml)
            .collect::<Result<Vec<_>>>()?;
        let cleared = root
            .children_named("ClearRange")
            .map(ByteRange::from_xml)
            .collect::<Result<Vec<_>>>()?;
        Ok((ranges, cleared))
    }

    /// Page ranges in document order, one service page at a time.
    pub fn list_page_ranges(&self, options: PageRangeOptions) -> Result<Pager<PageRange>> {
        // Validate eagerly so argument errors surface before the first fetch.
        page_list_request(self, &options, None)?;
        let client = self.clone();
        Ok(Pager::new(None, move |marker| {
            let client = client.clone();
            let options = options.clone();
            async move {
                let request = page_list_request(&client, &options, marker.as_deref())?;
                let response = client.send(request).await?;
                let root = response.xml()?;
                let mut items = Vec::new();
                for node in &root.children {
                    let cleared = match node.name.as_str() {
                        "PageRange" => false,
                        "ClearRange" => true,
                        _ => continue,
                    };
                    let range = ByteRange::from_xml(node)?;
                    items.push(PageRange {
                        start: range.start,
                        end: range.end,
                        cleared,
                    });
                }
                let next = root.child_text("NextMarker").map(str::to_string);
                Ok(Page::new(items, next))
            }
        }))
    }

    /// Grow or shrink the blob (size a multiple of 512).
    pub async fn resize_blob(&self, size: u64, conditions: &BlobConditions) -> Result<ResponseInfo> {
        if size % PAGE_SIZE != 0 {
            return Err(Error::invalid(
                "page blob size must be aligned to a 512-byte boundary",
            ));
        }
        let builder = conditions.apply(
            empty_body(self.client().put(self.url_with(&[("comp", "properties")])))
                .header("x-ms-blob-content-length", size.to_string()),
        );
        let response = self.send(builder).await?;
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    /// Update the sequence number.  `value` is required for `Max` and `Update`.
    pub async fn set_sequence_number(
        &self,
        action: SequenceNumberAction,
        value: Option<i64>,
        conditions: &BlobConditions,
    ) -> Result<ResponseInfo> {
        let mut builder = empty_body(self.client().put(self.url_with(&[("comp", "properties")])))
            .header("x-ms-sequence-number-action", action.as_str());
        match (action, value) {
            (SequenceNumberAction::Increment, Some(_)) => {
                return Err(Error::invalid(
                    "a sequence number cannot be supplied with the increment action",
                ));
            }
            (SequenceNumberAction::Increment, None) => {}
            (_, Some(v)) => builder = builder.header("x-ms-blob-sequence-number", v.to_string()),
            (_, None) => {
                return Err(Error::invalid(
                    "a sequence number is required for the max and update actions",
                ));
            }
        }
        let response = self.send(conditions.apply(builder)).await?;
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    /// Start an incremental copy from a snapshot URL of another page blob.
    pub async fn start_copy_incremental(
        &self,
        source_snapshot_url: &str,
        conditions: &ModifiedAccessConditions,
    ) -> Result<CopyProperties> {
        let source = url::Url::parse(source_snapshot_url)
            .map_err(|e| Error::invalid(format!("invalid copy source: {}", e)))?;
        if !source.query_pairs().any(|(k, _)| k == "snapshot") {
            return Err(Error::invalid(
                "incremental copy source must be a blob snapshot URL",
            ));
        }
        let builder = conditions.apply(
            empty_body(
                self.client()
                    .put(self.url_with(&[("comp", "incrementalcopy")])),
            )
            .header("x-ms-copy-source", source_snapshot_url),
        );
        let response = self.send(builder).await?;
        Ok(CopyProperties::from_headers(&response.headers))
    }

    pub async fn set_premium_page_blob_tier(
        &self,
        tier: PremiumPageBlobTier,
        lease_id: Option<&str>,
    ) -> Result<()> {
        let mut builder = empty_body(self.client().put(self.url_with(&[("comp", "tier")])))
            .header("x-ms-access-tier", tier.as_str());
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        self.send(builder).await?;
        Ok(())
    }

    pub async fn get_blob_properties(&self, conditions: &BlobConditions) -> Result<BlobProperties> {
        let builder = conditions.apply(self.client().head(self.url()));
        let response = self.send(builder).await?;
        Ok(self.properties_from_headers(&response.headers, None))
    }

    fn properties_from_headers(&self, h: &HeaderMap, size: Option<u64>) -> BlobProperties {
        BlobProperties {
            name: self.blob_name.clone(),
            container: self.container_name.clone(),
            snapshot: self.snapshot.clone(),
            blob_type: header_string(h, "x-ms-blob-type"),
            size: size.or_else(|| header_parse(h, "content-length")).unwrap_or(0),
            content_settings: ContentSettings::from_headers(h),
            etag: header_string(h, "etag"),
            last_modified: header_date(h, "last-modified"),
            creation_time: header_date(h, "x-ms-creation-time"),
            metadata: parse_metadata(h),
            lease: LeaseProperties::from_headers(h),
            copy: CopyProperties::from_headers(h),
            blob_sequence_number: header_parse(h, "x-ms-blob-sequence-number"),
            server_encrypted: header_parse(h, "x-ms-server-encrypted"),
            blob_tier: header_string(h, "x-ms-access-tier"),
            is_incremental_copy: header_parse(h, "x-ms-incremental-copy"),
        }
    }

    /// Download the blob, or `length` bytes from `offset`.
    pub async fn download_blob(
        &self,
        offset: Option<u64>,
        length: Option<u64>,
        conditions: &BlobConditions,
    ) -> Result<DownloadedBlob> {
        let mut builder = self.client().get(self.url());
        match (offset, length) {
            (Some(o), l) => builder = builder.header("x-ms-range", range_header(o, l)),
            (None, Some(_)) => {
                return Err(Error::invalid("offset must be provided if length is provided"))
            }
            (None, None) => {}
        }
        let ranged = offset.is_some();
        let mut response = self
            .transport
            .pipeline
            .send_accepting(conditions.apply(builder), |s| {
                ranged && s == StatusCode::RANGE_NOT_SATISFIABLE
            })
            .await?;
        if response.status == StatusCode::RANGE_NOT_SATISFIABLE {
            if offset != Some(0) {
                return Err(Error::invalid("offset is beyond the end of the blob"));
            }
            // A zero-length blob rejects every range.
            response = self.send(conditions.apply(self.client().get(self.url()))).await?;
        }
        let total = header_str(&response.headers, "content-range")
            .and_then(parse_content_range)
            .map(|(_, _, total)| total);
        let mut properties = self.properties_from_headers(&response.headers, total);
        if let Some(md5) = header_string(&response.headers, "x-ms-blob-content-md5") {
            properties.content_settings.content_md5 = Some(md5);
        }
        Ok(DownloadedBlob {
            properties,
            content: response.body,
        })
    }

    pub async fn delete_blob(
        &self,
        delete_snapshots: Option<DeleteSnapshots>,
        conditions: &BlobConditions,
    ) -> Result<()> {
        let mut builder = self.client().delete(self.url());
        if let Some(mode) = delete_snapshots {
            if self.snapshot.is_some() {
                return Err(Error::invalid(
                    "delete_snapshots cannot be used when deleting a snapshot",
                ));
            }
            builder = builder.header(
                "x-ms-delete-snapshots",
                match mode {
                    DeleteSnapshots::Include => "include",
                    DeleteSnapshots::Only => "only",
                },
            );
        }
        self.send(conditions.apply(builder)).await?;
        Ok(())
    }

    /// Snapshot the blob; returns the snapshot id.
    pub async fn create_snapshot(
        &self,
        metadata: &HashMap<String, String>,
        conditions: &BlobConditions,
    ) -> Result<String> {
        let builder = conditions.apply(with_metadata(
            empty_body(self.client().put(self.url_with(&[("comp", "snapshot")]))),
            metadata,
        ));
        let response = self.send(builder).await?;
        response.require_header("x-ms-snapshot").map(str::to_string)
    }

    /// Create a page blob holding `data`.
    ///
    /// The data is zero-padded to a page boundary and written in chunks;
    /// chunks that are entirely zero are skipped since new pages read as zero.
    pub async fn upload_blob(
        &self,
        data: Bytes,
        options: &UploadPageBlobOptions,
    ) -> Result<ResponseInfo> {
        if options.chunk_size == 0 || options.chunk_size as u64 % PAGE_SIZE != 0 {
            return Err(Error::invalid("chunk_size must be a non-zero multiple of 512"));
        }
        let padded = {
            let rem = data.len() as u64 % PAGE_SIZE;
            if rem == 0 {
                data
            } else {
                let mut buf = BytesMut::with_capacity(data.len() + (PAGE_SIZE - rem) as usize);
                buf.extend_from_slice(&data);
                buf.resize(data.len() + (PAGE_SIZE - rem) as usize, 0);
                buf.freeze()
            }
        };
        let size = padded.len() as u64;
        let created = self.create_page_blob(size, &options.create).await?;

        let chunk_size = options.chunk_size;
        let chunks: Vec<(u64, Bytes)> = (0..padded.len())
            .step_by(chunk_size)
            .map(|start| {
                let end = (start + chunk_size).min(padded.len());
                (start as u64, padded.slice(start..end))
            })
            .filter(|(_, chunk)| chunk.iter().any(|b| *b != 0))
            .collect();
        let written = chunks.len();

        let page_options = UploadPageOptions {
            validate_content: options.validate_content,
            conditions: BlobConditions {
                lease_id: options.create.conditions.lease_id.clone(),
                modified: ModifiedAccessConditions::default(),
            },
            sequence_number: SequenceNumberConditions::default(),
        };
        let results: Vec<ResponseInfo> = stream::iter(chunks)
            .map(|(offset, chunk)| {
                let page_options = &page_options;
                async move { self.upload_page(chunk, offset, page_options).await }
            })
            .buffer_unordered(options.max_concurrency.max(1))
            .try_collect()
            .await?;
        info!(
            "Uploaded page blob {}/{}: {} bytes, {} non-empty chunks",
            self.container_name, self.blob_name, size, written
        );
        Ok(results.into_iter().last().unwrap_or(created))
    }

    pub fn get_lease_client(&self, lease_id: Option<String>) -> LeaseClient {
        LeaseClient::new(
            self.transport.pipeline.clone(),
            self.url(),
            LeaseTarget::Blob,
            lease_id,
        )
    }

    /// Acquire a lease for `duration` seconds (-1 for infinite).
    pub async fn acquire_lease(&self, duration: i32, lease_id: Option<String>) -> Result<LeaseClient> {
        let mut lease = self.get_lease_client(lease_id);
        lease.acquire(duration).await?;
        Ok(lease)
    }

    /// Service SAS for this blob (requires a shared key credential).
    pub fn generate_sas(&self, options: &SasOptions) -> Result<String> {
        let key = self.transport.shared_key.as_ref().ok_or_else(|| {
            Error::invalid("generating a SAS requires a shared key credential")
        })?;
        generate_blob_sas(
            key,
            &self.container_name,
            &self.blob_name,
            self.snapshot.as_deref(),
            options,
        )
    }
}

/// Build a `comp=pagelist` request.
fn page_list_request(
    client: &BlobClient,
    options: &PageRangeOptions,
    marker: Option<&str>,
) -> Result<reqwest::RequestBuilder> {
    if options.previous_snapshot.is_some() && options.previous_snapshot_url.is_some() {
        return Err(Error::invalid(
            "previous_snapshot and previous_snapshot_url are mutually exclusive",
        ));
    }
    let mut params: Vec<(&str, String)> = vec![("comp", "pagelist".to_string())];
    if let Some(prev) = &options.previous_snapshot {
        params.push(("prevsnapshot", prev.clone()));
    }
    if let Some(n) = options.results_per_page {
        params.push(("maxresults", n.to_string()));
    }
    if let Some(m) = marker {
        params.push(("marker", m.to_string()));
    }
    let params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
    let mut builder = client.client().get(client.url_with(&params));
    match (options.offset, options.length) {
        (Some(o), Some(l)) => {
            check_512_alignment(o, l)?;
            builder = builder.header("x-ms-range", range_header(o, Some(l)));
        }
        (Some(o), None) => {
            if o % PAGE_SIZE != 0 {
                return Err(Error::invalid(
                    "offset must be an integer that aligns with 512 bytes",
                ));
            }
            builder = builder.header("x-ms-range", range_header(o, None));
        }
        (None, Some(_)) => {
            return Err(Error::invalid("offset must be provided if length is provided"))
        }
        (None, None) => {}
    }
    if let Some(url) = &options.previous_snapshot_url {
        builder = builder.header("x-ms-previous-snapshot-url", url);
    }
    Ok(options.conditions.apply(builder))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob() -> BlobClient {
        BlobClient::new(
            "https://acct.blob.core.windows.net",
            "disks",
            "os/disk.vhd",
            StorageCredential::Anonymous,
            &ClientOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_blob_url_with_snapshot() {
        let b = blob().with_snapshot("2026-01-01T00:00:00.0000000Z");
        assert_eq!(
            b.url().as_str(),
            "https://acct.blob.core.windows.net/disks/os/disk.vhd?snapshot=2026-01-01T00%3A00%3A00.0000000Z"
        );
    }

    #[test]
    fn test_from_blob_url() {
        let b = BlobClient::from_blob_url(
            "https://acct.blob.core.windows.net/disks/os/disk.vhd?snapshot=abc",
            StorageCredential::Anonymous,
            &ClientOptions::default(),
        )
        .unwrap();
        assert_eq!(b.container_name(), "disks");
        assert_eq!(b.blob_name(), "os/disk.vhd");
        assert_eq!(b.snapshot(), Some("abc"));
        assert_eq!(b.account_name().as_deref(), Some("acct"));

        let emulator = BlobClient::from_blob_url(
            "http://127.0.0.1:10000/devstoreaccount1/c/b",
            StorageCredential::Anonymous,
            &ClientOptions::default(),
        )
        .unwrap();
        assert_eq!(
            emulator.url().as_str(),
            "http://127.0.0.1:10000/devstoreaccount1/c/b"
        );
        assert!(BlobClient::from_blob_url(
            "https://acct.blob.core.windows.net/onlycontainer",
            StorageCredential::Anonymous,
            &ClientOptions::default(),
        )
        .is_err());
    }

    #[test]
    fn test_page_list_request_validation() {
        let b = blob();
        let length_only = PageRangeOptions {
            length: Some(512),
            ..Default::default()
        };
        assert!(page_list_request(&b, &length_only, None).is_err());

        let unaligned = PageRangeOptions {
            offset: Some(1),
            length: Some(512),
            ..Default::default()
        };
        assert!(page_list_request(&b, &unaligned, None).is_err());

        let both = PageRangeOptions {
            previous_snapshot: Some("a".into()),
            previous_snapshot_url: Some("https://x/y?snapshot=b".into()),
            ..Default::default()
        };
        assert!(page_list_request(&b, &both, None).is_err());

        let ok = PageRangeOptions {
            offset: Some(0),
            length: Some(1024),
            previous_snapshot: Some("snap".into()),
            results_per_page: Some(2),
            ..Default::default()
        };
        let req = page_list_request(&b, &ok, Some("m1")).unwrap().build().unwrap();
        assert_eq!(
            req.url().query(),
            Some("comp=pagelist&prevsnapshot=snap&maxresults=2&marker=m1")
        );
        assert_eq!(req.headers()["x-ms-range"], "bytes=0-1023");
    }

    #[tokio::test]
    async fn test_alignment_rejected_locally() {
        let b = blob();
        assert!(matches!(
            b.create_page_blob(1000, &CreatePageBlobOptions::default()).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            b.upload_page(Bytes::from(vec![1u8; 100]), 0, &UploadPageOptions::default())
                .await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            b.clear_page(512, 100, &UploadPageOptions::default()).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            b.resize_blob(513, &BlobConditions::default()).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_sequence_number_arguments() {
        let b = blob();
        let none = BlobConditions::default();
        assert!(b
            .set_sequence_number(SequenceNumberAction::Increment, Some(3), &none)
            .await
            .is_err());
        assert!(b
            .set_sequence_number(SequenceNumberAction::Update, None, &none)
            .await
            .is_err());
    }

    #[test]
    fn test_sequence_number_headers() {
        let conditions = SequenceNumberConditions {
            if_sequence_number_lte: Some(10),
            if_sequence_number_eq: Some(7),
            ..Default::default()
        };
        let req = conditions
            .apply(reqwest::Client::new().put("http://localhost/c/b"))
            .build()
            .unwrap();
        assert_eq!(req.headers()["x-ms-if-sequence-number-le"], "10");
        assert_eq!(req.headers()["x-ms-if-sequence-number-eq"], "7");
        assert!(req.headers().get("x-ms-if-sequence-number-lt").is_none());
    }
}
