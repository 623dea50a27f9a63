//! Azure Files: shares, directories and files.
//!
//! [`ShareClient`] manages a share (create, snapshot, properties, access
//! policy) and hands out [`ShareFileClient`]s for individual files.  File
//! content is written as ranges; `upload_file` and `download_file` split the
//! payload into 4 MiB ranges and move them concurrently.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use http::{HeaderMap, StatusCode};
use tracing::{debug, info};

use super::lease::{LeaseClient, LeaseTarget};
use super::models::{
    signed_identifiers_from_xml, signed_identifiers_to_xml, ByteRange, ContentSettings,
    CopyProperties, LeaseProperties, ResponseInfo, SignedIdentifier,
};
use super::sas::{generate_file_sas, generate_share_sas, SasOptions};
use super::{
    content_md5, empty_body, header_date, header_parse, header_string, parse_account_url,
    parse_content_range, parse_iso8601, parse_metadata, range_header, resource_url, with_metadata,
    StorageCredential, StorageTransport,
};
use crate::connection_string::StorageConnectionString;
use crate::errors::{Error, Result};
use crate::pipeline::{ClientOptions, RawResponse};

/// Range size used by `upload_file` and `download_file`.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Largest permission (SDDL) that may be sent inline.
const MAX_INLINE_PERMISSION: usize = 8 * 1024;

/// SMB timestamps carry 100ns precision: `2026-01-02T03:04:05.1234567Z`.
fn format_smb_time(value: &DateTime<Utc>) -> String {
    format!(
        "{}.{:07}Z",
        value.format("%Y-%m-%dT%H:%M:%S"),
        value.timestamp_subsec_nanos() / 100
    )
}

/// SMB properties of a file or directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmbProperties {
    /// Attribute list such as `ReadOnly|Archive`; `None` is sent as `"None"`.
    pub file_attributes: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub last_write_time: Option<DateTime<Utc>>,
    pub change_time: Option<DateTime<Utc>>,
    pub permission_key: Option<String>,
}

impl SmbProperties {
    /// Apply with `default` (`now`/`inherit` on create, `preserve` on update)
    /// filling unset fields.
    fn apply(
        &self,
        mut builder: reqwest::RequestBuilder,
        default_attributes: &str,
        default_time: &str,
        permission: Option<&str>,
        default_permission: &str,
    ) -> Result<reqwest::RequestBuilder> {
        if let Some(p) = permission {
            if p.len() > MAX_INLINE_PERMISSION {
                return Err(Error::invalid(
                    "file permission is larger than 8 KiB; set it on the share and pass its permission key instead",
                ));
            }
            if self.permission_key.is_some() {
                return Err(Error::invalid(
                    "file_permission and permission_key cannot both be set",
                ));
            }
        }
        builder = builder
            .header(
                "x-ms-file-attributes",
                self.file_attributes.as_deref().unwrap_or(default_attributes),
            )
            .header(
                "x-ms-file-creation-time",
                self.creation_time
                    .as_ref()
                    .map(format_smb_time)
                    .unwrap_or_else(|| default_time.to_string()),
            )
            .header(
                "x-ms-file-last-write-time",
                self.last_write_time
                    .as_ref()
                    .map(format_smb_time)
                    .unwrap_or_else(|| default_time.to_string()),
            );
        if let Some(change) = &self.change_time {
            builder = builder.header("x-ms-file-change-time", format_smb_time(change));
        }
        builder = match (&self.permission_key, permission) {
            (Some(key), _) => builder.header("x-ms-file-permission-key", key),
            (None, Some(p)) => builder.header("x-ms-file-permission", p),
            (None, None) => builder.header("x-ms-file-permission", default_permission),
        };
        Ok(builder)
    }
}

/// Options for [`ShareFileClient::create_file`].
#[derive(Debug, Clone, Default)]
pub struct CreateFileOptions {
    pub content_settings: ContentSettings,
    pub metadata: HashMap<String, String>,
    pub lease_id: Option<String>,
    /// SDDL permission; at most 8 KiB.
    pub file_permission: Option<String>,
    pub smb: SmbProperties,
}

/// `x-ms-file-last-write-time` behaviour for range writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileLastWriteMode {
    Now,
    Preserve,
}

impl FileLastWriteMode {
    fn as_str(self) -> &'static str {
        match self {
            FileLastWriteMode::Now => "Now",
            FileLastWriteMode::Preserve => "Preserve",
        }
    }
}

/// Options for range writes.
#[derive(Debug, Clone, Default)]
pub struct UploadRangeOptions {
    /// Send `Content-MD5` so the service verifies the payload.
    pub validate_content: bool,
    pub lease_id: Option<String>,
    pub file_last_write_mode: Option<FileLastWriteMode>,
}

/// Options for [`ShareFileClient::upload_file`].
#[derive(Debug, Clone)]
pub struct UploadFileOptions {
    pub create: CreateFileOptions,
    pub validate_content: bool,
    pub max_concurrency: usize,
    pub chunk_size: usize,
}

impl Default for UploadFileOptions {
    fn default() -> Self {
        Self {
            create: CreateFileOptions::default(),
            validate_content: false,
            max_concurrency: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Options for [`ShareFileClient::download_file`].
#[derive(Debug, Clone)]
pub struct DownloadFileOptions {
    pub offset: u64,
    /// Bytes to read from `offset`; `None` reads to the end.
    pub length: Option<u64>,
    pub lease_id: Option<String>,
    pub max_concurrency: usize,
    pub chunk_size: usize,
}

impl Default for DownloadFileOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            length: None,
            lease_id: None,
            max_concurrency: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// `x-ms-file-permission-copy-mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionCopyMode {
    /// Copy the source's security descriptor.
    Source,
    /// Use the permission or key supplied with the copy.
    Override,
}

/// Options for [`ShareFileClient::start_copy_from_url`].
#[derive(Debug, Clone, Default)]
pub struct CopyFileOptions {
    pub metadata: HashMap<String, String>,
    pub lease_id: Option<String>,
    pub permission_copy_mode: Option<PermissionCopyMode>,
    pub file_permission: Option<String>,
    pub ignore_read_only: Option<bool>,
    pub set_archive_attribute: Option<bool>,
    pub smb: SmbProperties,
}

/// Options for [`ShareFileClient::rename_file`].
#[derive(Debug, Clone, Default)]
pub struct RenameFileOptions {
    pub overwrite: Option<bool>,
    pub ignore_read_only: Option<bool>,
    pub file_permission: Option<String>,
    pub smb: SmbProperties,
    pub source_lease_id: Option<String>,
    pub destination_lease_id: Option<String>,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Share properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareProperties {
    pub name: String,
    pub snapshot: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Quota in GiB.
    pub quota: Option<u32>,
    pub metadata: HashMap<String, String>,
    pub lease: LeaseProperties,
}

/// File properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileProperties {
    pub name: String,
    pub path: String,
    pub share: String,
    pub snapshot: Option<String>,
    pub size: u64,
    pub content_settings: ContentSettings,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
    pub lease: LeaseProperties,
    pub copy: CopyProperties,
    pub server_encrypted: Option<bool>,
    pub file_attributes: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub last_write_time: Option<DateTime<Utc>>,
    pub change_time: Option<DateTime<Utc>>,
    pub file_id: Option<String>,
    pub parent_id: Option<String>,
    pub permission_key: Option<String>,
}

/// Downloaded content plus the file's properties.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub properties: FileProperties,
    pub content: Bytes,
}

// ── Share ───────────────────────────────────────────────────────────

/// Client for one file share.
#[derive(Debug, Clone)]
pub struct ShareClient {
    transport: StorageTransport,
    account_url: url::Url,
    share_name: String,
    snapshot: Option<String>,
}

impl ShareClient {
    pub fn new(
        account_url: &str,
        share_name: impl Into<String>,
        credential: StorageCredential,
        options: &ClientOptions,
    ) -> Result<Self> {
        let account_url = parse_account_url(account_url)?;
        let transport = StorageTransport::new(&account_url, credential, options)?;
        Ok(Self {
            transport,
            account_url,
            share_name: share_name.into(),
            snapshot: None,
        })
    }

    pub fn from_connection_string(
        connection_string: &str,
        share_name: impl Into<String>,
        options: &ClientOptions,
    ) -> Result<Self> {
        let cs = StorageConnectionString::parse(connection_string)?;
        let credential = StorageCredential::from_connection_string(&cs)?;
        Self::new(&cs.file_endpoint, share_name, credential, options)
    }

    pub fn share_name(&self) -> &str {
        &self.share_name
    }

    /// Same share, bound to a snapshot.
    pub fn with_snapshot(&self, snapshot: impl Into<String>) -> Self {
        Self {
            snapshot: Some(snapshot.into()),
            ..self.clone()
        }
    }

    /// `{account_url}/{share}`, with `sharesnapshot` when bound to a snapshot.
    pub fn url(&self) -> url::Url {
        let mut url = resource_url(&self.account_url, &self.share_name)
            .unwrap_or_else(|_| self.account_url.clone());
        if let Some(s) = &self.snapshot {
            url.query_pairs_mut().append_pair("sharesnapshot", s);
        }
        url
    }

    fn url_with(&self, params: &[(&str, &str)]) -> url::Url {
        let mut url = resource_url(&self.account_url, &self.share_name)
            .unwrap_or_else(|_| self.account_url.clone());
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("restype", "share");
            if let Some(s) = &self.snapshot {
                query.append_pair("sharesnapshot", s);
            }
            for (k, v) in params {
                query.append_pair(k, v);
            }
        }
        url
    }

    /// Create the share; `quota` is in GiB.
    pub async fn create_share(
        &self,
        metadata: &HashMap<String, String>,
        quota: Option<u32>,
    ) -> Result<ResponseInfo> {
        let mut builder = empty_body(self.transport.pipeline.client().put(self.url_with(&[])));
        builder = with_metadata(builder, metadata);
        if let Some(q) = quota {
            builder = builder.header("x-ms-share-quota", q.to_string());
        }
        let response = self.transport.pipeline.send(builder).await?;
        info!("Created share {}", self.share_name);
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    /// Delete the share; `delete_snapshots` also removes its snapshots.
    pub async fn delete_share(&self, delete_snapshots: bool) -> Result<()> {
        let mut builder = self.transport.pipeline.client().delete(self.url_with(&[]));
        if delete_snapshots {
            builder = builder.header("x-ms-delete-snapshots", "include");
        }
        self.transport.pipeline.send(builder).await?;
        Ok(())
    }

    /// Snapshot the share; returns the snapshot id.
    pub async fn create_snapshot(&self, metadata: &HashMap<String, String>) -> Result<String> {
        let builder = with_metadata(
            empty_body(
                self.transport
                    .pipeline
                    .client()
                    .put(self.url_with(&[("comp", "snapshot")])),
            ),
            metadata,
        );
        let response = self.transport.pipeline.send(builder).await?;
        response.require_header("x-ms-snapshot").map(str::to_string)
    }

    pub async fn get_share_properties(&self) -> Result<ShareProperties> {
        let builder = self.transport.pipeline.client().get(self.url_with(&[]));
        let response = self.transport.pipeline.send(builder).await?;
        let h = &response.headers;
        Ok(ShareProperties {
            name: self.share_name.clone(),
            snapshot: self.snapshot.clone(),
            etag: header_string(h, "etag"),
            last_modified: header_date(h, "last-modified"),
            quota: header_parse(h, "x-ms-share-quota"),
            metadata: parse_metadata(h),
            lease: LeaseProperties::from_headers(h),
        })
    }

    /// Replace the share's stored access policies.
    pub async fn set_share_access_policy(&self, identifiers: &[SignedIdentifier]) -> Result<()> {
        if identifiers.len() > 5 {
            return Err(Error::invalid(
                "too many access policies provided; a share supports at most 5",
            ));
        }
        let body = signed_identifiers_to_xml(identifiers)?;
        let builder = self
            .transport
            .pipeline
            .client()
            .put(self.url_with(&[("comp", "acl")]))
            .header(http::header::CONTENT_TYPE, "application/xml")
            .body(body);
        self.transport.pipeline.send(builder).await?;
        Ok(())
    }

    pub async fn get_share_access_policy(&self) -> Result<Vec<SignedIdentifier>> {
        let builder = self
            .transport
            .pipeline
            .client()
            .get(self.url_with(&[("comp", "acl")]));
        let response = self.transport.pipeline.send(builder).await?;
        if response.body.is_empty() {
            return Ok(Vec::new());
        }
        Ok(signed_identifiers_from_xml(&response.xml()?))
    }

    /// Create a directory (parents must exist).
    pub async fn create_directory(
        &self,
        directory_path: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<ResponseInfo> {
        let mut url = resource_url(
            &self.account_url,
            &format!("{}/{}", self.share_name, directory_path.trim_matches('/')),
        )?;
        url.query_pairs_mut().append_pair("restype", "directory");
        let builder = SmbProperties::default().apply(
            with_metadata(empty_body(self.transport.pipeline.client().put(url)), metadata),
            "Directory",
            "now",
            None,
            "inherit",
        )?;
        let response = self.transport.pipeline.send(builder).await?;
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    pub fn get_file_client(&self, file_path: &str) -> ShareFileClient {
        ShareFileClient {
            transport: self.transport.clone(),
            account_url: self.account_url.clone(),
            share_name: self.share_name.clone(),
            file_path: file_path.trim_matches('/').to_string(),
            snapshot: self.snapshot.clone(),
        }
    }

    /// Service SAS for this share (requires a shared key credential).
    pub fn generate_sas(&self, options: &SasOptions) -> Result<String> {
        let key = self.transport.shared_key.as_ref().ok_or_else(|| {
            Error::invalid("generating a SAS requires a shared key credential")
        })?;
        generate_share_sas(key, &self.share_name, options)
    }
}

// ── File ────────────────────────────────────────────────────────────

/// Client for one file in a share.
#[derive(Debug, Clone)]
pub struct ShareFileClient {
    transport: StorageTransport,
    account_url: url::Url,
    share_name: String,
    file_path: String,
    snapshot: Option<String>,
}

impl ShareFileClient {
    pub fn new(
        account_url: &str,
        share_name: impl Into<String>,
        file_path: &str,
        credential: StorageCredential,
        options: &ClientOptions,
    ) -> Result<Self> {
        Ok(ShareClient::new(account_url, share_name, credential, options)?.get_file_client(file_path))
    }

    /// Same file, bound to a share snapshot.
    pub fn with_snapshot(&self, snapshot: impl Into<String>) -> Self {
        Self {
            snapshot: Some(snapshot.into()),
            ..self.clone()
        }
    }

    pub fn share_name(&self) -> &str {
        &self.share_name
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.file_path.rsplit('/').next().unwrap_or(&self.file_path)
    }

    /// `{account_url}/{share}/{path}`, with `sharesnapshot` when bound to a snapshot.
    pub fn url(&self) -> url::Url {
        self.url_with(&[])
    }

    fn url_with(&self, params: &[(&str, &str)]) -> url::Url {
        let mut url = resource_url(
            &self.account_url,
            &format!("{}/{}", self.share_name, self.file_path),
        )
        .unwrap_or_else(|_| self.account_url.clone());
        if self.snapshot.is_some() || !params.is_empty() {
            let mut query = url.query_pairs_mut();
            if let Some(s) = &self.snapshot {
                query.append_pair("sharesnapshot", s);
            }
            for (k, v) in params {
                query.append_pair(k, v);
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

    /// Create (or overwrite) the file with a fixed size.
    pub async fn create_file(&self, size: u64, options: &CreateFileOptions) -> Result<ResponseInfo> {
        let mut builder = empty_body(self.client().put(self.url()))
            .header("x-ms-type", "file")
            .header("x-ms-content-length", size.to_string());
        builder = options.content_settings.apply(builder, "x-ms-");
        builder = with_metadata(builder, &options.metadata);
        if let Some(lease) = &options.lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        builder = options.smb.apply(
            builder,
            "None",
            "now",
            options.file_permission.as_deref(),
            "inherit",
        )?;
        let response = self.send(builder).await?;
        debug!("Created file {}/{} ({} bytes)", self.share_name, self.file_path, size);
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    /// Whether the file exists.
    pub async fn exists(&self) -> Result<bool> {
        match self.send(self.client().head(self.url())).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_file(&self, lease_id: Option<&str>) -> Result<()> {
        let mut builder = self.client().delete(self.url());
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        self.send(builder).await?;
        Ok(())
    }

    pub async fn get_file_properties(&self, lease_id: Option<&str>) -> Result<FileProperties> {
        let mut builder = self.client().head(self.url());
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        let response = self.send(builder).await?;
        Ok(self.properties_from_headers(&response.headers, None))
    }

    fn properties_from_headers(&self, h: &HeaderMap, size: Option<u64>) -> FileProperties {
        FileProperties {
            name: self.file_name().to_string(),
            path: self.file_path.clone(),
            share: self.share_name.clone(),
            snapshot: self.snapshot.clone(),
            size: size.or_else(|| header_parse(h, "content-length")).unwrap_or(0),
            content_settings: ContentSettings::from_headers(h),
            etag: header_string(h, "etag"),
            last_modified: header_date(h, "last-modified"),
            metadata: parse_metadata(h),
            lease: LeaseProperties::from_headers(h),
            copy: CopyProperties::from_headers(h),
            server_encrypted: header_parse(h, "x-ms-server-encrypted"),
            file_attributes: header_string(h, "x-ms-file-attributes"),
            creation_time: header_string(h, "x-ms-file-creation-time")
                .and_then(|v| parse_iso8601(&v)),
            last_write_time: header_string(h, "x-ms-file-last-write-time")
                .and_then(|v| parse_iso8601(&v)),
            change_time: header_string(h, "x-ms-file-change-time").and_then(|v| parse_iso8601(&v)),
            file_id: header_string(h, "x-ms-file-id"),
            parent_id: header_string(h, "x-ms-file-parent-id"),
            permission_key: header_string(h, "x-ms-file-permission-key"),
        }
    }

    /// Replace the content headers; SMB properties are preserved unless given.
    pub async fn set_http_headers(
        &self,
        content_settings: &ContentSettings,
        smb: &SmbProperties,
        file_permission: Option<&str>,
        lease_id: Option<&str>,
    ) -> Result<ResponseInfo> {
        let mut builder = empty_body(self.client().put(self.url_with(&[("comp", "properties")])));
        builder = content_settings.apply(builder, "x-ms-");
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        builder = smb.apply(builder, "preserve", "preserve", file_permission, "preserve")?;
        let response = self.send(builder).await?;
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    /// Replace all user metadata.
    pub async fn set_file_metadata(
        &self,
        metadata: &HashMap<String, String>,
        lease_id: Option<&str>,
    ) -> Result<ResponseInfo> {
        let mut builder = with_metadata(
            empty_body(self.client().put(self.url_with(&[("comp", "metadata")]))),
            metadata,
        );
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        let response = self.send(builder).await?;
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    /// Change the file size, truncating or zero-extending.
    pub async fn resize_file(&self, size: u64, lease_id: Option<&str>) -> Result<ResponseInfo> {
        let mut builder = empty_body(self.client().put(self.url_with(&[("comp", "properties")])))
            .header("x-ms-content-length", size.to_string());
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        builder = SmbProperties::default().apply(builder, "preserve", "preserve", None, "preserve")?;
        let response = self.send(builder).await?;
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    /// Write `data` at `offset`.
    pub async fn upload_range(
        &self,
        data: Bytes,
        offset: u64,
        options: &UploadRangeOptions,
    ) -> Result<ResponseInfo> {
        if data.is_empty() {
            return Err(Error::invalid("range data must not be empty"));
        }
        let mut builder = self
            .client()
            .put(self.url_with(&[("comp", "range")]))
            .header("x-ms-range", range_header(offset, Some(data.len() as u64)))
            .header("x-ms-write", "update");
        if options.validate_content {
            builder = builder.header("content-md5", content_md5(&data));
        }
        if let Some(lease) = &options.lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        if let Some(mode) = options.file_last_write_mode {
            builder = builder.header("x-ms-file-last-write-time", mode.as_str());
        }
        let response = self.send(builder.body(data)).await?;
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    /// Copy `length` bytes from `source_url` (at `source_offset`) into this file at `offset`.
    pub async fn upload_range_from_url(
        &self,
        source_url: &str,
        offset: u64,
        length: u64,
        source_offset: u64,
        options: &UploadRangeOptions,
    ) -> Result<ResponseInfo> {
        if length == 0 {
            return Err(Error::invalid("length must be greater than zero"));
        }
        let mut builder = empty_body(self.client().put(self.url_with(&[("comp", "range")])))
            .header("x-ms-copy-source", source_url)
            .header("x-ms-range", range_header(offset, Some(length)))
            .header("x-ms-source-range", range_header(source_offset, Some(length)))
            .header("x-ms-write", "update");
        if let Some(lease) = &options.lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        if let Some(mode) = options.file_last_write_mode {
            builder = builder.header("x-ms-file-last-write-time", mode.as_str());
        }
        let response = self.send(builder).await?;
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    /// Zero a 512-aligned range.
    pub async fn clear_range(
        &self,
        offset: u64,
        length: u64,
        lease_id: Option<&str>,
    ) -> Result<ResponseInfo> {
        super::check_512_alignment(offset, length)?;
        let mut builder = empty_body(self.client().put(self.url_with(&[("comp", "range")])))
            .header("x-ms-range", range_header(offset, Some(length)))
            .header("x-ms-write", "clear");
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        let response = self.send(builder).await?;
        Ok(ResponseInfo::from_headers(&response.headers))
    }

    /// Create the file and write `data` in ranges.
    pub async fn upload_file(&self, data: Bytes, options: &UploadFileOptions) -> Result<ResponseInfo> {
        let size = data.len() as u64;
        let created = self.create_file(size, &options.create).await?;
        if data.is_empty() {
            return Ok(created);
        }

        let chunk_size = options.chunk_size.max(1);
        let range_options = UploadRangeOptions {
            validate_content: options.validate_content,
            lease_id: options.create.lease_id.clone(),
            file_last_write_mode: None,
        };
        let chunks: Vec<(u64, Bytes)> = (0..data.len())
            .step_by(chunk_size)
            .map(|start| {
                let end = (start + chunk_size).min(data.len());
                (start as u64, data.slice(start..end))
            })
            .collect();
        let count = chunks.len();

        let results: Vec<ResponseInfo> = stream::iter(chunks)
            .map(|(offset, chunk)| {
                let range_options = &range_options;
                async move { self.upload_range(chunk, offset, range_options).await }
            })
            .buffer_unordered(options.max_concurrency.max(1))
            .try_collect()
            .await?;
        info!(
            "Uploaded {} bytes to {}/{} in {} ranges",
            size, self.share_name, self.file_path, count
        );
        Ok(results.into_iter().last().unwrap_or(created))
    }

    async fn get_range(
        &self,
        offset: u64,
        length: Option<u64>,
        lease_id: Option<&str>,
    ) -> Result<RawResponse> {
        let mut builder = self
            .client()
            .get(self.url())
            .header("x-ms-range", range_header(offset, length));
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        self.transport
            .pipeline
            .send_accepting(builder, |s| s == StatusCode::RANGE_NOT_SATISFIABLE)
            .await
    }

    /// Download the file (or a range of it).
    pub async fn download_file(&self, options: &DownloadFileOptions) -> Result<DownloadedFile> {
        let chunk = options.chunk_size.max(1) as u64;
        let first_len = match options.length {
            Some(len) => len.min(chunk),
            None => chunk,
        };
        if options.length == Some(0) {
            return Err(Error::invalid("length must be greater than zero"));
        }
        let lease = options.lease_id.as_deref();

        let mut first = self.get_range(options.offset, Some(first_len), lease).await?;
        if first.status == StatusCode::RANGE_NOT_SATISFIABLE {
            if options.offset != 0 {
                return Err(Error::invalid("offset is beyond the end of the file"));
            }
            // Empty files reject every range; read them whole.
            let mut builder = self.client().get(self.url());
            if let Some(lease) = lease {
                builder = builder.header("x-ms-lease-id", lease);
            }
            first = self.send(builder).await?;
        }

        let total = first
            .header("content-range")
            .and_then(parse_content_range)
            .map(|(_, _, total)| total)
            .unwrap_or(first.body.len() as u64);
        let mut properties = self.properties_from_headers(&first.headers, Some(total));
        if let Some(md5) = first.header("x-ms-content-md5") {
            properties.content_settings.content_md5 = Some(md5.to_string());
        }

        let end = match options.length {
            Some(len) => (options.offset + len).min(total),
            None => total,
        };
        let mut next = options.offset + first.body.len() as u64;
        let mut ranges = Vec::new();
        while next < end {
            let len = chunk.min(end - next);
            ranges.push((next, len));
            next += len;
        }

        let mut content = BytesMut::with_capacity(end.saturating_sub(options.offset) as usize);
        content.extend_from_slice(&first.body);
        let rest: Vec<Bytes> = stream::iter(ranges)
            .map(|(offset, len)| async move {
                self.get_range(offset, Some(len), lease)
                    .await
                    .map(|r| r.body)
            })
            .buffered(options.max_concurrency.max(1))
            .try_collect()
            .await?;
        for part in rest {
            content.extend_from_slice(&part);
        }

        Ok(DownloadedFile {
            properties,
            content: content.freeze(),
        })
    }

    /// Valid and (when diffing against `previous_snapshot`) cleared ranges.
    pub async fn get_ranges(
        &self,
        offset: Option<u64>,
        length: Option<u64>,
        previous_snapshot: Option<&str>,
        lease_id: Option<&str>,
    ) -> Result<(Vec<ByteRange>, Vec<ByteRange>)> {
        let mut params = vec![("comp", "rangelist")];
        if let Some(prev) = previous_snapshot {
            params.push(("prevsharesnapshot", prev));
        }
        let mut builder = self.client().get(self.url_with(&params));
        match (offset, length) {
            (Some(o), l) => builder = builder.header("x-ms-range", range_header(o, l)),
            (None, Some(_)) => {
                return Err(Error::invalid("offset must be provided if length is provided"))
            }
            (None, None) => {}
        }
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        let response = self.send(builder).await?;
        let root = response.xml()?;
        let ranges = root
            .children_named("Range")
            .map(ByteRange::from_xml)
            .collect::<Result<Vec<_>>>()?;
        let cleared = root
            .children_named("ClearRange")
            .map(ByteRange::from_xml)
            .collect::<Result<Vec<_>>>()?;
        Ok((ranges, cleared))
    }

    /// Start a server-side copy from `source_url`.
    pub async fn start_copy_from_url(
        &self,
        source_url: &str,
        options: &CopyFileOptions,
    ) -> Result<CopyProperties> {
        let mut builder = with_metadata(
            empty_body(self.client().put(self.url())).header("x-ms-copy-source", source_url),
            &options.metadata,
        );
        if let Some(lease) = &options.lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        if let Some(mode) = options.permission_copy_mode {
            let mode = match mode {
                PermissionCopyMode::Source => "source",
                PermissionCopyMode::Override => {
                    if options.file_permission.is_none() && options.smb.permission_key.is_none() {
                        return Err(Error::invalid(
                            "permission copy mode 'override' needs a file permission or permission key",
                        ));
                    }
                    "override"
                }
            };
            builder = builder.header("x-ms-file-permission-copy-mode", mode);
        }
        if let Some(p) = &options.file_permission {
            builder = builder.header("x-ms-file-permission", p);
        }
        if let Some(key) = &options.smb.permission_key {
            builder = builder.header("x-ms-file-permission-key", key);
        }
        if let Some(v) = options.ignore_read_only {
            builder = builder.header("x-ms-file-copy-ignore-readonly", v.to_string());
        }
        if let Some(v) = options.set_archive_attribute {
            builder = builder.header("x-ms-file-copy-set-archive", v.to_string());
        }
        if let Some(attrs) = &options.smb.file_attributes {
            builder = builder.header("x-ms-file-attributes", attrs);
        }
        if let Some(t) = &options.smb.creation_time {
            builder = builder.header("x-ms-file-creation-time", format_smb_time(t));
        }
        if let Some(t) = &options.smb.last_write_time {
            builder = builder.header("x-ms-file-last-write-time", format_smb_time(t));
        }
        let response = self.send(builder).await?;
        Ok(CopyProperties::from_headers(&response.headers))
    }

    /// Abort a pending copy.
    pub async fn abort_copy(&self, copy_id: &str, lease_id: Option<&str>) -> Result<()> {
        let mut builder = empty_body(
            self.client()
                .put(self.url_with(&[("comp", "copy"), ("copyid", copy_id)])),
        )
        .header("x-ms-copy-action", "abort");
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        self.send(builder).await?;
        Ok(())
    }

    /// Rename within the share; returns a client for the new path.
    pub async fn rename_file(
        &self,
        new_path: &str,
        options: &RenameFileOptions,
    ) -> Result<ShareFileClient> {
        let new_path = new_path.trim_matches('/');
        if new_path.is_empty() {
            return Err(Error::invalid("new file path must not be empty"));
        }
        let target = ShareFileClient {
            file_path: new_path.to_string(),
            snapshot: None,
            ..self.clone()
        };

        let mut builder = with_metadata(
            empty_body(self.client().put(target.url_with(&[("comp", "rename")])))
                .header("x-ms-file-rename-source", self.url().as_str()),
            &options.metadata,
        );
        if let Some(v) = options.overwrite {
            builder = builder.header("x-ms-file-rename-replace-if-exists", v.to_string());
        }
        if let Some(v) = options.ignore_read_only {
            builder = builder.header("x-ms-file-rename-ignore-readonly", v.to_string());
        }
        if let Some(lease) = &options.source_lease_id {
            builder = builder.header("x-ms-source-lease-id", lease);
        }
        if let Some(lease) = &options.destination_lease_id {
            builder = builder.header("x-ms-destination-lease-id", lease);
        }
        if let Some(ct) = &options.content_type {
            builder = builder.header("x-ms-content-type", ct);
        }
        if let Some(p) = &options.file_permission {
            if p.len() > MAX_INLINE_PERMISSION {
                return Err(Error::invalid("file permission is larger than 8 KiB"));
            }
            builder = builder.header("x-ms-file-permission", p);
        } else if let Some(key) = &options.smb.permission_key {
            builder = builder.header("x-ms-file-permission-key", key);
        }
        if let Some(attrs) = &options.smb.file_attributes {
            builder = builder.header("x-ms-file-attributes", attrs);
        }
        if let Some(t) = &options.smb.creation_time {
            builder = builder.header("x-ms-file-creation-time", format_smb_time(t));
        }
        if let Some(t) = &options.smb.last_write_time {
            builder = builder.header("x-ms-file-last-write-time", format_smb_time(t));
        }
        self.send(builder).await?;
        info!("Renamed {} to {}", self.file_path, new_path);
        Ok(target)
    }

    /// Lease client for this file.
    pub fn get_lease_client(&self, lease_id: Option<String>) -> LeaseClient {
        LeaseClient::new(
            self.transport.pipeline.clone(),
            self.url(),
            LeaseTarget::File,
            lease_id,
        )
    }

    /// Acquire an infinite lease.
    pub async fn acquire_lease(&self, lease_id: Option<String>) -> Result<LeaseClient> {
        let mut lease = self.get_lease_client(lease_id);
        lease.acquire(-1).await?;
        Ok(lease)
    }

    /// Service SAS for this file (requires a shared key credential).
    pub fn generate_sas(&self, options: &SasOptions) -> Result<String> {
        let key = self.transport.shared_key.as_ref().ok_or_else(|| {
            Error::invalid("generating a SAS requires a shared key credential")
        })?;
        generate_file_sas(key, &self.share_name, &self.file_path, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn share() -> ShareClient {
        ShareClient::new(
            "https://acct.file.core.windows.net",
            "vhds",
            StorageCredential::Anonymous,
            &ClientOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_make_file_url() {
        let file = share().get_file_client("vhd_dir/my.vhd");
        assert_eq!(
            file.url().as_str(),
            "https://acct.file.core.windows.net/vhds/vhd_dir/my.vhd"
        );
        assert_eq!(file.file_name(), "my.vhd");
    }

    #[test]
    fn test_make_file_url_no_directory_and_protocol() {
        let file = ShareClient::new(
            "http://acct.file.core.windows.net/",
            "vhds",
            StorageCredential::Anonymous,
            &ClientOptions::default(),
        )
        .unwrap()
        .get_file_client("my.vhd");
        assert_eq!(file.url().as_str(), "http://acct.file.core.windows.net/vhds/my.vhd");
    }

    #[test]
    fn test_make_file_url_with_snapshot_and_unicode() {
        let file = share()
            .get_file_client("啊齄丂狛狜")
            .with_snapshot("2026-01-01T00:00:00.0000000Z");
        let url = file.url();
        assert!(url.path().ends_with("/vhds/%E5%95%8A%E9%BD%84%E4%B8%82%E7%8B%9B%E7%8B%9C"));
        assert_eq!(
            url.query_pairs().next().unwrap(),
            ("sharesnapshot".into(), "2026-01-01T00:00:00.0000000Z".into())
        );
    }

    #[test]
    fn test_smb_time_format() {
        let t = Utc.with_ymd_and_hms(2026, 2, 3, 4, 5, 6).unwrap()
            + chrono::Duration::nanoseconds(123_456_700);
        assert_eq!(format_smb_time(&t), "2026-02-03T04:05:06.1234567Z");
    }

    #[tokio::test]
    async fn test_create_file_rejects_long_permission() {
        let file = share().get_file_client("dir/f");
        let options = CreateFileOptions {
            file_permission: Some("a".repeat(8 * 1024 + 1)),
            ..Default::default()
        };
        assert!(matches!(
            file.create_file(1024, &options).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_range_alignment_checked_locally() {
        let file = share().get_file_client("f");
        assert!(matches!(
            file.clear_range(1, 512, None).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            file.clear_range(0, 511, None).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_generate_sas_requires_shared_key() {
        let file = share().get_file_client("f");
        let options = SasOptions::new("r", Utc::now());
        assert!(file.generate_sas(&options).is_err());
    }
}
