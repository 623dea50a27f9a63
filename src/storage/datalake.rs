//! Data Lake Storage Gen2 file systems and paths.
//!
//! Path operations go to the `dfs` endpoint.  File-system level operations
//! (create, properties, metadata, access policy, leases, rename and deleted
//! path listing) are container operations and go to the matching `blob`
//! endpoint.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use serde_json::Value;
use tracing::{debug, info};

use super::lease::{LeaseClient, LeaseTarget};
use super::models::{
    signed_identifiers_from_xml, signed_identifiers_to_xml, ContainerProperties, ContentSettings,
    ModifiedAccessConditions, PublicAccess, SignedIdentifier,
};
use super::sas::{generate_container_sas, SasOptions};
use super::{
    dfs_to_blob_url, empty_body, header_date, header_parse, header_str, header_string,
    parse_account_url, parse_http_date, resource_url, with_metadata, StorageCredential,
    StorageTransport,
};
use crate::connection_string::StorageConnectionString;
use crate::errors::{Error, Result};
use crate::pager::{Page, Pager};
use crate::pipeline::{ClientOptions, RawResponse};

/// Whether a path is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
}

impl PathKind {
    fn resource(self) -> &'static str {
        match self {
            PathKind::File => "file",
            PathKind::Directory => "directory",
        }
    }
}

/// Options for creating a file or directory.
#[derive(Debug, Clone, Default)]
pub struct CreatePathOptions {
    pub metadata: HashMap<String, String>,
    pub content_settings: ContentSettings,
    /// POSIX permissions, symbolic (`rwxr-x---`) or octal (`0750`).
    pub permissions: Option<String>,
    pub umask: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub lease_id: Option<String>,
    /// `Some(false)` fails with `ResourceExists` if the path exists.
    pub overwrite: Option<bool>,
    pub conditions: ModifiedAccessConditions,
}

/// Options for [`FileSystemClient::get_paths`].
#[derive(Debug, Clone)]
pub struct GetPathsOptions {
    /// Directory to list; the file system root when unset.
    pub path: Option<String>,
    pub recursive: bool,
    pub results_per_page: Option<u32>,
    /// Return owner and group as user principal names.
    pub upn: Option<bool>,
}

impl Default for GetPathsOptions {
    fn default() -> Self {
        Self {
            path: None,
            recursive: true,
            results_per_page: None,
            upn: None,
        }
    }
}

/// File system access policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSystemAccessPolicy {
    pub public_access: Option<PublicAccess>,
    pub signed_identifiers: Vec<SignedIdentifier>,
}

/// A path as returned by listing or `get_properties`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathProperties {
    pub name: String,
    pub is_directory: bool,
    pub content_length: u64,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub permissions: Option<String>,
    pub creation_time: Option<String>,
    pub expiry_time: Option<String>,
    pub metadata: HashMap<String, String>,
    pub content_settings: ContentSettings,
}

/// A soft-deleted path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletedPathProperties {
    pub name: String,
    pub deletion_id: Option<String>,
    pub deleted_time: Option<DateTime<Utc>>,
    pub remaining_retention_days: Option<u32>,
}

/// Encode metadata as `x-ms-properties` (`key=base64(value),...`).
fn encode_properties(metadata: &HashMap<String, String>) -> String {
    let mut pairs: Vec<String> = metadata
        .iter()
        .map(|(k, v)| format!("{}={}", k, BASE64_STANDARD.encode(v)))
        .collect();
    pairs.sort();
    pairs.join(",")
}

fn decode_properties(value: &str) -> HashMap<String, String> {
    value
        .split(',')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            let decoded = BASE64_STANDARD.decode(v.trim()).ok()?;
            Some((k.trim().to_string(), String::from_utf8_lossy(&decoded).into_owned()))
        })
        .collect()
}

/// Listing fields arrive as strings (`"contentLength": "0"`) or numbers.
fn json_string(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn path_from_json(item: &Value) -> PathProperties {
    PathProperties {
        name: json_string(item, "name").unwrap_or_default(),
        is_directory: json_string(item, "isDirectory")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false),
        content_length: json_string(item, "contentLength")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        etag: json_string(item, "etag"),
        last_modified: json_string(item, "lastModified").and_then(|v| parse_http_date(&v)),
        owner: json_string(item, "owner"),
        group: json_string(item, "group"),
        permissions: json_string(item, "permissions"),
        creation_time: json_string(item, "creationTime"),
        expiry_time: json_string(item, "expiryTime"),
        metadata: HashMap::new(),
        content_settings: ContentSettings::default(),
    }
}

// ── File system ─────────────────────────────────────────────────────

/// Client for one Data Lake file system.
#[derive(Debug, Clone)]
pub struct FileSystemClient {
    transport: StorageTransport,
    dfs_url: url::Url,
    blob_url: url::Url,
    file_system_name: String,
}

impl FileSystemClient {
    /// `account_url` may be either the `dfs` or `blob` endpoint.
    pub fn new(
        account_url: &str,
        file_system_name: impl Into<String>,
        credential: StorageCredential,
        options: &ClientOptions,
    ) -> Result<Self> {
        let mut dfs_url = parse_account_url(account_url)?;
        if let Some(host) = dfs_url.host_str().map(str::to_string) {
            if host.contains(".blob.") {
                let _ = dfs_url.set_host(Some(&host.replacen(".blob.", ".dfs.", 1)));
            }
        }
        let blob_url = dfs_to_blob_url(&dfs_url);
        let transport = StorageTransport::new(&dfs_url, credential, options)?;
        Ok(Self {
            transport,
            dfs_url,
            blob_url,
            file_system_name: file_system_name.into(),
        })
    }

    pub fn from_connection_string(
        connection_string: &str,
        file_system_name: impl Into<String>,
        options: &ClientOptions,
    ) -> Result<Self> {
        let cs = StorageConnectionString::parse(connection_string)?;
        let credential = StorageCredential::from_connection_string(&cs)?;
        Self::new(&cs.dfs_endpoint, file_system_name, credential, options)
    }

    pub fn file_system_name(&self) -> &str {
        &self.file_system_name
    }

    /// `{dfs_endpoint}/{file_system}`.
    pub fn url(&self) -> url::Url {
        resource_url(&self.dfs_url, &self.file_system_name).unwrap_or_else(|_| self.dfs_url.clone())
    }

    fn container_url(&self, params: &[(&str, &str)]) -> url::Url {
        let mut url = resource_url(&self.blob_url, &self.file_system_name)
            .unwrap_or_else(|_| self.blob_url.clone());
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("restype", "container");
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

    pub async fn create_file_system(
        &self,
        metadata: &HashMap<String, String>,
        public_access: Option<PublicAccess>,
    ) -> Result<ContainerProperties> {
        let mut builder = with_metadata(empty_body(self.client().put(self.container_url(&[]))), metadata);
        if let Some(access) = public_access {
            builder = builder.header("x-ms-blob-public-access", access.as_str());
        }
        let response = self.send(builder).await?;
        info!("Created file system {}", self.file_system_name);
        Ok(ContainerProperties::from_headers(
            &self.file_system_name,
            &response.headers,
        ))
    }

    pub async fn exists(&self) -> Result<bool> {
        match self.get_file_system_properties(None).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Mark the file system for deletion.
    pub async fn delete_file_system(
        &self,
        lease_id: Option<&str>,
        conditions: &ModifiedAccessConditions,
    ) -> Result<()> {
        let mut builder = self.client().delete(self.container_url(&[]));
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        self.send(conditions.apply(builder)).await?;
        Ok(())
    }

    pub async fn get_file_system_properties(
        &self,
        lease_id: Option<&str>,
    ) -> Result<ContainerProperties> {
        let mut builder = self.client().get(self.container_url(&[]));
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        let response = self.send(builder).await?;
        Ok(ContainerProperties::from_headers(
            &self.file_system_name,
            &response.headers,
        ))
    }

    /// Replace the file system's metadata.
    pub async fn set_file_system_metadata(
        &self,
        metadata: &HashMap<String, String>,
        lease_id: Option<&str>,
    ) -> Result<ContainerProperties> {
        let mut builder = with_metadata(
            empty_body(self.client().put(self.container_url(&[("comp", "metadata")]))),
            metadata,
        );
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        let response = self.send(builder).await?;
        Ok(ContainerProperties::from_headers(
            &self.file_system_name,
            &response.headers,
        ))
    }

    /// Replace stored access policies (at most five) and the public access level.
    pub async fn set_file_system_access_policy(
        &self,
        signed_identifiers: &[SignedIdentifier],
        public_access: Option<PublicAccess>,
        lease_id: Option<&str>,
    ) -> Result<ContainerProperties> {
        if signed_identifiers.len() > 5 {
            return Err(Error::invalid(
                "too many access policies provided; the server does not support setting more than 5 access policies on a single resource",
            ));
        }
        let body = signed_identifiers_to_xml(signed_identifiers)?;
        let mut builder = self
            .client()
            .put(self.container_url(&[("comp", "acl")]))
            .header(http::header::CONTENT_TYPE, "application/xml")
            .body(body);
        if let Some(access) = public_access {
            builder = builder.header("x-ms-blob-public-access", access.as_str());
        }
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        let response = self.send(builder).await?;
        Ok(ContainerProperties::from_headers(
            &self.file_system_name,
            &response.headers,
        ))
    }

    pub async fn get_file_system_access_policy(
        &self,
        lease_id: Option<&str>,
    ) -> Result<FileSystemAccessPolicy> {
        let mut builder = self.client().get(self.container_url(&[("comp", "acl")]));
        if let Some(lease) = lease_id {
            builder = builder.header("x-ms-lease-id", lease);
        }
        let response = self.send(builder).await?;
        let signed_identifiers = if response.body.is_empty() {
            Vec::new()
        } else {
            signed_identifiers_from_xml(&response.xml()?)
        };
        Ok(FileSystemAccessPolicy {
            public_access: PublicAccess::from_headers(&response.headers),
            signed_identifiers,
        })
    }

    pub fn get_lease_client(&self, lease_id: Option<String>) -> LeaseClient {
        let url = resource_url(&self.blob_url, &self.file_system_name)
            .unwrap_or_else(|_| self.blob_url.clone());
        LeaseClient::new(
            self.transport.pipeline.clone(),
            url,
            LeaseTarget::Container,
            lease_id,
        )
    }

    /// Acquire a lease for `duration` seconds (-1 for infinite).
    pub async fn acquire_lease(&self, duration: i32, lease_id: Option<String>) -> Result<LeaseClient> {
        let mut lease = self.get_lease_client(lease_id);
        lease.acquire(duration).await?;
        Ok(lease)
    }

    /// Rename the file system; returns a client for the new name.
    pub async fn rename_file_system(
        &self,
        new_name: &str,
        source_lease_id: Option<&str>,
    ) -> Result<FileSystemClient> {
        let renamed = FileSystemClient {
            file_system_name: new_name.to_string(),
            ..self.clone()
        };
        let mut builder = empty_body(
            self.client()
                .put(renamed.container_url(&[("comp", "rename")])),
        )
        .header("x-ms-source-container-name", &self.file_system_name);
        if let Some(lease) = source_lease_id {
            builder = builder.header("x-ms-source-lease-id", lease);
        }
        self.send(builder).await?;
        info!("Renamed file system {} to {}", self.file_system_name, new_name);
        Ok(renamed)
    }

    /// List paths, following `x-ms-continuation`.
    pub fn get_paths(&self, options: GetPathsOptions) -> Pager<PathProperties> {
        let client = self.clone();
        Pager::new(None, move |continuation| {
            let client = client.clone();
            let options = options.clone();
            async move {
                let mut url = client.url();
                {
                    let mut query = url.query_pairs_mut();
                    query.append_pair("resource", "filesystem");
                    query.append_pair("recursive", if options.recursive { "true" } else { "false" });
                    if let Some(dir) = &options.path {
                        query.append_pair("directory", dir.trim_matches('/'));
                    }
                    if let Some(n) = options.results_per_page {
                        query.append_pair("maxResults", &n.to_string());
                    }
                    if let Some(upn) = options.upn {
                        query.append_pair("upn", if upn { "true" } else { "false" });
                    }
                    if let Some(token) = &continuation {
                        query.append_pair("continuation", token);
                    }
                }
                let response = client.send(client.client().get(url)).await?;
                let body: Value = response.json()?;
                let items = body
                    .get("paths")
                    .and_then(Value::as_array)
                    .map(|paths| paths.iter().map(path_from_json).collect())
                    .unwrap_or_default();
                let next = response.header("x-ms-continuation").map(str::to_string);
                Ok(Page::new(items, next))
            }
        })
    }

    pub fn get_directory_client(&self, directory: &str) -> PathClient {
        self.path_client(directory, PathKind::Directory)
    }

    pub fn get_file_client(&self, file_path: &str) -> PathClient {
        self.path_client(file_path, PathKind::File)
    }

    fn path_client(&self, path: &str, kind: PathKind) -> PathClient {
        PathClient {
            transport: self.transport.clone(),
            dfs_url: self.dfs_url.clone(),
            file_system_name: self.file_system_name.clone(),
            path: path.trim_matches('/').to_string(),
            kind,
        }
    }

    pub async fn create_directory(
        &self,
        directory: &str,
        options: &CreatePathOptions,
    ) -> Result<PathClient> {
        let client = self.get_directory_client(directory);
        client.create(options).await?;
        Ok(client)
    }

    pub async fn delete_directory(&self, directory: &str) -> Result<()> {
        self.get_directory_client(directory).delete(None).await
    }

    pub async fn create_file(&self, file_path: &str, options: &CreatePathOptions) -> Result<PathClient> {
        let client = self.get_file_client(file_path);
        client.create(options).await?;
        Ok(client)
    }

    pub async fn delete_file(&self, file_path: &str) -> Result<()> {
        self.get_file_client(file_path).delete(None).await
    }

    /// List soft-deleted paths under `path_prefix`.
    pub fn list_deleted_paths(
        &self,
        path_prefix: Option<String>,
        results_per_page: Option<u32>,
    ) -> Pager<DeletedPathProperties> {
        let client = self.clone();
        Pager::new(None, move |marker| {
            let client = client.clone();
            let path_prefix = path_prefix.clone();
            async move {
                let mut params: Vec<(&str, String)> = vec![
                    ("comp", "list".to_string()),
                    ("showonly", "deleted".to_string()),
                ];
                if let Some(prefix) = &path_prefix {
                    params.push(("prefix", prefix.clone()));
                }
                if let Some(n) = results_per_page {
                    params.push(("maxresults", n.to_string()));
                }
                if let Some(m) = &marker {
                    params.push(("marker", m.clone()));
                }
                let params: Vec<(&str, &str)> =
                    params.iter().map(|(k, v)| (*k, v.as_str())).collect();
                let response = client
                    .send(client.client().get(client.container_url(&params)))
                    .await?;
                let root = response.xml()?;
                let items = root
                    .child("Blobs")
                    .map(|blobs| {
                        blobs
                            .children_named("Blob")
                            .map(|blob| DeletedPathProperties {
                                name: blob.child_text("Name").unwrap_or_default().to_string(),
                                deletion_id: blob.child_text("DeletionId").map(str::to_string),
                                deleted_time: blob
                                    .path(&["Properties", "DeletedTime"])
                                    .and_then(|n| parse_http_date(&n.text)),
                                remaining_retention_days: blob
                                    .path(&["Properties", "RemainingRetentionDays"])
                                    .and_then(|n| n.text.trim().parse().ok()),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let next = root.child_text("NextMarker").map(str::to_string);
                Ok(Page::new(items, next))
            }
        })
    }

    /// Restore a soft-deleted path.
    pub async fn undelete_path(&self, deleted_path_name: &str, deletion_id: &str) -> Result<PathClient> {
        let path = deleted_path_name.trim_matches('/');
        let mut url = resource_url(&self.blob_url, &format!("{}/{}", self.file_system_name, path))?;
        url.query_pairs_mut().append_pair("comp", "undelete");
        let builder = empty_body(self.client().put(url))
            .header("x-ms-undelete-source", format!("{}?deletionid={}", path, deletion_id));
        let response = self.send(builder).await?;
        let kind = match header_str(&response.headers, "x-ms-resource-type") {
            Some("directory") => PathKind::Directory,
            _ => PathKind::File,
        };
        info!("Restored {} ({:?})", path, kind);
        Ok(self.path_client(path, kind))
    }

    /// Container SAS for this file system (requires a shared key credential).
    pub fn generate_sas(&self, options: &SasOptions) -> Result<String> {
        let key = self.transport.shared_key.as_ref().ok_or_else(|| {
            Error::invalid("generating a SAS requires a shared key credential")
        })?;
        generate_container_sas(key, &self.file_system_name, options)
    }
}

// ── Path ────────────────────────────────────────────────────────────

/// Client for one file or directory.
#[derive(Debug, Clone)]
pub struct PathClient {
    transport: StorageTransport,
    dfs_url: url::Url,
    file_system_name: String,
    path: String,
    kind: PathKind,
}

impl PathClient {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> PathKind {
        self.kind
    }

    pub fn file_system_name(&self) -> &str {
        &self.file_system_name
    }

    pub fn url(&self) -> url::Url {
        resource_url(
            &self.dfs_url,
            &format!("{}/{}", self.file_system_name, self.path),
        )
        .unwrap_or_else(|_| self.dfs_url.clone())
    }

    pub async fn create(&self, options: &CreatePathOptions) -> Result<()> {
        let mut url = self.url();
        url.query_pairs_mut().append_pair("resource", self.kind.resource());
        let mut builder = empty_body(self.transport.pipeline.client().put(url));
        if !options.metadata.is_empty() {
            builder = builder.header("x-ms-properties", encode_properties(&options.metadata));
        }
        builder = options.content_settings.apply(builder, "x-ms-");
        let optional = [
            ("x-ms-permissions", &options.permissions),
            ("x-ms-umask", &options.umask),
            ("x-ms-owner", &options.owner),
            ("x-ms-group", &options.group),
            ("x-ms-lease-id", &options.lease_id),
        ];
        for (name, value) in optional {
            if let Some(v) = value {
                builder = builder.header(name, v);
            }
        }
        if options.overwrite == Some(false) {
            builder = builder.header(http::header::IF_NONE_MATCH, "*");
        }
        builder = options.conditions.apply(builder);
        self.transport.pipeline.send(builder).await?;
        debug!("Created {} {}/{}", self.kind.resource(), self.file_system_name, self.path);
        Ok(())
    }

    /// Delete the path; directories are deleted recursively.
    pub async fn delete(&self, lease_id: Option<&str>) -> Result<()> {
        let mut continuation: Option<String> = None;
        loop {
            let mut url = self.url();
            {
                let mut query = url.query_pairs_mut();
                if self.kind == PathKind::Directory {
                    query.append_pair("recursive", "true");
                }
                if let Some(token) = &continuation {
                    query.append_pair("continuation", token);
                }
            }
            let mut builder = self.transport.pipeline.client().delete(url);
            if let Some(lease) = lease_id {
                builder = builder.header("x-ms-lease-id", lease);
            }
            let response = self.transport.pipeline.send(builder).await?;
            // Large directories are deleted in batches.
            continuation = response
                .header("x-ms-continuation")
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if continuation.is_none() {
                return Ok(());
            }
        }
    }

    pub async fn exists(&self) -> Result<bool> {
        match self.get_properties().await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn get_properties(&self) -> Result<PathProperties> {
        let response = self
            .transport
            .pipeline
            .send(self.transport.pipeline.client().head(self.url()))
            .await?;
        Ok(path_from_headers(&self.path, &response.headers))
    }
}

fn path_from_headers(name: &str, h: &HeaderMap) -> PathProperties {
    PathProperties {
        name: name.to_string(),
        is_directory: header_str(h, "x-ms-resource-type") == Some("directory"),
        content_length: header_parse(h, "content-length").unwrap_or(0),
        etag: header_string(h, "etag"),
        last_modified: header_date(h, "last-modified"),
        owner: header_string(h, "x-ms-owner"),
        group: header_string(h, "x-ms-group"),
        permissions: header_string(h, "x-ms-permissions"),
        creation_time: header_string(h, "x-ms-creation-time"),
        expiry_time: header_string(h, "x-ms-expiry-time"),
        metadata: header_str(h, "x-ms-properties")
            .map(decode_properties)
            .unwrap_or_default(),
        content_settings: ContentSettings::from_headers(h),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs() -> FileSystemClient {
        FileSystemClient::new(
            "https://acct.dfs.core.windows.net",
            "fs1",
            StorageCredential::Anonymous,
            &ClientOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoints() {
        let fs = fs();
        assert_eq!(fs.url().as_str(), "https://acct.dfs.core.windows.net/fs1");
        assert_eq!(
            fs.container_url(&[("comp", "acl")]).as_str(),
            "https://acct.blob.core.windows.net/fs1?restype=container&comp=acl"
        );
        let from_blob = FileSystemClient::new(
            "https://acct.blob.core.windows.net",
            "fs1",
            StorageCredential::Anonymous,
            &ClientOptions::default(),
        )
        .unwrap();
        assert_eq!(from_blob.url().as_str(), "https://acct.dfs.core.windows.net/fs1");
    }

    #[test]
    fn test_path_client_url() {
        let dir = fs().get_directory_client("/a/b dir/");
        assert_eq!(dir.path(), "a/b dir");
        assert_eq!(dir.kind(), PathKind::Directory);
        assert_eq!(
            dir.url().as_str(),
            "https://acct.dfs.core.windows.net/fs1/a/b%20dir"
        );
    }

    #[test]
    fn test_properties_encoding() {
        let mut metadata = HashMap::new();
        metadata.insert("hello".to_string(), "world".to_string());
        metadata.insert("number".to_string(), "42".to_string());
        let encoded = encode_properties(&metadata);
        assert_eq!(encoded, "hello=d29ybGQ=,number=NDI=");
        assert_eq!(decode_properties(&encoded), metadata);
    }

    #[test]
    fn test_path_from_json_accepts_strings_and_numbers() {
        let item = serde_json::json!({
            "name": "dir/file.txt",
            "isDirectory": "false",
            "contentLength": "1024",
            "etag": "0x8D",
            "lastModified": "Tue, 15 Nov 1994 08:12:31 GMT",
            "owner": "$superuser",
            "permissions": "rw-r-----"
        });
        let p = path_from_json(&item);
        assert_eq!(p.name, "dir/file.txt");
        assert!(!p.is_directory);
        assert_eq!(p.content_length, 1024);
        assert!(p.last_modified.is_some());

        let dir = path_from_json(&serde_json::json!({"name": "d", "isDirectory": true, "contentLength": 0}));
        assert!(dir.is_directory);
        assert_eq!(dir.content_length, 0);
    }

    #[tokio::test]
    async fn test_access_policy_limit() {
        let ids: Vec<SignedIdentifier> = (0..6)
            .map(|i| SignedIdentifier {
                id: format!("id{}", i),
                access_policy: None,
            })
            .collect();
        assert!(matches!(
            fs().set_file_system_access_policy(&ids, None, None).await,
            Err(Error::InvalidArgument(_))
        ));
    }
}
