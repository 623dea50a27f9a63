//! Leases on blobs, containers (file systems) and files.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{empty_body, header_date, header_parse, header_string};
use crate::errors::{Error, Result};
use crate::pipeline::Pipeline;

/// What a [`LeaseClient`] leases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseTarget {
    Blob,
    /// Blob container or Data Lake file system.
    Container,
    File,
}

/// Acquire, renew, change, release and break a lease.
///
/// The lease id defaults to a random UUID and is updated by `acquire` and
/// `change` to whatever the service confirms.
#[derive(Debug, Clone)]
pub struct LeaseClient {
    pipeline: Pipeline,
    url: url::Url,
    target: LeaseTarget,
    id: String,
    etag: Option<String>,
    last_modified: Option<DateTime<Utc>>,
}

impl LeaseClient {
    pub(crate) fn new(
        pipeline: Pipeline,
        url: url::Url,
        target: LeaseTarget,
        lease_id: Option<String>,
    ) -> Self {
        Self {
            pipeline,
            url,
            target,
            id: lease_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            etag: None,
            last_modified: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> LeaseTarget {
        self.target
    }

    /// ETag of the leased resource from the last lease response.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// Acquire the lease; `duration` is seconds (15..=60) or -1 for infinite.
    pub async fn acquire(&mut self, duration: i32) -> Result<()> {
        match self.target {
            LeaseTarget::File if duration != -1 => {
                return Err(Error::invalid("file leases must be infinite (duration -1)"));
            }
            LeaseTarget::Blob | LeaseTarget::Container
                if duration != -1 && !(15..=60).contains(&duration) =>
            {
                return Err(Error::invalid(
                    "lease duration must be -1 (infinite) or between 15 and 60 seconds",
                ));
            }
            _ => {}
        }
        let builder = self
            .request("acquire")
            .header("x-ms-lease-duration", duration.to_string())
            .header("x-ms-proposed-lease-id", &self.id);
        let response = self.pipeline.send(builder).await?;
        self.update(&response.headers);
        debug!("Acquired lease {} on {}", self.id, self.url.path());
        Ok(())
    }

    /// Renew a blob or container lease.
    pub async fn renew(&mut self) -> Result<()> {
        if self.target == LeaseTarget::File {
            return Err(Error::invalid("file leases cannot be renewed"));
        }
        let builder = self.request("renew").header("x-ms-lease-id", &self.id);
        let response = self.pipeline.send(builder).await?;
        self.update(&response.headers);
        Ok(())
    }

    pub async fn release(&mut self) -> Result<()> {
        let builder = self.request("release").header("x-ms-lease-id", &self.id);
        let response = self.pipeline.send(builder).await?;
        self.etag = header_string(&response.headers, "etag");
        self.last_modified = header_date(&response.headers, "last-modified");
        Ok(())
    }

    /// Change the active lease id to `proposed_lease_id`.
    pub async fn change(&mut self, proposed_lease_id: &str) -> Result<()> {
        let builder = self
            .request("change")
            .header("x-ms-lease-id", &self.id)
            .header("x-ms-proposed-lease-id", proposed_lease_id);
        let response = self.pipeline.send(builder).await?;
        self.update(&response.headers);
        if header_string(&response.headers, "x-ms-lease-id").is_none() {
            self.id = proposed_lease_id.to_string();
        }
        Ok(())
    }

    /// Break the lease; returns the seconds until it is fully broken.
    ///
    /// `break_period` (0..=60) applies to blobs and containers only.
    pub async fn break_lease(&mut self, break_period: Option<u32>) -> Result<u32> {
        let mut builder = self.request("break");
        match (self.target, break_period) {
            (LeaseTarget::File, Some(_)) => {
                return Err(Error::invalid("file leases do not accept a break period"));
            }
            (_, Some(period)) if period > 60 => {
                return Err(Error::invalid("break period must be between 0 and 60 seconds"));
            }
            (_, Some(period)) => {
                builder = builder.header("x-ms-lease-break-period", period.to_string());
            }
            (_, None) => {}
        }
        let response = self.pipeline.send(builder).await?;
        self.etag = header_string(&response.headers, "etag");
        self.last_modified = header_date(&response.headers, "last-modified");
        Ok(header_parse(&response.headers, "x-ms-lease-time").unwrap_or(0))
    }

    fn request(&self, action: &str) -> reqwest::RequestBuilder {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            if self.target == LeaseTarget::Container {
                query.append_pair("restype", "container");
            }
            query.append_pair("comp", "lease");
        }
        empty_body(self.pipeline.client().put(url)).header("x-ms-lease-action", action)
    }

    fn update(&mut self, headers: &http::HeaderMap) {
        if let Some(id) = header_string(headers, "x-ms-lease-id") {
            self.id = id;
        }
        self.etag = header_string(headers, "etag");
        self.last_modified = header_date(headers, "last-modified");
    }
}
