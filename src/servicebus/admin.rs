//! Queue administration over the Service Bus ATOM management API.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use http::StatusCode;
use tracing::{debug, info};

use super::{format_duration, parse_duration};
use crate::auth::{BearerTokenCredential, Credential, ServiceBusSasCredential, TokenCredential};
use crate::connection_string::ServiceBusConnectionString;
use crate::errors::{Error, ResponseError, Result};
use crate::pager::{Page, Pager};
use crate::pipeline::{ApiVersion, ClientOptions, Pipeline, RawResponse};
use crate::storage::parse_iso8601;
use crate::xml::{XmlNode, XmlWriter};

/// Management API version.
pub const SERVICE_BUS_API_VERSION: &str = "2021-05";

/// OAuth scope for Service Bus.
pub const SERVICE_BUS_SCOPE: &str = "https://servicebus.azure.net/.default";

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const CONNECT_NS: &str = "http://schemas.microsoft.com/netservices/2010/10/servicebus/connect";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const ATOM_CONTENT_TYPE: &str = "application/atom+xml";

/// Entities fetched per list request.
const LIST_PAGE_SIZE: usize = 100;

/// How the administration client authenticates.
#[derive(Clone)]
pub enum ServiceBusCredential {
    Sas(ServiceBusSasCredential),
    Token(Arc<dyn TokenCredential>),
}

/// Entity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityStatus {
    #[default]
    Active,
    Disabled,
    SendDisabled,
    ReceiveDisabled,
    Creating,
    Deleting,
    Renaming,
    Restoring,
    Unknown,
}

impl EntityStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "Active" => Self::Active,
            "Disabled" => Self::Disabled,
            "SendDisabled" => Self::SendDisabled,
            "ReceiveDisabled" => Self::ReceiveDisabled,
            "Creating" => Self::Creating,
            "Deleting" => Self::Deleting,
            "Renaming" => Self::Renaming,
            "Restoring" => Self::Restoring,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Disabled => "Disabled",
            Self::SendDisabled => "SendDisabled",
            Self::ReceiveDisabled => "ReceiveDisabled",
            Self::Creating => "Creating",
            Self::Deleting => "Deleting",
            Self::Renaming => "Renaming",
            Self::Restoring => "Restoring",
            Self::Unknown => "Unknown",
        }
    }
}

/// Settings for a new queue; unset fields take the service defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueOptions {
    pub lock_duration: Option<ChronoDuration>,
    pub max_size_in_megabytes: Option<i64>,
    pub requires_duplicate_detection: Option<bool>,
    pub requires_session: Option<bool>,
    pub default_message_time_to_live: Option<ChronoDuration>,
    pub dead_lettering_on_message_expiration: Option<bool>,
    pub duplicate_detection_history_time_window: Option<ChronoDuration>,
    pub max_delivery_count: Option<i32>,
    pub enable_batched_operations: Option<bool>,
    pub status: Option<EntityStatus>,
    pub forward_to: Option<String>,
    pub user_metadata: Option<String>,
    pub auto_delete_on_idle: Option<ChronoDuration>,
    pub enable_partitioning: Option<bool>,
    pub forward_dead_lettered_messages_to: Option<String>,
    pub enable_express: Option<bool>,
    pub max_message_size_in_kilobytes: Option<i64>,
}

/// Settings of an existing queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueProperties {
    pub name: String,
    pub lock_duration: ChronoDuration,
    pub max_size_in_megabytes: i64,
    pub requires_duplicate_detection: bool,
    pub requires_session: bool,
    pub default_message_time_to_live: ChronoDuration,
    pub dead_lettering_on_message_expiration: bool,
    pub duplicate_detection_history_time_window: ChronoDuration,
    pub max_delivery_count: i32,
    pub enable_batched_operations: bool,
    pub status: EntityStatus,
    pub forward_to: Option<String>,
    pub user_metadata: Option<String>,
    pub auto_delete_on_idle: ChronoDuration,
    pub enable_partitioning: bool,
    pub forward_dead_lettered_messages_to: Option<String>,
    pub enable_express: bool,
    pub max_message_size_in_kilobytes: Option<i64>,
}

impl QueueProperties {
    fn to_options(&self) -> QueueOptions {
        QueueOptions {
            lock_duration: Some(self.lock_duration),
            max_size_in_megabytes: Some(self.max_size_in_megabytes),
            requires_duplicate_detection: Some(self.requires_duplicate_detection),
            requires_session: Some(self.requires_session),
            default_message_time_to_live: Some(self.default_message_time_to_live),
            dead_lettering_on_message_expiration: Some(self.dead_lettering_on_message_expiration),
            duplicate_detection_history_time_window: Some(
                self.duplicate_detection_history_time_window,
            ),
            max_delivery_count: Some(self.max_delivery_count),
            enable_batched_operations: Some(self.enable_batched_operations),
            status: Some(self.status),
            forward_to: self.forward_to.clone(),
            user_metadata: self.user_metadata.clone(),
            auto_delete_on_idle: Some(self.auto_delete_on_idle),
            enable_partitioning: Some(self.enable_partitioning),
            forward_dead_lettered_messages_to: self.forward_dead_lettered_messages_to.clone(),
            enable_express: Some(self.enable_express),
            max_message_size_in_kilobytes: self.max_message_size_in_kilobytes,
        }
    }

    fn from_entry(entry: &XmlNode) -> Result<Self> {
        let name = entry_title(entry)?;
        let desc = entry
            .path(&["content", "QueueDescription"])
            .ok_or_else(|| Error::decode("entry has no QueueDescription"))?;
        let duration = |tag: &str| -> Result<ChronoDuration> {
            desc.child_text(tag)
                .map(parse_duration)
                .transpose()
                .map(|d| d.unwrap_or_else(ChronoDuration::zero))
        };
        let flag = |tag: &str| desc.bool_child(tag).unwrap_or(false);
        let text = |tag: &str| {
            desc.child_text(tag)
                .filter(|t| !t.trim().is_empty())
                .map(str::to_string)
        };
        Ok(Self {
            name,
            lock_duration: duration("LockDuration")?,
            max_size_in_megabytes: desc.parse_child("MaxSizeInMegabytes").unwrap_or(0),
            requires_duplicate_detection: flag("RequiresDuplicateDetection"),
            requires_session: flag("RequiresSession"),
            default_message_time_to_live: duration("DefaultMessageTimeToLive")?,
            dead_lettering_on_message_expiration: flag("DeadLetteringOnMessageExpiration"),
            duplicate_detection_history_time_window: duration(
                "DuplicateDetectionHistoryTimeWindow",
            )?,
            max_delivery_count: desc.parse_child("MaxDeliveryCount").unwrap_or(0),
            enable_batched_operations: flag("EnableBatchedOperations"),
            status: desc
                .child_text("Status")
                .map(EntityStatus::parse)
                .unwrap_or_default(),
            forward_to: text("ForwardTo"),
            user_metadata: text("UserMetadata"),
            auto_delete_on_idle: duration("AutoDeleteOnIdle")?,
            enable_partitioning: flag("EnablePartitioning"),
            forward_dead_lettered_messages_to: text("ForwardDeadLetteredMessagesTo"),
            enable_express: flag("EnableExpress"),
            max_message_size_in_kilobytes: desc.parse_child("MaxMessageSizeInKilobytes"),
        })
    }
}

/// Message counts and timestamps of a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRuntimeProperties {
    pub name: String,
    pub created_at_utc: Option<DateTime<Utc>>,
    pub updated_at_utc: Option<DateTime<Utc>>,
    pub accessed_at_utc: Option<DateTime<Utc>>,
    pub size_in_bytes: i64,
    pub total_message_count: i64,
    pub active_message_count: i64,
    pub dead_letter_message_count: i64,
    pub scheduled_message_count: i64,
    pub transfer_message_count: i64,
    pub transfer_dead_letter_message_count: i64,
}

impl QueueRuntimeProperties {
    fn from_entry(entry: &XmlNode) -> Result<Self> {
        let name = entry_title(entry)?;
        let desc = entry
            .path(&["content", "QueueDescription"])
            .ok_or_else(|| Error::decode("entry has no QueueDescription"))?;
        let date = |tag: &str| desc.child_text(tag).and_then(parse_iso8601);
        let count = |tag: &str| {
            desc.child("CountDetails")
                .and_then(|d| d.parse_child(tag))
                .unwrap_or(0)
        };
        Ok(Self {
            name,
            created_at_utc: date("CreatedAt"),
            updated_at_utc: date("UpdatedAt"),
            accessed_at_utc: date("AccessedAt"),
            size_in_bytes: desc.parse_child("SizeInBytes").unwrap_or(0),
            total_message_count: desc.parse_child("MessageCount").unwrap_or(0),
            active_message_count: count("ActiveMessageCount"),
            dead_letter_message_count: count("DeadLetterMessageCount"),
            scheduled_message_count: count("ScheduledMessageCount"),
            transfer_message_count: count("TransferMessageCount"),
            transfer_dead_letter_message_count: count("TransferDeadLetterMessageCount"),
        })
    }
}

fn entry_title(entry: &XmlNode) -> Result<String> {
    entry
        .child_text("title")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::decode("entry has no title"))
}

/// Render a queue entry; elements follow the order the service requires.
fn queue_entry_xml(options: &QueueOptions) -> Result<String> {
    let duration = |d: Option<ChronoDuration>| d.map(format_duration);
    let mut w = XmlWriter::new();
    w.start("entry", &[("xmlns", ATOM_NS)])
        .start("content", &[("type", "application/xml")])
        .start(
            "QueueDescription",
            &[("xmlns", CONNECT_NS), ("xmlns:i", XSI_NS)],
        )
        .opt_element("LockDuration", duration(options.lock_duration))
        .opt_element("MaxSizeInMegabytes", options.max_size_in_megabytes)
        .opt_element(
            "RequiresDuplicateDetection",
            options.requires_duplicate_detection,
        )
        .opt_element("RequiresSession", options.requires_session)
        .opt_element(
            "DefaultMessageTimeToLive",
            duration(options.default_message_time_to_live),
        )
        .opt_element(
            "DeadLetteringOnMessageExpiration",
            options.dead_lettering_on_message_expiration,
        )
        .opt_element(
            "DuplicateDetectionHistoryTimeWindow",
            duration(options.duplicate_detection_history_time_window),
        )
        .opt_element("MaxDeliveryCount", options.max_delivery_count)
        .opt_element("EnableBatchedOperations", options.enable_batched_operations)
        .opt_element("Status", options.status.map(EntityStatus::as_str))
        .opt_element("ForwardTo", options.forward_to.as_deref())
        .opt_element("UserMetadata", options.user_metadata.as_deref())
        .opt_element("AutoDeleteOnIdle", duration(options.auto_delete_on_idle))
        .opt_element("EnablePartitioning", options.enable_partitioning)
        .opt_element(
            "ForwardDeadLetteredMessagesTo",
            options.forward_dead_lettered_messages_to.as_deref(),
        )
        .opt_element("EnableExpress", options.enable_express)
        .opt_element(
            "MaxMessageSizeInKilobytes",
            options.max_message_size_in_kilobytes,
        )
        .end("QueueDescription")
        .end("content")
        .end("entry");
    w.finish()
}

/// A bare `<feed>` with no entries; the service's answer for a missing entity.
fn not_found(name: &str) -> Error {
    Error::ResourceNotFound(ResponseError {
        status: StatusCode::NOT_FOUND,
        code: Some("MessagingEntityNotFound".to_string()),
        message: format!("Queue '{}' does not exist", name),
    })
}

/// Client for Service Bus namespace administration.
#[derive(Clone)]
pub struct ServiceBusAdministrationClient {
    pipeline: Pipeline,
    endpoint: url::Url,
    sas: Option<ServiceBusSasCredential>,
}

impl std::fmt::Debug for ServiceBusAdministrationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBusAdministrationClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl ServiceBusAdministrationClient {
    /// `endpoint` is the namespace host, optionally with a scheme.
    pub fn new(
        endpoint: &str,
        credential: ServiceBusCredential,
        options: &ClientOptions,
    ) -> Result<Self> {
        let trimmed = endpoint.trim_end_matches('/');
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };
        let endpoint = url::Url::parse(&with_scheme)
            .map_err(|e| Error::invalid(format!("invalid namespace '{}': {}", endpoint, e)))?;
        let sas = match &credential {
            ServiceBusCredential::Sas(sas) => Some(sas.clone()),
            ServiceBusCredential::Token(_) => None,
        };
        let auth: Arc<dyn Credential> = match credential {
            ServiceBusCredential::Sas(sas) => Arc::new(sas),
            ServiceBusCredential::Token(inner) => {
                Arc::new(BearerTokenCredential::new(inner, SERVICE_BUS_SCOPE))
            }
        };
        let pipeline = Pipeline::new(
            Some(auth),
            options.pipeline_options(ApiVersion::Query(SERVICE_BUS_API_VERSION.to_string())),
        );
        Ok(Self {
            pipeline,
            endpoint,
            sas,
        })
    }

    pub fn from_connection_string(connection_string: &str, options: &ClientOptions) -> Result<Self> {
        let cs = ServiceBusConnectionString::parse(connection_string)?;
        let sas = ServiceBusSasCredential::new(cs.shared_access_key_name, cs.shared_access_key);
        Self::new(
            &cs.fully_qualified_namespace,
            ServiceBusCredential::Sas(sas),
            options,
        )
    }

    pub fn fully_qualified_namespace(&self) -> &str {
        self.endpoint.host_str().unwrap_or_default()
    }

    fn entity_url(&self, path: &str) -> Result<url::Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::invalid("namespace endpoint cannot be a base URL"))?
            .clear()
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    /// Forwarding targets are sent as full entity URLs.
    fn forward_url(&self, target: &str) -> String {
        if target.contains("://") {
            target.to_string()
        } else {
            format!(
                "{}://{}/{}",
                self.endpoint.scheme(),
                self.fully_qualified_namespace(),
                target
            )
        }
    }

    /// PUT an entry; forwarding targets need their own SAS in supplementary headers.
    async fn put_entry(
        &self,
        name: &str,
        mut options: QueueOptions,
        update: bool,
    ) -> Result<RawResponse> {
        let mut builder = self
            .pipeline
            .client()
            .put(self.entity_url(name)?)
            .header(http::header::CONTENT_TYPE, ATOM_CONTENT_TYPE);

        let expiry = Utc::now().timestamp() + 3600;
        if let Some(target) = options.forward_to.take() {
            let target = self.forward_url(&target);
            if let Some(sas) = &self.sas {
                builder = builder.header(
                    "ServiceBusSupplementaryAuthorization",
                    sas.signature_for(&target, expiry)?,
                );
            }
            options.forward_to = Some(target);
        }
        if let Some(target) = options.forward_dead_lettered_messages_to.take() {
            let target = self.forward_url(&target);
            if let Some(sas) = &self.sas {
                builder = builder.header(
                    "ServiceBusDlqSupplementaryAuthorization",
                    sas.signature_for(&target, expiry)?,
                );
            }
            options.forward_dead_lettered_messages_to = Some(target);
        }
        if update {
            builder = builder.header(http::header::IF_MATCH, "*");
        }
        self.pipeline
            .send(builder.body(queue_entry_xml(&options)?))
            .await
    }

    async fn get_entry(&self, name: &str) -> Result<XmlNode> {
        let builder = self
            .pipeline
            .client()
            .get(self.entity_url(name)?)
            .query(&[("enrich", "false")]);
        let root = self.pipeline.send(builder).await?.xml()?;
        if root.name != "entry" {
            return Err(not_found(name));
        }
        Ok(root)
    }

    /// Create a queue; existing queues fail with `ResourceExists`.
    pub async fn create_queue(&self, name: &str, options: QueueOptions) -> Result<QueueProperties> {
        let response = self.put_entry(name, options, false).await?;
        info!("Created queue {}", name);
        QueueProperties::from_entry(&response.xml()?)
    }

    pub async fn get_queue(&self, name: &str) -> Result<QueueProperties> {
        QueueProperties::from_entry(&self.get_entry(name).await?)
    }

    pub async fn get_queue_runtime_properties(&self, name: &str) -> Result<QueueRuntimeProperties> {
        QueueRuntimeProperties::from_entry(&self.get_entry(name).await?)
    }

    /// Replace a queue's settings with `properties`.
    pub async fn update_queue(&self, properties: &QueueProperties) -> Result<QueueProperties> {
        let response = self
            .put_entry(&properties.name, properties.to_options(), true)
            .await?;
        info!("Updated queue {}", properties.name);
        QueueProperties::from_entry(&response.xml()?)
    }

    pub async fn delete_queue(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::invalid("queue name cannot be empty"));
        }
        let builder = self.pipeline.client().delete(self.entity_url(name)?);
        self.pipeline.send(builder).await?;
        info!("Deleted queue {}", name);
        Ok(())
    }

    fn list_entries<T, F>(&self, parse: F) -> Pager<T>
    where
        T: Send + 'static,
        F: Fn(&XmlNode) -> Result<T> + Send + Sync + Copy + 'static,
    {
        let pipeline = self.pipeline.clone();
        let mut url = self.endpoint.clone();
        url.set_path("/$Resources/queues");
        Pager::new(None, move |token| {
            let pipeline = pipeline.clone();
            let url = url.clone();
            async move {
                let skip: usize = match token {
                    Some(t) => t
                        .parse()
                        .map_err(|_| Error::invalid(format!("invalid list token '{}'", t)))?,
                    None => 0,
                };
                let builder = pipeline.client().get(url).query(&[
                    ("$skip", skip.to_string()),
                    ("$top", LIST_PAGE_SIZE.to_string()),
                ]);
                let feed = pipeline.send(builder).await?.xml()?;
                let items = feed
                    .children_named("entry")
                    .map(parse)
                    .collect::<Result<Vec<_>>>()?;
                debug!("Listed {} queue(s) from offset {}", items.len(), skip);
                let next = (items.len() == LIST_PAGE_SIZE).then(|| (skip + items.len()).to_string());
                Ok(Page::new(items, next))
            }
        })
    }

    pub fn list_queues(&self) -> Pager<QueueProperties> {
        self.list_entries(QueueProperties::from_entry)
    }

    pub fn list_queues_runtime_properties(&self) -> Pager<QueueRuntimeProperties> {
        self.list_entries(QueueRuntimeProperties::from_entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    const QUEUE_ENTRY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<entry xmlns="http://www.w3.org/2005/Atom">
  <id>https://myns.servicebus.windows.net/orders?api-version=2021-05</id>
  <title type="text">orders</title>
  <content type="application/xml">
    <QueueDescription xmlns="http://schemas.microsoft.com/netservices/2010/10/servicebus/connect" xmlns:i="http://www.w3.org/2001/XMLSchema-instance">
      <LockDuration>PT1M</LockDuration>
      <MaxSizeInMegabytes>1024</MaxSizeInMegabytes>
      <RequiresDuplicateDetection>false</RequiresDuplicateDetection>
      <RequiresSession>false</RequiresSession>
      <DefaultMessageTimeToLive>P10675199DT2H48M5.4775807S</DefaultMessageTimeToLive>
      <DeadLetteringOnMessageExpiration>true</DeadLetteringOnMessageExpiration>
      <DuplicateDetectionHistoryTimeWindow>PT10M</DuplicateDetectionHistoryTimeWindow>
      <MaxDeliveryCount>10</MaxDeliveryCount>
      <EnableBatchedOperations>true</EnableBatchedOperations>
      <SizeInBytes>2048</SizeInBytes>
      <MessageCount>7</MessageCount>
      <Status>Active</Status>
      <CreatedAt>2022-05-01T10:00:00.0000000Z</CreatedAt>
      <UpdatedAt>2022-05-01T10:05:00.0000000Z</UpdatedAt>
      <AccessedAt>0001-01-01T00:00:00Z</AccessedAt>
      <CountDetails xmlns:d2p1="http://schemas.microsoft.com/netservices/2011/06/servicebus">
        <d2p1:ActiveMessageCount>5</d2p1:ActiveMessageCount>
        <d2p1:DeadLetterMessageCount>1</d2p1:DeadLetterMessageCount>
        <d2p1:ScheduledMessageCount>1</d2p1:ScheduledMessageCount>
        <d2p1:TransferMessageCount>0</d2p1:TransferMessageCount>
        <d2p1:TransferDeadLetterMessageCount>0</d2p1:TransferDeadLetterMessageCount>
      </CountDetails>
      <AutoDeleteOnIdle>P10675199DT2H48M5.4775807S</AutoDeleteOnIdle>
      <EnablePartitioning>false</EnablePartitioning>
      <EnableExpress>false</EnableExpress>
      <MaxMessageSizeInKilobytes>256</MaxMessageSizeInKilobytes>
    </QueueDescription>
  </content>
</entry>"#;

    #[test]
    fn test_queue_properties_from_entry() {
        let entry = parse_document(QUEUE_ENTRY).unwrap();
        let props = QueueProperties::from_entry(&entry).unwrap();
        assert_eq!(props.name, "orders");
        assert_eq!(props.lock_duration, ChronoDuration::minutes(1));
        assert_eq!(props.max_delivery_count, 10);
        assert!(props.dead_lettering_on_message_expiration);
        assert_eq!(props.status, EntityStatus::Active);
        assert!(props.forward_to.is_none());
        assert_eq!(props.max_message_size_in_kilobytes, Some(256));
    }

    #[test]
    fn test_runtime_properties_from_entry() {
        let entry = parse_document(QUEUE_ENTRY).unwrap();
        let runtime = QueueRuntimeProperties::from_entry(&entry).unwrap();
        assert_eq!(runtime.size_in_bytes, 2048);
        assert_eq!(runtime.total_message_count, 7);
        assert_eq!(runtime.active_message_count, 5);
        assert_eq!(runtime.dead_letter_message_count, 1);
        assert!(runtime.created_at_utc.is_some());
    }

    #[test]
    fn test_entry_xml_keeps_element_order() {
        let xml = queue_entry_xml(&QueueOptions {
            max_delivery_count: Some(10),
            dead_lettering_on_message_expiration: Some(true),
            lock_duration: Some(ChronoDuration::seconds(45)),
            ..Default::default()
        })
        .unwrap();
        let lock = xml.find("<LockDuration>PT45S</LockDuration>").unwrap();
        let dead = xml
            .find("<DeadLetteringOnMessageExpiration>true</DeadLetteringOnMessageExpiration>")
            .unwrap();
        let max = xml.find("<MaxDeliveryCount>10</MaxDeliveryCount>").unwrap();
        assert!(lock < dead && dead < max);
        assert!(!xml.contains("RequiresSession"));
    }

    #[test]
    fn test_update_round_trips_every_setting() {
        let entry = parse_document(QUEUE_ENTRY).unwrap();
        let props = QueueProperties::from_entry(&entry).unwrap();
        let xml = queue_entry_xml(&props.to_options()).unwrap();
        let reparsed = parse_document(&xml).unwrap();
        let desc = reparsed.path(&["content", "QueueDescription"]).unwrap();
        assert_eq!(
            desc.child_text("DefaultMessageTimeToLive"),
            Some("P10675199DT2H48M5.4775807S")
        );
        assert_eq!(desc.child_text("Status"), Some("Active"));
    }

    #[test]
    fn test_forward_url() {
        let client = ServiceBusAdministrationClient::from_connection_string(
            "Endpoint=sb://myns.servicebus.windows.net/;SharedAccessKeyName=root;SharedAccessKey=a2V5",
            &ClientOptions::default(),
        )
        .unwrap();
        assert_eq!(client.fully_qualified_namespace(), "myns.servicebus.windows.net");
        assert_eq!(
            client.forward_url("dlq"),
            "https://myns.servicebus.windows.net/dlq"
        );
        assert_eq!(
            client.entity_url("$Resources/queues").unwrap().path(),
            "/$Resources/queues"
        );
    }
}
