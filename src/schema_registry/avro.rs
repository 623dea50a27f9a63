//! Avro encoding backed by Schema Registry.
//!
//! Encoded payloads carry only the Avro datum; the writer schema travels by
//! reference in the content type `avro/binary+{schema_id}`.  Schema ids and
//! definitions are cached per encoder.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;

use apache_avro::{from_avro_datum, from_value, to_avro_datum, to_value, Schema as AvroSchema};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::client::{SchemaFormat, SchemaRegistryClient};
use crate::errors::{Error, Result};

/// MIME type prefix of encoded content.
pub const AVRO_MIME_TYPE: &str = "avro/binary";

/// Entries kept in each schema cache.
const CACHE_CAPACITY: usize = 128;

/// Encoded payload and its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub content: Bytes,
    pub content_type: String,
}

/// A message type that can carry encoded content (e.g. an event data type).
pub trait MessageType: Sized {
    fn from_message_content(content: Bytes, content_type: String) -> Self;

    fn message_content(&self) -> MessageContent;
}

impl MessageType for MessageContent {
    fn from_message_content(content: Bytes, content_type: String) -> Self {
        Self {
            content,
            content_type,
        }
    }

    fn message_content(&self) -> MessageContent {
        self.clone()
    }
}

/// Fixed-capacity map evicting the oldest insertion.
struct BoundedCache<K, V> {
    capacity: usize,
    entries: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: K, value: V) {
        if self.entries.insert(key.clone(), value).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Encodes and decodes Avro content using schemas stored in Schema Registry.
pub struct AvroEncoder {
    client: SchemaRegistryClient,
    group_name: Option<String>,
    auto_register: bool,
    schema_ids: Mutex<BoundedCache<(String, String), String>>,
    schemas: Mutex<BoundedCache<String, String>>,
}

impl std::fmt::Debug for AvroEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvroEncoder")
            .field("group_name", &self.group_name)
            .field("auto_register", &self.auto_register)
            .finish_non_exhaustive()
    }
}

/// Parse a schema that must be an Avro record; returns it with its full name.
fn parse_record_schema(definition: &str) -> Result<(AvroSchema, String)> {
    let schema =
        AvroSchema::parse_str(definition).map_err(|e| Error::InvalidSchema(e.to_string()))?;
    let fullname = match &schema {
        AvroSchema::Record(record) => record.name.fullname(None),
        _ => {
            return Err(Error::InvalidSchema(
                "schema must be an Avro record".to_string(),
            ))
        }
    };
    Ok((schema, fullname))
}

/// Schema id from `avro/binary+{id}`.
fn schema_id_from_content_type(content_type: &str) -> Result<&str> {
    let (mime, id) = content_type.split_once('+').ok_or_else(|| {
        Error::InvalidContent(format!(
            "content type '{}' is not of the form '{}+<schema ID>'",
            content_type, AVRO_MIME_TYPE
        ))
    })?;
    if mime.trim() != AVRO_MIME_TYPE || id.trim().is_empty() {
        return Err(Error::InvalidContent(format!(
            "content type '{}' is not of the form '{}+<schema ID>'",
            content_type, AVRO_MIME_TYPE
        )));
    }
    Ok(id.trim())
}

impl AvroEncoder {
    /// `group_name` is required for encoding; decoding works without it.
    pub fn new(
        client: SchemaRegistryClient,
        group_name: Option<String>,
        auto_register: bool,
    ) -> Self {
        Self {
            client,
            group_name,
            auto_register,
            schema_ids: Mutex::new(BoundedCache::new(CACHE_CAPACITY)),
            schemas: Mutex::new(BoundedCache::new(CACHE_CAPACITY)),
        }
    }

    pub fn client(&self) -> &SchemaRegistryClient {
        &self.client
    }

    async fn schema_id(&self, group_name: &str, name: &str, definition: &str) -> Result<String> {
        let key = (name.to_string(), definition.to_string());
        if let Some(id) = lock(&self.schema_ids).get(&key) {
            return Ok(id);
        }
        let properties = if self.auto_register {
            self.client
                .register_schema(group_name, name, definition, &SchemaFormat::Avro)
                .await?
        } else {
            self.client
                .get_schema_properties(group_name, name, definition, &SchemaFormat::Avro)
                .await?
        };
        debug!("Resolved schema {} to id {}", name, properties.id);
        lock(&self.schema_ids).insert(key, properties.id.clone());
        Ok(properties.id)
    }

    async fn schema_definition(&self, schema_id: &str) -> Result<String> {
        if let Some(definition) = lock(&self.schemas).get(&schema_id.to_string()) {
            return Ok(definition);
        }
        let schema = self.client.get_schema(schema_id).await?;
        lock(&self.schemas).insert(schema_id.to_string(), schema.definition.clone());
        Ok(schema.definition)
    }

    /// Encode `content` with the record schema `schema`.
    pub async fn encode<T: Serialize>(&self, content: &T, schema: &str) -> Result<MessageContent> {
        let group_name = self.group_name.as_deref().ok_or_else(|| {
            Error::invalid("'group_name' in constructor cannot be None, if encoding.")
        })?;
        let (parsed, fullname) = parse_record_schema(schema)?;
        let value = to_value(content)
            .and_then(|v| v.resolve(&parsed))
            .map_err(|e| Error::InvalidContent(format!("cannot encode value with schema: {}", e)))?;
        let datum = to_avro_datum(&parsed, value)
            .map_err(|e| Error::InvalidContent(format!("cannot encode value with schema: {}", e)))?;

        let schema_id = self.schema_id(group_name, &fullname, schema).await?;
        Ok(MessageContent {
            content: Bytes::from(datum),
            content_type: format!("{}+{}", AVRO_MIME_TYPE, schema_id),
        })
    }

    /// Encode into a caller message type.
    pub async fn encode_message<T: Serialize, M: MessageType>(
        &self,
        content: &T,
        schema: &str,
    ) -> Result<M> {
        let encoded = self.encode(content, schema).await?;
        Ok(M::from_message_content(encoded.content, encoded.content_type))
    }

    /// Decode a message, optionally resolving into `readers_schema`.
    pub async fn decode<T: DeserializeOwned, M: MessageType>(
        &self,
        message: &M,
        readers_schema: Option<&str>,
    ) -> Result<T> {
        let MessageContent {
            content,
            content_type,
        } = message.message_content();
        let schema_id = schema_id_from_content_type(&content_type)?;
        let writer_definition = self.schema_definition(schema_id).await?;
        let writer =
            AvroSchema::parse_str(&writer_definition).map_err(|e| Error::InvalidSchema(e.to_string()))?;
        let reader = readers_schema
            .map(AvroSchema::parse_str)
            .transpose()
            .map_err(|e| Error::InvalidSchema(e.to_string()))?;

        let mut bytes: &[u8] = &content;
        let value = from_avro_datum(&writer, &mut bytes, reader.as_ref()).map_err(|e| {
            Error::InvalidContent(format!(
                "cannot decode content with schema {}: {}",
                schema_id, e
            ))
        })?;
        from_value::<T>(&value).map_err(|e| Error::InvalidContent(e.to_string()))
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // Poisoning leaves the map intact.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
