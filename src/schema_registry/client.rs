//! Schema Registry REST client.

use std::sync::Arc;

use tracing::info;

use crate::auth::{BearerTokenCredential, TokenCredential};
use crate::errors::{Error, Result};
use crate::pipeline::{ApiVersion, ClientOptions, Pipeline, RawResponse};

/// Schema Registry API version.
pub const SCHEMA_REGISTRY_API_VERSION: &str = "2021-10";

/// OAuth scope for Schema Registry (hosted by Event Hubs namespaces).
pub const SCHEMA_REGISTRY_SCOPE: &str = "https://eventhubs.azure.net/.default";

/// Serialization format of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaFormat {
    Avro,
    /// Any other format name the service reports.
    Other(String),
}

impl SchemaFormat {
    /// Parse a format name, case-insensitively.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("avro") {
            SchemaFormat::Avro
        } else {
            SchemaFormat::Other(capitalize(s))
        }
    }

    /// Name as used in `serialization={Format}`.
    pub fn as_str(&self) -> &str {
        match self {
            SchemaFormat::Avro => "Avro",
            SchemaFormat::Other(s) => s,
        }
    }

    fn content_type(&self) -> String {
        format!("application/json; serialization={}", self.as_str())
    }

    fn from_content_type(content_type: &str) -> Option<Self> {
        content_type
            .split(';')
            .filter_map(|part| part.trim().strip_prefix("serialization="))
            .next()
            .map(Self::parse)
    }
}

impl std::fmt::Display for SchemaFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn capitalize(s: &str) -> String {
    let lower = s.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Identity of a registered schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaProperties {
    pub id: String,
    pub format: SchemaFormat,
    pub group_name: String,
    pub name: String,
    pub version: i32,
}

/// A schema definition with its properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub definition: String,
    pub properties: SchemaProperties,
}

/// Client for a Schema Registry namespace.
#[derive(Debug, Clone)]
pub struct SchemaRegistryClient {
    pipeline: Pipeline,
    endpoint: url::Url,
}

impl SchemaRegistryClient {
    /// `fully_qualified_namespace` is `{namespace}.servicebus.windows.net`,
    /// optionally with a scheme.
    pub fn new(
        fully_qualified_namespace: &str,
        credential: Arc<dyn TokenCredential>,
        options: &ClientOptions,
    ) -> Result<Self> {
        let trimmed = fully_qualified_namespace.trim_end_matches('/');
        let endpoint = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };
        let endpoint = url::Url::parse(&endpoint).map_err(|e| {
            Error::invalid(format!(
                "invalid namespace '{}': {}",
                fully_qualified_namespace, e
            ))
        })?;
        let auth = Arc::new(BearerTokenCredential::new(credential, SCHEMA_REGISTRY_SCOPE));
        let pipeline = Pipeline::new(
            Some(auth),
            options.pipeline_options(ApiVersion::Query(SCHEMA_REGISTRY_API_VERSION.to_string())),
        );
        Ok(Self { pipeline, endpoint })
    }

    pub fn fully_qualified_namespace(&self) -> &str {
        self.endpoint.host_str().unwrap_or_default()
    }

    fn url(&self, segments: &[&str]) -> Result<url::Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::invalid("namespace endpoint cannot be a base URL"))?
            .clear()
            .extend(segments);
        Ok(url)
    }

    /// Register a schema; an existing identical schema returns its properties,
    /// a changed one becomes a new version.
    pub async fn register_schema(
        &self,
        group_name: &str,
        name: &str,
        definition: &str,
        format: &SchemaFormat,
    ) -> Result<SchemaProperties> {
        let url = self.url(&["$schemaGroups", group_name, "schemas", name])?;
        let builder = self
            .pipeline
            .client()
            .put(url)
            .header(http::header::CONTENT_TYPE, format.content_type())
            .body(definition.to_string());
        let response = self.pipeline.send(builder).await?;
        let properties = properties_from_response(&response, Some(format))?;
        info!(
            "Registered schema {}/{} as {} (version {})",
            group_name, name, properties.id, properties.version
        );
        Ok(properties)
    }

    /// Fetch a schema by id.
    pub async fn get_schema(&self, schema_id: &str) -> Result<Schema> {
        let url = self.url(&["$schemaGroups", "$schemas", schema_id])?;
        let response = self.pipeline.send(self.pipeline.client().get(url)).await?;
        schema_from_response(&response)
    }

    /// Fetch a specific version of a named schema.
    pub async fn get_schema_by_version(
        &self,
        group_name: &str,
        name: &str,
        version: i32,
    ) -> Result<Schema> {
        let version = version.to_string();
        let url = self.url(&[
            "$schemaGroups",
            group_name,
            "schemas",
            name,
            "versions",
            &version,
        ])?;
        let response = self.pipeline.send(self.pipeline.client().get(url)).await?;
        schema_from_response(&response)
    }

    /// Look up the properties of an already registered definition.
    pub async fn get_schema_properties(
        &self,
        group_name: &str,
        name: &str,
        definition: &str,
        format: &SchemaFormat,
    ) -> Result<SchemaProperties> {
        let action = format!("{}:get-id", name);
        let url = self.url(&["$schemaGroups", group_name, "schemas", &action])?;
        let builder = self
            .pipeline
            .client()
            .post(url)
            .header(http::header::CONTENT_TYPE, format.content_type())
            .body(definition.to_string());
        let response = self.pipeline.send(builder).await?;
        properties_from_response(&response, Some(format))
    }
}

fn properties_from_response(
    response: &RawResponse,
    format: Option<&SchemaFormat>,
) -> Result<SchemaProperties> {
    let format = response
        .header("content-type")
        .and_then(SchemaFormat::from_content_type)
        .or_else(|| format.cloned())
        .unwrap_or(SchemaFormat::Avro);
    Ok(SchemaProperties {
        id: response.require_header("schema-id")?.to_string(),
        format,
        group_name: response.header("schema-group-name").unwrap_or_default().to_string(),
        name: response.header("schema-name").unwrap_or_default().to_string(),
        version: response.parse_header("schema-version").unwrap_or(0),
    })
}

fn schema_from_response(response: &RawResponse) -> Result<Schema> {
    Ok(Schema {
        definition: response.text(),
        properties: properties_from_response(response, None)?,
    })
}
