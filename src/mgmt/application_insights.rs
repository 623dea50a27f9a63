//! Application Insights management (`Microsoft.Insights`, 2018-05-01-preview).
//!
//! The client is split into operation groups the way ARM groups them:
//! components, web tests, proactive detection configurations, and the
//! provider's operation list.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{list_by_next_link, ARM_ENDPOINT, ARM_SCOPE};
use crate::auth::{BearerTokenCredential, TokenCredential};
use crate::errors::{Error, Result};
use crate::pager::Pager;
use crate::pipeline::{ApiVersion, ClientOptions, Pipeline};

/// API version of this client.
pub const APPLICATION_INSIGHTS_API_VERSION: &str = "2018-05-01-preview";

const PROVIDER: &str = "Microsoft.Insights";

// ── Models ──────────────────────────────────────────────────────────

/// An Application Insights component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInsightsComponent {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default, skip_serializing)]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing)]
    pub resource_type: Option<String>,
    pub location: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    /// Kind of application, e.g. `web`, `ios`, `other`.
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub properties: ComponentProperties,
}

impl ApplicationInsightsComponent {
    pub fn new(location: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentProperties {
    #[serde(rename = "ApplicationId", default, skip_serializing)]
    pub application_id: Option<String>,
    #[serde(rename = "AppId", default, skip_serializing)]
    pub app_id: Option<String>,
    #[serde(rename = "Application_Type", default)]
    pub application_type: Option<String>,
    #[serde(rename = "Flow_Type", default, skip_serializing_if = "Option::is_none")]
    pub flow_type: Option<String>,
    #[serde(rename = "Request_Source", default, skip_serializing_if = "Option::is_none")]
    pub request_source: Option<String>,
    #[serde(rename = "InstrumentationKey", default, skip_serializing)]
    pub instrumentation_key: Option<String>,
    #[serde(rename = "ConnectionString", default, skip_serializing)]
    pub connection_string: Option<String>,
    #[serde(rename = "CreationDate", default, skip_serializing)]
    pub creation_date: Option<String>,
    #[serde(rename = "TenantId", default, skip_serializing)]
    pub tenant_id: Option<String>,
    #[serde(rename = "HockeyAppId", default, skip_serializing_if = "Option::is_none")]
    pub hockey_app_id: Option<String>,
    #[serde(rename = "HockeyAppToken", default, skip_serializing)]
    pub hockey_app_token: Option<String>,
    #[serde(rename = "SamplingPercentage", default, skip_serializing_if = "Option::is_none")]
    pub sampling_percentage: Option<f64>,
    #[serde(rename = "RetentionInDays", default, skip_serializing_if = "Option::is_none")]
    pub retention_in_days: Option<i32>,
    #[serde(rename = "DisableIpMasking", default, skip_serializing_if = "Option::is_none")]
    pub disable_ip_masking: Option<bool>,
    #[serde(
        rename = "ImmediatePurgeDataOn30Days",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub immediate_purge_data_on_30_days: Option<bool>,
    #[serde(rename = "IngestionMode", default, skip_serializing_if = "Option::is_none")]
    pub ingestion_mode: Option<String>,
    #[serde(
        rename = "publicNetworkAccessForIngestion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub public_network_access_for_ingestion: Option<String>,
    #[serde(
        rename = "publicNetworkAccessForQuery",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub public_network_access_for_query: Option<String>,
    #[serde(rename = "provisioningState", default, skip_serializing)]
    pub provisioning_state: Option<String>,
}

/// An availability web test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebTest {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default, skip_serializing)]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing)]
    pub resource_type: Option<String>,
    pub location: String,
    /// Must include `hidden-link:{component resource id}: Resource`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    /// `ping` or `multistep`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub properties: WebTestProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebTestProperties {
    #[serde(rename = "SyntheticMonitorId", default)]
    pub synthetic_monitor_id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Enabled", default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Seconds between runs.
    #[serde(rename = "Frequency", default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<i32>,
    /// Seconds before a run times out.
    #[serde(rename = "Timeout", default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i32>,
    #[serde(rename = "Kind", default)]
    pub kind: String,
    #[serde(rename = "RetryEnabled", default, skip_serializing_if = "Option::is_none")]
    pub retry_enabled: Option<bool>,
    #[serde(rename = "Locations", default)]
    pub locations: Vec<WebTestGeolocation>,
    #[serde(rename = "Configuration", default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<WebTestConfiguration>,
    #[serde(rename = "provisioningState", default, skip_serializing)]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebTestGeolocation {
    #[serde(rename = "Id")]
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebTestConfiguration {
    /// XML test definition.
    #[serde(rename = "WebTest")]
    pub web_test: String,
}

/// One operation the provider exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Operation {
    pub name: Option<String>,
    pub display: Option<OperationDisplay>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OperationDisplay {
    pub provider: Option<String>,
    pub resource: Option<String>,
    pub operation: Option<String>,
    pub description: Option<String>,
}

/// A smart-detection rule configuration on a component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProactiveDetectionConfiguration {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub send_emails_to_subscription_owners: Option<bool>,
    #[serde(default)]
    pub custom_emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_definitions: Option<ProactiveDetectionRuleDefinitions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProactiveDetectionRuleDefinitions {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub help_url: Option<String>,
    #[serde(default)]
    pub is_hidden: Option<bool>,
    #[serde(default)]
    pub is_enabled_by_default: Option<bool>,
    #[serde(default)]
    pub is_in_preview: Option<bool>,
    #[serde(default)]
    pub supports_email_notifications: Option<bool>,
}

// ── Client ──────────────────────────────────────────────────────────

/// Client for Application Insights resources in one subscription.
#[derive(Debug, Clone)]
pub struct ApplicationInsightsManagementClient {
    pipeline: Pipeline,
    endpoint: url::Url,
    subscription_id: String,
}

impl ApplicationInsightsManagementClient {
    pub fn new(
        credential: Arc<dyn TokenCredential>,
        subscription_id: impl Into<String>,
        options: &ClientOptions,
    ) -> Result<Self> {
        Self::with_endpoint(credential, subscription_id, ARM_ENDPOINT, options)
    }

    /// Target a different Resource Manager endpoint (sovereign clouds, tests).
    pub fn with_endpoint(
        credential: Arc<dyn TokenCredential>,
        subscription_id: impl Into<String>,
        endpoint: &str,
        options: &ClientOptions,
    ) -> Result<Self> {
        let subscription_id = subscription_id.into();
        if subscription_id.is_empty() {
            return Err(Error::invalid("subscription_id cannot be empty"));
        }
        let endpoint = url::Url::parse(endpoint)
            .map_err(|e| Error::invalid(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        let auth = Arc::new(BearerTokenCredential::new(credential, ARM_SCOPE));
        let pipeline = Pipeline::new(
            Some(auth),
            options.pipeline_options(ApiVersion::Query(
                APPLICATION_INSIGHTS_API_VERSION.to_string(),
            )),
        );
        Ok(Self {
            pipeline,
            endpoint,
            subscription_id,
        })
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn components(&self) -> ComponentsOperations<'_> {
        ComponentsOperations { client: self }
    }

    pub fn web_tests(&self) -> WebTestsOperations<'_> {
        WebTestsOperations { client: self }
    }

    pub fn operations(&self) -> Operations<'_> {
        Operations { client: self }
    }

    pub fn proactive_detection_configurations(&self) -> ProactiveDetectionConfigurationsOperations<'_> {
        ProactiveDetectionConfigurationsOperations { client: self }
    }

    fn url(&self, segments: &[&str]) -> Result<url::Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::invalid("endpoint cannot be a base URL"))?
            .clear()
            .extend(segments);
        Ok(url)
    }

    /// `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Insights/...`
    fn resource_group_url(&self, resource_group: &str, rest: &[&str]) -> Result<url::Url> {
        if resource_group.is_empty() {
            return Err(Error::invalid("resource_group_name cannot be empty"));
        }
        let mut segments = vec![
            "subscriptions",
            self.subscription_id.as_str(),
            "resourceGroups",
            resource_group,
            "providers",
            PROVIDER,
        ];
        segments.extend_from_slice(rest);
        self.url(&segments)
    }

    fn subscription_url(&self, collection: &str) -> Result<url::Url> {
        self.url(&[
            "subscriptions",
            self.subscription_id.as_str(),
            "providers",
            PROVIDER,
            collection,
        ])
    }

    fn pager<T>(&self, first: Result<url::Url>) -> Pager<T>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        match first {
            Ok(url) => list_by_next_link(self.pipeline.clone(), url),
            Err(e) => Pager::new(None, move |_| {
                let e = Error::invalid(e.to_string());
                async move { Err(e) }
            }),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: url::Url) -> Result<T> {
        self.pipeline.send(self.pipeline.client().get(url)).await?.json()
    }

    async fn put_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        url: url::Url,
        body: &B,
    ) -> Result<T> {
        let builder = self.pipeline.client().put(url).json(body);
        self.pipeline.send(builder).await?.json()
    }

    async fn delete(&self, url: url::Url) -> Result<()> {
        self.pipeline.send(self.pipeline.client().delete(url)).await?;
        Ok(())
    }
}

fn require_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid(format!("{} cannot be empty", kind)));
    }
    Ok(())
}

// ── Components ──────────────────────────────────────────────────────

pub struct ComponentsOperations<'a> {
    client: &'a ApplicationInsightsManagementClient,
}

impl ComponentsOperations<'_> {
    /// Every component in the subscription.
    pub fn list(&self) -> Pager<ApplicationInsightsComponent> {
        self.client.pager(self.client.subscription_url("components"))
    }

    pub fn list_by_resource_group(&self, resource_group: &str) -> Pager<ApplicationInsightsComponent> {
        self.client
            .pager(self.client.resource_group_url(resource_group, &["components"]))
    }

    pub async fn get(
        &self,
        resource_group: &str,
        resource_name: &str,
    ) -> Result<ApplicationInsightsComponent> {
        require_name("resource_name", resource_name)?;
        let url = self
            .client
            .resource_group_url(resource_group, &["components", resource_name])?;
        self.client.get_json(url).await
    }

    /// Create a component, or replace an existing one.
    pub async fn create_or_update(
        &self,
        resource_group: &str,
        resource_name: &str,
        insight_properties: &ApplicationInsightsComponent,
    ) -> Result<ApplicationInsightsComponent> {
        require_name("resource_name", resource_name)?;
        let url = self
            .client
            .resource_group_url(resource_group, &["components", resource_name])?;
        let component: ApplicationInsightsComponent =
            self.client.put_json(url, insight_properties).await?;
        info!("Created or updated component {}/{}", resource_group, resource_name);
        Ok(component)
    }

    pub async fn delete(&self, resource_group: &str, resource_name: &str) -> Result<()> {
        require_name("resource_name", resource_name)?;
        let url = self
            .client
            .resource_group_url(resource_group, &["components", resource_name])?;
        self.client.delete(url).await?;
        info!("Deleted component {}/{}", resource_group, resource_name);
        Ok(())
    }

    /// Replace the component's tags.
    pub async fn update_tags(
        &self,
        resource_group: &str,
        resource_name: &str,
        tags: HashMap<String, String>,
    ) -> Result<ApplicationInsightsComponent> {
        require_name("resource_name", resource_name)?;
        let url = self
            .client
            .resource_group_url(resource_group, &["components", resource_name])?;
        let builder = self
            .client
            .pipeline
            .client()
            .patch(url)
            .json(&serde_json::json!({ "tags": tags }));
        self.client.pipeline.send(builder).await?.json()
    }
}

// ── Web tests ───────────────────────────────────────────────────────

pub struct WebTestsOperations<'a> {
    client: &'a ApplicationInsightsManagementClient,
}

impl WebTestsOperations<'_> {
    pub fn list(&self) -> Pager<WebTest> {
        self.client.pager(self.client.subscription_url("webtests"))
    }

    /// Web tests attached to one component.
    pub fn list_by_component(&self, resource_group: &str, component_name: &str) -> Pager<WebTest> {
        let url = require_name("component_name", component_name).and_then(|_| {
            self.client
                .resource_group_url(resource_group, &["components", component_name, "webtests"])
        });
        self.client.pager(url)
    }

    pub async fn get(&self, resource_group: &str, web_test_name: &str) -> Result<WebTest> {
        require_name("web_test_name", web_test_name)?;
        let url = self
            .client
            .resource_group_url(resource_group, &["webtests", web_test_name])?;
        self.client.get_json(url).await
    }

    pub async fn create_or_update(
        &self,
        resource_group: &str,
        web_test_name: &str,
        web_test: &WebTest,
    ) -> Result<WebTest> {
        require_name("web_test_name", web_test_name)?;
        let url = self
            .client
            .resource_group_url(resource_group, &["webtests", web_test_name])?;
        let created: WebTest = self.client.put_json(url, web_test).await?;
        info!("Created or updated web test {}/{}", resource_group, web_test_name);
        Ok(created)
    }

    pub async fn delete(&self, resource_group: &str, web_test_name: &str) -> Result<()> {
        require_name("web_test_name", web_test_name)?;
        let url = self
            .client
            .resource_group_url(resource_group, &["webtests", web_test_name])?;
        self.client.delete(url).await?;
        info!("Deleted web test {}/{}", resource_group, web_test_name);
        Ok(())
    }
}

// ── Operations ──────────────────────────────────────────────────────

pub struct Operations<'a> {
    client: &'a ApplicationInsightsManagementClient,
}

impl Operations<'_> {
    /// Operations available from the `Microsoft.Insights` provider.
    pub fn list(&self) -> Pager<Operation> {
        self.client
            .pager(self.client.url(&["providers", PROVIDER, "operations"]))
    }
}

// ── Proactive detection ─────────────────────────────────────────────

pub struct ProactiveDetectionConfigurationsOperations<'a> {
    client: &'a ApplicationInsightsManagementClient,
}

impl ProactiveDetectionConfigurationsOperations<'_> {
    fn url(&self, resource_group: &str, resource_name: &str, config: Option<&str>) -> Result<url::Url> {
        require_name("resource_name", resource_name)?;
        let mut rest = vec!["components", resource_name, "ProactiveDetectionConfigs"];
        if let Some(config) = config {
            require_name("configuration_id", config)?;
            rest.push(config);
        }
        self.client.resource_group_url(resource_group, &rest)
    }

    /// All configurations of a component.  The service returns a bare array.
    pub async fn list(
        &self,
        resource_group: &str,
        resource_name: &str,
    ) -> Result<Vec<ProactiveDetectionConfiguration>> {
        let url = self.url(resource_group, resource_name, None)?;
        let body: Value = self.client.get_json(url).await?;
        match body {
            Value::Array(_) => Ok(serde_json::from_value(body)?),
            Value::Object(mut map) => match map.remove("value") {
                Some(value) => Ok(serde_json::from_value(value)?),
                None => Err(Error::decode("proactive detection list has no 'value'")),
            },
            _ => Err(Error::decode("unexpected proactive detection list body")),
        }
    }

    pub async fn get(
        &self,
        resource_group: &str,
        resource_name: &str,
        configuration_id: &str,
    ) -> Result<ProactiveDetectionConfiguration> {
        let url = self.url(resource_group, resource_name, Some(configuration_id))?;
        self.client.get_json(url).await
    }

    pub async fn update(
        &self,
        resource_group: &str,
        resource_name: &str,
        configuration_id: &str,
        configuration: &ProactiveDetectionConfiguration,
    ) -> Result<ProactiveDetectionConfiguration> {
        let url = self.url(resource_group, resource_name, Some(configuration_id))?;
        let updated = self.client.put_json(url, configuration).await?;
        info!(
            "Updated proactive detection {} on {}/{}",
            configuration_id, resource_group, resource_name
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenCredential;

    fn client() -> ApplicationInsightsManagementClient {
        ApplicationInsightsManagementClient::new(
            Arc::new(StaticTokenCredential::new("token")),
            "sub-1",
            &ClientOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_resource_urls() {
        let client = client();
        assert_eq!(
            client.subscription_url("components").unwrap().as_str(),
            "https://management.azure.com/subscriptions/sub-1/providers/Microsoft.Insights/components"
        );
        assert_eq!(
            client
                .resource_group_url("rg", &["webtests", "ping test"])
                .unwrap()
                .as_str(),
            "https://management.azure.com/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Insights/webtests/ping%20test"
        );
        assert!(client.resource_group_url("", &["components"]).is_err());
    }

    #[test]
    fn test_empty_subscription_rejected() {
        let err = ApplicationInsightsManagementClient::new(
            Arc::new(StaticTokenCredential::new("token")),
            "",
            &ClientOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_component_serialization_skips_read_only() {
        let mut component = ApplicationInsightsComponent::new("westus", "web");
        component.properties.application_type = Some("web".into());
        component.properties.instrumentation_key = Some("ikey".into());
        component.id = Some("/subscriptions/x".into());
        let json = serde_json::to_value(&component).unwrap();
        assert_eq!(json["location"], "westus");
        assert_eq!(json["kind"], "web");
        assert_eq!(json["properties"]["Application_Type"], "web");
        assert!(json.get("id").is_none());
        assert!(json["properties"].get("InstrumentationKey").is_none());
    }

    #[test]
    fn test_component_deserializes_service_shape() {
        let body = r#"{
            "id": "/subscriptions/sub-1/resourceGroups/rg/providers/microsoft.insights/components/app",
            "name": "app",
            "type": "microsoft.insights/components",
            "location": "westus",
            "tags": {"env": "test"},
            "kind": "web",
            "properties": {
                "ApplicationId": "app",
                "AppId": "7a0e2c1e-0000-0000-0000-000000000000",
                "Application_Type": "web",
                "InstrumentationKey": "ikey",
                "RetentionInDays": 90,
                "provisioningState": "Succeeded"
            }
        }"#;
        let component: ApplicationInsightsComponent = serde_json::from_str(body).unwrap();
        assert_eq!(component.name.as_deref(), Some("app"));
        assert_eq!(component.tags["env"], "test");
        assert_eq!(component.properties.retention_in_days, Some(90));
        assert_eq!(
            component.properties.provisioning_state.as_deref(),
            Some("Succeeded")
        );
    }

    #[test]
    fn test_proactive_configuration_is_pascal_case() {
        let config = ProactiveDetectionConfiguration {
            name: Some("slowpageloadtime".into()),
            enabled: Some(true),
            send_emails_to_subscription_owners: Some(false),
            custom_emails: vec!["ops@example.com".into()],
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["Name"], "slowpageloadtime");
        assert_eq!(json["SendEmailsToSubscriptionOwners"], false);
        assert_eq!(json["CustomEmails"][0], "ops@example.com");
    }
}
