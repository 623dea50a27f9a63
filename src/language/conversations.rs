//! Conversational language understanding (`/language/:analyze-conversations`).

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::text_analytics::LANGUAGE_API_VERSION;
use crate::auth::CognitiveCredential;
use crate::errors::{Error, Result};
use crate::pipeline::{ApiVersion, ClientOptions, Pipeline};

/// A single utterance to analyze against a deployed project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationTask {
    pub text: String,
    pub project_name: String,
    pub deployment_name: String,
    /// Conversation item id; defaults to `"1"`.
    pub id: Option<String>,
    /// Participant id; defaults to `"1"`.
    pub participant_id: Option<String>,
    pub language: Option<String>,
    pub verbose: Option<bool>,
    pub is_logging_enabled: Option<bool>,
    pub string_index_type: Option<String>,
    /// Orchestration projects only: skip routing and call this target.
    pub direct_target: Option<String>,
}

impl ConversationTask {
    pub fn new(
        text: impl Into<String>,
        project_name: impl Into<String>,
        deployment_name: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            project_name: project_name.into(),
            deployment_name: deployment_name.into(),
            ..Default::default()
        }
    }

    fn body(&self) -> Value {
        let mut item = Map::new();
        item.insert("id".into(), json!(self.id.as_deref().unwrap_or("1")));
        item.insert(
            "participantId".into(),
            json!(self.participant_id.as_deref().unwrap_or("1")),
        );
        item.insert("text".into(), json!(self.text));
        if let Some(language) = &self.language {
            item.insert("language".into(), json!(language));
        }

        let mut params = Map::new();
        params.insert("projectName".into(), json!(self.project_name));
        params.insert("deploymentName".into(), json!(self.deployment_name));
        if let Some(verbose) = self.verbose {
            params.insert("verbose".into(), json!(verbose));
        }
        if let Some(logging) = self.is_logging_enabled {
            params.insert("isLoggingEnabled".into(), json!(logging));
        }
        if let Some(index_type) = &self.string_index_type {
            params.insert("stringIndexType".into(), json!(index_type));
        }
        if let Some(target) = &self.direct_target {
            params.insert("directTarget".into(), json!(target));
        }

        json!({
            "kind": "Conversation",
            "analysisInput": { "conversationItem": item },
            "parameters": params,
        })
    }
}

// ── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationIntent {
    pub category: String,
    #[serde(rename = "confidenceScore")]
    pub confidence: f64,
}

/// A resolved entity value (`DateTimeResolution`, `NumberResolution`, ...).
/// Kind-specific fields stay in `properties`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityResolution {
    pub resolution_kind: String,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraInformation {
    /// `ListKey`, `EntitySubtype` or `RegexKey`.
    pub extra_information_kind: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub regex_pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntity {
    pub category: String,
    pub text: String,
    pub offset: i64,
    pub length: i64,
    #[serde(rename = "confidenceScore")]
    pub confidence: f64,
    #[serde(default)]
    pub resolutions: Vec<EntityResolution>,
    #[serde(default)]
    pub extra_information: Vec<ExtraInformation>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPrediction {
    #[serde(default)]
    pub top_intent: Option<String>,
    #[serde(default)]
    pub intents: Vec<ConversationIntent>,
    #[serde(default)]
    pub entities: Vec<ConversationEntity>,
}

/// Result of a conversation project, also nested inside orchestration results.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTargetResult {
    pub query: String,
    #[serde(default)]
    pub detected_language: Option<String>,
    pub prediction: ConversationPrediction,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTargetIntent {
    #[serde(rename = "confidenceScore")]
    pub confidence: f64,
    #[serde(default)]
    pub api_version: Option<String>,
    pub result: ConversationTargetResult,
}

/// Intent routed to a question answering, LUIS or other opaque target.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpaqueTargetIntent {
    #[serde(rename = "confidenceScore")]
    pub confidence: f64,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NonLinkedTargetIntent {
    #[serde(rename = "confidenceScore")]
    pub confidence: f64,
}

/// One orchestration intent, keyed by the project kind it routes to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "targetProjectKind")]
pub enum TargetIntentResult {
    Conversation(ConversationTargetIntent),
    QuestionAnswering(OpaqueTargetIntent),
    Luis(OpaqueTargetIntent),
    NonLinked(NonLinkedTargetIntent),
}

impl TargetIntentResult {
    pub fn confidence(&self) -> f64 {
        match self {
            TargetIntentResult::Conversation(i) => i.confidence,
            TargetIntentResult::QuestionAnswering(i) | TargetIntentResult::Luis(i) => i.confidence,
            TargetIntentResult::NonLinked(i) => i.confidence,
        }
    }

    pub fn target_kind(&self) -> &'static str {
        match self {
            TargetIntentResult::Conversation(_) => "conversation",
            TargetIntentResult::QuestionAnswering(_) => "question_answering",
            TargetIntentResult::Luis(_) => "luis",
            TargetIntentResult::NonLinked(_) => "non_linked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationPrediction {
    #[serde(default)]
    pub top_intent: Option<String>,
    #[serde(default)]
    pub intents: HashMap<String, TargetIntentResult>,
}

impl OrchestrationPrediction {
    /// The routed result of the top intent.
    pub fn top_intent_result(&self) -> Option<&TargetIntentResult> {
        self.top_intent.as_ref().and_then(|top| self.intents.get(top))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "projectKind")]
pub enum Prediction {
    Conversation(ConversationPrediction),
    Orchestration(OrchestrationPrediction),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeConversationResult {
    pub query: String,
    #[serde(default)]
    pub detected_language: Option<String>,
    pub prediction: Prediction,
}

#[derive(Deserialize)]
struct ResultEnvelope {
    result: AnalyzeConversationResult,
}

// ── Client ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConversationAnalysisClient {
    pipeline: Pipeline,
    endpoint: url::Url,
}

impl ConversationAnalysisClient {
    pub fn new(
        endpoint: &str,
        credential: CognitiveCredential,
        options: &ClientOptions,
    ) -> Result<Self> {
        let endpoint = url::Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|e| Error::invalid(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        let pipeline = Pipeline::new(
            Some(credential.into_credential()),
            options.pipeline_options(ApiVersion::Query(LANGUAGE_API_VERSION.to_string())),
        );
        Ok(Self { pipeline, endpoint })
    }

    fn analyze_url(&self) -> Result<url::Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::invalid("endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(["language", ":analyze-conversations"]);
        Ok(url)
    }

    /// Analyze one utterance with a conversation or orchestration project.
    pub async fn analyze_conversation(
        &self,
        task: &ConversationTask,
    ) -> Result<AnalyzeConversationResult> {
        let builder = self
            .pipeline
            .client()
            .post(self.analyze_url()?)
            .json(&task.body());
        let response = self.pipeline.send(builder).await?;
        let envelope: ResultEnvelope = response.json()?;
        debug!(
            "Analyzed conversation with project {}/{}",
            task.project_name, task.deployment_name
        );
        Ok(envelope.result)
    }
}
