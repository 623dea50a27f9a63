//! Text Analytics batch actions (`/language/analyze-text/jobs`).
//!
//! A job runs several actions over the same documents.  Results come back
//! grouped by task; [`AnalyzeActionsHandler`] regroups them per document so
//! callers get, for each input document in input order, one result per
//! action in action order.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::auth::CognitiveCredential;
use crate::errors::{Error, Result};
use crate::pipeline::{ApiVersion, ClientOptions, Pipeline};
use crate::poller::{decode_continuation_token, LroHandler, Poller};

/// Language service API version.
pub const LANGUAGE_API_VERSION: &str = "2022-05-01";

const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_STRING_INDEX_TYPE: &str = "UnicodeCodePoint";

// ── Input ───────────────────────────────────────────────────────────

/// One document to analyze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDocumentInput {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl TextDocumentInput {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Plain strings get ids `"0"`, `"1"`, ... by position.
    pub fn from_strings<S: AsRef<str>>(texts: &[S], language: Option<&str>) -> Vec<Self> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| Self {
                id: i.to_string(),
                text: text.as_ref().to_string(),
                language: language.map(str::to_string),
            })
            .collect()
    }
}

/// Settings shared by every action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOptions {
    pub model_version: Option<String>,
    /// Defaults to `UnicodeCodePoint`.
    pub string_index_type: Option<String>,
    pub disable_service_logs: Option<bool>,
}

/// An action to run over every document of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzeAction {
    RecognizeEntities(ActionOptions),
    RecognizePiiEntities {
        options: ActionOptions,
        /// `phi` restricts detection to health information.
        domain_filter: Option<String>,
        categories_filter: Vec<String>,
    },
    ExtractKeyPhrases(ActionOptions),
    RecognizeLinkedEntities(ActionOptions),
    AnalyzeSentiment {
        options: ActionOptions,
        show_opinion_mining: Option<bool>,
    },
    ExtractSummary {
        options: ActionOptions,
        max_sentence_count: Option<u32>,
        /// `Offset` or `Rank`.
        order_by: Option<String>,
    },
    RecognizeCustomEntities {
        project_name: String,
        deployment_name: String,
        options: ActionOptions,
    },
    SingleLabelClassify {
        project_name: String,
        deployment_name: String,
        options: ActionOptions,
    },
    MultiLabelClassify {
        project_name: String,
        deployment_name: String,
        options: ActionOptions,
    },
}

/// The kind of an action, as recorded in results and continuation tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    RecognizeEntities,
    RecognizePiiEntities,
    ExtractKeyPhrases,
    RecognizeLinkedEntities,
    AnalyzeSentiment,
    ExtractSummary,
    RecognizeCustomEntities,
    SingleLabelClassify,
    MultiLabelClassify,
}

impl ActionKind {
    /// Task kind on the wire.
    pub fn task_kind(self) -> &'static str {
        match self {
            ActionKind::RecognizeEntities => "EntityRecognition",
            ActionKind::RecognizePiiEntities => "PiiEntityRecognition",
            ActionKind::ExtractKeyPhrases => "KeyPhraseExtraction",
            ActionKind::RecognizeLinkedEntities => "EntityLinking",
            ActionKind::AnalyzeSentiment => "SentimentAnalysis",
            ActionKind::ExtractSummary => "ExtractiveSummarization",
            ActionKind::RecognizeCustomEntities => "CustomEntityRecognition",
            ActionKind::SingleLabelClassify => "CustomSingleLabelClassification",
            ActionKind::MultiLabelClassify => "CustomMultiLabelClassification",
        }
    }
}

impl AnalyzeAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            AnalyzeAction::RecognizeEntities(_) => ActionKind::RecognizeEntities,
            AnalyzeAction::RecognizePiiEntities { .. } => ActionKind::RecognizePiiEntities,
            AnalyzeAction::ExtractKeyPhrases(_) => ActionKind::ExtractKeyPhrases,
            AnalyzeAction::RecognizeLinkedEntities(_) => ActionKind::RecognizeLinkedEntities,
            AnalyzeAction::AnalyzeSentiment { .. } => ActionKind::AnalyzeSentiment,
            AnalyzeAction::ExtractSummary { .. } => ActionKind::ExtractSummary,
            AnalyzeAction::RecognizeCustomEntities { .. } => ActionKind::RecognizeCustomEntities,
            AnalyzeAction::SingleLabelClassify { .. } => ActionKind::SingleLabelClassify,
            AnalyzeAction::MultiLabelClassify { .. } => ActionKind::MultiLabelClassify,
        }
    }

    fn options(&self) -> &ActionOptions {
        match self {
            AnalyzeAction::RecognizeEntities(options)
            | AnalyzeAction::ExtractKeyPhrases(options)
            | AnalyzeAction::RecognizeLinkedEntities(options)
            | AnalyzeAction::RecognizePiiEntities { options, .. }
            | AnalyzeAction::AnalyzeSentiment { options, .. }
            | AnalyzeAction::ExtractSummary { options, .. }
            | AnalyzeAction::RecognizeCustomEntities { options, .. }
            | AnalyzeAction::SingleLabelClassify { options, .. }
            | AnalyzeAction::MultiLabelClassify { options, .. } => options,
        }
    }

    /// `parameters` object of the task.
    fn parameters(&self) -> Value {
        let options = self.options();
        let mut params = Map::new();
        if let Some(version) = &options.model_version {
            params.insert("modelVersion".into(), json!(version));
        }
        if let Some(opt_out) = options.disable_service_logs {
            params.insert("loggingOptOut".into(), json!(opt_out));
        }
        let uses_offsets = !matches!(
            self,
            AnalyzeAction::ExtractKeyPhrases(_)
                | AnalyzeAction::SingleLabelClassify { .. }
                | AnalyzeAction::MultiLabelClassify { .. }
        );
        if uses_offsets {
            let index_type = options
                .string_index_type
                .as_deref()
                .unwrap_or(DEFAULT_STRING_INDEX_TYPE);
            params.insert("stringIndexType".into(), json!(index_type));
        }

        match self {
            AnalyzeAction::RecognizePiiEntities {
                domain_filter,
                categories_filter,
                ..
            } => {
                if let Some(domain) = domain_filter {
                    params.insert("domain".into(), json!(domain));
                }
                if !categories_filter.is_empty() {
                    params.insert("piiCategories".into(), json!(categories_filter));
                }
            }
            AnalyzeAction::AnalyzeSentiment {
                show_opinion_mining: Some(mining),
                ..
            } => {
                params.insert("opinionMining".into(), json!(mining));
            }
            AnalyzeAction::ExtractSummary {
                max_sentence_count,
                order_by,
                ..
            } => {
                if let Some(count) = max_sentence_count {
                    params.insert("sentenceCount".into(), json!(count));
                }
                if let Some(order) = order_by {
                    params.insert("sortBy".into(), json!(order));
                }
            }
            AnalyzeAction::RecognizeCustomEntities {
                project_name,
                deployment_name,
                ..
            }
            | AnalyzeAction::SingleLabelClassify {
                project_name,
                deployment_name,
                ..
            }
            | AnalyzeAction::MultiLabelClassify {
                project_name,
                deployment_name,
                ..
            } => {
                params.insert("projectName".into(), json!(project_name));
                params.insert("deploymentName".into(), json!(deployment_name));
            }
            _ => {}
        }
        Value::Object(params)
    }
}

/// Options for [`TextAnalyticsClient::begin_analyze_actions`].
#[derive(Debug, Clone, Default)]
pub struct AnalyzeActionsOptions {
    pub display_name: Option<String>,
    /// Language applied to documents that carry none.
    pub language: Option<String>,
    pub show_stats: bool,
    pub polling_interval: Option<Duration>,
}

// ── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SentimentConfidenceScores {
    #[serde(default)]
    pub positive: f64,
    #[serde(default)]
    pub neutral: f64,
    #[serde(default)]
    pub negative: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorizedEntity {
    pub text: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub offset: i64,
    pub length: i64,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedEntityMatch {
    pub text: String,
    pub confidence_score: f64,
    pub offset: i64,
    pub length: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedEntity {
    pub name: String,
    #[serde(default)]
    pub matches: Vec<LinkedEntityMatch>,
    pub language: String,
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
    pub data_source: String,
    #[serde(default)]
    pub bing_id: Option<String>,
}

/// A sentiment target ("design") with links to the assessments about it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceTarget {
    pub text: String,
    pub sentiment: String,
    pub confidence_scores: SentimentConfidenceScores,
    pub offset: i64,
    pub length: i64,
    #[serde(default)]
    pub relations: Vec<TargetRelation>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRelation {
    pub relation_type: String,
    /// JSON pointer such as `#/documents/0/sentences/1/assessments/0`.
    #[serde(rename = "ref")]
    pub reference: String,
}

/// An opinion about a target ("sleek").
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentSentiment {
    pub text: String,
    pub sentiment: String,
    pub confidence_scores: SentimentConfidenceScores,
    pub offset: i64,
    pub length: i64,
    #[serde(default)]
    pub is_negated: bool,
}

/// A target with its resolved assessments.
#[derive(Debug, Clone, PartialEq)]
pub struct MinedOpinion {
    pub target: SentenceTarget,
    pub assessments: Vec<AssessmentSentiment>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceSentiment {
    pub text: String,
    pub sentiment: String,
    pub confidence_scores: SentimentConfidenceScores,
    pub offset: i64,
    pub length: i64,
    #[serde(default)]
    pub targets: Vec<SentenceTarget>,
    #[serde(default)]
    pub assessments: Vec<AssessmentSentiment>,
    /// Filled from `targets` and `assessments` after parsing.
    #[serde(skip)]
    pub mined_opinions: Vec<MinedOpinion>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarySentence {
    pub text: String,
    pub rank_score: f64,
    pub offset: i64,
    pub length: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationCategory {
    pub category: String,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextAnalyticsWarning {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentStatistics {
    #[serde(rename = "charactersCount")]
    pub character_count: i64,
    pub transactions_count: i64,
}

/// Action-specific content of a successful document result.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    Entities(Vec<CategorizedEntity>),
    PiiEntities {
        entities: Vec<CategorizedEntity>,
        redacted_text: String,
    },
    KeyPhrases(Vec<String>),
    LinkedEntities(Vec<LinkedEntity>),
    Sentiment {
        sentiment: String,
        confidence_scores: SentimentConfidenceScores,
        sentences: Vec<SentenceSentiment>,
    },
    Summary(Vec<SummarySentence>),
    CustomEntities(Vec<CategorizedEntity>),
    Classifications(Vec<ClassificationCategory>),
}

/// A successful per-document result of one action.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentResult {
    pub id: String,
    pub kind: ActionKind,
    pub warnings: Vec<TextAnalyticsWarning>,
    pub statistics: Option<TextDocumentStatistics>,
    pub output: ActionOutput,
}

/// A document the action could not process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentError {
    pub id: String,
    pub kind: ActionKind,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Success(DocumentResult),
    Error(DocumentError),
}

impl ActionResult {
    pub fn id(&self) -> &str {
        match self {
            ActionResult::Success(r) => &r.id,
            ActionResult::Error(e) => &e.id,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ActionResult::Success(r) => r.kind,
            ActionResult::Error(e) => e.kind,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ActionResult::Error(_))
    }
}

/// Job details refreshed on every poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzeActionsMetadata {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub created_on: Option<DateTime<Utc>>,
    pub expires_on: Option<DateTime<Utc>>,
    pub last_modified_on: Option<DateTime<Utc>>,
    pub actions_succeeded_count: u32,
    pub actions_failed_count: u32,
    pub actions_in_progress_count: u32,
    pub total_actions_count: u32,
}

impl AnalyzeActionsMetadata {
    fn from_body(body: &Value) -> Self {
        let text = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);
        let date = |key: &str| {
            body.get(key)
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc))
        };
        let count = |key: &str| {
            body.pointer(&format!("/tasks/{}", key))
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32
        };
        Self {
            id: text("jobId"),
            display_name: text("displayName"),
            created_on: date("createdDateTime"),
            expires_on: date("expirationDateTime"),
            last_modified_on: date("lastUpdatedDateTime"),
            actions_succeeded_count: count("completed"),
            actions_failed_count: count("failed"),
            actions_in_progress_count: count("inProgress"),
            total_actions_count: count("total"),
        }
    }
}

// ── Result assembly ─────────────────────────────────────────────────

fn parse_document(kind: ActionKind, doc: &Value) -> Result<DocumentResult> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Common {
        id: String,
        #[serde(default)]
        warnings: Vec<TextAnalyticsWarning>,
        #[serde(default)]
        statistics: Option<TextDocumentStatistics>,
    }

    fn field<T: serde::de::DeserializeOwned + Default>(doc: &Value, key: &str) -> Result<T> {
        match doc.get(key) {
            Some(v) => Ok(serde_json::from_value(v.clone())?),
            None => Ok(T::default()),
        }
    }

    let common: Common = serde_json::from_value(doc.clone())?;
    let output = match kind {
        ActionKind::RecognizeEntities => ActionOutput::Entities(field(doc, "entities")?),
        ActionKind::RecognizeCustomEntities => {
            ActionOutput::CustomEntities(field(doc, "entities")?)
        }
        ActionKind::RecognizePiiEntities => ActionOutput::PiiEntities {
            entities: field(doc, "entities")?,
            redacted_text: field(doc, "redactedText")?,
        },
        ActionKind::ExtractKeyPhrases => ActionOutput::KeyPhrases(field(doc, "keyPhrases")?),
        ActionKind::RecognizeLinkedEntities => {
            ActionOutput::LinkedEntities(field(doc, "entities")?)
        }
        ActionKind::AnalyzeSentiment => {
            let mut sentences: Vec<SentenceSentiment> = field(doc, "sentences")?;
            resolve_opinions(&mut sentences);
            ActionOutput::Sentiment {
                sentiment: field(doc, "sentiment")?,
                confidence_scores: field(doc, "confidenceScores")?,
                sentences,
            }
        }
        ActionKind::ExtractSummary => ActionOutput::Summary(field(doc, "sentences")?),
        ActionKind::SingleLabelClassify | ActionKind::MultiLabelClassify => {
            ActionOutput::Classifications(field(doc, "class")?)
        }
    };
    Ok(DocumentResult {
        id: common.id,
        kind,
        warnings: common.warnings,
        statistics: common.statistics,
        output,
    })
}

/// `(sentence, assessment)` indexes from `#/documents/{d}/sentences/{s}/assessments/{a}`.
fn assessment_ref(reference: &str) -> Option<(usize, usize)> {
    let parts: Vec<&str> = reference.trim_start_matches('#').split('/').collect();
    let sentence = parts.iter().position(|p| *p == "sentences")?;
    let assessment = parts.iter().position(|p| *p == "assessments")?;
    Some((
        parts.get(sentence + 1)?.parse().ok()?,
        parts.get(assessment + 1)?.parse().ok()?,
    ))
}

fn resolve_opinions(sentences: &mut [SentenceSentiment]) {
    let mut resolved = Vec::with_capacity(sentences.len());
    for sentence in sentences.iter() {
        let opinions = sentence
            .targets
            .iter()
            .map(|target| MinedOpinion {
                target: target.clone(),
                assessments: target
                    .relations
                    .iter()
                    .filter(|r| r.relation_type.eq_ignore_ascii_case("assessment"))
                    .filter_map(|r| assessment_ref(&r.reference))
                    .filter_map(|(s, a)| sentences.get(s)?.assessments.get(a).cloned())
                    .collect(),
            })
            .collect::<Vec<_>>();
        resolved.push(opinions);
    }
    for (sentence, opinions) in sentences.iter_mut().zip(resolved) {
        sentence.mined_opinions = opinions;
    }
}

/// Per-document error body: the inner error is the specific one when present.
fn parse_document_error(kind: ActionKind, value: &Value) -> Option<DocumentError> {
    let id = value.get("id")?.as_str()?.to_string();
    let error = value.get("error")?;
    let specific = error.get("innererror").unwrap_or(error);
    let text = |v: &Value, key: &str| {
        v.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Some(DocumentError {
        id,
        kind,
        code: text(specific, "code"),
        message: text(specific, "message"),
    })
}

/// Task index from a job error target (`#/tasks/items/{i}`).
fn task_index_from_target(target: &str) -> Option<usize> {
    target
        .trim_start_matches('#')
        .strip_prefix("/tasks/items/")?
        .split('/')
        .next()?
        .parse()
        .ok()
}

/// Task results merged across result pages, keyed by task index.
#[derive(Debug, Default)]
struct TaskResults {
    failed: bool,
    documents: HashMap<String, Value>,
    errors: HashMap<String, Value>,
}

fn merge_page(tasks: &mut [TaskResults], body: &Value) {
    let items = body
        .pointer("/tasks/items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for (position, item) in items.iter().enumerate() {
        let index = item
            .get("taskName")
            .and_then(Value::as_str)
            .and_then(|name| name.parse::<usize>().ok())
            .unwrap_or(position);
        let Some(task) = tasks.get_mut(index) else {
            warn!("Ignoring result for unknown task {}", index);
            continue;
        };
        if item.get("status").and_then(Value::as_str) == Some("failed") {
            task.failed = true;
        }
        let list = |key: &str| {
            item.pointer(&format!("/results/{}", key))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        for doc in list("documents") {
            if let Some(id) = doc.get("id").and_then(Value::as_str) {
                task.documents.insert(id.to_string(), doc.clone());
            }
        }
        for err in list("errors") {
            if let Some(id) = err.get("id").and_then(Value::as_str) {
                task.errors.insert(id.to_string(), err.clone());
            }
        }
    }
}

/// Regroup task results into one row per document.
fn assemble_results(
    doc_ids: &[String],
    kinds: &[ActionKind],
    tasks: &[TaskResults],
    job_errors: &HashMap<usize, (String, String)>,
) -> Result<Vec<Vec<ActionResult>>> {
    let mut rows = Vec::with_capacity(doc_ids.len());
    for id in doc_ids {
        let mut row = Vec::with_capacity(kinds.len());
        for (index, (kind, task)) in kinds.iter().zip(tasks).enumerate() {
            let kind = *kind;
            let task_error = || {
                let (code, message) = job_errors.get(&index).cloned().unwrap_or_else(|| {
                    ("InternalServerError".to_string(), "action failed".to_string())
                });
                DocumentError {
                    id: id.clone(),
                    kind,
                    code,
                    message,
                }
            };
            let result = if task.failed || job_errors.contains_key(&index) {
                ActionResult::Error(task_error())
            } else if let Some(doc) = task.documents.get(id) {
                ActionResult::Success(parse_document(kind, doc)?)
            } else if let Some(err) = task.errors.get(id).and_then(|e| parse_document_error(kind, e))
            {
                ActionResult::Error(err)
            } else {
                ActionResult::Error(DocumentError {
                    id: id.clone(),
                    kind,
                    code: "MissingResult".to_string(),
                    message: "the service returned no result for this document".to_string(),
                })
            };
            row.push(result);
        }
        rows.push(row);
    }
    Ok(rows)
}

// ── Poller ──────────────────────────────────────────────────────────

/// Regroups job results; carries document and action order across resumes.
#[derive(Debug, Clone)]
pub struct AnalyzeActionsHandler {
    doc_ids: Vec<String>,
    kinds: Vec<ActionKind>,
    show_stats: bool,
    metadata: AnalyzeActionsMetadata,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandlerState {
    doc_id_order: Vec<String>,
    task_id_order: Vec<ActionKind>,
    #[serde(default)]
    show_stats: bool,
}

impl AnalyzeActionsHandler {
    pub fn metadata(&self) -> &AnalyzeActionsMetadata {
        &self.metadata
    }

    async fn collect(
        &self,
        pipeline: &Pipeline,
        body: Value,
    ) -> Result<Vec<Vec<ActionResult>>> {
        let mut tasks: Vec<TaskResults> =
            self.kinds.iter().map(|_| TaskResults::default()).collect();
        let mut job_errors = HashMap::new();
        let mut page = body;
        let mut pages = 1;
        loop {
            merge_page(&mut tasks, &page);
            for err in page
                .get("errors")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                if let Some(index) = err
                    .get("target")
                    .and_then(Value::as_str)
                    .and_then(task_index_from_target)
                {
                    let code = err.get("code").and_then(Value::as_str).unwrap_or_default();
                    let message = err.get("message").and_then(Value::as_str).unwrap_or_default();
                    job_errors.insert(index, (code.to_string(), message.to_string()));
                }
            }
            let Some(next) = page.get("nextLink").and_then(Value::as_str) else {
                break;
            };
            let url = url::Url::parse(next)
                .map_err(|e| Error::decode(format!("invalid nextLink: {}", e)))?;
            page = pipeline.send(pipeline.client().get(url)).await?.json()?;
            pages += 1;
        }
        debug!("Merged {} result page(s) for {} task(s)", pages, self.kinds.len());
        assemble_results(&self.doc_ids, &self.kinds, &tasks, &job_errors)
    }
}

impl LroHandler for AnalyzeActionsHandler {
    type Output = Vec<Vec<ActionResult>>;

    fn poll_url(&self, operation_location: &url::Url) -> url::Url {
        let mut url = operation_location.clone();
        if self.show_stats {
            url.query_pairs_mut().append_pair("showStats", "true");
        }
        url
    }

    fn on_progress(&mut self, body: &Value) {
        self.metadata = AnalyzeActionsMetadata::from_body(body);
    }

    fn finish<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        body: Value,
    ) -> BoxFuture<'a, Result<Self::Output>> {
        Box::pin(self.collect(pipeline, body))
    }

    fn continuation_state(&self) -> Value {
        serde_json::to_value(HandlerState {
            doc_id_order: self.doc_ids.clone(),
            task_id_order: self.kinds.clone(),
            show_stats: self.show_stats,
        })
        .unwrap_or(Value::Null)
    }
}

pub type AnalyzeActionsPoller = Poller<AnalyzeActionsHandler>;

// ── Client ──────────────────────────────────────────────────────────

/// Client for the Language service text analysis endpoints.
#[derive(Debug, Clone)]
pub struct TextAnalyticsClient {
    pipeline: Pipeline,
    endpoint: url::Url,
    default_language: Option<String>,
}

impl TextAnalyticsClient {
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
        Ok(Self {
            pipeline,
            endpoint,
            default_language: None,
        })
    }

    /// Language used for documents without one, unless overridden per call.
    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = Some(language.into());
        self
    }

    fn jobs_url(&self) -> Result<url::Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::invalid("endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(["language", "analyze-text", "jobs"]);
        Ok(url)
    }

    /// Submit a job running `actions` over `documents`.
    pub async fn begin_analyze_actions(
        &self,
        documents: Vec<TextDocumentInput>,
        actions: &[AnalyzeAction],
        options: AnalyzeActionsOptions,
    ) -> Result<AnalyzeActionsPoller> {
        if documents.is_empty() {
            return Err(Error::invalid("Input documents can not be empty or None"));
        }
        if actions.is_empty() {
            return Err(Error::invalid("At least one action must be specified"));
        }

        let language = options.language.or_else(|| self.default_language.clone());
        let docs: Vec<TextDocumentInput> = documents
            .into_iter()
            .map(|mut doc| {
                if doc.language.is_none() {
                    doc.language = language.clone();
                }
                doc
            })
            .collect();
        let tasks: Vec<Value> = actions
            .iter()
            .enumerate()
            .map(|(i, action)| {
                json!({
                    "kind": action.kind().task_kind(),
                    "taskName": i.to_string(),
                    "parameters": action.parameters(),
                })
            })
            .collect();
        let mut body = json!({
            "analysisInput": { "documents": docs },
            "tasks": tasks,
        });
        if let Some(name) = &options.display_name {
            body["displayName"] = json!(name);
        }

        let builder = self.pipeline.client().post(self.jobs_url()?).json(&body);
        let response = self.pipeline.send(builder).await?;
        info!(
            "Submitted analyze job with {} document(s) and {} action(s)",
            docs.len(),
            actions.len()
        );

        let handler = AnalyzeActionsHandler {
            doc_ids: docs.iter().map(|d| d.id.clone()).collect(),
            kinds: actions.iter().map(AnalyzeAction::kind).collect(),
            show_stats: options.show_stats,
            metadata: AnalyzeActionsMetadata::default(),
        };
        Poller::from_response(
            self.pipeline.clone(),
            &response,
            handler,
            options.polling_interval.unwrap_or(DEFAULT_POLLING_INTERVAL),
        )
    }

    /// Resume a job from [`Poller::continuation_token`].
    pub fn begin_analyze_actions_from_continuation_token(
        &self,
        token: &str,
        polling_interval: Option<Duration>,
    ) -> Result<AnalyzeActionsPoller> {
        let (url, state) = decode_continuation_token(token)?;
        let state: HandlerState = serde_json::from_value(state)
            .map_err(|e| Error::invalid(format!("invalid continuation token: {}", e)))?;
        let handler = AnalyzeActionsHandler {
            doc_ids: state.doc_id_order,
            kinds: state.task_id_order,
            show_stats: state.show_stats,
            metadata: AnalyzeActionsMetadata::default(),
        };
        Ok(Poller::new(
            self.pipeline.clone(),
            url,
            handler,
            polling_interval.unwrap_or(DEFAULT_POLLING_INTERVAL),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TextAnalyticsClient {
        TextAnalyticsClient::new(
            "https://lang.example.com/",
            CognitiveCredential::Key("k".into()),
            &ClientOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_jobs_url() {
        assert_eq!(
            client().jobs_url().unwrap().as_str(),
            "https://lang.example.com/language/analyze-text/jobs"
        );
    }

    #[test]
    fn test_action_parameters() {
        let pii = AnalyzeAction::RecognizePiiEntities {
            options: ActionOptions {
                disable_service_logs: Some(true),
                ..Default::default()
            },
            domain_filter: Some("phi".into()),
            categories_filter: vec!["USSocialSecurityNumber".into()],
        };
        let params = pii.parameters();
        assert_eq!(params["loggingOptOut"], true);
        assert_eq!(params["domain"], "phi");
        assert_eq!(params["piiCategories"][0], "USSocialSecurityNumber");
        assert_eq!(params["stringIndexType"], "UnicodeCodePoint");

        let key_phrases = AnalyzeAction::ExtractKeyPhrases(ActionOptions::default()).parameters();
        assert!(key_phrases.get("stringIndexType").is_none());

        let classify = AnalyzeAction::SingleLabelClassify {
            project_name: "p".into(),
            deployment_name: "d".into(),
            options: ActionOptions::default(),
        };
        assert_eq!(classify.kind().task_kind(), "CustomSingleLabelClassification");
        assert_eq!(classify.parameters()["deploymentName"], "d");
    }

    #[test]
    fn test_from_strings_assigns_positional_ids() {
        let docs = TextDocumentInput::from_strings(&["a", "b"], Some("en"));
        assert_eq!(docs[1].id, "1");
        assert_eq!(docs[1].language.as_deref(), Some("en"));
    }

    #[test]
    fn test_task_index_from_target() {
        assert_eq!(task_index_from_target("#/tasks/items/3"), Some(3));
        assert_eq!(task_index_from_target("#/tasks/items/0/results"), Some(0));
        assert_eq!(task_index_from_target("#/documents/1"), None);
    }

    #[test]
    fn test_assemble_keeps_input_and_action_order() {
        let kinds = [ActionKind::ExtractKeyPhrases, ActionKind::RecognizeEntities];
        let mut tasks = vec![TaskResults::default(), TaskResults::default()];
        let body = json!({"tasks": {"items": [
            {"kind": "EntityRecognitionLROResults", "taskName": "1", "status": "succeeded",
             "results": {"documents": [
                {"id": "56", "entities": [], "warnings": []},
                {"id": "0", "entities": [], "warnings": []}],
              "errors": [{"id": "19", "error": {"code": "InvalidArgument", "message": "x",
                 "innererror": {"code": "InvalidDocument", "message": "Document text is empty."}}}]}},
            {"kind": "KeyPhraseExtractionLROResults", "taskName": "0", "status": "succeeded",
             "results": {"documents": [
                {"id": "0", "keyPhrases": ["a"], "warnings": []},
                {"id": "19", "keyPhrases": [], "warnings": []},
                {"id": "56", "keyPhrases": ["b"], "warnings": []}], "errors": []}}
        ]}});
        merge_page(&mut tasks, &body);
        let ids: Vec<String> = ["56", "0", "19"].iter().map(|s| s.to_string()).collect();
        let rows = assemble_results(&ids, &kinds, &tasks, &HashMap::new()).unwrap();

        assert_eq!(rows.len(), 3);
        for (row, id) in rows.iter().zip(&ids) {
            assert_eq!(row.len(), 2);
            assert_eq!(row[0].id(), id);
            assert_eq!(row[0].kind(), ActionKind::ExtractKeyPhrases);
            assert_eq!(row[1].kind(), ActionKind::RecognizeEntities);
        }
        match &rows[2][1] {
            ActionResult::Error(e) => assert_eq!(e.code, "InvalidDocument"),
            other => panic!("expected error, got {:?}", other),
        }
        match &rows[0][0] {
            ActionResult::Success(r) => {
                assert_eq!(r.output, ActionOutput::KeyPhrases(vec!["b".into()]))
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_task_marks_every_document() {
        let kinds = [ActionKind::AnalyzeSentiment, ActionKind::RecognizePiiEntities];
        let mut tasks = vec![TaskResults::default(), TaskResults::default()];
        merge_page(
            &mut tasks,
            &json!({"tasks": {"items": [
                {"taskName": "0", "status": "succeeded", "results": {"documents": [
                    {"id": "1", "sentiment": "negative",
                     "confidenceScores": {"positive": 0.0, "neutral": 0.1, "negative": 0.9},
                     "sentences": [], "warnings": []}], "errors": []}},
                {"taskName": "1", "status": "failed"}
            ]}}),
        );
        let mut job_errors = HashMap::new();
        job_errors.insert(1, ("InvalidParameterValue".to_string(), "bad".to_string()));
        let rows = assemble_results(&["1".to_string()], &kinds, &tasks, &job_errors).unwrap();
        assert!(!rows[0][0].is_error());
        match &rows[0][1] {
            ActionResult::Error(e) => {
                assert_eq!(e.code, "InvalidParameterValue");
                assert_eq!(e.kind, ActionKind::RecognizePiiEntities);
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_mined_opinions_resolve_references() {
        let doc = json!({
            "id": "0", "sentiment": "positive", "warnings": [],
            "confidenceScores": {"positive": 1.0, "neutral": 0.0, "negative": 0.0},
            "sentences": [{
                "text": "It has a sleek premium design.", "sentiment": "positive",
                "confidenceScores": {"positive": 1.0, "neutral": 0.0, "negative": 0.0},
                "offset": 0, "length": 30,
                "targets": [{"text": "design", "sentiment": "positive",
                    "confidenceScores": {"positive": 1.0, "negative": 0.0},
                    "offset": 23, "length": 6,
                    "relations": [
                        {"relationType": "assessment", "ref": "#/documents/0/sentences/0/assessments/0"},
                        {"relationType": "assessment", "ref": "#/documents/0/sentences/0/assessments/1"}]}],
                "assessments": [
                    {"text": "sleek", "sentiment": "positive",
                     "confidenceScores": {"positive": 1.0, "negative": 0.0},
                     "offset": 9, "length": 5, "isNegated": false},
                    {"text": "premium", "sentiment": "positive",
                     "confidenceScores": {"positive": 1.0, "negative": 0.0},
                     "offset": 15, "length": 7, "isNegated": false}]
            }]
        });
        let result = parse_document(ActionKind::AnalyzeSentiment, &doc).unwrap();
        let ActionOutput::Sentiment { sentences, .. } = result.output else {
            panic!("expected sentiment output");
        };
        let opinion = &sentences[0].mined_opinions[0];
        assert_eq!(opinion.target.text, "design");
        let texts: Vec<&str> = opinion.assessments.iter().map(|a| a.text.as_str()).collect();
        assert_eq!(texts, ["sleek", "premium"]);
    }

    #[test]
    fn test_metadata_from_status_body() {
        let meta = AnalyzeActionsMetadata::from_body(&json!({
            "jobId": "abc", "status": "succeeded",
            "createdDateTime": "2022-05-01T10:00:00Z",
            "expirationDateTime": "2022-05-02T10:00:00Z",
            "lastUpdatedDateTime": "2022-05-01T10:00:05Z",
            "tasks": {"completed": 1, "failed": 0, "inProgress": 0, "total": 1}
        }));
        assert_eq!(meta.id.as_deref(), Some("abc"));
        assert!(meta.display_name.is_none());
        assert!(meta.created_on.is_some());
        assert_eq!(meta.actions_succeeded_count, 1);
        assert_eq!(meta.total_actions_count, 1);
    }

    #[tokio::test]
    async fn test_empty_documents_rejected() {
        let err = client()
            .begin_analyze_actions(
                vec![],
                &[AnalyzeAction::ExtractKeyPhrases(ActionOptions::default())],
                AnalyzeActionsOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Input documents can not be empty or None"));
    }

    #[test]
    fn test_continuation_token_restores_order() {
        let handler = AnalyzeActionsHandler {
            doc_ids: vec!["56".into(), "0".into()],
            kinds: vec![ActionKind::AnalyzeSentiment, ActionKind::ExtractKeyPhrases],
            show_stats: true,
            metadata: AnalyzeActionsMetadata::default(),
        };
        let poller = Poller::new(
            client().pipeline.clone(),
            url::Url::parse("https://lang.example.com/language/analyze-text/jobs/1").unwrap(),
            handler,
            Duration::from_millis(1),
        );
        let token = poller.continuation_token().unwrap();
        let resumed = client()
            .begin_analyze_actions_from_continuation_token(&token, None)
            .unwrap();
        assert_eq!(resumed.handler().doc_ids, ["56", "0"]);
        assert_eq!(
            resumed.handler().kinds,
            [ActionKind::AnalyzeSentiment, ActionKind::ExtractKeyPhrases]
        );
        assert!(resumed.handler().show_stats);
    }
}
