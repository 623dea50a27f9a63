//! Form Recognizer prebuilt receipt analysis (REST API v2.0 / v2.1).
//!
//! `begin_recognize_receipts_from_url` submits a receipt URL and returns a
//! poller.  The final `analyzeResult` is turned into [`RecognizedForm`]s:
//! one per document result, with typed field values, page ranges and page
//! text.  When field elements are requested, each field's `elements`
//! references (`#/readResults/0/lines/2/words/1`) are resolved against the
//! page text.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::auth::CognitiveCredential;
use crate::errors::{Error, Result};
use crate::pipeline::{ApiVersion, ClientOptions, Pipeline};
use crate::poller::{LroHandler, Poller};

const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5);

/// REST API versions; the version is part of the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormRecognizerApiVersion {
    V2_0,
    #[default]
    V2_1,
}

impl FormRecognizerApiVersion {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches(['v', 'V']) {
            "2.0" | "2_0" => Ok(Self::V2_0),
            "2.1" | "2_1" => Ok(Self::V2_1),
            other => Err(Error::invalid(format!(
                "unsupported Form Recognizer API version '{}'",
                other
            ))),
        }
    }

    fn path(self) -> &'static str {
        match self {
            Self::V2_0 => "v2.0",
            Self::V2_1 => "v2.1",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecognizeReceiptsOptions {
    /// Resolve field elements to words, lines and selection marks.
    pub include_field_elements: bool,
    /// Receipt locale such as `en-US`; v2.1 and up.
    pub locale: Option<String>,
    /// Page numbers or ranges (`1`, `3-5`); v2.1 and up.
    pub pages: Vec<String>,
    pub polling_interval: Option<Duration>,
}

// ── Models ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

fn bounding_box(values: &[f64]) -> Vec<Point> {
    values
        .chunks_exact(2)
        .map(|xy| Point { x: xy[0], y: xy[1] })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextAppearance {
    /// `handwriting` or `other`.
    pub style_name: String,
    pub style_confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormWord {
    pub text: String,
    pub bounding_box: Vec<Point>,
    pub confidence: Option<f64>,
    pub page_number: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormLine {
    pub text: String,
    pub bounding_box: Vec<Point>,
    pub words: Vec<FormWord>,
    pub page_number: u32,
    pub appearance: Option<TextAppearance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormSelectionMark {
    /// `selected` or `unselected`.
    pub state: String,
    pub bounding_box: Vec<Point>,
    pub confidence: Option<f64>,
    pub page_number: u32,
}

/// An element a field value was read from.
#[derive(Debug, Clone, PartialEq)]
pub enum FormElement {
    Word(FormWord),
    Line(FormLine),
    SelectionMark(FormSelectionMark),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormPage {
    pub page_number: u32,
    pub text_angle: f64,
    pub width: f64,
    pub height: f64,
    /// `pixel` or `inch`.
    pub unit: String,
    pub lines: Vec<FormLine>,
    pub selection_marks: Vec<FormSelectionMark>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormPageRange {
    pub first_page_number: u32,
    pub last_page_number: u32,
}

/// Where a field value was found.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldData {
    pub page_number: u32,
    pub text: Option<String>,
    pub bounding_box: Vec<Point>,
    pub field_elements: Vec<FormElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Number(f64),
    Integer(i64),
    Date(NaiveDate),
    Time(NaiveTime),
    PhoneNumber(String),
    CountryRegion(String),
    SelectionMark(String),
    List(Vec<FormField>),
    Dictionary(HashMap<String, FormField>),
    /// The service recognized the field but returned no value.
    Empty,
}

impl FieldValue {
    /// Type name as reported by `value_type` in other SDKs.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Number(_) => "float",
            FieldValue::Integer(_) => "int",
            FieldValue::Date(_) => "date",
            FieldValue::Time(_) => "time",
            FieldValue::PhoneNumber(_) => "phoneNumber",
            FieldValue::CountryRegion(_) => "countryRegion",
            FieldValue::SelectionMark(_) => "selectionMark",
            FieldValue::List(_) => "list",
            FieldValue::Dictionary(_) => "dictionary",
            FieldValue::Empty => "none",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s)
            | FieldValue::PhoneNumber(s)
            | FieldValue::CountryRegion(s)
            | FieldValue::SelectionMark(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: Option<String>,
    pub value: FieldValue,
    pub value_data: Option<FieldData>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedForm {
    pub form_type: String,
    pub form_type_confidence: Option<f64>,
    pub fields: HashMap<String, FormField>,
    pub page_range: FormPageRange,
    pub pages: Vec<FormPage>,
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalyzeResult {
    #[serde(default)]
    read_results: Vec<RawReadResult>,
    #[serde(default)]
    document_results: Vec<RawDocumentResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReadResult {
    page: u32,
    #[serde(default)]
    angle: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    lines: Vec<RawLine>,
    #[serde(default)]
    selection_marks: Vec<RawSelectionMark>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLine {
    text: String,
    #[serde(default)]
    bounding_box: Vec<f64>,
    #[serde(default)]
    words: Vec<RawWord>,
    #[serde(default)]
    appearance: Option<RawAppearance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWord {
    text: String,
    #[serde(default)]
    bounding_box: Vec<f64>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAppearance {
    style: RawStyle,
}

#[derive(Debug, Deserialize)]
struct RawStyle {
    name: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSelectionMark {
    state: String,
    #[serde(default)]
    bounding_box: Vec<f64>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocumentResult {
    doc_type: String,
    #[serde(default)]
    doc_type_confidence: Option<f64>,
    #[serde(default)]
    page_range: Vec<u32>,
    #[serde(default)]
    fields: HashMap<String, Option<Value>>,
}

fn convert_pages(read_results: &[RawReadResult]) -> Vec<FormPage> {
    read_results
        .iter()
        .map(|page| FormPage {
            page_number: page.page,
            text_angle: page.angle,
            width: page.width,
            height: page.height,
            unit: page.unit.clone(),
            lines: page
                .lines
                .iter()
                .map(|line| FormLine {
                    text: line.text.clone(),
                    bounding_box: bounding_box(&line.bounding_box),
                    words: line
                        .words
                        .iter()
                        .map(|word| convert_word(word, page.page))
                        .collect(),
                    page_number: page.page,
                    appearance: line.appearance.as_ref().map(|a| TextAppearance {
                        style_name: a.style.name.clone(),
                        style_confidence: a.style.confidence,
                    }),
                })
                .collect(),
            selection_marks: page
                .selection_marks
                .iter()
                .map(|mark| FormSelectionMark {
                    state: mark.state.clone(),
                    bounding_box: bounding_box(&mark.bounding_box),
                    confidence: mark.confidence,
                    page_number: page.page,
                })
                .collect(),
        })
        .collect()
}

fn convert_word(word: &RawWord, page_number: u32) -> FormWord {
    FormWord {
        text: word.text.clone(),
        bounding_box: bounding_box(&word.bounding_box),
        confidence: word.confidence,
        page_number,
    }
}

/// Resolve `#/readResults/{p}/lines/{l}[/words/{w}]` or
/// `#/readResults/{p}/selectionMarks/{s}`.
fn resolve_element(reference: &str, pages: &[FormPage]) -> Result<FormElement> {
    let invalid = || Error::decode(format!("cannot resolve field element '{}'", reference));
    let parts: Vec<&str> = reference
        .trim_start_matches('#')
        .trim_start_matches('/')
        .split('/')
        .collect();
    let index = |i: usize| -> Result<usize> {
        parts
            .get(i)
            .and_then(|s| s.parse().ok())
            .ok_or_else(invalid)
    };
    if parts.first() != Some(&"readResults") {
        return Err(invalid());
    }
    let page = pages.get(index(1)?).ok_or_else(invalid)?;
    match parts.get(2).copied() {
        Some("lines") => {
            let line = page.lines.get(index(3)?).ok_or_else(invalid)?;
            match parts.get(4).copied() {
                Some("words") => line
                    .words
                    .get(index(5)?)
                    .cloned()
                    .map(FormElement::Word)
                    .ok_or_else(invalid),
                None => Ok(FormElement::Line(line.clone())),
                Some(_) => Err(invalid()),
            }
        }
        Some("selectionMarks") => page
            .selection_marks
            .get(index(3)?)
            .cloned()
            .map(FormElement::SelectionMark)
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn convert_field(
    name: Option<&str>,
    raw: Option<&Value>,
    pages: &[FormPage],
    include_elements: bool,
) -> Result<FormField> {
    let Some(raw) = raw.filter(|v| !v.is_null()) else {
        return Ok(FormField {
            name: name.map(str::to_string),
            value: FieldValue::Empty,
            value_data: None,
            confidence: None,
        });
    };
    let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);
    let kind = raw.get("type").and_then(Value::as_str).unwrap_or("string");

    let value = match kind {
        "string" => text("valueString").map(FieldValue::String),
        "number" => raw
            .get("valueNumber")
            .and_then(Value::as_f64)
            .map(FieldValue::Number),
        "integer" => raw
            .get("valueInteger")
            .and_then(Value::as_i64)
            .map(FieldValue::Integer),
        "date" => text("valueDate")
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
            .map(FieldValue::Date),
        "time" => text("valueTime")
            .and_then(|t| NaiveTime::parse_from_str(&t, "%H:%M:%S").ok())
            .map(FieldValue::Time),
        "phoneNumber" => text("valuePhoneNumber").map(FieldValue::PhoneNumber),
        "countryRegion" => text("valueCountryRegion").map(FieldValue::CountryRegion),
        "selectionMark" => text("valueSelectionMark").map(FieldValue::SelectionMark),
        "array" => {
            let items = raw
                .get("valueArray")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let list = items
                .iter()
                .map(|item| convert_field(None, Some(item), pages, include_elements))
                .collect::<Result<Vec<_>>>()?;
            Some(FieldValue::List(list))
        }
        "object" => {
            let entries = raw
                .get("valueObject")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let mut map = HashMap::with_capacity(entries.len());
            for (key, item) in &entries {
                map.insert(
                    key.clone(),
                    convert_field(Some(key), Some(item), pages, include_elements)?,
                );
            }
            Some(FieldValue::Dictionary(map))
        }
        other => {
            debug!("Unknown field type '{}'; keeping its text", other);
            text("text").map(FieldValue::String)
        }
    }
    .unwrap_or(FieldValue::Empty);

    let value_data = match raw.get("page").and_then(Value::as_u64) {
        Some(page_number) => {
            let field_elements = if include_elements {
                raw.get("elements")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_str)
                    .map(|r| resolve_element(r, pages))
                    .collect::<Result<Vec<_>>>()?
            } else {
                Vec::new()
            };
            let bbox: Vec<f64> = raw
                .get("boundingBox")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_f64)
                .collect();
            Some(FieldData {
                page_number: page_number as u32,
                text: text("text"),
                bounding_box: bounding_box(&bbox),
                field_elements,
            })
        }
        None => None,
    };

    Ok(FormField {
        name: name.map(str::to_string),
        value,
        value_data,
        confidence: raw.get("confidence").and_then(Value::as_f64),
    })
}

/// Build receipts from a terminal `analyzeResult`.
fn prepare_receipts(analyze_result: &Value, include_elements: bool) -> Result<Vec<RecognizedForm>> {
    let raw: RawAnalyzeResult = serde_json::from_value(analyze_result.clone())?;
    let all_pages = convert_pages(&raw.read_results);

    raw.document_results
        .iter()
        .map(|doc| {
            let first = doc.page_range.first().copied().unwrap_or(1);
            let last = doc.page_range.get(1).copied().unwrap_or(first);
            let mut fields = HashMap::with_capacity(doc.fields.len());
            for (name, value) in &doc.fields {
                fields.insert(
                    name.clone(),
                    convert_field(Some(name), value.as_ref(), &all_pages, include_elements)?,
                );
            }
            let pages = all_pages
                .iter()
                .filter(|p| p.page_number >= first && p.page_number <= last)
                .cloned()
                .collect();
            Ok(RecognizedForm {
                form_type: doc.doc_type.clone(),
                form_type_confidence: doc.doc_type_confidence,
                fields,
                page_range: FormPageRange {
                    first_page_number: first,
                    last_page_number: last,
                },
                pages,
            })
        })
        .collect()
}

// ── Poller ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RecognizeReceiptsHandler {
    include_field_elements: bool,
}

impl LroHandler for RecognizeReceiptsHandler {
    type Output = Vec<RecognizedForm>;

    fn finish<'a>(
        &'a self,
        _pipeline: &'a Pipeline,
        body: Value,
    ) -> BoxFuture<'a, Result<Self::Output>> {
        Box::pin(async move {
            let analyze_result = body
                .get("analyzeResult")
                .ok_or_else(|| Error::decode("operation result is missing 'analyzeResult'"))?;
            prepare_receipts(analyze_result, self.include_field_elements)
        })
    }

    fn continuation_state(&self) -> Value {
        json!({ "includeFieldElements": self.include_field_elements })
    }
}

pub type RecognizeReceiptsPoller = Poller<RecognizeReceiptsHandler>;

// ── Client ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FormRecognizerClient {
    pipeline: Pipeline,
    endpoint: url::Url,
    api_version: FormRecognizerApiVersion,
}

impl FormRecognizerClient {
    /// `options.api_version` selects `2.0` or `2.1` (the default).
    pub fn new(
        endpoint: &str,
        credential: CognitiveCredential,
        options: &ClientOptions,
    ) -> Result<Self> {
        let api_version = options
            .api_version
            .as_deref()
            .map(FormRecognizerApiVersion::parse)
            .transpose()?
            .unwrap_or_default();
        let endpoint = url::Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|e| Error::invalid(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        let mut client_options = options.clone();
        client_options.api_version = None;
        let pipeline = Pipeline::new(
            Some(credential.into_credential()),
            client_options.pipeline_options(ApiVersion::None),
        );
        Ok(Self {
            pipeline,
            endpoint,
            api_version,
        })
    }

    pub fn api_version(&self) -> FormRecognizerApiVersion {
        self.api_version
    }

    fn receipt_url(&self, options: &RecognizeReceiptsOptions) -> Result<url::Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::invalid("endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend([
                "formrecognizer",
                self.api_version.path(),
                "prebuilt",
                "receipt",
                "analyze",
            ]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(
                "includeTextDetails",
                if options.include_field_elements { "true" } else { "false" },
            );
            if let Some(locale) = &options.locale {
                query.append_pair("locale", locale);
            }
            for pages in &options.pages {
                query.append_pair("pages", pages);
            }
        }
        Ok(url)
    }

    /// Analyze the receipt at `receipt_url`.
    pub async fn begin_recognize_receipts_from_url(
        &self,
        receipt_url: &str,
        options: RecognizeReceiptsOptions,
    ) -> Result<RecognizeReceiptsPoller> {
        if self.api_version == FormRecognizerApiVersion::V2_0 {
            if options.locale.is_some() {
                return Err(Error::invalid(
                    "'locale' is only available for API version V2_1 and up",
                ));
            }
            if !options.pages.is_empty() {
                return Err(Error::invalid(
                    "'pages' is only available for API version V2_1 and up",
                ));
            }
        }
        let builder = self
            .pipeline
            .client()
            .post(self.receipt_url(&options)?)
            .json(&json!({ "source": receipt_url }));
        let response = self.pipeline.send(builder).await?;
        info!("Submitted receipt analysis ({})", self.api_version.path());
        Poller::from_response(
            self.pipeline.clone(),
            &response,
            RecognizeReceiptsHandler {
                include_field_elements: options.include_field_elements,
            },
            options.polling_interval.unwrap_or(DEFAULT_POLLING_INTERVAL),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze_result() -> Value {
        json!({
            "version": "2.1.0",
            "readResults": [{
                "page": 1, "angle": 0.6, "width": 1688, "height": 3000, "unit": "pixel",
                "lines": [
                    {"text": "Contoso", "boundingBox": [1,2,3,2,3,4,1,4],
                     "appearance": {"style": {"name": "other", "confidence": 0.9}},
                     "words": [{"text": "Contoso", "boundingBox": [1,2,3,2,3,4,1,4], "confidence": 0.99}]},
                    {"text": "Total 14.50", "boundingBox": [0,0,1,0,1,1,0,1],
                     "words": [{"text": "Total", "boundingBox": [0,0,1,0,1,1,0,1]},
                               {"text": "14.50", "boundingBox": [0,0,1,0,1,1,0,1], "confidence": 0.98}]}
                ]
            }],
            "documentResults": [{
                "docType": "prebuilt:receipt",
                "pageRange": [1, 1],
                "fields": {
                    "MerchantName": {"type": "string", "valueString": "Contoso", "text": "Contoso",
                        "boundingBox": [1,2,3,2,3,4,1,4], "page": 1, "confidence": 0.97,
                        "elements": ["#/readResults/0/lines/0/words/0"]},
                    "Total": {"type": "number", "valueNumber": 14.5, "text": "14.50", "page": 1,
                        "confidence": 0.98, "elements": ["#/readResults/0/lines/1/words/1"]},
                    "TransactionDate": {"type": "date", "valueDate": "2019-06-10", "page": 1},
                    "TransactionTime": {"type": "time", "valueTime": "13:59:00", "page": 1},
                    "MerchantPhoneNumber": {"type": "phoneNumber", "valuePhoneNumber": "+19876543210", "page": 1},
                    "ReceiptType": {"type": "string", "valueString": "Itemized", "confidence": 0.66},
                    "Items": {"type": "array", "valueArray": [
                        {"type": "object", "valueObject": {
                            "Name": {"type": "string", "valueString": "Surface Pro 6", "page": 1,
                                     "elements": ["#/readResults/0/lines/0"]},
                            "Quantity": {"type": "number", "valueNumber": 1, "page": 1}
                        }}
                    ]},
                    "Tip": null
                }
            }]
        })
    }

    #[test]
    fn test_receipt_fields_are_typed() {
        let receipts = prepare_receipts(&analyze_result(), true).unwrap();
        assert_eq!(receipts.len(), 1);
        let receipt = &receipts[0];
        assert_eq!(receipt.form_type, "prebuilt:receipt");
        assert_eq!(receipt.page_range.first_page_number, 1);
        assert_eq!(receipt.page_range.last_page_number, 1);

        let f = &receipt.fields;
        assert_eq!(f["MerchantName"].value.as_str(), Some("Contoso"));
        assert_eq!(f["Total"].value.as_f64(), Some(14.5));
        assert_eq!(
            f["TransactionDate"].value,
            FieldValue::Date(NaiveDate::from_ymd_opt(2019, 6, 10).unwrap())
        );
        assert_eq!(
            f["TransactionTime"].value,
            FieldValue::Time(NaiveTime::from_hms_opt(13, 59, 0).unwrap())
        );
        assert_eq!(
            f["MerchantPhoneNumber"].value,
            FieldValue::PhoneNumber("+19876543210".into())
        );
        assert_eq!(f["ReceiptType"].value.as_str(), Some("Itemized"));
        assert!(f["ReceiptType"].value_data.is_none());
        assert_eq!(f["Tip"].value, FieldValue::Empty);

        let FieldValue::List(items) = &f["Items"].value else {
            panic!("Items should be a list");
        };
        let FieldValue::Dictionary(item) = &items[0].value else {
            panic!("item should be a dictionary");
        };
        assert_eq!(item["Name"].name.as_deref(), Some("Name"));
        let name_data = item["Name"].value_data.as_ref().unwrap();
        assert!(matches!(name_data.field_elements[0], FormElement::Line(ref l) if l.text == "Contoso"));
    }

    #[test]
    fn test_field_elements_resolve_words() {
        let receipts = prepare_receipts(&analyze_result(), true).unwrap();
        let data = receipts[0].fields["Total"].value_data.as_ref().unwrap();
        assert_eq!(data.page_number, 1);
        match &data.field_elements[0] {
            FormElement::Word(w) => {
                assert_eq!(w.text, "14.50");
                assert_eq!(w.page_number, 1);
            }
            other => panic!("expected word, got {:?}", other),
        }

        let without = prepare_receipts(&analyze_result(), false).unwrap();
        let data = without[0].fields["Total"].value_data.as_ref().unwrap();
        assert!(data.field_elements.is_empty());
    }

    #[test]
    fn test_pages_carry_lines() {
        let receipts = prepare_receipts(&analyze_result(), true).unwrap();
        let page = &receipts[0].pages[0];
        assert_eq!(page.page_number, 1);
        assert_eq!(page.unit, "pixel");
        assert_eq!(page.lines.len(), 2);
        assert_eq!(page.lines[0].bounding_box.len(), 4);
        assert_eq!(
            page.lines[0].appearance.as_ref().map(|a| a.style_name.as_str()),
            Some("other")
        );
        assert_eq!(page.lines[1].words[1].text, "14.50");
    }

    #[test]
    fn test_bad_element_reference() {
        let pages = convert_pages(&[]);
        assert!(resolve_element("#/readResults/0/lines/0", &pages).is_err());
        assert!(resolve_element("#/documents/0", &pages).is_err());
    }

    #[test]
    fn test_api_version_parsing_and_url() {
        assert_eq!(
            FormRecognizerApiVersion::parse("2.0").unwrap(),
            FormRecognizerApiVersion::V2_0
        );
        assert_eq!(
            FormRecognizerApiVersion::parse("v2.1").unwrap(),
            FormRecognizerApiVersion::V2_1
        );
        assert!(FormRecognizerApiVersion::parse("3.0").is_err());

        let client = FormRecognizerClient::new(
            "https://fr.example.com/",
            CognitiveCredential::Key("k".into()),
            &ClientOptions::default(),
        )
        .unwrap();
        let url = client
            .receipt_url(&RecognizeReceiptsOptions {
                include_field_elements: true,
                locale: Some("en-US".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(url.path(), "/formrecognizer/v2.1/prebuilt/receipt/analyze");
        assert_eq!(url.query(), Some("includeTextDetails=true&locale=en-US"));
    }

    #[tokio::test]
    async fn test_locale_rejected_on_v2_0() {
        let options = ClientOptions {
            api_version: Some("2.0".into()),
            ..Default::default()
        };
        let client = FormRecognizerClient::new(
            "https://fr.example.com",
            CognitiveCredential::Key("k".into()),
            &options,
        )
        .unwrap();
        let err = client
            .begin_recognize_receipts_from_url(
                "https://example.com/receipt.jpg",
                RecognizeReceiptsOptions {
                    locale: Some("en-US".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("'locale' is only available for API version V2_1 and up"));
    }
}
