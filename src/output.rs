//! Data types flowing into and out of the OCR pipeline.
//!
//! [`RawOcrResult`] is what a backend hands us and is deliberately loose:
//! every field is optional and unknown keys are kept. [`NormalizedResponse`]
//! is what every caller gets back, with all three fields always populated.

use crate::error::{ItemError, OcrError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Untrusted result returned by an OCR backend.
///
/// `text` is mandatory by contract but optional here so its absence can be
/// detected and reported by the assembler instead of failing inside serde.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOcrResult {
    /// Concatenated raw extracted text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Backend-side cleaned text, if the backend already ran a cleanup pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean: Option<String>,

    /// Backend-side Markdown rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,

    /// Arbitrary backend metadata (`page_count`, `results`, `filename`, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_json: Option<Value>,

    /// Any other top-level keys the backend sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawOcrResult {
    /// A result carrying only raw text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_clean(mut self, clean: impl Into<String>) -> Self {
        self.clean = Some(clean.into());
        self
    }

    pub fn with_markdown(mut self, markdown: impl Into<String>) -> Self {
        self.markdown = Some(markdown.into());
        self
    }

    pub fn with_raw_json(mut self, raw_json: Value) -> Self {
        self.raw_json = Some(raw_json);
        self
    }

    /// Decode an untrusted JSON body.
    ///
    /// Anything that is not an object, or whose known fields have the wrong
    /// type, is an [`OcrError::UpstreamMalformed`]. A missing `text` is *not*
    /// rejected here; that is the assembler's call.
    pub fn from_value(value: Value) -> Result<Self, OcrError> {
        if !value.is_object() {
            return Err(OcrError::UpstreamMalformed {
                detail: format!("expected a JSON object, got {}", json_kind(&value)),
            });
        }
        serde_json::from_value(value).map_err(|e| OcrError::UpstreamMalformed {
            detail: e.to_string(),
        })
    }

    /// Reinterpret the whole result as a JSON object, keeping only present keys.
    pub fn into_map(self) -> Map<String, Value> {
        let mut map = self.extra;
        if let Some(text) = self.text {
            map.insert("text".into(), Value::String(text));
        }
        if let Some(clean) = self.clean {
            map.insert("clean".into(), Value::String(clean));
        }
        if let Some(markdown) = self.markdown {
            map.insert("markdown".into(), Value::String(markdown));
        }
        if let Some(raw_json) = self.raw_json {
            map.insert("raw_json".into(), raw_json);
        }
        map
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The response every caller receives.
///
/// Serialises to exactly three keys: `text`, `markdown`, `raw_json`.
/// `markdown` is never empty and `raw_json` is never null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    /// Cleaned text.
    pub text: String,
    /// Backend Markdown, or the cleaned text in a ```` ```txt ```` fence.
    pub markdown: String,
    /// Backend metadata, or the whole raw result when the backend sent none.
    pub raw_json: Value,
}

/// Where an input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Url,
    Upload,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Url => "url",
            SourceType::Upload => "upload",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request metadata merged into `raw_json` by the assembler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    pub content_type: String,
    pub source_type: SourceType,
    pub file_size_bytes: u64,
}

/// One input processed end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedDocument {
    /// The path or URL as given by the caller.
    pub input: String,
    pub metadata: FileMetadata,
    pub response: NormalizedResponse,
    /// Wall-clock time spent on this input, download included.
    pub duration_ms: u64,
}

/// Outcome of one input within a batch.
///
/// Exactly one of `document` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    /// 0-indexed position in the batch.
    pub index: usize,
    pub input: String,
    pub document: Option<ProcessedDocument>,
    pub error: Option<ItemError>,
}

/// Aggregate counters for a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Every item of a batch, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub items: Vec<BatchItem>,
    pub stats: BatchStats,
}

impl BatchOutput {
    /// Successful documents in input order.
    pub fn documents(&self) -> impl Iterator<Item = &ProcessedDocument> {
        self.items.iter().filter_map(|i| i.document.as_ref())
    }

    /// Failed items in input order.
    pub fn errors(&self) -> impl Iterator<Item = &ItemError> {
        self.items.iter().filter_map(|i| i.error.as_ref())
    }
}

/// Files written for one processed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionArtifacts {
    /// Session directory name (`20240505T135412Z_f452a3`).
    pub session: String,
    pub dir: PathBuf,
    pub txt: PathBuf,
    pub md: PathBuf,
    pub json: PathBuf,
    /// First 500 characters of the cleaned text.
    pub preview: String,
}

/// A batch run persisted into one session directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutput {
    pub dir: PathBuf,
    pub batch: BatchOutput,
    /// One entry per successful document, in input order.
    pub artifacts: Vec<SessionArtifacts>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_text_is_none_not_error() {
        let raw = RawOcrResult::from_value(json!({"clean": "x"})).unwrap();
        assert!(raw.text.is_none());
        assert_eq!(raw.clean.as_deref(), Some("x"));
    }

    #[test]
    fn null_text_counts_as_missing() {
        let raw = RawOcrResult::from_value(json!({"text": null})).unwrap();
        assert!(raw.text.is_none());
    }

    #[test]
    fn non_object_body_is_malformed() {
        let err = RawOcrResult::from_value(json!(["a", "b"])).unwrap_err();
        assert!(matches!(err, OcrError::UpstreamMalformed { .. }));
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn wrongly_typed_text_is_malformed() {
        let err = RawOcrResult::from_value(json!({"text": 42})).unwrap_err();
        assert!(matches!(err, OcrError::UpstreamMalformed { .. }));
    }

    #[test]
    fn extra_keys_survive_into_map() {
        let raw =
            RawOcrResult::from_value(json!({"text": "abc", "engine": "mistral", "pages": 2}))
                .unwrap();
        let map = raw.into_map();
        assert_eq!(map["text"], json!("abc"));
        assert_eq!(map["engine"], json!("mistral"));
        assert_eq!(map["pages"], json!(2));
        assert!(!map.contains_key("clean"));
    }

    #[test]
    fn normalized_response_has_three_keys() {
        let resp = NormalizedResponse {
            text: "a".into(),
            markdown: "```txt\na\n```".into(),
            raw_json: json!({}),
        };
        let v = serde_json::to_value(&resp).unwrap();
        let keys: Vec<&String> = v.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn source_type_serialises_lowercase() {
        assert_eq!(serde_json::to_value(SourceType::Url).unwrap(), json!("url"));
        assert_eq!(SourceType::Upload.to_string(), "upload");
    }
}
