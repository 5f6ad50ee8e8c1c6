//! Response assembly: turn an untrusted [`RawOcrResult`] into a
//! [`NormalizedResponse`].
//!
//! Backends differ in what they send. Some already clean the text or render
//! Markdown, some send a metadata object, some send only `text`. All of that
//! uncertainty is resolved here, in one fallback chain, so nothing downstream
//! ever sees a missing field:
//!
//! | Field      | First choice                 | Fallback                        |
//! |------------|------------------------------|---------------------------------|
//! | `text`     | `clean` (non-empty)          | `normalize(text)`               |
//! | `markdown` | `markdown` (non-empty)       | `text` in a ```` ```txt ```` fence |
//! | `raw_json` | `raw_json` (present, non-null) | the whole raw result as an object |
//!
//! When `raw_json` ends up being a JSON object and request metadata is
//! supplied, the metadata is merged in according to [`MetadataPrecedence`].

use crate::config::{MetadataPrecedence, OcrConfig};
use crate::error::OcrError;
use crate::output::{FileMetadata, NormalizedResponse, RawOcrResult};
use crate::pipeline::normalize::Normalizer;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use tracing::debug;

static DEFAULT_ASSEMBLER: Lazy<Assembler> = Lazy::new(Assembler::default);

/// Assemble with the default normaliser and backend-wins metadata merging.
pub fn assemble(
    raw: RawOcrResult,
    meta: Option<&FileMetadata>,
) -> Result<NormalizedResponse, OcrError> {
    DEFAULT_ASSEMBLER.assemble(raw, meta)
}

/// Wrap plain text in a ```` ```txt ```` fenced block.
pub fn fenced_markdown(text: &str) -> String {
    format!("```txt\n{text}\n```")
}

/// Fallback resolver from raw backend output to the response contract.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    normalizer: Normalizer,
    precedence: MetadataPrecedence,
}

impl Assembler {
    pub fn new(normalizer: Normalizer, precedence: MetadataPrecedence) -> Self {
        Self {
            normalizer,
            precedence,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(config.normalizer.clone(), config.metadata_precedence)
    }

    /// Resolve `raw` into a response, enriching metadata when `meta` is given.
    ///
    /// # Errors
    /// [`OcrError::MissingRequiredField`] if `raw.text` is absent. Every other
    /// gap is filled from the fallback chain.
    pub fn assemble(
        &self,
        mut raw: RawOcrResult,
        meta: Option<&FileMetadata>,
    ) -> Result<NormalizedResponse, OcrError> {
        let Some(raw_text) = raw.text.as_deref() else {
            return Err(OcrError::MissingRequiredField { field: "text" });
        };

        let text = match raw.clean.as_deref() {
            Some(clean) if !clean.is_empty() => clean.to_string(),
            _ => self.normalizer.normalize(raw_text),
        };

        let markdown = match raw.markdown.as_deref() {
            Some(md) if !md.is_empty() => md.to_string(),
            _ => fenced_markdown(&text),
        };

        let backend_json = raw.raw_json.take().filter(|v| !v.is_null());
        let from_backend = backend_json.is_some();
        let mut raw_json = match backend_json {
            Some(v) => v,
            None => Value::Object(raw.into_map()),
        };

        if let (Some(meta), Value::Object(map)) = (meta, &mut raw_json) {
            enrich_metadata(map, meta, self.precedence, Utc::now());
        }

        debug!(
            text_len = text.len(),
            raw_json_from_backend = from_backend,
            enriched = meta.is_some() && raw_json.is_object(),
            "assembled OCR response"
        );

        Ok(NormalizedResponse {
            text,
            markdown,
            raw_json,
        })
    }
}

/// Merge request metadata into `map` under `precedence`.
///
/// Keys: `filename`, `content_type`, `source_type`, `timestamp` (RFC 3339)
/// and `file_size_bytes`.
pub fn enrich_metadata(
    map: &mut Map<String, Value>,
    meta: &FileMetadata,
    precedence: MetadataPrecedence,
    at: DateTime<Utc>,
) {
    let entries = [
        ("filename", Value::from(meta.filename.as_str())),
        ("content_type", Value::from(meta.content_type.as_str())),
        ("source_type", Value::from(meta.source_type.as_str())),
        ("timestamp", Value::from(at.to_rfc3339())),
        ("file_size_bytes", Value::from(meta.file_size_bytes)),
    ];

    for (key, value) in entries {
        match precedence {
            MetadataPrecedence::BackendWins => {
                map.entry(key).or_insert(value);
            }
            MetadataPrecedence::RequestWins => {
                map.insert(key.to_string(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SourceType;
    use crate::pipeline::normalize::normalize;
    use serde_json::json;

    fn upload_meta() -> FileMetadata {
        FileMetadata {
            filename: "scan.pdf".into(),
            content_type: "application/pdf".into(),
            source_type: SourceType::Upload,
            file_size_bytes: 2048,
        }
    }

    #[test]
    fn text_only_result_uses_fallbacks() {
        let resp = assemble(RawOcrResult::new("abc"), None).unwrap();
        assert_eq!(resp.text, normalize("abc"));
        assert_eq!(resp.markdown, "```txt\nabc\n```");
        assert_eq!(resp.raw_json, json!({"text": "abc"}));
    }

    #[test]
    fn explicit_fields_win() {
        let raw = RawOcrResult::new("abc")
            .with_clean("ABC")
            .with_markdown("**ABC**")
            .with_raw_json(json!({"page_count": 1}));
        let resp = assemble(raw, None).unwrap();
        assert_eq!(resp.text, "ABC");
        assert_eq!(resp.markdown, "**ABC**");
        assert_eq!(resp.raw_json, json!({"page_count": 1}));
    }

    #[test]
    fn missing_text_is_fatal() {
        let raw = RawOcrResult::default().with_clean("ABC");
        let err = assemble(raw, None).unwrap_err();
        assert!(matches!(err, OcrError::MissingRequiredField { field: "text" }));
    }

    #[test]
    fn empty_text_is_valid() {
        let resp = assemble(RawOcrResult::new(""), None).unwrap();
        assert_eq!(resp.text, "");
        assert_eq!(resp.markdown, "```txt\n\n```");
    }

    #[test]
    fn empty_clean_and_markdown_fall_back() {
        let raw = RawOcrResult::new("12 . 5").with_clean("").with_markdown("");
        let resp = assemble(raw, None).unwrap();
        assert_eq!(resp.text, "12.5");
        assert_eq!(resp.markdown, "```txt\n12.5\n```");
    }

    #[test]
    fn markdown_fence_uses_clean_text() {
        let raw = RawOcrResult::new("ignored").with_clean("cleaned");
        let resp = assemble(raw, None).unwrap();
        assert_eq!(resp.markdown, "```txt\ncleaned\n```");
    }

    #[test]
    fn null_raw_json_falls_back_to_whole_result() {
        let raw = RawOcrResult::new("x").with_raw_json(Value::Null);
        let resp = assemble(raw, None).unwrap();
        assert_eq!(resp.raw_json, json!({"text": "x"}));
    }

    #[test]
    fn enrichment_backend_wins() {
        let raw = RawOcrResult::new("x")
            .with_raw_json(json!({"filename": "backend.pdf", "page_count": 3}));
        let resp = assemble(raw, Some(&upload_meta())).unwrap();
        let obj = resp.raw_json.as_object().unwrap();
        assert_eq!(obj["filename"], json!("backend.pdf"));
        assert_eq!(obj["content_type"], json!("application/pdf"));
        assert_eq!(obj["source_type"], json!("upload"));
        assert_eq!(obj["file_size_bytes"], json!(2048));
        assert_eq!(obj["page_count"], json!(3));
        assert!(obj["timestamp"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[test]
    fn enrichment_request_wins() {
        let assembler = Assembler::new(Normalizer::default(), MetadataPrecedence::RequestWins);
        let raw = RawOcrResult::new("x").with_raw_json(json!({"filename": "backend.pdf"}));
        let resp = assembler.assemble(raw, Some(&upload_meta())).unwrap();
        assert_eq!(resp.raw_json["filename"], json!("scan.pdf"));
    }

    #[test]
    fn enrichment_applies_to_fallback_map() {
        let resp = assemble(RawOcrResult::new("x"), Some(&upload_meta())).unwrap();
        assert_eq!(resp.raw_json["text"], json!("x"));
        assert_eq!(resp.raw_json["filename"], json!("scan.pdf"));
    }

    #[test]
    fn non_object_raw_json_is_kept_unenriched() {
        let raw = RawOcrResult::new("x").with_raw_json(json!(["page one", "page two"]));
        let resp = assemble(raw, Some(&upload_meta())).unwrap();
        assert_eq!(resp.raw_json, json!(["page one", "page two"]));
    }

    #[test]
    fn enrich_timestamp_is_rfc3339() {
        let mut map = Map::new();
        let at = DateTime::parse_from_rfc3339("2024-05-05T13:54:12Z")
            .unwrap()
            .with_timezone(&Utc);
        enrich_metadata(&mut map, &upload_meta(), MetadataPrecedence::BackendWins, at);
        assert_eq!(map["timestamp"], json!("2024-05-05T13:54:12+00:00"));
    }
}
