//! OCR engine client: forward bytes to a backend and return its raw result.
//!
//! Two backends are supported:
//!
//! * **Service**: an OCR microservice taking a multipart upload (`file`, plus
//!   an optional `api_key` field) and answering with a
//!   `{text, clean?, markdown?, raw_json?}` object. The body is decoded as-is
//!   into a [`RawOcrResult`]; the assembler decides what to trust.
//! * **Mistral**: the hosted Mistral OCR API, called directly with the
//!   document inlined as a base64 data URI. Its per-page Markdown is joined
//!   here (see [`crate::pipeline::pages`]) and the request/response details
//!   become `raw_json`.
//!
//! ## Failure classification
//!
//! No retries happen here. Every failure is classified instead, so the caller
//! can decide: connection refused → [`OcrError::UpstreamUnavailable`],
//! time budget exceeded → [`OcrError::UpstreamTimeout`], 4xx →
//! [`OcrError::UpstreamRejected`] with the backend's own `detail`, other
//! non-2xx → [`OcrError::UpstreamError`], undecodable body →
//! [`OcrError::UpstreamMalformed`].

use crate::config::{OcrBackend, OcrConfig, PageDelimiter};
use crate::error::OcrError;
use crate::output::RawOcrResult;
use crate::pipeline::input::{LoadedInput, CONTENT_TYPE_PDF};
use crate::pipeline::pages::join_pages;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest upstream body excerpt carried into an error message.
const MAX_DETAIL_CHARS: usize = 500;

/// A configured connection to one OCR backend.
///
/// Holds one `reqwest::Client`; clone the engine or share it behind a
/// reference to reuse the connection pool across requests.
#[derive(Debug, Clone)]
pub struct OcrEngine {
    backend: OcrBackend,
    api_key: Option<String>,
    client: reqwest::Client,
    timeout_secs: u64,
    page_delimiter: PageDelimiter,
}

impl OcrEngine {
    pub fn new(config: &OcrConfig) -> Result<Self, OcrError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| OcrError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            backend: config.backend.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            client,
            timeout_secs: config.request_timeout_secs,
            page_delimiter: config.page_delimiter,
        })
    }

    pub fn backend(&self) -> &OcrBackend {
        &self.backend
    }

    /// Send one document to the backend.
    pub async fn recognize(&self, input: &LoadedInput) -> Result<RawOcrResult, OcrError> {
        let meta = &input.metadata;
        info!(
            "Processing file: {}, size: {} bytes, type: {}, backend: {}",
            meta.filename,
            meta.file_size_bytes,
            meta.content_type,
            self.backend.name()
        );

        match &self.backend {
            OcrBackend::Service { url } => self.recognize_service(url, input).await,
            OcrBackend::Mistral { base_url, model } => {
                self.recognize_mistral(base_url, model, input).await
            }
        }
    }

    /// Lightweight round trip telling whether `key` is accepted by the backend.
    ///
    /// Any failure, including an unreachable backend, counts as "not valid".
    pub async fn validate_api_key(&self, key: &str) -> bool {
        if key.trim().is_empty() {
            return false;
        }
        let outcome = match &self.backend {
            OcrBackend::Service { url } => self.validate_with_service(url, key).await,
            OcrBackend::Mistral { base_url, .. } => self.validate_with_mistral(base_url, key).await,
        };
        match outcome {
            Ok(valid) => {
                debug!("API key validation against {}: {}", self.backend.name(), valid);
                valid
            }
            Err(e) => {
                warn!("API key validation failed: {}", e);
                false
            }
        }
    }

    // ── Service backend ──────────────────────────────────────────────────────

    async fn recognize_service(
        &self,
        url: &str,
        input: &LoadedInput,
    ) -> Result<RawOcrResult, OcrError> {
        let meta = &input.metadata;
        let part = Part::bytes(input.bytes.clone())
            .file_name(meta.filename.clone())
            .mime_str(&meta.content_type)
            .map_err(|e| OcrError::Internal(format!("invalid content type: {e}")))?;

        let mut form = Form::new().part("file", part);
        if let Some(ref key) = self.api_key {
            form = form.text("api_key", key.clone());
        }

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.classify_send_error(url, e))?;

        let body = self.read_json(url, response).await?;
        RawOcrResult::from_value(body)
    }

    async fn validate_with_service(&self, url: &str, key: &str) -> Result<bool, OcrError> {
        let endpoint = format!("{}/validate", url.trim_end_matches('/'));
        let response = self
            .client
            .post(&endpoint)
            .json(&json!({ "api_key": key }))
            .send()
            .await
            .map_err(|e| self.classify_send_error(&endpoint, e))?;

        let body = self.read_json(&endpoint, response).await?;
        Ok(body.get("valid").and_then(Value::as_bool).unwrap_or(false))
    }

    // ── Mistral backend ──────────────────────────────────────────────────────

    async fn recognize_mistral(
        &self,
        base_url: &str,
        model: &str,
        input: &LoadedInput,
    ) -> Result<RawOcrResult, OcrError> {
        let key = self.api_key.as_deref().ok_or_else(|| OcrError::ApiKeyMissing {
            backend: self.backend.name().to_string(),
        })?;

        let start = Instant::now();
        let meta = &input.metadata;
        let endpoint = format!("{}/v1/ocr", base_url.trim_end_matches('/'));
        let body = mistral_request_body(model, &meta.content_type, &input.bytes);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_send_error(&endpoint, e))?;

        let value = self.read_json(&endpoint, response).await?;
        let mut parsed: MistralOcrResponse =
            serde_json::from_value(value).map_err(|e| OcrError::UpstreamMalformed {
                detail: format!("unexpected Mistral OCR response: {e}"),
            })?;
        parsed.pages.sort_by_key(|p| p.index);

        let results: Vec<String> = parsed.pages.into_iter().map(|p| p.markdown).collect();
        let text = join_pages(&results, self.page_delimiter);
        let elapsed = start.elapsed().as_secs_f64();
        debug!("Mistral OCR returned {} pages in {:.2}s", results.len(), elapsed);

        let raw_json = json!({
            "text": text,
            "page_count": results.len(),
            "results": results,
            "processing_time_seconds": (elapsed * 100.0).round() / 100.0,
            "filename": meta.filename,
            "file_size_bytes": meta.file_size_bytes,
            "timestamp": Utc::now().to_rfc3339(),
            "content_type": meta.content_type,
            "model": parsed.model.as_deref().unwrap_or(model),
        });

        Ok(RawOcrResult::new(text).with_raw_json(raw_json))
    }

    async fn validate_with_mistral(&self, base_url: &str, key: &str) -> Result<bool, OcrError> {
        let endpoint = format!("{}/v1/models", base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&endpoint)
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| self.classify_send_error(&endpoint, e))?;
        Ok(response.status().is_success())
    }

    // ── Shared helpers ───────────────────────────────────────────────────────

    fn classify_send_error(&self, endpoint: &str, e: reqwest::Error) -> OcrError {
        if e.is_timeout() {
            warn!("OCR service timeout: {}", e);
            OcrError::UpstreamTimeout {
                endpoint: endpoint.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            warn!("Cannot connect to OCR service: {}", e);
            OcrError::UpstreamUnavailable {
                endpoint: endpoint.to_string(),
                detail: e.to_string(),
            }
        }
    }

    /// Check the status and decode the body as JSON.
    async fn read_json(&self, endpoint: &str, response: reqwest::Response) -> Result<Value, OcrError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                OcrError::UpstreamTimeout {
                    endpoint: endpoint.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                OcrError::UpstreamMalformed {
                    detail: format!("failed to read response body: {e}"),
                }
            }
        })?;

        if status.is_client_error() {
            let detail = error_detail(&bytes);
            warn!("OCR service rejected request (HTTP {}): {}", status.as_u16(), detail);
            return Err(OcrError::UpstreamRejected {
                status: status.as_u16(),
                detail,
            });
        }
        if !status.is_success() {
            let detail = error_detail(&bytes);
            warn!("OCR service HTTP error {}: {}", status.as_u16(), detail);
            return Err(OcrError::UpstreamError {
                status: status.as_u16(),
                detail,
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            warn!("OCR service returned invalid JSON: {}", e);
            OcrError::UpstreamMalformed {
                detail: e.to_string(),
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct MistralOcrResponse {
    pages: Vec<MistralPage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MistralPage {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    markdown: String,
}

fn mistral_request_body(model: &str, content_type: &str, bytes: &[u8]) -> Value {
    let data_uri = format!("data:{};base64,{}", content_type, STANDARD.encode(bytes));
    let doc_type = if content_type == CONTENT_TYPE_PDF {
        "document_url"
    } else {
        "image_url"
    };

    let mut document = Map::new();
    document.insert("type".into(), Value::from(doc_type));
    document.insert(doc_type.into(), Value::from(data_uri));

    json!({
        "model": model,
        "document": document,
        "include_image_base64": false,
    })
}

/// Best human-readable message from an error body: `detail`, then `message`,
/// then the raw text.
fn error_detail(body: &[u8]) -> String {
    if let Ok(Value::Object(obj)) = serde_json::from_slice::<Value>(body) {
        for key in ["detail", "message", "error"] {
            match obj.get(key) {
                Some(Value::String(s)) => return s.clone(),
                Some(other) if !other.is_null() => return other.to_string(),
                _ => {}
            }
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        "no detail provided".to_string()
    } else {
        text.chars().take(MAX_DETAIL_CHARS).collect()
    }
}
