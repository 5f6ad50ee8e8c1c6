//! Configuration types for OCR processing.
//!
//! Everything the surrounding layers need (which backend to call, timeouts,
//! batch concurrency, output policies) lives in one [`OcrConfig`], built via
//! [`OcrConfigBuilder`] and passed explicitly to every entry point. The
//! normaliser and assembler themselves need no configuration; the knobs here
//! only choose *which* normaliser and merge policy the pipeline uses.

use crate::error::OcrError;
use crate::pipeline::normalize::Normalizer;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default OCR microservice endpoint.
pub const DEFAULT_SERVICE_URL: &str = "http://ocr-service:9000/ocr";

/// Default Mistral API base URL.
pub const DEFAULT_MISTRAL_BASE_URL: &str = "https://api.mistral.ai";

/// Default Mistral OCR model.
pub const DEFAULT_MISTRAL_MODEL: &str = "mistral-ocr-latest";

/// Configuration for OCR processing.
///
/// # Example
/// ```rust
/// use docscan_ocr::{OcrBackend, OcrConfig};
///
/// let config = OcrConfig::builder()
///     .backend(OcrBackend::service("http://localhost:9000/ocr"))
///     .concurrency(4)
///     .request_timeout_secs(90)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Which OCR engine to call. Default: the OCR microservice.
    pub backend: OcrBackend,

    /// API key forwarded to the backend. Mandatory for [`OcrBackend::Mistral`].
    pub api_key: Option<String>,

    /// Per-request timeout for the OCR call in seconds. Default: 60.
    ///
    /// Large multi-page PDFs routinely take 20-40 s on hosted OCR.
    pub request_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Number of inputs processed at once by `process_batch`. Default: 4.
    pub concurrency: usize,

    /// Page-marker policy when the backend returns several pages. Default: multi-page only.
    pub page_delimiter: PageDelimiter,

    /// Who wins when request metadata collides with backend metadata. Default: backend.
    pub metadata_precedence: MetadataPrecedence,

    /// Text normaliser applied when the backend sends no cleaned text.
    pub normalizer: Normalizer,

    /// Base directory for session artifacts. Default: `./data`.
    pub output_dir: PathBuf,

    /// Shape of the `<stem>.json` session artifact. Default: the full response.
    pub json_artifact: JsonArtifact,

    /// Receives per-input events from `process_batch`.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackend::default(),
            api_key: None,
            request_timeout_secs: 60,
            download_timeout_secs: 120,
            concurrency: 4,
            page_delimiter: PageDelimiter::default(),
            metadata_precedence: MetadataPrecedence::default(),
            normalizer: Normalizer::default(),
            output_dir: PathBuf::from("data"),
            json_artifact: JsonArtifact::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("backend", &self.backend)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("page_delimiter", &self.page_delimiter)
            .field("metadata_precedence", &self.metadata_precedence)
            .field("normalizer", &self.normalizer)
            .field("output_dir", &self.output_dir)
            .field("json_artifact", &self.json_artifact)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn backend(mut self, backend: OcrBackend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Inputs processed at once; 0 is raised to 1.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn page_delimiter(mut self, policy: PageDelimiter) -> Self {
        self.config.page_delimiter = policy;
        self
    }

    pub fn metadata_precedence(mut self, precedence: MetadataPrecedence) -> Self {
        self.config.metadata_precedence = precedence;
        self
    }

    pub fn normalizer(mut self, normalizer: Normalizer) -> Self {
        self.config.normalizer = normalizer;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn json_artifact(mut self, layout: JsonArtifact) -> Self {
        self.config.json_artifact = layout;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        if c.request_timeout_secs == 0 || c.download_timeout_secs == 0 {
            return Err(OcrError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        match &c.backend {
            OcrBackend::Service { url } => check_http_url("service URL", url)?,
            OcrBackend::Mistral { base_url, model } => {
                check_http_url("Mistral base URL", base_url)?;
                if model.trim().is_empty() {
                    return Err(OcrError::InvalidConfig("Mistral model must not be empty".into()));
                }
            }
        }
        Ok(self.config)
    }
}

fn check_http_url(what: &str, url: &str) -> Result<(), OcrError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(OcrError::InvalidConfig(format!(
            "{what} must be an http(s) URL, got '{url}'"
        )))
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The OCR engine a request is forwarded to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OcrBackend {
    /// An OCR microservice accepting a multipart `file` upload and answering
    /// with a `{text, clean?, markdown?, raw_json?}` object.
    Service { url: String },
    /// The hosted Mistral OCR API, called directly.
    Mistral { base_url: String, model: String },
}

impl Default for OcrBackend {
    fn default() -> Self {
        OcrBackend::service(DEFAULT_SERVICE_URL)
    }
}

impl OcrBackend {
    pub fn service(url: impl Into<String>) -> Self {
        OcrBackend::Service { url: url.into() }
    }

    /// Mistral OCR with the public endpoint and default model.
    pub fn mistral() -> Self {
        OcrBackend::Mistral {
            base_url: DEFAULT_MISTRAL_BASE_URL.to_string(),
            model: DEFAULT_MISTRAL_MODEL.to_string(),
        }
    }

    /// Short name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            OcrBackend::Service { .. } => "service",
            OcrBackend::Mistral { .. } => "mistral",
        }
    }
}

/// When to prefix pages with a `--- Page i/N ---` marker before joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageDelimiter {
    /// Never add markers; pages are joined with a blank line.
    Never,
    /// Add markers only when the result has more than one page. (default)
    #[default]
    MultiPageOnly,
    /// Always add markers, even for a single page.
    Always,
}

impl PageDelimiter {
    /// Whether a result with `page_count` pages gets markers.
    pub fn applies(&self, page_count: usize) -> bool {
        match self {
            PageDelimiter::Never => false,
            PageDelimiter::MultiPageOnly => page_count > 1,
            PageDelimiter::Always => page_count > 0,
        }
    }

    /// Render the marker line for the given page (1-indexed).
    pub fn render(page_num: usize, total: usize) -> String {
        format!("--- Page {page_num}/{total} ---")
    }
}

/// Conflict policy when request metadata is merged into backend `raw_json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MetadataPrecedence {
    /// Keys already sent by the backend are kept. (default)
    #[default]
    BackendWins,
    /// Request metadata overwrites backend keys of the same name.
    RequestWins,
}

/// Layout of the JSON session artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JsonArtifact {
    /// The whole [`crate::output::NormalizedResponse`]. (default)
    #[default]
    Full,
    /// `{"text": …}`
    Text,
    /// `{"result": …}`
    Result,
}
