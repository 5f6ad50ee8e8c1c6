//! Error types for the docscan-ocr library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`OcrError`]: **Fatal**: the request cannot produce a response at all
//!   (unreadable input, OCR engine down, malformed upstream payload).
//!   Returned as `Err(OcrError)` from the top-level `process*` functions.
//!
//! * [`ItemError`]: **Non-fatal**: one input of a batch failed while the
//!   others succeeded. Stored inside [`crate::output::BatchItem`] so callers
//!   can inspect partial success.
//!
//! Upstream failures are classified so that an HTTP layer can map them to
//! status codes with [`OcrError::http_status`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docscan-ocr library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The input is neither a PDF nor a supported image.
    #[error("Unsupported file '{name}' ({content_type}): expected PDF, PNG or JPEG")]
    UnsupportedFormat { name: String, content_type: String },

    /// The input contained zero bytes.
    #[error("Input '{name}' is empty")]
    EmptyInput { name: String },

    // ── Upstream (OCR engine) errors ─────────────────────────────────────
    /// The OCR engine refused the connection.
    #[error("OCR service unavailable at '{endpoint}': {detail}\nPlease try again later.")]
    UpstreamUnavailable { endpoint: String, detail: String },

    /// The OCR engine did not answer within the time budget.
    #[error("OCR service at '{endpoint}' timed out after {secs}s")]
    UpstreamTimeout { endpoint: String, secs: u64 },

    /// The OCR engine rejected the request (4xx); `detail` is the engine's own message.
    #[error("OCR service rejected the request (HTTP {status}): {detail}")]
    UpstreamRejected { status: u16, detail: String },

    /// The OCR engine failed while processing the request (5xx or other non-success).
    #[error("OCR service error (HTTP {status}): {detail}")]
    UpstreamError { status: u16, detail: String },

    /// The OCR engine answered with a body that is not a valid OCR result.
    #[error("OCR service returned invalid data: {detail}")]
    UpstreamMalformed { detail: String },

    /// The selected backend needs an API key and none was configured.
    #[error("Backend '{backend}' requires an API key.\nSet MISTRAL_API_KEY or pass --api-key.")]
    ApiKeyMissing { backend: String },

    // ── Contract errors ───────────────────────────────────────────────────
    /// A raw OCR result lacked a field every collaborator must provide.
    #[error("OCR result is missing required field '{field}'")]
    MissingRequiredField { field: &'static str },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a session artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Batch errors ──────────────────────────────────────────────────────
    /// Every input of a batch failed.
    #[error("All {total} inputs failed.\nFirst error: {first_error}")]
    AllInputsFailed { total: usize, first_error: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// HTTP status an API layer should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            OcrError::FileNotFound { .. } => 404,
            OcrError::PermissionDenied { .. } => 403,
            OcrError::InvalidInput { .. }
            | OcrError::UnsupportedFormat { .. }
            | OcrError::EmptyInput { .. }
            | OcrError::DownloadFailed { .. }
            | OcrError::InvalidConfig(_) => 400,
            OcrError::DownloadTimeout { .. } => 408,
            OcrError::ApiKeyMissing { .. } => 401,
            OcrError::UpstreamUnavailable { .. } => 503,
            OcrError::UpstreamTimeout { .. } => 504,
            OcrError::UpstreamRejected { status, .. } => *status,
            OcrError::UpstreamError { .. } | OcrError::UpstreamMalformed { .. } => 502,
            OcrError::AllInputsFailed { .. } => 502,
            OcrError::MissingRequiredField { .. }
            | OcrError::OutputWriteFailed { .. }
            | OcrError::Internal(_) => 500,
        }
    }

    /// Whether re-sending the same request later may succeed.
    ///
    /// Only connection failures and timeouts qualify; rejected or malformed
    /// exchanges fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OcrError::UpstreamUnavailable { .. } | OcrError::UpstreamTimeout { .. }
        )
    }
}

/// A non-fatal error for a single input of a batch.
///
/// The batch continues unless every input fails.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("Input {index} ('{input}'): {detail}")]
pub struct ItemError {
    /// 0-indexed position of the input in the batch.
    pub index: usize,
    /// The path or URL as given by the caller.
    pub input: String,
    /// HTTP status an API layer would report for this failure.
    pub status: u16,
    /// Whether retrying this input later may succeed.
    pub retryable: bool,
    /// Human-readable reason.
    pub detail: String,
}

impl ItemError {
    pub fn from_error(index: usize, input: impl Into<String>, err: &OcrError) -> Self {
        Self {
            index,
            input: input.into(),
            status: err.http_status(),
            retryable: err.is_retryable(),
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_mapping() {
        let unavailable = OcrError::UpstreamUnavailable {
            endpoint: "http://ocr:9000/ocr".into(),
            detail: "connection refused".into(),
        };
        assert_eq!(unavailable.http_status(), 503);
        assert!(unavailable.is_retryable());

        let timeout = OcrError::UpstreamTimeout {
            endpoint: "http://ocr:9000/ocr".into(),
            secs: 60,
        };
        assert_eq!(timeout.http_status(), 504);
        assert!(timeout.is_retryable());

        let malformed = OcrError::UpstreamMalformed {
            detail: "expected value at line 1".into(),
        };
        assert_eq!(malformed.http_status(), 502);
        assert!(!malformed.is_retryable());
    }

    #[test]
    fn rejected_forwards_backend_status() {
        let e = OcrError::UpstreamRejected {
            status: 415,
            detail: "unsupported media".into(),
        };
        assert_eq!(e.http_status(), 415);
        assert!(!e.is_retryable());
        assert!(e.to_string().contains("unsupported media"));
    }

    #[test]
    fn missing_field_display() {
        let e = OcrError::MissingRequiredField { field: "text" };
        assert!(e.to_string().contains("'text'"), "got: {e}");
        assert_eq!(e.http_status(), 500);
    }

    #[test]
    fn item_error_captures_classification() {
        let e = OcrError::UpstreamTimeout {
            endpoint: "http://ocr".into(),
            secs: 5,
        };
        let item = ItemError::from_error(2, "scan.png", &e);
        assert_eq!(item.index, 2);
        assert_eq!(item.status, 504);
        assert!(item.retryable);
        assert!(item.to_string().contains("scan.png"));
    }

    #[test]
    fn all_inputs_failed_display() {
        let e = OcrError::AllInputsFailed {
            total: 3,
            first_error: "boom".into(),
        };
        assert!(e.to_string().contains("All 3 inputs"));
    }
}
