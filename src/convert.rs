//! Entry points: one document, raw bytes, or a concurrent batch.
//!
//! Every path runs the same stages: resolve the input, send it to the OCR
//! engine, assemble the response. A batch never aborts on one bad input; the
//! failure is recorded as an [`ItemError`] and the rest carry on.

use crate::config::OcrConfig;
use crate::error::{ItemError, OcrError};
use crate::output::{
    BatchItem, BatchOutput, BatchStats, ProcessedDocument, SessionOutput, SourceType,
};
use crate::pipeline::assemble::Assembler;
use crate::pipeline::engine::OcrEngine;
use crate::pipeline::input::{self, LoadedInput};
use crate::session;
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::{debug, info, warn};

/// OCR one local file or URL.
///
/// # Errors
/// Input errors (missing file, unsupported type, failed download), any
/// classified upstream failure, or [`OcrError::MissingRequiredField`] when the
/// backend answered without `text`.
pub async fn process(
    input_str: impl AsRef<str>,
    config: &OcrConfig,
) -> Result<ProcessedDocument, OcrError> {
    let engine = OcrEngine::new(config)?;
    let assembler = Assembler::from_config(config);
    process_one(&engine, &assembler, input_str.as_ref(), config).await
}

/// OCR bytes that are already in memory, such as an HTTP upload.
///
/// `content_type` is the declared type, if any; magic bytes take precedence.
///
/// # Example
/// ```rust,no_run
/// use docscan_ocr::{process_bytes, OcrConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("scan.png")?;
/// let doc = process_bytes(bytes, "scan.png", Some("image/png"), &OcrConfig::default()).await?;
/// println!("{}", doc.response.text);
/// # Ok(())
/// # }
/// ```
pub async fn process_bytes(
    bytes: Vec<u8>,
    filename: &str,
    content_type: Option<&str>,
    config: &OcrConfig,
) -> Result<ProcessedDocument, OcrError> {
    let start = Instant::now();
    let loaded = input::from_bytes(bytes, filename, content_type, SourceType::Upload)?;
    let engine = OcrEngine::new(config)?;
    let assembler = Assembler::from_config(config);
    recognize_loaded(&engine, &assembler, filename, loaded, start).await
}

/// OCR several inputs concurrently (`config.concurrency` at a time).
///
/// Items come back in input order whatever order they finished in.
///
/// # Errors
/// [`OcrError::InvalidInput`] for an empty list and
/// [`OcrError::AllInputsFailed`] when not a single input succeeded.
pub async fn process_batch<S: AsRef<str>>(
    inputs: &[S],
    config: &OcrConfig,
) -> Result<BatchOutput, OcrError> {
    if inputs.is_empty() {
        return Err(OcrError::InvalidInput {
            input: "no inputs given".to_string(),
        });
    }

    let batch_start = Instant::now();
    let total = inputs.len();
    let engine = OcrEngine::new(config)?;
    let assembler = Assembler::from_config(config);
    info!(
        "Starting batch: {} inputs, backend {}, concurrency {}",
        total,
        engine.backend().name(),
        config.concurrency
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let engine = &engine;
    let assembler = &assembler;
    let jobs = inputs.iter().enumerate().map(move |(index, input)| {
        let input = input.as_ref().trim().to_string();
        async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_item_start(index, total, &input);
            }
            match process_one(engine, assembler, &input, config).await {
                Ok(doc) => {
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_item_complete(index, total, doc.response.text.len());
                    }
                    BatchItem {
                        index,
                        input,
                        document: Some(doc),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("Input {} ({}) failed: {}", index + 1, input, e);
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_item_error(index, total, &e.to_string());
                    }
                    BatchItem {
                        index,
                        error: Some(ItemError::from_error(index, &input, &e)),
                        input,
                        document: None,
                    }
                }
            }
        }
    });

    let mut items: Vec<BatchItem> = stream::iter(jobs)
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    items.sort_by_key(|item| item.index);

    let succeeded = items.iter().filter(|i| i.document.is_some()).count();
    let stats = BatchStats {
        total,
        succeeded,
        failed: total - succeeded,
        duration_ms: batch_start.elapsed().as_millis() as u64,
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, succeeded);
    }

    if succeeded == 0 {
        let first_error = items
            .iter()
            .find_map(|i| i.error.as_ref())
            .map(|e| e.detail.clone())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(OcrError::AllInputsFailed { total, first_error });
    }

    info!(
        "Batch complete: {}/{} succeeded, {}ms total",
        succeeded, total, stats.duration_ms
    );

    Ok(BatchOutput { items, stats })
}

/// Run a batch and persist every successful document into a new session
/// directory under `config.output_dir`.
///
/// The directory is only created once at least one input succeeded.
pub async fn process_to_session<S: AsRef<str>>(
    inputs: &[S],
    config: &OcrConfig,
) -> Result<SessionOutput, OcrError> {
    let batch = process_batch(inputs, config).await?;
    let mut session = session::new_session_dir(&config.output_dir).await?;

    let mut artifacts = Vec::with_capacity(batch.stats.succeeded);
    for item in &batch.items {
        let Some(ref doc) = item.document else {
            continue;
        };
        let saved = session::write_artifacts(
            &mut session,
            &doc.metadata.filename,
            &doc.response,
            config.json_artifact,
        )
        .await?;
        artifacts.push(saved);
    }

    info!(
        "Saved {} documents to {}",
        artifacts.len(),
        session.dir.display()
    );

    Ok(SessionOutput {
        dir: session.dir,
        batch,
        artifacts,
    })
}

/// Synchronous wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(
    input_str: impl AsRef<str>,
    config: &OcrConfig,
) -> Result<ProcessedDocument, OcrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process(input_str, config))
}

/// Ask the configured backend whether `key` is accepted.
///
/// Only a broken configuration is an error; an unreachable backend or a
/// refused key are both `Ok(false)`.
pub async fn validate_api_key(config: &OcrConfig, key: &str) -> Result<bool, OcrError> {
    let engine = OcrEngine::new(config)?;
    Ok(engine.validate_api_key(key).await)
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn process_one(
    engine: &OcrEngine,
    assembler: &Assembler,
    input_str: &str,
    config: &OcrConfig,
) -> Result<ProcessedDocument, OcrError> {
    let start = Instant::now();
    let loaded = input::load_input(input_str, config.download_timeout_secs).await?;
    recognize_loaded(engine, assembler, input_str, loaded, start).await
}

async fn recognize_loaded(
    engine: &OcrEngine,
    assembler: &Assembler,
    input_str: &str,
    loaded: LoadedInput,
    start: Instant,
) -> Result<ProcessedDocument, OcrError> {
    let raw = engine.recognize(&loaded).await?;
    let response = assembler.assemble(raw, Some(&loaded.metadata))?;
    let duration_ms = start.elapsed().as_millis() as u64;
    debug!(
        "Processed {} in {}ms ({} chars)",
        input_str,
        duration_ms,
        response.text.chars().count()
    );

    Ok(ProcessedDocument {
        input: input_str.to_string(),
        metadata: loaded.metadata,
        response,
        duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        errors: AtomicUsize,
        done: AtomicUsize,
    }

    impl crate::progress::BatchProgressCallback for Counting {
        fn on_item_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, _succeeded: usize) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn empty_batch_is_invalid() {
        let err = process_batch::<&str>(&[], &OcrConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn all_failed_batch_reports_first_error() {
        let cb = Arc::new(Counting {
            errors: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
        });
        let config = OcrConfig::builder()
            .progress_callback(cb.clone())
            .build()
            .unwrap();
        let err = process_batch(&["/nope/a.pdf", "/nope/b.pdf"], &config)
            .await
            .unwrap_err();
        match err {
            OcrError::AllInputsFailed { total, first_error } => {
                assert_eq!(total, 2);
                assert!(first_error.contains("/nope/a.pdf"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(cb.errors.load(Ordering::SeqCst), 2);
        assert_eq!(cb.done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsupported_bytes_fail_before_any_request() {
        let err = process_bytes(b"plain".to_vec(), "notes.txt", None, &OcrConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedFormat { .. }));
    }
}
