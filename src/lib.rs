//! # docscan-ocr
//!
//! Send PDFs and scanned images to an OCR engine and get back cleaned text,
//! Markdown and metadata in one predictable shape.
//!
//! OCR engines disagree about what they return. One sends cleaned text and
//! Markdown, another only raw text, a third adds a metadata blob of its own.
//! This crate hides that: whatever the backend sends, the caller receives a
//! [`NormalizedResponse`] whose `text`, `markdown` and `raw_json` are always
//! populated.
//!
//! ## Pipeline Overview
//!
//! ```text
//! path / URL / bytes
//!  │
//!  ├─ 1. Input      read the file or download the URL, sniff the type
//!  ├─ 2. Engine     OCR microservice (multipart) or Mistral OCR API
//!  ├─ 3. Normalize  NFKC, whitespace, correction table, structure hints
//!  ├─ 4. Assemble   clean → text, markdown → fenced text, raw_json → result
//!  └─ 5. Session    optional txt / md / json artifacts on disk
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docscan_ocr::{process, OcrConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Talks to http://ocr-service:9000/ocr unless configured otherwise
//!     let config = OcrConfig::default();
//!     let doc = process("scan.pdf", &config).await?;
//!     println!("{}", doc.response.text);
//!     Ok(())
//! }
//! ```
//!
//! The normaliser is usable on its own:
//!
//! ```rust
//! let cleaned = docscan_ocr::normalize("Giá   12 . 5   triệu");
//! assert_eq!(cleaned, "Giá 12.5 triệu");
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docscan` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docscan-ocr = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    JsonArtifact, MetadataPrecedence, OcrBackend, OcrConfig, OcrConfigBuilder, PageDelimiter,
};
pub use convert::{
    process, process_batch, process_bytes, process_sync, process_to_session, validate_api_key,
};
pub use error::{ItemError, OcrError};
pub use output::{
    BatchItem, BatchOutput, BatchStats, FileMetadata, NormalizedResponse, ProcessedDocument,
    RawOcrResult, SessionArtifacts, SessionOutput, SourceType,
};
pub use pipeline::assemble::{assemble, Assembler};
pub use pipeline::engine::OcrEngine;
pub use pipeline::normalize::{normalize, CorrectionRule, NormalizeStep, Normalizer};
pub use pipeline::pages::join_pages;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
