//! Pipeline stages for document OCR.
//!
//! Each submodule implements exactly one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ engine ──▶ assemble ──▶ NormalizedResponse
//! (path/URL) (HTTP)    │
//!            │         └─▶ normalize (only when the backend sent no `clean`)
//!            └─▶ pages (Mistral backend: join per-page Markdown)
//! ```
//!
//! 1. [`input`]: load a local file or download a URL, settle the content type
//! 2. [`engine`]: forward the bytes to the OCR backend; the only stage with
//!    network I/O. Failures are classified, never retried
//! 3. [`pages`]: join per-page text with `--- Page i/N ---` markers
//! 4. [`normalize`]: deterministic text cleanup (Unicode, whitespace,
//!    correction table, structural hints)
//! 5. [`assemble`]: resolve the backend's optional fields into the response
//!    contract and merge request metadata

pub mod assemble;
pub mod engine;
pub mod input;
pub mod normalize;
pub mod pages;
