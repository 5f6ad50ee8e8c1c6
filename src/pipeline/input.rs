//! Input resolution: turn a user-supplied path or URL into bytes plus the
//! [`FileMetadata`] that travels with them.
//!
//! Both sources end in the same place, an in-memory buffer whose content type
//! has been settled. The OCR backends take the bytes directly; nothing is
//! written to disk.
//!
//! Content type is decided by magic bytes first, then the declared type
//! (upload header or HTTP `Content-Type`), then the file extension. Only PDF,
//! PNG and JPEG are accepted.

use crate::error::OcrError;
use crate::output::{FileMetadata, SourceType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONTENT_TYPE_PDF: &str = "application/pdf";
pub const CONTENT_TYPE_PNG: &str = "image/png";
pub const CONTENT_TYPE_JPEG: &str = "image/jpeg";
pub const CONTENT_TYPE_OCTET: &str = "application/octet-stream";

/// Bytes ready for the OCR engine, with their request metadata.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub bytes: Vec<u8>,
    pub metadata: FileMetadata,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local file or download a URL.
pub async fn load_input(input: &str, download_timeout_secs: u64) -> Result<LoadedInput, OcrError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(OcrError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, download_timeout_secs).await
    } else {
        load_local(input).await
    }
}

/// Wrap bytes that arrived some other way (an HTTP upload, a database blob).
pub fn from_bytes(
    bytes: Vec<u8>,
    filename: &str,
    declared_content_type: Option<&str>,
    source_type: SourceType,
) -> Result<LoadedInput, OcrError> {
    if bytes.is_empty() {
        return Err(OcrError::EmptyInput {
            name: filename.to_string(),
        });
    }

    let content_type = resolve_content_type(&bytes, declared_content_type, filename);
    if !is_supported(content_type) {
        return Err(OcrError::UnsupportedFormat {
            name: filename.to_string(),
            content_type: declared_content_type
                .unwrap_or(content_type)
                .to_string(),
        });
    }

    Ok(LoadedInput {
        metadata: FileMetadata {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            source_type,
            file_size_bytes: bytes.len() as u64,
        },
        bytes,
    })
}

async fn load_local(path_str: &str) -> Result<LoadedInput, OcrError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => OcrError::PermissionDenied { path: path.clone() },
        _ => OcrError::FileNotFound { path: path.clone() },
    })?;

    let filename = file_name_of(&path);
    debug!("Loaded local file: {} ({} bytes)", path.display(), bytes.len());
    from_bytes(bytes, &filename, None, SourceType::Upload)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedInput, OcrError> {
    info!("Downloading from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| OcrError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OcrError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(OcrError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let declared = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                OcrError::DownloadTimeout {
                    url: url.to_string(),
                    secs: timeout_secs,
                }
            } else {
                OcrError::DownloadFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?
        .to_vec();

    let filename = filename_from_url(url);
    info!("Downloaded {} ({} bytes)", filename, bytes.len());
    from_bytes(bytes, &filename, declared.as_deref(), SourceType::Url)
}

// ── Content type ─────────────────────────────────────────────────────────────

/// Identify PDF / PNG / JPEG from their leading bytes.
pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        Some(CONTENT_TYPE_PDF)
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(CONTENT_TYPE_PNG)
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(CONTENT_TYPE_JPEG)
    } else {
        None
    }
}

/// Content type implied by a file name's extension.
pub fn guess_content_type(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        CONTENT_TYPE_PDF
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        CONTENT_TYPE_JPEG
    } else if lower.ends_with(".png") {
        CONTENT_TYPE_PNG
    } else {
        CONTENT_TYPE_OCTET
    }
}

pub fn is_supported(content_type: &str) -> bool {
    matches!(
        content_type,
        CONTENT_TYPE_PDF | CONTENT_TYPE_PNG | CONTENT_TYPE_JPEG
    )
}

fn resolve_content_type<'a>(bytes: &[u8], declared: Option<&'a str>, filename: &str) -> &'a str {
    if let Some(sniffed) = sniff_content_type(bytes) {
        return sniffed;
    }
    let declared = declared
        .map(|d| d.split(';').next().unwrap_or(d).trim())
        .map(|d| match d {
            "image/jpg" => CONTENT_TYPE_JPEG,
            other => other,
        });
    match declared {
        Some(d) if is_supported(d) => d,
        _ => guess_content_type(filename),
    }
}

// ── Names ────────────────────────────────────────────────────────────────────

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed_file".to_string())
}

/// Last path segment of a URL, or `downloaded` when it has none.
pub fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded".to_string()
}

static RE_DOCUMENT_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)https?://\S+?\.(?:pdf|png|jpe?g)").unwrap());

/// Pull PDF and image links out of free text, first occurrence order, no duplicates.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for m in RE_DOCUMENT_URL.find_iter(text) {
        let url = m.as_str().to_string();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_sniff() {
        assert_eq!(sniff_content_type(b"%PDF-1.7\n"), Some(CONTENT_TYPE_PDF));
        assert_eq!(
            sniff_content_type(b"\x89PNG\r\n\x1a\n\0\0"),
            Some(CONTENT_TYPE_PNG)
        );
        assert_eq!(sniff_content_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(CONTENT_TYPE_JPEG));
        assert_eq!(sniff_content_type(b"GIF89a"), None);
    }

    #[test]
    fn test_guess_from_extension() {
        assert_eq!(guess_content_type("Scan.PDF"), CONTENT_TYPE_PDF);
        assert_eq!(guess_content_type("photo.jpeg"), CONTENT_TYPE_JPEG);
        assert_eq!(guess_content_type("photo.JPG"), CONTENT_TYPE_JPEG);
        assert_eq!(guess_content_type("img.png"), CONTENT_TYPE_PNG);
        assert_eq!(guess_content_type("notes.txt"), CONTENT_TYPE_OCTET);
    }

    #[test]
    fn test_from_bytes_magic_beats_extension() {
        let input = from_bytes(
            b"%PDF-1.4 body".to_vec(),
            "misnamed.png",
            None,
            SourceType::Upload,
        )
        .unwrap();
        assert_eq!(input.metadata.content_type, CONTENT_TYPE_PDF);
        assert_eq!(input.metadata.file_size_bytes, 13);
    }

    #[test]
    fn test_from_bytes_declared_with_params() {
        let input = from_bytes(
            b"opaque".to_vec(),
            "file",
            Some("image/jpg; charset=binary"),
            SourceType::Url,
        )
        .unwrap();
        assert_eq!(input.metadata.content_type, CONTENT_TYPE_JPEG);
        assert_eq!(input.metadata.source_type, SourceType::Url);
    }

    #[test]
    fn test_from_bytes_unsupported() {
        let err = from_bytes(b"hello".to_vec(), "notes.txt", None, SourceType::Upload).unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_from_bytes_empty() {
        let err = from_bytes(Vec::new(), "a.pdf", None, SourceType::Upload).unwrap_err();
        assert!(matches!(err, OcrError::EmptyInput { .. }));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(filename_from_url("https://x.org/docs/report.pdf?dl=1"), "report.pdf");
        assert_eq!(filename_from_url("https://x.org/"), "downloaded");
        assert_eq!(filename_from_url("not a url"), "downloaded");
    }

    #[test]
    fn test_extract_urls() {
        let text = "see https://a.org/x.pdf and http://b.org/y.JPG,\nplus https://a.org/x.pdf again \
                    and https://c.org/page.html";
        assert_eq!(
            extract_urls(text),
            vec!["https://a.org/x.pdf".to_string(), "http://b.org/y.JPG".to_string()]
        );
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = load_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, OcrError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_load_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nrest").unwrap();
        let input = load_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(input.metadata.filename, "page.png");
        assert_eq!(input.metadata.content_type, CONTENT_TYPE_PNG);
        assert_eq!(input.metadata.source_type, SourceType::Upload);
    }

    #[tokio::test]
    async fn test_blank_input_rejected() {
        let err = load_input("   ", 5).await.unwrap_err();
        assert!(matches!(err, OcrError::InvalidInput { .. }));
    }
}
