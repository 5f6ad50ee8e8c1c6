//! Session storage for processed documents.
//!
//! A session is one directory under the configured output root, named
//! `<YYYYMMDDTHHMMSSZ>_<6 hex>`. Each processed document writes three
//! artifacts into it: `<stem>.txt` (cleaned text), `<stem>.md` (Markdown) and
//! `<stem>.json` (layout per [`JsonArtifact`]). Every file is written to a
//! `.tmp` sibling first and renamed into place, so a reader never sees a
//! partial artifact.

use crate::config::JsonArtifact;
use crate::error::OcrError;
use crate::output::{NormalizedResponse, SessionArtifacts};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Characters of cleaned text kept in [`SessionArtifacts::preview`].
pub const PREVIEW_CHARS: usize = 500;

/// A session directory that has been created on disk.
#[derive(Debug, Clone)]
pub struct Session {
    pub name: String,
    pub dir: PathBuf,
    /// Lower-cased stems already written, so case-insensitive filesystems
    /// cannot merge two documents either.
    stems: HashSet<String>,
}

impl Session {
    /// Reserve an artifact stem for `filename` that no earlier document in
    /// this session used. A clash gets `_2`, `_3`, … appended.
    pub fn claim_stem(&mut self, filename: &str) -> String {
        let base = artifact_stem(filename);
        let mut stem = base.clone();
        let mut n = 2;
        while !self.stems.insert(stem.to_lowercase()) {
            stem = format!("{base}_{n}");
            n += 1;
        }
        stem
    }
}

/// Session directory name for the current instant.
pub fn session_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().format("%Y%m%dT%H%M%SZ"), &id[..6])
}

/// Create a fresh session directory under `base`.
pub async fn new_session_dir(base: &Path) -> Result<Session, OcrError> {
    let name = session_name();
    let dir = base.join(&name);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| OcrError::OutputWriteFailed {
            path: dir.clone(),
            source: e,
        })?;
    info!("Created session directory: {}", dir.display());
    Ok(Session {
        name,
        dir,
        stems: HashSet::new(),
    })
}

/// Write the txt / md / json artifacts for one response.
///
/// `filename` is the input's file name; its sanitised stem names the files,
/// made unique within the session by [`Session::claim_stem`].
pub async fn write_artifacts(
    session: &mut Session,
    filename: &str,
    response: &NormalizedResponse,
    layout: JsonArtifact,
) -> Result<SessionArtifacts, OcrError> {
    let stem = session.claim_stem(filename);
    let txt = session.dir.join(format!("{stem}.txt"));
    let md = session.dir.join(format!("{stem}.md"));
    let json = session.dir.join(format!("{stem}.json"));

    let json_body = serde_json::to_vec_pretty(&json_artifact(response, layout))
        .map_err(|e| OcrError::Internal(format!("serialising JSON artifact: {e}")))?;

    write_atomic(&txt, response.text.as_bytes()).await?;
    write_atomic(&md, response.markdown.as_bytes()).await?;
    write_atomic(&json, &json_body).await?;
    debug!("Saved artifacts for {} in {}", stem, session.dir.display());

    Ok(SessionArtifacts {
        session: session.name.clone(),
        dir: session.dir.clone(),
        txt,
        md,
        json,
        preview: preview(&response.text),
    })
}

/// JSON document stored in the `.json` artifact.
pub fn json_artifact(response: &NormalizedResponse, layout: JsonArtifact) -> Value {
    match layout {
        JsonArtifact::Full => json!({
            "text": response.text,
            "markdown": response.markdown,
            "raw_json": response.raw_json,
        }),
        JsonArtifact::Text => json!({ "text": response.text }),
        JsonArtifact::Result => json!({ "result": response.raw_json }),
    }
}

/// First [`PREVIEW_CHARS`] characters of `text`.
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// File stem safe to use inside the session directory.
fn artifact_stem(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches(|c| c == '.' || c == '_').is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), OcrError> {
    let tmp_path = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| OcrError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| OcrError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> NormalizedResponse {
        NormalizedResponse {
            text: "Điều 1. Phạm vi".into(),
            markdown: "```txt\nĐiều 1. Phạm vi\n```".into(),
            raw_json: json!({"page_count": 1}),
        }
    }

    #[test]
    fn session_name_shape() {
        let name = session_name();
        let (stamp, id) = name.split_once('_').unwrap();
        assert_eq!(stamp.len(), 16);
        assert!(stamp.ends_with('Z'));
        assert_eq!(id.len(), 6);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn stems_are_sanitised() {
        assert_eq!(artifact_stem("report.pdf"), "report");
        assert_eq!(artifact_stem("my scan (1).png"), "my_scan__1_");
        assert_eq!(artifact_stem(""), "document");
        assert_eq!(artifact_stem("..."), "document");
    }

    #[test]
    fn clashing_stems_get_numbered() {
        let mut session = Session {
            name: "s".into(),
            dir: PathBuf::from("s"),
            stems: HashSet::new(),
        };
        assert_eq!(session.claim_stem("a b.pdf"), "a_b");
        assert_eq!(session.claim_stem("a_b.pdf"), "a_b_2");
        assert_eq!(session.claim_stem("a_b_2.png"), "a_b_2_2");
        assert_eq!(session.claim_stem("A_B.jpg"), "A_B_3");
        assert_eq!(session.claim_stem("other.pdf"), "other");
    }

    #[tokio::test]
    async fn second_document_with_same_stem_does_not_overwrite() {
        let base = tempfile::tempdir().unwrap();
        let mut session = new_session_dir(base.path()).await.unwrap();
        let first = write_artifacts(&mut session, "a b.pdf", &response(), JsonArtifact::Text)
            .await
            .unwrap();
        let mut other = response();
        other.text = "second".into();
        let second = write_artifacts(&mut session, "a_b.pdf", &other, JsonArtifact::Text)
            .await
            .unwrap();

        assert_ne!(first.txt, second.txt);
        assert_eq!(std::fs::read_to_string(&first.txt).unwrap(), "Điều 1. Phạm vi");
        assert_eq!(std::fs::read_to_string(&second.txt).unwrap(), "second");
        assert_eq!(std::fs::read_dir(&session.dir).unwrap().count(), 6);
    }

    #[test]
    fn json_layouts() {
        let r = response();
        assert_eq!(json_artifact(&r, JsonArtifact::Text), json!({"text": r.text}));
        assert_eq!(
            json_artifact(&r, JsonArtifact::Result),
            json!({"result": {"page_count": 1}})
        );
        let full = json_artifact(&r, JsonArtifact::Full);
        assert_eq!(full["markdown"], json!(r.markdown));
    }

    #[test]
    fn preview_counts_chars_not_bytes() {
        let text = "ệ".repeat(600);
        let p = preview(&text);
        assert_eq!(p.chars().count(), PREVIEW_CHARS);
    }

    #[tokio::test]
    async fn writes_all_three_artifacts() {
        let base = tempfile::tempdir().unwrap();
        let mut session = new_session_dir(base.path()).await.unwrap();
        let artifacts = write_artifacts(&mut session, "scan.pdf", &response(), JsonArtifact::Text)
            .await
            .unwrap();

        assert_eq!(artifacts.txt, session.dir.join("scan.txt"));
        assert_eq!(std::fs::read_to_string(&artifacts.txt).unwrap(), "Điều 1. Phạm vi");
        assert!(std::fs::read_to_string(&artifacts.md).unwrap().starts_with("```txt"));
        let saved: Value =
            serde_json::from_str(&std::fs::read_to_string(&artifacts.json).unwrap()).unwrap();
        assert_eq!(saved, json!({"text": "Điều 1. Phạm vi"}));
        assert_eq!(artifacts.preview, "Điều 1. Phạm vi");

        let leftovers: Vec<_> = std::fs::read_dir(&session.dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
