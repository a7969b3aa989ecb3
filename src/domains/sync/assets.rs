//! Embedded image extraction and sync. Note bodies reference images by
//! stable relative paths under `images/`; this module finds those
//! references and makes sure both sides of a sync have the bytes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::domains::storage::{Note, NoteKind};
use crate::errors::{DomainError, DomainResult, TransportError};
use crate::transport::WebDavClient;

const ASSET_RETRY_ATTEMPTS: u32 = 3;

static MD_APP_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"!\[[^\]]*\]\(app://images/([^)]+)\)"#).expect("valid regex"));
static MD_REL_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"!\[[^\]]*\]\(images/([^)]+)\)"#).expect("valid regex"));
static MD_SRC_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"src="images/([^"]+)""#).expect("valid regex"));

/// Extracts the `images/...` paths a note body refers to, per its kind.
pub fn extract_asset_paths(note: &Note) -> Vec<String> {
    match note.kind {
        NoteKind::Markdown => extract_markdown_asset_paths(&note.body),
        NoteKind::Whiteboard => extract_whiteboard_asset_paths(&note.body),
    }
}

fn extract_markdown_asset_paths(body: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for re in [&*MD_APP_IMAGE, &*MD_REL_IMAGE, &*MD_SRC_IMAGE] {
        for caps in re.captures_iter(body) {
            paths.push(format!("images/{}", &caps[1]));
        }
    }
    paths.sort();
    paths.dedup();
    paths
}

fn extract_whiteboard_asset_paths(body: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };
    let Some(file_map) = value.get("fileMap").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut paths = Vec::new();
    for entry in file_map.values() {
        let file_name = match entry {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj.get("fileName").and_then(Value::as_str).map(str::to_string),
            _ => None,
        };
        if let Some(name) = file_name {
            paths.push(format!("images/whiteboard/{}", name));
        }
    }
    paths.sort();
    paths.dedup();
    paths
}

/// Local-side access to asset bytes, mirroring the remote `images/`
/// layout under a base directory. Kept as a small capability trait so
/// the sync core does not need to know how the shell lays out its data
/// directory.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn exists(&self, relative_path: &str) -> DomainResult<bool>;
    async fn read(&self, relative_path: &str) -> DomainResult<Vec<u8>>;
    async fn write(&self, relative_path: &str, bytes: &[u8]) -> DomainResult<()>;
}

pub struct FsAssetStore {
    base_dir: PathBuf,
}

impl FsAssetStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn full_path(&self, relative_path: &str) -> PathBuf {
        self.base_dir.join(relative_path)
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn exists(&self, relative_path: &str) -> DomainResult<bool> {
        Ok(tokio::fs::metadata(self.full_path(relative_path)).await.is_ok())
    }

    async fn read(&self, relative_path: &str) -> DomainResult<Vec<u8>> {
        tokio::fs::read(self.full_path(relative_path)).await.map_err(|e| DomainError::Io(e.to_string()))
    }

    async fn write(&self, relative_path: &str, bytes: &[u8]) -> DomainResult<()> {
        let path = self.full_path(relative_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| DomainError::Io(e.to_string()))?;
        }
        tokio::fs::write(path, bytes).await.map_err(|e| DomainError::Io(e.to_string()))
    }
}

/// Uploads every asset a note references that is not already present on
/// the remote. Returns the subset of referenced paths that could not be
/// uploaded after retry; callers surface these as `imageUploadFailed`
/// without failing the note's own sync.
pub async fn upload_missing_assets(note: &Note, client: &WebDavClient, root_path: &str, store: &dyn AssetStore) -> Vec<String> {
    let mut failed = Vec::new();

    for relative in extract_asset_paths(note) {
        if let Some(parent) = Path::new(&relative).parent() {
            let remote_dir = format!("{}{}", root_path, parent.display());
            let _ = client.create_directory(&remote_dir).await;
        }

        let remote_path = format!("{}{}", root_path, relative);
        match client.exists(&remote_path).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(_) => {
                failed.push(relative);
                continue;
            }
        }

        let Ok(true) = store.exists(&relative).await else {
            continue;
        };
        let Ok(bytes) = store.read(&relative).await else {
            failed.push(relative);
            continue;
        };

        if upload_with_retry(client, &remote_path, &bytes).await.is_err() {
            failed.push(relative);
        }
    }

    failed
}

/// Downloads every asset a note references that is not already present
/// locally. Returns the paths that could not be downloaded.
pub async fn download_missing_assets(note: &Note, client: &WebDavClient, root_path: &str, store: &dyn AssetStore) -> Vec<String> {
    let mut failed = Vec::new();

    for relative in extract_asset_paths(note) {
        if matches!(store.exists(&relative).await, Ok(true)) {
            continue;
        }

        let remote_path = format!("{}{}", root_path, relative);
        match download_with_retry(client, &remote_path).await {
            Ok(bytes) => {
                if store.write(&relative, &bytes).await.is_err() {
                    failed.push(relative);
                }
            }
            Err(_) => failed.push(relative),
        }
    }

    failed
}

async fn upload_with_retry(client: &WebDavClient, remote_path: &str, bytes: &[u8]) -> Result<(), TransportError> {
    let mut last_err = None;
    for attempt in 1..=ASSET_RETRY_ATTEMPTS {
        match client.upload_binary(remote_path, bytes).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                log::warn!("asset upload attempt {} failed for {}: {}", attempt, remote_path, e);
                last_err = Some(e);
                if attempt < ASSET_RETRY_ATTEMPTS {
                    tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                }
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

async fn download_with_retry(client: &WebDavClient, remote_path: &str) -> Result<Vec<u8>, TransportError> {
    let mut last_err = None;
    for attempt in 1..=ASSET_RETRY_ATTEMPTS {
        match client.download_binary(remote_path).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => {
                log::warn!("asset download attempt {} failed for {}: {}", attempt, remote_path, e);
                last_err = Some(e);
                if attempt < ASSET_RETRY_ATTEMPTS {
                    tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                }
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn note_with_body(kind: NoteKind, body: &str) -> Note {
        Note {
            sync_id: Uuid::new_v4(),
            title: String::new(),
            body: body.to_string(),
            kind,
            tags: String::new(),
            category: String::new(),
            pinned: false,
            favorite: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            is_deleted: false,
            deleted_at: None,
        }
    }

    #[test]
    fn extracts_app_scheme_and_relative_markdown_images() {
        let body = "![a](app://images/foo.png) and ![b](images/bar.png) and <img src=\"images/baz.png\">";
        let note = note_with_body(NoteKind::Markdown, body);
        let paths = extract_asset_paths(&note);
        assert_eq!(paths, vec!["images/bar.png".to_string(), "images/baz.png".to_string(), "images/foo.png".to_string()]);
    }

    #[test]
    fn extracts_whiteboard_file_map_entries() {
        let body = r#"{"elements": [], "fileMap": {"abc": "sketch.png", "def": {"fileName": "other.png"}}}"#;
        let note = note_with_body(NoteKind::Whiteboard, body);
        let mut paths = extract_asset_paths(&note);
        paths.sort();
        assert_eq!(paths, vec!["images/whiteboard/other.png".to_string(), "images/whiteboard/sketch.png".to_string()]);
    }

    #[test]
    fn whiteboard_without_file_map_yields_no_assets() {
        let note = note_with_body(NoteKind::Whiteboard, r#"{"elements": []}"#);
        assert!(extract_asset_paths(&note).is_empty());
    }
}
