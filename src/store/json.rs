// src/store/json.rs — One pretty-printed JSON file per document
//
// Writes go to a sibling temp file which is then renamed over the target, so
// a reader sees either the previous full document or the new one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::capture::session::Page;
use crate::infra::errors::PagecapError;
use crate::store::DocumentStore;

const EXTENSION: &str = "json";

pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, document: &str) -> PathBuf {
        self.dir.join(format!("{document}.{EXTENSION}"))
    }

    fn store_err(document: &str, e: impl std::fmt::Display) -> PagecapError {
        PagecapError::Store {
            document: document.to_string(),
            message: e.to_string(),
        }
    }
}

/// Document names come from slugs, but `show` takes user input.
fn check_name(document: &str) -> Result<(), PagecapError> {
    let ok = !document.is_empty()
        && document
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(PagecapError::Config(format!(
            "invalid document name '{document}'"
        )))
    }
}

/// Write `body` to `path` and flush it to disk before returning, so the
/// rename that follows never exposes a file the OS has not persisted.
async fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut f = tokio::fs::File::create(path).await?;
    f.write_all(body).await?;
    f.flush().await?;
    f.sync_all().await
}

#[async_trait]
impl DocumentStore for JsonDirStore {
    async fn write(&self, document: &str, pages: &[Page]) -> Result<(), PagecapError> {
        check_name(document)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::store_err(document, e))?;

        let body = serde_json::to_vec_pretty(pages)?;
        let target = self.path_for(document);
        let tmp = self.dir.join(format!(".{document}.{EXTENSION}.tmp"));

        if let Err(e) = write_synced(&tmp, &body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Self::store_err(document, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Self::store_err(document, e));
        }
        Ok(())
    }

    async fn read(&self, document: &str) -> Result<Option<Vec<Page>>, PagecapError> {
        check_name(document)?;
        match tokio::fs::read(self.path_for(document)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, PagecapError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
