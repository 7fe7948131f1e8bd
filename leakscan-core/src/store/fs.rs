//! Filesystem-backed object store: each bucket is a directory under a
//! configured root, keys are `/`-separated relative paths, and the etag is
//! the SHA-256 of the file content at listing time.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;
use walkdir::WalkDir;

use super::{ObjectPage, ObjectStore, content_etag};
use crate::error::{Result, ScanError};
use crate::types::ObjectEntry;

#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.is_empty() || bucket.contains(['/', '\\', '.']) {
            return Err(ScanError::ObjectNotFound(format!(
                "invalid bucket name `{bucket}`"
            )));
        }
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let dir = self.bucket_dir(bucket)?;
        if key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(ScanError::ObjectNotFound(format!(
                "invalid object key `{key}`"
            )));
        }
        Ok(dir.join(key))
    }
}

/// Relative path of `entry` below `dir`, normalised to `/` separators.
fn relative_key(dir: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(dir).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage> {
        let dir = self.bucket_dir(bucket)?;
        if !dir.is_dir() {
            return Err(ScanError::ObjectNotFound(format!(
                "bucket `{bucket}` does not exist"
            )));
        }

        let prefix = prefix.to_string();
        let continuation = continuation.map(str::to_string);
        let page = tokio::task::spawn_blocking(move || {
            list_page_blocking(&dir, &prefix, continuation.as_deref(), max_keys)
        })
        .await
        .map_err(|e| ScanError::Internal(format!("listing task failed: {e}")))??;

        Ok(page)
    }

    async fn fetch(
        &self,
        bucket: &str,
        key: &str,
        expected_etag: Option<&str>,
    ) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScanError::ObjectNotFound(format!(
                    "{bucket}/{key}"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(expected) = expected_etag {
            let actual = content_etag(&bytes);
            if actual != expected {
                return Err(ScanError::VersionMismatch(format!(
                    "{bucket}/{key}: expected etag {expected}, found {actual}"
                )));
            }
        }
        Ok(bytes)
    }
}

fn list_page_blocking(
    dir: &Path,
    prefix: &str,
    continuation: Option<&str>,
    max_keys: usize,
) -> Result<ObjectPage> {
    let mut keys = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry during listing");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(key) = relative_key(dir, entry.path()) else {
            continue;
        };
        if !key.starts_with(prefix) {
            continue;
        }
        if let Some(after) = continuation {
            if key.as_str() <= after {
                continue;
            }
        }
        keys.push((key, entry.into_path()));
    }
    keys.sort_by(|a, b| a.0.cmp(&b.0));

    let truncated = keys.len() > max_keys;
    keys.truncate(max_keys);

    let mut entries = Vec::with_capacity(keys.len());
    for (key, path) in keys {
        // Hash at listing time; a later rewrite shows up as a version
        // mismatch at fetch time.
        let bytes = std::fs::read(&path)?;
        entries.push(ObjectEntry {
            key,
            etag: content_etag(&bytes),
        });
    }

    let continuation = if truncated {
        entries.last().map(|e| e.key.clone())
    } else {
        None
    };
    Ok(ObjectPage {
        entries,
        continuation,
    })
}
