//! In-memory object store for tests and single-process development.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ObjectPage, ObjectStore, content_etag};
use crate::error::{Result, ScanError};
use crate::types::ObjectEntry;

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    buckets: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object, returning its etag.
    pub fn put(
        &self,
        bucket: impl Into<String>,
        key: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> String {
        let bytes = bytes.into();
        let etag = content_etag(&bytes);
        self.buckets
            .lock()
            .expect("object store lock poisoned")
            .entry(bucket.into())
            .or_default()
            .insert(key.into(), bytes);
        etag
    }

    pub fn remove(&self, bucket: &str, key: &str) {
        if let Some(objects) = self
            .buckets
            .lock()
            .expect("object store lock poisoned")
            .get_mut(bucket)
        {
            objects.remove(key);
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage> {
        let buckets = self.buckets.lock().expect("object store lock poisoned");
        let objects = buckets.get(bucket).ok_or_else(|| {
            ScanError::ObjectNotFound(format!("bucket `{bucket}` does not exist"))
        })?;

        let mut entries = Vec::new();
        let mut truncated = false;
        for (key, bytes) in objects {
            if !key.starts_with(prefix) {
                continue;
            }
            if let Some(after) = continuation {
                if key.as_str() <= after {
                    continue;
                }
            }
            if entries.len() == max_keys {
                truncated = true;
                break;
            }
            entries.push(ObjectEntry {
                key: key.clone(),
                etag: content_etag(bytes),
            });
        }

        let continuation = if truncated {
            entries.last().map(|e: &ObjectEntry| e.key.clone())
        } else {
            None
        };
        Ok(ObjectPage {
            entries,
            continuation,
        })
    }

    async fn fetch(
        &self,
        bucket: &str,
        key: &str,
        expected_etag: Option<&str>,
    ) -> Result<Vec<u8>> {
        let buckets = self.buckets.lock().expect("object store lock poisoned");
        let bytes = buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| {
                ScanError::ObjectNotFound(format!("{bucket}/{key}"))
            })?;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_list_fetch_roundtrip() {
        let store = InMemoryObjectStore::new();
        let etag = store.put("docs", "a.txt", "hello");

        let page = store.list_page("docs", "", None, 10).await.unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].etag, etag);

        let bytes = store.fetch("docs", "a.txt", Some(&etag)).await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn overwrite_changes_etag() {
        let store = InMemoryObjectStore::new();
        let old = store.put("docs", "a.txt", "one");
        let new = store.put("docs", "a.txt", "two");
        assert_ne!(old, new);

        let err = store.fetch("docs", "a.txt", Some(&old)).await.unwrap_err();
        assert!(matches!(err, ScanError::VersionMismatch(_)));
    }
}
