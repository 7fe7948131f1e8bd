//! Object store boundary.
//!
//! The scanner consumes a bucket-like store through [`ObjectStore`]: a
//! restartable paginated listing of `(key, etag)` pairs plus a blob fetch
//! that can be version-checked against an expected etag. The shipped
//! backends are filesystem directories ([`fs::FsObjectStore`]) and an
//! in-memory map ([`memory::InMemoryObjectStore`]); an S3-style client
//! slots in behind the same trait.

pub mod fs;
pub mod memory;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::Result;
use crate::types::ObjectEntry;

/// One page of an object listing. `continuation` restarts the listing
/// strictly after the last returned key.
#[derive(Clone, Debug)]
pub struct ObjectPage {
    pub entries: Vec<ObjectEntry>,
    pub continuation: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List up to `max_keys` objects under `bucket`/`prefix`, starting
    /// strictly after `continuation` when given. Keys come back in a stable
    /// ascending order so an interrupted enumeration can resume per page.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage>;

    /// Fetch raw object bytes. When `expected_etag` is given and the stored
    /// content no longer matches, the fetch fails with
    /// [`crate::ScanError::VersionMismatch`] instead of returning stale or
    /// changed data.
    async fn fetch(
        &self,
        bucket: &str,
        key: &str,
        expected_etag: Option<&str>,
    ) -> Result<Vec<u8>>;
}

/// Content-addressed version tag: hex SHA-256 of the object bytes.
pub fn content_etag(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
