//! Blob cache and resident-site store.
//!
//! Layers a moka in-memory cache over the sqlite tables. When the database
//! failed to open, the store runs memory-only for the session: every durable
//! operation silently degrades to the in-memory layer.

use bytes::Bytes;
use moka::sync::Cache;
use serde::Serialize;
use tracing::warn;

use common::manifest::{Manifest, SiteInfo};

use crate::database::Database;

/// Largest decompressed blob admitted into the cache.
pub const MAX_CACHED_BLOB_BYTES: usize = 5 * 1024 * 1024;

/// Capacity of the in-memory blob layer, in bytes.
const MEMORY_CACHE_CAPACITY: u64 = 128 * 1024 * 1024;

/// Cache statistics for logs and operational queries.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub memory_entries: u64,
    pub durable_entries: u64,
    pub durable_bytes: u64,
}

/// Blob cache + resident-site persistence.
#[derive(Clone)]
pub struct SiteStore {
    db: Option<Database>,
    memory: Cache<String, Bytes>,
}

impl SiteStore {
    pub fn new(db: Option<Database>) -> Self {
        Self {
            db,
            memory: Cache::builder()
                .weigher(|_cid: &String, data: &Bytes| {
                    data.len().try_into().unwrap_or(u32::MAX)
                })
                .max_capacity(MEMORY_CACHE_CAPACITY)
                .build(),
        }
    }

    /// Whether durable storage is available this session.
    pub fn is_durable(&self) -> bool {
        self.db.is_some()
    }

    /// Look up a decompressed blob by content identifier.
    pub async fn get_blob(&self, cid: &str) -> Option<Bytes> {
        if let Some(hit) = self.memory.get(cid) {
            return Some(hit);
        }
        if let Some(db) = &self.db {
            match db.get_blob(cid).await {
                Ok(Some(data)) => {
                    let bytes = Bytes::from(data);
                    self.memory.insert(cid.to_string(), bytes.clone());
                    return Some(bytes);
                }
                Ok(None) => {}
                Err(e) => warn!("blob cache read failed for {cid}: {e}"),
            }
        }
        None
    }

    /// Admit a decompressed blob. Returns false when the size gate rejects
    /// it; the content is still served, just never cached.
    pub async fn put_blob(&self, cid: &str, data: &Bytes) -> bool {
        if data.len() > MAX_CACHED_BLOB_BYTES {
            return false;
        }
        self.memory.insert(cid.to_string(), data.clone());
        if let Some(db) = &self.db {
            if let Err(e) = db.put_blob(cid, data).await {
                warn!("blob cache write failed for {cid}: {e}");
            }
        }
        true
    }

    /// Drop every cached blob, memory and durable.
    pub async fn clear_blobs(&self) {
        self.memory.invalidate_all();
        if let Some(db) = &self.db {
            if let Err(e) = db.clear_blobs().await {
                warn!("blob cache clear failed: {e}");
            }
        }
    }

    /// Persist the resident manifest + site info.
    pub async fn save_resident(&self, manifest: &Manifest, info: &SiteInfo) {
        let Some(db) = &self.db else { return };
        let manifest_json = match serde_json::to_string(manifest) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize manifest: {e}");
                return;
            }
        };
        let info_json = match serde_json::to_string(info) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize site info: {e}");
                return;
            }
        };
        if let Err(e) = db.save_resident(&manifest_json, &info_json).await {
            warn!("failed to persist resident site: {e}");
        }
    }

    /// Load the persisted resident site, if any.
    pub async fn load_resident(&self) -> Option<(Manifest, SiteInfo)> {
        let db = self.db.as_ref()?;
        let (manifest_json, info_json) = match db.load_resident().await {
            Ok(Some(row)) => row,
            Ok(None) => return None,
            Err(e) => {
                warn!("failed to load resident site: {e}");
                return None;
            }
        };
        let manifest = serde_json::from_str(&manifest_json).ok()?;
        let info = serde_json::from_str(&info_json).ok()?;
        Some((manifest, info))
    }

    /// Remove the persisted resident site.
    pub async fn clear_resident(&self) {
        if let Some(db) = &self.db {
            if let Err(e) = db.clear_resident().await {
                warn!("failed to clear resident site: {e}");
            }
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        let (durable_entries, durable_bytes) = match &self.db {
            Some(db) => db.blob_stats().await.unwrap_or((0, 0)),
            None => (0, 0),
        };
        self.memory.run_pending_tasks();
        CacheStats {
            memory_entries: self.memory.entry_count(),
            durable_entries,
            durable_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn size_gate_rejects_oversized_blobs() {
        let store = SiteStore::new(None);
        let big = Bytes::from(vec![0u8; MAX_CACHED_BLOB_BYTES + 1]);
        assert!(!store.put_blob("cid-big", &big).await);
        assert!(store.get_blob("cid-big").await.is_none());

        let ok = Bytes::from_static(b"small");
        assert!(store.put_blob("cid-small", &ok).await);
        assert_eq!(store.get_blob("cid-small").await.unwrap(), ok);
    }

    #[tokio::test]
    async fn memory_only_mode_works_without_database() {
        let store = SiteStore::new(None);
        assert!(!store.is_durable());

        // durable operations degrade silently
        assert!(store.load_resident().await.is_none());
        store.clear_resident().await;
        store.clear_blobs().await;

        let data = Bytes::from_static(b"bytes");
        assert!(store.put_blob("cid", &data).await);
        assert_eq!(store.get_blob("cid").await.unwrap(), data);
    }

    #[tokio::test]
    async fn durable_blobs_survive_memory_invalidation() {
        let db = Database::in_memory().await.unwrap();
        let store = SiteStore::new(Some(db));
        let data = Bytes::from_static(b"persisted");
        assert!(store.put_blob("cid", &data).await);

        store.memory.invalidate_all();
        assert_eq!(store.get_blob("cid").await.unwrap(), data);
    }

    #[tokio::test]
    async fn clear_blobs_empties_both_layers() {
        let db = Database::in_memory().await.unwrap();
        let store = SiteStore::new(Some(db));
        store
            .put_blob("cid", &Bytes::from_static(b"gone"))
            .await;
        store.clear_blobs().await;
        assert!(store.get_blob("cid").await.is_none());
    }
}
