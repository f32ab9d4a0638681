//! Persistent mapping cache: two independent JSON documents, one per
//! namespace, with read-through/write-through semantics.
//!
//! `twitter_cache.json` maps profile link -> scraped screen name (null when
//! the page exposed none, so dead links are never re-scraped).
//! `bluesky_cache.json` maps screen name -> accepted candidate (null when
//! the search found nothing acceptable, so misses are never re-queried).
//!
//! Entries are monotonic: no TTL, no eviction. A stale cache is refreshed
//! only by deleting the file externally.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::domain::models::CandidateAccount;
use crate::error::{AppError, Result};

const TWITTER_CACHE_FILE: &str = "twitter_cache.json";
const BLUESKY_CACHE_FILE: &str = "bluesky_cache.json";

/// Non-fatal load problem surfaced to the caller (the run starts with an
/// empty namespace instead of failing).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheWarning {
    pub file: PathBuf,
    pub message: String,
}

/// One namespace: an in-memory map plus its backing file body, serialized
/// under a single async mutex. Holding the lock across the file write keeps
/// reads and writes within the namespace strictly ordered.
struct Namespace<V> {
    path: PathBuf,
    map: Mutex<HashMap<String, V>>,
}

impl<V> Namespace<V>
where
    V: Serialize + DeserializeOwned + Clone + Send,
{
    async fn load(path: PathBuf) -> (Self, Option<CacheWarning>) {
        let (map, warning) = match tokio::fs::read_to_string(&path).await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(map) => (map, None),
                Err(e) => {
                    tracing::warn!(
                        "[CACHE] {} is corrupted, starting fresh: {}",
                        path.display(),
                        e
                    );
                    (
                        HashMap::new(),
                        Some(CacheWarning {
                            file: path.clone(),
                            message: format!("corrupted cache file, starting fresh: {}", e),
                        }),
                    )
                }
            },
            Err(_) => (HashMap::new(), None),
        };

        (
            Self {
                path,
                map: Mutex::new(map),
            },
            warning,
        )
    }

    async fn get(&self, key: &str) -> Option<V> {
        self.map.lock().await.get(key).cloned()
    }

    async fn contains(&self, key: &str) -> bool {
        self.map.lock().await.contains_key(key)
    }

    /// Write-through: the entry is persisted before `put` returns.
    async fn put(&self, key: &str, value: V) -> Result<()> {
        let mut map = self.map.lock().await;
        map.insert(key.to_string(), value);
        let body = serde_json::to_string_pretty(&*map)
            .map_err(|e| AppError::cache(format!("serialize {}: {}", self.path.display(), e)))?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| AppError::cache(format!("write {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

/// The single persisted store of the run. The two namespaces are
/// independent and may proceed concurrently; no lock is exposed.
pub struct MappingCache {
    twitter: Namespace<Option<String>>,
    bluesky: Namespace<Option<CandidateAccount>>,
}

impl MappingCache {
    /// Open (or create) the cache directory and load both documents.
    /// Corruption degrades to empty and is reported, never fatal.
    pub async fn open(cache_dir: &Path) -> Result<(Self, Vec<CacheWarning>)> {
        tokio::fs::create_dir_all(cache_dir)
            .await
            .map_err(|e| AppError::cache(format!("create {}: {}", cache_dir.display(), e)))?;

        let (twitter, w1) = Namespace::load(cache_dir.join(TWITTER_CACHE_FILE)).await;
        let (bluesky, w2) = Namespace::load(cache_dir.join(BLUESKY_CACHE_FILE)).await;

        let warnings = [w1, w2].into_iter().flatten().collect();
        Ok((Self { twitter, bluesky }, warnings))
    }

    /// `None` = never cached; `Some(None)` = cached as unresolvable.
    pub async fn get_source_link(&self, link: &str) -> Option<Option<String>> {
        self.twitter.get(link).await
    }

    pub async fn put_source_link(&self, link: &str, username: Option<String>) -> Result<()> {
        self.twitter.put(link, username).await
    }

    /// `None` = never cached; `Some(None)` = cached no-match marker.
    pub async fn get_resolution(&self, username: &str) -> Option<Option<CandidateAccount>> {
        self.bluesky.get(username).await
    }

    pub async fn put_resolution(
        &self,
        username: &str,
        candidate: Option<CandidateAccount>,
    ) -> Result<()> {
        self.bluesky.put(username, candidate).await
    }

    /// Fast-path probe used by the scrape phase.
    pub async fn has_resolution(&self, username: &str) -> bool {
        self.bluesky.contains(username).await
    }
}
