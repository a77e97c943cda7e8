//! Lazy-loading, idle-evicting registry of model resources.
//!
//! Embedding, chat, and reranker models are expensive to load, so they are
//! cached under a composite `(name, kind)` key. A miss loads through the
//! inference runtime exactly once, even when many requests race for the
//! same key; a hit refreshes recency. A periodic sweeper, owned by the
//! cache and abortable at shutdown, disposes resources idle beyond the
//! configured threshold.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::llm::{InferenceRuntime, ModelHandle, RankScore, SamplingOptions};
use crate::models::{ChatMessage, ModelKind, ResourceStatus};

type ResourceKey = (String, ModelKind);

/// A loaded model plus the operations its kind allows. Owned by the cache;
/// callers hold it only as `Arc<ModelResource>`.
pub struct ModelResource {
    pub name: String,
    pub kind: ModelKind,
    handle: ModelHandle,
    runtime: Arc<dyn InferenceRuntime>,
}

impl std::fmt::Debug for ModelResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelResource")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl ModelResource {
    fn require(&self, needed: ModelKind, operation: &'static str) -> Result<()> {
        if self.kind == needed {
            Ok(())
        } else {
            Err(Error::UnsupportedCapability {
                model: self.name.clone(),
                kind: self.kind,
                operation,
            })
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.require(ModelKind::Embedding, "embed")?;
        self.runtime.embed(&self.handle, text).await
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        sampling: &SamplingOptions,
    ) -> Result<String> {
        self.require(ModelKind::Chat, "chat")?;
        self.runtime.chat(&self.handle, messages, sampling).await
    }

    pub async fn rank(&self, query: &str, documents: &[String]) -> Result<Vec<RankScore>> {
        self.require(ModelKind::Reranker, "rank")?;
        self.runtime.rank(&self.handle, query, documents).await
    }
}

/// One cache slot. The once-cell deduplicates concurrent loads for the
/// same key; `last_used` is only ever read or written under the cache's
/// entry-map lock, which is what makes the sweep recency re-check sound.
struct CacheEntry {
    cell: OnceCell<Arc<ModelResource>>,
    last_used: Mutex<Instant>,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            last_used: Mutex::new(Instant::now()),
        }
    }
}

pub struct ResourceCache {
    runtime: Arc<dyn InferenceRuntime>,
    entries: Mutex<HashMap<ResourceKey, Arc<CacheEntry>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ResourceCache {
    pub fn new(runtime: Arc<dyn InferenceRuntime>) -> Self {
        Self {
            runtime,
            entries: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
        }
    }

    /// Look up or load the model resource for `(name, kind)`.
    ///
    /// On a hit the entry's recency is refreshed and the existing handle
    /// returned. On a miss the load runs through the entry's once-cell, so
    /// concurrent acquirers for the same key produce exactly one underlying
    /// load and all receive the same resource. A failed load removes the
    /// placeholder entry so nothing half-initialized stays behind.
    pub async fn acquire(&self, name: &str, kind: ModelKind) -> Result<Arc<ModelResource>> {
        let key = (name.to_string(), kind);

        // Refreshing recency under the entry-map lock means a sweep that
        // runs after us must observe the new timestamp and skip this key.
        let entry = {
            let mut entries = self.entries.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(CacheEntry::new()))
                .clone();
            *entry.last_used.lock() = Instant::now();
            entry
        };

        let runtime = self.runtime.clone();
        let result = entry
            .cell
            .get_or_try_init(|| async {
                let handle = runtime.load(name, kind).await?;
                Ok::<_, Error>(Arc::new(ModelResource {
                    name: name.to_string(),
                    kind,
                    handle,
                    runtime: runtime.clone(),
                }))
            })
            .await;

        match result {
            Ok(resource) => Ok(resource.clone()),
            Err(e) => {
                let mut entries = self.entries.lock();
                if let Some(current) = entries.get(&key) {
                    // Drop the placeholder only if it is still ours and no
                    // concurrent acquirer managed to initialize it.
                    if Arc::ptr_eq(current, &entry) && current.cell.get().is_none() {
                        entries.remove(&key);
                    }
                }
                Err(e)
            }
        }
    }

    /// Dispose and remove every resource loaded under `name`, regardless of
    /// idle time. Returns false if no such resource was cached.
    pub async fn release(&self, name: &str) -> bool {
        let victims: Vec<(ResourceKey, Arc<CacheEntry>)> = {
            let mut entries = self.entries.lock();
            let keys: Vec<ResourceKey> = entries
                .keys()
                .filter(|(n, _)| n.as_str() == name)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|k| entries.remove(&k).map(|e| (k, e)))
                .collect()
        };

        if victims.is_empty() {
            return false;
        }

        for ((name, kind), entry) in victims {
            if let Some(resource) = entry.cell.get() {
                self.runtime.dispose(&resource.handle).await;
                tracing::info!("Released model {name} ({kind})");
            }
        }
        true
    }

    /// Dispose every loaded resource whose recency is older than `max_idle`.
    /// Returns the number of evicted resources.
    ///
    /// The idle decision and the removal happen in one critical section on
    /// the entry map, so an `acquire` that refreshed a key before we got the
    /// lock wins the race and the key survives. Keys whose load is still in
    /// flight are skipped; a stalled load never blocks the sweep.
    pub async fn sweep(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let victims: Vec<(ResourceKey, Arc<CacheEntry>)> = {
            let mut entries = self.entries.lock();
            let expired: Vec<ResourceKey> = entries
                .iter()
                .filter(|(_, entry)| {
                    entry.cell.initialized()
                        && now.duration_since(*entry.last_used.lock()) > max_idle
                })
                .map(|(key, _)| key.clone())
                .collect();
            expired
                .into_iter()
                .filter_map(|k| entries.remove(&k).map(|e| (k, e)))
                .collect()
        };

        let mut evicted = 0;
        for ((name, kind), entry) in victims {
            if let Some(resource) = entry.cell.get() {
                self.runtime.dispose(&resource.handle).await;
                tracing::info!("Evicted idle model {name} ({kind})");
                evicted += 1;
            }
        }
        evicted
    }

    /// Snapshot of cached resources. `loaded` is false for keys whose load
    /// is still in flight.
    pub fn list(&self) -> Vec<ResourceStatus> {
        let mut statuses: Vec<ResourceStatus> = self
            .entries
            .lock()
            .iter()
            .map(|((name, kind), entry)| ResourceStatus {
                name: name.clone(),
                kind: *kind,
                loaded: entry.cell.initialized(),
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Start the periodic idle sweep. The task holds only a weak reference
    /// to the cache and runs independently of any request's lifecycle.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration, max_idle: Duration) {
        let cache = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a fresh cache
            // is not swept at startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let evicted = cache.sweep(max_idle).await;
                if evicted > 0 {
                    tracing::info!("Sweeper evicted {evicted} idle model resource(s)");
                }
            }
        });

        let mut sweeper = self.sweeper.lock();
        if let Some(old) = sweeper.replace(handle) {
            old.abort();
        }
    }

    /// Cancel the periodic sweep. Safe to call when none is running.
    pub fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for ResourceCache {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::MockRuntime;
    use std::sync::atomic::Ordering;

    fn cache_with_mock() -> (Arc<ResourceCache>, Arc<MockRuntime>) {
        let runtime = Arc::new(MockRuntime::new());
        let cache = Arc::new(ResourceCache::new(runtime.clone()));
        (cache, runtime)
    }

    #[tokio::test]
    async fn test_acquire_loads_once_and_caches() {
        let (cache, runtime) = cache_with_mock();

        let first = cache.acquire("m", ModelKind::Embedding).await.unwrap();
        let second = cache.acquire("m", ModelKind::Embedding).await.unwrap();

        assert_eq!(runtime.loads.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_distinct_kinds_are_distinct_resources() {
        let (cache, runtime) = cache_with_mock();

        cache.acquire("m", ModelKind::Embedding).await.unwrap();
        cache.acquire("m", ModelKind::Chat).await.unwrap();

        assert_eq!(runtime.loads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.list().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_acquires_share_a_single_load() {
        let (cache, runtime) = cache_with_mock();
        *runtime.load_delay.lock() = Duration::from_millis(20);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.acquire("m", ModelKind::Embedding).await.unwrap()
            }));
        }

        let mut resources = Vec::new();
        for handle in handles {
            resources.push(handle.await.unwrap());
        }

        assert_eq!(runtime.loads.load(Ordering::SeqCst), 1);
        for resource in &resources[1..] {
            assert!(Arc::ptr_eq(&resources[0], resource));
        }
    }

    #[tokio::test]
    async fn test_failed_load_leaves_no_entry() {
        let (cache, runtime) = cache_with_mock();
        *runtime.fail_loads.lock() = true;

        let err = cache.acquire("missing", ModelKind::Embedding).await.unwrap_err();
        assert!(matches!(err, Error::ModelNotFound(_)));
        assert!(cache.list().is_empty());

        // Once the backend recovers, the same key loads cleanly.
        *runtime.fail_loads.lock() = false;
        cache.acquire("missing", ModelKind::Embedding).await.unwrap();
        assert_eq!(cache.list().len(), 1);
    }

    #[tokio::test]
    async fn test_release_disposes_and_reports_absence() {
        let (cache, runtime) = cache_with_mock();

        cache.acquire("m", ModelKind::Embedding).await.unwrap();
        assert!(cache.release("m").await);
        assert_eq!(runtime.disposals.load(Ordering::SeqCst), 1);
        assert!(cache.list().is_empty());

        assert!(!cache.release("m").await);
        assert!(!cache.release("never-loaded").await);
    }

    #[tokio::test]
    async fn test_release_covers_every_kind_under_the_name() {
        let (cache, runtime) = cache_with_mock();

        cache.acquire("m", ModelKind::Embedding).await.unwrap();
        cache.acquire("m", ModelKind::Chat).await.unwrap();
        cache.acquire("other", ModelKind::Chat).await.unwrap();

        assert!(cache.release("m").await);
        assert_eq!(runtime.disposals.load(Ordering::SeqCst), 2);
        assert_eq!(cache.list().len(), 1);
        assert_eq!(cache.list()[0].name, "other");
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_idle_resources() {
        let (cache, runtime) = cache_with_mock();

        cache.acquire("stale", ModelKind::Embedding).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.acquire("fresh", ModelKind::Embedding).await.unwrap();

        let evicted = cache.sweep(Duration::from_millis(15)).await;

        assert_eq!(evicted, 1);
        assert_eq!(runtime.disposals.load(Ordering::SeqCst), 1);
        let remaining = cache.list();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "fresh");
    }

    #[tokio::test]
    async fn test_reacquire_refreshes_recency() {
        let (cache, _runtime) = cache_with_mock();

        cache.acquire("m", ModelKind::Embedding).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Touch the resource; the sweep decision below must observe it.
        cache.acquire("m", ModelKind::Embedding).await.unwrap();

        let evicted = cache.sweep(Duration::from_millis(20)).await;
        assert_eq!(evicted, 0);
        assert_eq!(cache.list().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_skips_in_flight_loads() {
        let (cache, runtime) = cache_with_mock();
        *runtime.load_delay.lock() = Duration::from_millis(50);

        let loading = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.acquire("slow", ModelKind::Chat).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The slow load is past any idle threshold but not yet initialized.
        let evicted = cache.sweep(Duration::from_millis(1)).await;
        assert_eq!(evicted, 0);

        loading.await.unwrap().unwrap();
        assert_eq!(cache.list().len(), 1);
        assert!(cache.list()[0].loaded);
    }

    #[tokio::test]
    async fn test_untouched_resource_is_gone_after_periodic_sweep() {
        let (cache, runtime) = cache_with_mock();

        cache.acquire("m", ModelKind::Embedding).await.unwrap();
        cache.start_sweeper(Duration::from_millis(20), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cache.list().is_empty());
        assert_eq!(runtime.disposals.load(Ordering::SeqCst), 1);
        cache.stop_sweeper();
    }

    #[tokio::test]
    async fn test_capability_checks_guard_operations() {
        let (cache, _runtime) = cache_with_mock();

        let embedder = cache.acquire("m", ModelKind::Embedding).await.unwrap();
        let err = embedder.rank("q", &["d".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedCapability { .. }));

        let chat = cache.acquire("m", ModelKind::Chat).await.unwrap();
        let err = chat.embed("text").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedCapability { .. }));
    }

    #[tokio::test]
    async fn test_list_reports_kind_and_loaded_state() {
        let (cache, _runtime) = cache_with_mock();

        cache.acquire("a", ModelKind::Reranker).await.unwrap();
        let statuses = cache.list();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].kind, ModelKind::Reranker);
        assert!(statuses[0].loaded);
    }
}
