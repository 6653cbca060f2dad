//! Per-project reference-data cache.
//!
//! Five sub-caches (members, labels, cycles, modules, sub-states) keyed by
//! project id, each entry carrying a 5-minute TTL. Reads evict lazily;
//! writes are idempotent last-write-wins, so two racing fetches for the same
//! project do duplicate work but never corrupt state. The five fetches for
//! one project run concurrently and fail independently: a dead labels
//! endpoint still lets the member selector render.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::warn;

use crate::api::{RefKind, RefList, ReferenceApi};

/// The full reference bundle for one project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectDataBundle {
    pub members: RefList,
    pub labels: RefList,
    pub cycles: RefList,
    pub modules: RefList,
    pub sub_states: RefList,
}

impl ProjectDataBundle {
    pub fn get(&self, kind: RefKind) -> &RefList {
        match kind {
            RefKind::Members => &self.members,
            RefKind::Labels => &self.labels,
            RefKind::Cycles => &self.cycles,
            RefKind::Modules => &self.modules,
            RefKind::SubStates => &self.sub_states,
        }
    }
}

struct CacheEntry {
    data: RefList,
    expires_at: Instant,
}

type KindMap = HashMap<String, CacheEntry>;

/// Shared, explicitly constructed cache — passed around by handle, never a
/// hidden singleton, so tests and multi-tenant consumers get isolation for
/// free.
pub struct ProjectDataCache {
    api: Arc<dyn ReferenceApi>,
    ttl: Duration,
    maps: Mutex<HashMap<RefKind, KindMap>>,
}

impl ProjectDataCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

    pub fn new(api: Arc<dyn ReferenceApi>) -> Self {
        Self::with_ttl(api, Self::DEFAULT_TTL)
    }

    pub fn with_ttl(api: Arc<dyn ReferenceApi>, ttl: Duration) -> Self {
        let mut maps = HashMap::new();
        for kind in RefKind::ALL {
            maps.insert(kind, KindMap::new());
        }
        Self {
            api,
            ttl,
            maps: Mutex::new(maps),
        }
    }

    /// The lock is only ever held for map reads/writes, never across an
    /// await, so poisoning can only come from a panic mid-insert; recover
    /// the guard rather than cascading the panic.
    fn lock(&self) -> MutexGuard<'_, HashMap<RefKind, KindMap>> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Synchronous warm read for selectors: avoids a loading flash when the
    /// data is already cached. Expired entries are evicted as a side effect
    /// of the read.
    pub fn get_cached(&self, kind: RefKind, project_id: &str) -> Option<RefList> {
        let mut maps = self.lock();
        let map = maps.get_mut(&kind)?;
        match map.get(project_id) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.data.clone()),
            Some(_) => {
                map.remove(project_id);
                None
            }
            None => None,
        }
    }

    /// The whole bundle for a project. Served from cache when all five
    /// kinds are fresh; otherwise all five are fetched concurrently, each
    /// failure degrading that one kind to an empty list.
    pub async fn get_all_project_data(&self, project_id: &str) -> ProjectDataBundle {
        if let Some(bundle) = self.warm_bundle(project_id) {
            return bundle;
        }

        let (members, labels, cycles, modules, sub_states) = tokio::join!(
            self.fetch_kind(RefKind::Members, project_id),
            self.fetch_kind(RefKind::Labels, project_id),
            self.fetch_kind(RefKind::Cycles, project_id),
            self.fetch_kind(RefKind::Modules, project_id),
            self.fetch_kind(RefKind::SubStates, project_id),
        );

        ProjectDataBundle {
            members,
            labels,
            cycles,
            modules,
            sub_states,
        }
    }

    /// Drop one project's entries across all five kinds, or everything when
    /// no project is given. Called after any create scoped to a project,
    /// since new entities change downstream selector lists.
    pub fn invalidate(&self, project_id: Option<&str>) {
        let mut maps = self.lock();
        for map in maps.values_mut() {
            match project_id {
                Some(id) => {
                    map.remove(id);
                }
                None => map.clear(),
            }
        }
    }

    /// Best-effort bulk warm. Per-project failures are already swallowed by
    /// the per-kind fetch path, so one bad id never aborts the rest.
    pub async fn preload(&self, project_ids: &[String]) {
        join_all(
            project_ids
                .iter()
                .map(|id| self.get_all_project_data(id)),
        )
        .await;
    }

    fn warm_bundle(&self, project_id: &str) -> Option<ProjectDataBundle> {
        let mut bundle = ProjectDataBundle::default();
        for kind in RefKind::ALL {
            let list = self.get_cached(kind, project_id)?;
            match kind {
                RefKind::Members => bundle.members = list,
                RefKind::Labels => bundle.labels = list,
                RefKind::Cycles => bundle.cycles = list,
                RefKind::Modules => bundle.modules = list,
                RefKind::SubStates => bundle.sub_states = list,
            }
        }
        Some(bundle)
    }

    /// Fetch one kind and populate its sub-cache. Failures return the empty
    /// default and leave the cache untouched, so the next bundle read
    /// retries.
    async fn fetch_kind(&self, kind: RefKind, project_id: &str) -> RefList {
        match self.api.fetch_reference(kind, project_id).await {
            Ok(list) => {
                let mut maps = self.lock();
                if let Some(map) = maps.get_mut(&kind) {
                    map.insert(
                        project_id.to_string(),
                        CacheEntry {
                            data: list.clone(),
                            expires_at: Instant::now() + self.ttl,
                        },
                    );
                }
                list
            }
            Err(e) => {
                warn!(
                    kind = kind.path_segment(),
                    project = project_id,
                    error = %e,
                    "reference fetch failed; degrading to empty list"
                );
                RefList::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::api::{ApiError, RefEntity};

    /// Programmable collaborator: counts calls, fails selected kinds or
    /// whole projects.
    struct FakeReferenceApi {
        calls: AtomicUsize,
        fail_kinds: HashSet<RefKind>,
        fail_projects: HashSet<String>,
    }

    impl FakeReferenceApi {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_kinds: HashSet::new(),
                fail_projects: HashSet::new(),
            }
        }

        fn failing_kind(kind: RefKind) -> Self {
            let mut api = Self::ok();
            api.fail_kinds.insert(kind);
            api
        }

        fn failing_project(id: &str) -> Self {
            let mut api = Self::ok();
            api.fail_projects.insert(id.to_string());
            api
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReferenceApi for FakeReferenceApi {
        async fn fetch_reference(
            &self,
            kind: RefKind,
            project_id: &str,
        ) -> Result<RefList, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Yield so concurrent callers actually interleave; without an
            // await point the first bundle fetch completes synchronously
            // and warms the cache before the second is even polled.
            tokio::task::yield_now().await;
            if self.fail_kinds.contains(&kind) || self.fail_projects.contains(project_id) {
                return Err(ApiError::Api {
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            Ok(RefList {
                data: vec![RefEntity {
                    id: format!("{project_id}-{}", kind.path_segment()),
                    name: kind.path_segment().to_string(),
                    extra: Default::default(),
                }],
            })
        }
    }

    fn cache_with(api: FakeReferenceApi, ttl: Duration) -> (Arc<FakeReferenceApi>, ProjectDataCache) {
        let api = Arc::new(api);
        let cache = ProjectDataCache::with_ttl(api.clone(), ttl);
        (api, cache)
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let (api, cache) = cache_with(FakeReferenceApi::ok(), Duration::from_secs(60));

        let first = cache.get_all_project_data("p1").await;
        assert_eq!(api.call_count(), 5);
        assert_eq!(first.members.data[0].id, "p1-members");

        let second = cache.get_all_project_data("p1").await;
        assert_eq!(api.call_count(), 5, "warm bundle must not refetch");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn ttl_expiry_evicts_on_read() {
        let (api, cache) = cache_with(FakeReferenceApi::ok(), Duration::from_millis(40));

        cache.get_all_project_data("p1").await;
        assert!(cache.get_cached(RefKind::Labels, "p1").is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get_cached(RefKind::Labels, "p1").is_none());

        // All five are stale, so the next bundle read refetches.
        cache.get_all_project_data("p1").await;
        assert_eq!(api.call_count(), 10);
    }

    #[tokio::test]
    async fn failed_kind_degrades_to_empty_without_poisoning_others() {
        let (_, cache) = cache_with(
            FakeReferenceApi::failing_kind(RefKind::Labels),
            Duration::from_secs(60),
        );

        let bundle = cache.get_all_project_data("p1").await;
        assert!(bundle.labels.data.is_empty());
        assert_eq!(bundle.members.data.len(), 1);
        assert_eq!(bundle.cycles.data.len(), 1);
        assert_eq!(bundle.modules.data.len(), 1);
        assert_eq!(bundle.sub_states.data.len(), 1);

        // The failure is not cached; the successful kinds are.
        assert!(cache.get_cached(RefKind::Labels, "p1").is_none());
        assert!(cache.get_cached(RefKind::Members, "p1").is_some());
    }

    #[tokio::test]
    async fn invalidate_bypasses_unexpired_entries() {
        let (api, cache) = cache_with(FakeReferenceApi::ok(), Duration::from_secs(600));

        cache.get_all_project_data("p1").await;
        cache.invalidate(Some("p1"));

        assert!(cache.get_cached(RefKind::Modules, "p1").is_none());
        cache.get_all_project_data("p1").await;
        assert_eq!(api.call_count(), 10, "invalidation must force refetch");
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_project() {
        let (_, cache) = cache_with(FakeReferenceApi::ok(), Duration::from_secs(600));
        cache.get_all_project_data("p1").await;
        cache.get_all_project_data("p2").await;

        cache.invalidate(None);
        assert!(cache.get_cached(RefKind::Members, "p1").is_none());
        assert!(cache.get_cached(RefKind::Members, "p2").is_none());
    }

    #[tokio::test]
    async fn concurrent_misses_both_fetch_and_settle_cleanly() {
        let (api, cache) = cache_with(FakeReferenceApi::ok(), Duration::from_secs(60));

        let (a, b) = tokio::join!(
            cache.get_all_project_data("p1"),
            cache.get_all_project_data("p1"),
        );
        // No dedup guarantee: both calls miss and fetch.
        assert_eq!(api.call_count(), 10);
        assert_eq!(a, b);

        // Last write wins, exactly one entry per kind remains.
        cache.get_all_project_data("p1").await;
        assert_eq!(api.call_count(), 10);
    }

    #[tokio::test]
    async fn preload_survives_a_bad_project() {
        let (_, cache) = cache_with(
            FakeReferenceApi::failing_project("bad"),
            Duration::from_secs(60),
        );

        cache
            .preload(&["good".to_string(), "bad".to_string()])
            .await;

        assert!(cache.get_cached(RefKind::Members, "good").is_some());
        assert!(cache.get_cached(RefKind::Members, "bad").is_none());
    }

    #[tokio::test]
    async fn cold_read_returns_none() {
        let (_, cache) = cache_with(FakeReferenceApi::ok(), Duration::from_secs(60));
        assert!(cache.get_cached(RefKind::Cycles, "nowhere").is_none());
    }
}
