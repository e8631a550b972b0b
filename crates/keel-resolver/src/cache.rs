//! Memoized, prefetch-aware container fetching.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::container::{Container, ContainerProvider, ResolverDelegate};
use crate::error::ProviderError;
use crate::package::PackageId;

type FetchResult = std::result::Result<Arc<dyn Container>, ProviderError>;

struct CacheState {
    /// Every completed fetch, failures included: a failed prefetch is
    /// replayed to the next `get` for the same package.
    containers: HashMap<PackageId, FetchResult>,
    /// Packages a prefetch worker is currently fetching.
    prefetching: HashSet<PackageId>,
}

/// The state prefetch workers share with the cache that spawned them.
struct CacheShared {
    state: Mutex<CacheState>,
    fetched: Condvar,
}

/// Caches container fetches for the lifetime of one resolver.
///
/// The search thread calls [`get`](ContainerCache::get); prefetch workers
/// populate the same map concurrently. All bookkeeping happens under one
/// mutex, with a condition variable handing prefetched results over to a
/// waiting `get`.
pub struct ContainerCache {
    provider: Arc<dyn ContainerProvider>,
    delegate: Option<Arc<dyn ResolverDelegate>>,
    skip_update: bool,
    shared: Arc<CacheShared>,
}

impl ContainerCache {
    pub fn new(
        provider: Arc<dyn ContainerProvider>,
        delegate: Option<Arc<dyn ResolverDelegate>>,
        skip_update: bool,
    ) -> ContainerCache {
        ContainerCache {
            provider,
            delegate,
            skip_update,
            shared: Arc::new(CacheShared {
                state: Mutex::new(CacheState {
                    containers: HashMap::new(),
                    prefetching: HashSet::new(),
                }),
                fetched: Condvar::new(),
            }),
        }
    }

    /// The container for `id`, fetching it on demand.
    ///
    /// If a prefetch for `id` is in flight this blocks until the worker
    /// publishes its result.
    pub fn get(&self, id: &PackageId) -> FetchResult {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if let Some(result) = state.containers.get(id) {
                return result.clone();
            }
            if state.prefetching.contains(id) {
                state = self.shared.fetched.wait(state).unwrap();
                continue;
            }
            break;
        }
        drop(state);

        log::debug!("fetching container for {id}");
        let result = fetch(
            self.provider.as_ref(),
            self.delegate.as_deref(),
            id,
            self.skip_update,
        );

        let mut state = self.shared.state.lock().unwrap();
        state
            .containers
            .entry(id.clone())
            .or_insert(result)
            .clone()
    }

    /// Start background fetches for every id not already cached or being
    /// prefetched. Fire-and-forget: completions land in the cache and wake
    /// any `get` waiting for them.
    pub fn prefetch(&self, ids: &[PackageId]) {
        let mut state = self.shared.state.lock().unwrap();
        let new: Vec<PackageId> = ids
            .iter()
            .filter(|id| !state.containers.contains_key(*id) && !state.prefetching.contains(*id))
            .cloned()
            .collect();
        for id in &new {
            state.prefetching.insert(id.clone());
        }
        drop(state);

        for id in new {
            let shared = Arc::clone(&self.shared);
            let provider = Arc::clone(&self.provider);
            let delegate = self.delegate.clone();
            let skip_update = self.skip_update;
            let worker_id = id.clone();
            let spawned = thread::Builder::new()
                .name(format!("keel-prefetch-{}", id.name))
                .spawn(move || {
                    let result = fetch(
                        provider.as_ref(),
                        delegate.as_deref(),
                        &worker_id,
                        skip_update,
                    );
                    let mut state = shared.state.lock().unwrap();
                    state
                        .containers
                        .entry(worker_id.clone())
                        .or_insert(result);
                    state.prefetching.remove(&worker_id);
                    shared.fetched.notify_all();
                });
            if let Err(err) = spawned {
                log::debug!("could not spawn prefetch worker for {id}: {err}");
                let mut state = self.shared.state.lock().unwrap();
                state.prefetching.remove(&id);
                self.shared.fetched.notify_all();
            }
        }
    }

    /// Whether a fetch for `id` has completed (successfully or not).
    pub fn contains(&self, id: &PackageId) -> bool {
        self.shared.state.lock().unwrap().containers.contains_key(id)
    }

    /// The cached result for `id`, without fetching or blocking.
    pub fn cached(&self, id: &PackageId) -> Option<FetchResult> {
        self.shared.state.lock().unwrap().containers.get(id).cloned()
    }

    /// Every successfully fetched container, ordered by package id.
    pub fn containers(&self) -> Vec<Arc<dyn Container>> {
        let state = self.shared.state.lock().unwrap();
        let mut entries: Vec<_> = state
            .containers
            .iter()
            .filter_map(|(id, result)| result.as_ref().ok().map(|c| (id.clone(), Arc::clone(c))))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries.into_iter().map(|(_, container)| container).collect()
    }
}

fn fetch(
    provider: &dyn ContainerProvider,
    delegate: Option<&dyn ResolverDelegate>,
    id: &PackageId,
    skip_update: bool,
) -> FetchResult {
    if let Some(delegate) = delegate {
        delegate.will_fetch(id);
    }
    let result = provider.fetch_container(id, skip_update);
    if let Some(delegate) = delegate {
        delegate.did_fetch(id, result.is_ok());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use keel_semver::Version;

    use crate::package::{BoundVersion, Constraint};

    #[derive(Debug)]
    struct EmptyContainer {
        id: PackageId,
    }

    impl Container for EmptyContainer {
        fn package_id(&self) -> &PackageId {
            &self.id
        }

        fn versions(&self) -> Result<Vec<Version>, ProviderError> {
            Ok(Vec::new())
        }

        fn dependencies_at_version(&self, _: &Version) -> Result<Vec<Constraint>, ProviderError> {
            Ok(Vec::new())
        }

        fn dependencies_at_revision(&self, _: &str) -> Result<Vec<Constraint>, ProviderError> {
            Ok(Vec::new())
        }

        fn unversioned_dependencies(&self) -> Result<Vec<Constraint>, ProviderError> {
            Ok(Vec::new())
        }

        fn updated_identifier(&self, _: &BoundVersion) -> Result<PackageId, ProviderError> {
            Ok(self.id.clone())
        }
    }

    /// Counts fetches; fails for packages whose name starts with "bad".
    struct CountingProvider {
        fetches: AtomicUsize,
        delay: Duration,
    }

    impl CountingProvider {
        fn new() -> CountingProvider {
            CountingProvider {
                fetches: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn slow() -> CountingProvider {
            CountingProvider {
                fetches: AtomicUsize::new(0),
                delay: Duration::from_millis(20),
            }
        }
    }

    impl ContainerProvider for CountingProvider {
        fn fetch_container(
            &self,
            id: &PackageId,
            _skip_update: bool,
        ) -> Result<Arc<dyn Container>, ProviderError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            if id.name.starts_with("bad") {
                return Err(ProviderError::msg(format!("no such package: {id}")));
            }
            Ok(Arc::new(EmptyContainer { id: id.clone() }))
        }
    }

    fn pkg(name: &str) -> PackageId {
        PackageId::new(name, format!("https://example.com/{name}.git"))
    }

    #[test]
    fn test_get_fetches_once() {
        let provider = Arc::new(CountingProvider::new());
        let cache = ContainerCache::new(provider.clone(), None, false);

        assert!(cache.get(&pkg("a")).is_ok());
        assert!(cache.get(&pkg("a")).is_ok());
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_get_replays_failures() {
        let provider = Arc::new(CountingProvider::new());
        let cache = ContainerCache::new(provider.clone(), None, false);

        assert!(cache.get(&pkg("bad-pkg")).is_err());
        assert!(cache.get(&pkg("bad-pkg")).is_err());
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prefetch_single_flight() {
        let provider = Arc::new(CountingProvider::slow());
        let cache = ContainerCache::new(provider.clone(), None, false);

        let ids = [pkg("a"), pkg("b")];
        cache.prefetch(&ids);
        cache.prefetch(&ids);

        // `get` waits for the in-flight prefetches instead of re-fetching.
        assert!(cache.get(&pkg("a")).is_ok());
        assert!(cache.get(&pkg("b")).is_ok());
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_prefetch_error_surfaces_on_get() {
        let provider = Arc::new(CountingProvider::new());
        let cache = ContainerCache::new(provider.clone(), None, false);

        cache.prefetch(&[pkg("bad-pkg")]);
        assert!(cache.get(&pkg("bad-pkg")).is_err());
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_contains_and_snapshot() {
        let provider = Arc::new(CountingProvider::new());
        let cache = ContainerCache::new(provider, None, false);

        assert!(!cache.contains(&pkg("a")));
        cache.get(&pkg("b")).unwrap();
        cache.get(&pkg("a")).unwrap();
        cache.get(&pkg("bad-pkg")).unwrap_err();
        assert!(cache.contains(&pkg("a")));
        assert!(cache.contains(&pkg("bad-pkg")));
        assert!(cache.cached(&pkg("a")).is_some());
        assert!(cache.cached(&pkg("missing")).is_none());

        // Failures are excluded from the snapshot, which is sorted by id.
        let names: Vec<String> = cache
            .containers()
            .iter()
            .map(|c| c.package_id().name.clone())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_delegate_observes_fetches() {
        struct Recording {
            events: Mutex<Vec<(String, bool)>>,
        }

        impl ResolverDelegate for Recording {
            fn did_fetch(&self, id: &PackageId, success: bool) {
                self.events
                    .lock()
                    .unwrap()
                    .push((id.name.clone(), success));
            }
        }

        let delegate = Arc::new(Recording {
            events: Mutex::new(Vec::new()),
        });
        let provider = Arc::new(CountingProvider::new());
        let cache = ContainerCache::new(provider, Some(delegate.clone()), false);

        cache.get(&pkg("a")).unwrap();
        cache.get(&pkg("bad-pkg")).unwrap_err();

        let events = delegate.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![("a".to_string(), true), ("bad-pkg".to_string(), false)]
        );
    }
}
