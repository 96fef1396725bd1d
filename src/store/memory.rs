use super::{validate_object_name, LeaseId, ObjectStore, StoreError, StoreResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Default)]
struct MemoryState {
    containers: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    leases: HashMap<(String, String), (LeaseId, Instant)>,
}

/// In-process store with the same contract as the filesystem backend.
#[derive(Default)]
pub struct InMemoryObjectStore {
    state: Mutex<MemoryState>,
    pub list_calls: AtomicU64,
    pub lease_attempts: AtomicU64,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install a lease held by someone else, for contention tests.
    pub fn hold_lease(&self, container: &str, name: &str, ttl: Duration) {
        let mut state = self.state();
        state.leases.insert(
            (container.to_string(), name.to_string()),
            (LeaseId::new("foreign".to_string()), Instant::now() + ttl),
        );
    }

    pub fn lease_held(&self, container: &str, name: &str) -> bool {
        let state = self.state();
        state
            .leases
            .get(&(container.to_string(), name.to_string()))
            .is_some_and(|(_, expires)| *expires > Instant::now())
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn ensure_container(&self, container: &str) -> StoreResult<()> {
        self.state()
            .containers
            .entry(container.to_string())
            .or_default();
        Ok(())
    }

    fn put(&self, container: &str, name: &str, bytes: &[u8]) -> StoreResult<()> {
        validate_object_name(name)?;
        let mut state = self.state();
        let objects = state
            .containers
            .get_mut(container)
            .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;
        objects.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, container: &str, name: &str) -> StoreResult<Vec<u8>> {
        self.state()
            .containers
            .get(container)
            .and_then(|objects| objects.get(name))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{container}/{name}")))
    }

    fn exists(&self, container: &str, name: &str) -> StoreResult<bool> {
        Ok(self
            .state()
            .containers
            .get(container)
            .is_some_and(|objects| objects.contains_key(name)))
    }

    fn list(&self, container: &str, prefix: &str) -> StoreResult<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .state()
            .containers
            .get(container)
            .map(|objects| {
                objects
                    .keys()
                    .filter(|name| name.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn acquire_lease(&self, container: &str, name: &str, ttl: Duration) -> StoreResult<LeaseId> {
        self.lease_attempts.fetch_add(1, Ordering::Relaxed);
        if !self.exists(container, name)? {
            return Err(StoreError::NotFound(format!("{container}/{name}")));
        }
        let mut state = self.state();
        let key = (container.to_string(), name.to_string());
        let now = Instant::now();
        if state
            .leases
            .get(&key)
            .is_some_and(|(_, expires)| *expires > now)
        {
            return Err(StoreError::LeaseConflict(format!("{container}/{name}")));
        }
        let lease = LeaseId::generate();
        state.leases.insert(key, (lease.clone(), now + ttl));
        Ok(lease)
    }

    fn release_lease(&self, container: &str, name: &str, lease: &LeaseId) -> StoreResult<()> {
        let mut state = self.state();
        let key = (container.to_string(), name.to_string());
        match state.leases.get(&key) {
            Some((held, _)) if held == lease => {
                state.leases.remove(&key);
                Ok(())
            }
            _ => Err(StoreError::LeaseMismatch(format!("{container}/{name}"))),
        }
    }
}
