//! Cooperative distributed lock over object-store leases.
//!
//! A lock key maps to a zero-byte object under `locks/`; holding the lock means
//! holding a time-boxed lease on that object. Contention is retried with
//! linear backoff, every other store failure surfaces immediately, and the
//! lease is released on every exit path (including unwinding). Leases are not
//! renewed: an action that outlives the TTL loses exclusivity.
use crate::error::{Result, TemplateError};
use crate::layout::StorageLayout;
use crate::store::{LeaseId, ObjectStore, StoreError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const MIN_LEASE_TTL: Duration = Duration::from_secs(15);
pub const MAX_LEASE_TTL: Duration = Duration::from_secs(60);

/// Retry budget for lease acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub max_attempts: u32,
    /// Wait after the n-th conflicting attempt is `backoff_step * n`.
    pub backoff_step: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            backoff_step: Duration::from_millis(200),
        }
    }
}

/// Clamp a requested lease duration into the range the store accepts.
pub fn clamp_ttl(ttl: Duration) -> Duration {
    ttl.clamp(MIN_LEASE_TTL, MAX_LEASE_TTL)
}

pub struct LeaseLock {
    store: Arc<dyn ObjectStore>,
    layout: StorageLayout,
    policy: LockPolicy,
}

impl LeaseLock {
    pub fn new(store: Arc<dyn ObjectStore>, layout: StorageLayout, policy: LockPolicy) -> Self {
        Self {
            store,
            layout,
            policy,
        }
    }

    /// Run `action` while holding the lease for `lock_key`.
    pub fn with_lock<T>(
        &self,
        lock_key: &str,
        ttl: Duration,
        action: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let container = self.layout.output_container();
        let name = self.layout.lock_object_name(lock_key);
        self.ensure_lock_object(container, &name)?;

        let ttl = clamp_ttl(ttl);
        let lease = self.acquire(lock_key, container, &name, ttl)?;
        tracing::info!(lock_key, ttl_secs = ttl.as_secs(), "lock acquired");

        let _guard = LeaseGuard {
            store: self.store.as_ref(),
            container,
            name: &name,
            lease,
        };
        action()
    }

    fn ensure_lock_object(&self, container: &str, name: &str) -> Result<()> {
        let path = format!("{container}/{name}");
        self.store
            .ensure_container(container)
            .map_err(|err| TemplateError::storage("create container", container, err))?;
        let present = self
            .store
            .exists(container, name)
            .map_err(|err| TemplateError::storage("inspect lock object", &path, err))?;
        if !present {
            self.store
                .put(container, name, &[])
                .map_err(|err| TemplateError::storage("create lock object", &path, err))?;
        }
        Ok(())
    }

    fn acquire(
        &self,
        lock_key: &str,
        container: &str,
        name: &str,
        ttl: Duration,
    ) -> Result<LeaseId> {
        let attempts = self.policy.max_attempts;
        for attempt in 1..=attempts {
            match self.store.acquire_lease(container, name, ttl) {
                Ok(lease) => return Ok(lease),
                Err(StoreError::LeaseConflict(_)) => {
                    tracing::debug!(lock_key, attempt, "lock busy");
                    if attempt < attempts {
                        thread::sleep(self.policy.backoff_step * attempt);
                    }
                }
                Err(err) => {
                    return Err(TemplateError::storage(
                        "acquire lease",
                        format!("{container}/{name}"),
                        err,
                    ))
                }
            }
        }
        Err(TemplateError::Conflict {
            lock_key: lock_key.to_string(),
            attempts,
        })
    }
}

/// Releases the lease when dropped; release failures are logged and
/// otherwise ignored because the lease expires on its own.
struct LeaseGuard<'a> {
    store: &'a dyn ObjectStore,
    container: &'a str,
    name: &'a str,
    lease: LeaseId,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        match self
            .store
            .release_lease(self.container, self.name, &self.lease)
        {
            Ok(()) => tracing::info!(lock = self.name, "lock released"),
            Err(err) => tracing::warn!(lock = self.name, error = %err, "lock release failed"),
        }
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
