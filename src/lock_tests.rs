use super::{clamp_ttl, LeaseLock, LockPolicy};
use crate::error::{ErrorKind, TemplateError};
use crate::layout::StorageLayout;
use crate::store::{InMemoryObjectStore, LeaseId, ObjectStore, StoreError, StoreResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

fn fast_policy() -> LockPolicy {
    LockPolicy {
        max_attempts: 200,
        backoff_step: Duration::from_millis(1),
    }
}

fn lock_with(store: Arc<InMemoryObjectStore>, policy: LockPolicy) -> LeaseLock {
    LeaseLock::new(store, StorageLayout::new("templates", "output"), policy)
}

#[test]
fn ttl_is_clamped_to_lease_bounds() {
    assert_eq!(clamp_ttl(Duration::from_secs(1)), Duration::from_secs(15));
    assert_eq!(clamp_ttl(Duration::from_secs(30)), Duration::from_secs(30));
    assert_eq!(clamp_ttl(Duration::from_secs(600)), Duration::from_secs(60));
}

#[test]
fn creates_lock_object_and_releases_after_success() {
    let store = Arc::new(InMemoryObjectStore::new());
    let lock = lock_with(store.clone(), fast_policy());
    let value = lock
        .with_lock("template-lock:abc", Duration::from_secs(60), || {
            assert!(store.lease_held("output", "locks/template-lock_abc.lock"));
            Ok(42)
        })
        .expect("lock acquired");
    assert_eq!(value, 42);
    assert!(store
        .exists("output", "locks/template-lock_abc.lock")
        .expect("exists"));
    assert!(!store.lease_held("output", "locks/template-lock_abc.lock"));
}

#[test]
fn releases_after_action_error() {
    let store = Arc::new(InMemoryObjectStore::new());
    let lock = lock_with(store.clone(), fast_policy());
    let err = lock
        .with_lock("k", Duration::from_secs(60), || -> Result<(), TemplateError> {
            Err(TemplateError::validation("boom"))
        })
        .expect_err("action error propagates");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!store.lease_held("output", "locks/k.lock"));
}

#[test]
fn releases_when_action_panics() {
    let store = Arc::new(InMemoryObjectStore::new());
    let lock = lock_with(store.clone(), fast_policy());
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = lock.with_lock("k", Duration::from_secs(60), || -> Result<(), TemplateError> {
            panic!("action blew up")
        });
    }));
    assert!(outcome.is_err());
    assert!(!store.lease_held("output", "locks/k.lock"));
}

#[test]
fn gives_up_with_conflict_after_attempt_budget() {
    let store = Arc::new(InMemoryObjectStore::new());
    store.ensure_container("output").expect("container");
    store.put("output", "locks/k.lock", b"").expect("lock object");
    store.hold_lease("output", "locks/k.lock", Duration::from_secs(60));
    let policy = LockPolicy {
        max_attempts: 3,
        backoff_step: Duration::from_millis(1),
    };
    let lock = lock_with(store.clone(), policy);
    let ran = AtomicBool::new(false);
    let err = lock
        .with_lock("k", Duration::from_secs(60), || {
            ran.store(true, Ordering::SeqCst);
            Ok(())
        })
        .expect_err("lease is held elsewhere");
    assert!(matches!(err, TemplateError::Conflict { attempts: 3, .. }), "{err}");
    assert!(err.kind().is_retryable());
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(store.lease_attempts.load(Ordering::SeqCst), 3);
}

/// Store whose lease acquisition always fails with a non-conflict error.
struct BrokenLeaseStore {
    inner: InMemoryObjectStore,
    attempts: AtomicU64,
}

impl ObjectStore for BrokenLeaseStore {
    fn ensure_container(&self, container: &str) -> StoreResult<()> {
        self.inner.ensure_container(container)
    }
    fn put(&self, container: &str, name: &str, bytes: &[u8]) -> StoreResult<()> {
        self.inner.put(container, name, bytes)
    }
    fn get(&self, container: &str, name: &str) -> StoreResult<Vec<u8>> {
        self.inner.get(container, name)
    }
    fn exists(&self, container: &str, name: &str) -> StoreResult<bool> {
        self.inner.exists(container, name)
    }
    fn list(&self, container: &str, prefix: &str) -> StoreResult<Vec<String>> {
        self.inner.list(container, prefix)
    }
    fn acquire_lease(&self, _: &str, _: &str, _: Duration) -> StoreResult<LeaseId> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Io(std::io::Error::other("service unavailable")))
    }
    fn release_lease(&self, container: &str, name: &str, lease: &LeaseId) -> StoreResult<()> {
        self.inner.release_lease(container, name, lease)
    }
}

#[test]
fn non_conflict_failures_are_not_retried() {
    let store = Arc::new(BrokenLeaseStore {
        inner: InMemoryObjectStore::new(),
        attempts: AtomicU64::new(0),
    });
    let lock = LeaseLock::new(
        store.clone(),
        StorageLayout::new("templates", "output"),
        fast_policy(),
    );
    let err = lock
        .with_lock("k", Duration::from_secs(60), || Ok(()))
        .expect_err("store failure");
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(store.attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn same_key_critical_sections_never_overlap() {
    let store = Arc::new(InMemoryObjectStore::new());
    let lock = lock_with(store, fast_policy());
    let inside = AtomicBool::new(false);
    let entered = AtomicU64::new(0);
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..3 {
                    lock.with_lock("shared", Duration::from_secs(60), || {
                        assert!(!inside.swap(true, Ordering::SeqCst), "overlapping holders");
                        std::thread::sleep(Duration::from_millis(2));
                        entered.fetch_add(1, Ordering::SeqCst);
                        inside.store(false, Ordering::SeqCst);
                        Ok(())
                    })
                    .expect("lock eventually acquired");
                }
            });
        }
    });
    assert_eq!(entered.load(Ordering::SeqCst), 12);
}

#[test]
fn different_keys_hold_their_locks_concurrently() {
    let store = Arc::new(InMemoryObjectStore::new());
    let lock = lock_with(store, fast_policy());
    let (a_tx, a_rx) = mpsc::channel::<()>();
    let (b_tx, b_rx) = mpsc::channel::<()>();
    let lock = &lock;
    std::thread::scope(|scope| {
        let first = scope.spawn(move || {
            lock.with_lock("contract-a", Duration::from_secs(60), move || {
                a_tx.send(()).expect("signal a");
                b_rx.recv_timeout(Duration::from_secs(5))
                    .map_err(|_| TemplateError::validation("b never entered"))
            })
        });
        let second = scope.spawn(move || {
            lock.with_lock("contract-b", Duration::from_secs(60), move || {
                b_tx.send(()).expect("signal b");
                a_rx.recv_timeout(Duration::from_secs(5))
                    .map_err(|_| TemplateError::validation("a never entered"))
            })
        });
        first.join().expect("join a").expect("a held lock alongside b");
        second.join().expect("join b").expect("b held lock alongside a");
    });
}
