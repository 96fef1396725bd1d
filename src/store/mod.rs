//! Object-store interface used by the lock, allocator and artifact store.
//!
//! Objects live in named containers and are addressed by `/`-separated names.
//! Leases give a time-boxed exclusive claim over one existing object.
mod filesystem;
#[cfg(test)]
mod memory;

pub use filesystem::FsObjectStore;
#[cfg(test)]
pub use memory::InMemoryObjectStore;

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Opaque token returned by a successful lease acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseId(String);

impl LeaseId {
    /// Fresh random token for a newly granted lease.
    pub(crate) fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[cfg(test)]
    pub(crate) fn new(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("container {0} does not exist")]
    ContainerNotFound(String),

    #[error("object {0} does not exist")]
    NotFound(String),

    #[error("lease on {0} is held by another owner")]
    LeaseConflict(String),

    #[error("lease on {0} is not held by this owner")]
    LeaseMismatch(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait ObjectStore: Send + Sync {
    /// Create the container if it does not exist yet.
    fn ensure_container(&self, container: &str) -> StoreResult<()>;

    /// Write (or overwrite) an object. Readers never observe a partial write.
    fn put(&self, container: &str, name: &str, bytes: &[u8]) -> StoreResult<()>;

    fn get(&self, container: &str, name: &str) -> StoreResult<Vec<u8>>;

    fn exists(&self, container: &str, name: &str) -> StoreResult<bool>;

    /// Sorted names of all objects whose name starts with `prefix`.
    fn list(&self, container: &str, prefix: &str) -> StoreResult<Vec<String>>;

    /// Claim an exclusive lease on an existing object for `ttl`.
    fn acquire_lease(&self, container: &str, name: &str, ttl: Duration) -> StoreResult<LeaseId>;

    fn release_lease(&self, container: &str, name: &str, lease: &LeaseId) -> StoreResult<()>;
}

/// Object names handed to a store must be relative and free of `..` parts.
pub(crate) fn validate_object_name(name: &str) -> StoreResult<()> {
    let invalid = name.is_empty()
        || name.starts_with('/')
        || name
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid object name {name:?}"),
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
