//! Filesystem-backed object store.
//!
//! Containers are directories under the store root. Lease records live under
//! `.leases/{container}/{name}.lease` and are only read or rewritten while an
//! exclusive `fs2` lock is held on the record file, so acquisition is atomic
//! across threads and processes sharing the same root.
use super::{validate_object_name, LeaseId, ObjectStore, StoreError, StoreResult};
use crate::util::now_epoch_ms;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const LEASES_DIR: &str = ".leases";
const TEMP_PREFIX: &str = ".tmp-";

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, container: &str) -> StoreResult<PathBuf> {
        let invalid = container.is_empty()
            || container.starts_with('.')
            || container.contains(['/', '\\']);
        if invalid {
            return Err(StoreError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid container name {container:?}"),
            )));
        }
        Ok(self.root.join(container))
    }

    fn object_path(&self, container: &str, name: &str) -> StoreResult<PathBuf> {
        validate_object_name(name)?;
        Ok(self.container_dir(container)?.join(name))
    }

    fn lease_path(&self, container: &str, name: &str) -> StoreResult<PathBuf> {
        validate_object_name(name)?;
        self.container_dir(container)?;
        Ok(self
            .root
            .join(LEASES_DIR)
            .join(container)
            .join(format!("{name}.lease")))
    }

    /// Run `update` on the lease record of `name` while holding its file lock.
    fn with_lease_record<T>(
        &self,
        container: &str,
        name: &str,
        update: impl FnOnce(Option<LeaseRecord>, &mut File) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let path = self.lease_path(container, name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        FileExt::lock_exclusive(&file)?;
        let result = read_record(&mut file).and_then(|record| update(record, &mut file));
        keep_update_result(result, FileExt::unlock(&file), &path)
    }
}

/// The record is already written when unlocking; closing the file drops the
/// lock anyway, so an unlock failure never replaces the update's outcome.
pub(super) fn keep_update_result<T>(
    result: StoreResult<T>,
    unlocked: std::io::Result<()>,
    path: &Path,
) -> StoreResult<T> {
    if let Err(err) = unlocked {
        tracing::warn!(path = %path.display(), error = %err, "lease file unlock failed");
    }
    result
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LeaseRecord {
    lease_id: String,
    expires_at_epoch_ms: u128,
}

impl LeaseRecord {
    fn is_active(&self, now_ms: u128) -> bool {
        self.expires_at_epoch_ms > now_ms
    }
}

fn read_record(file: &mut File) -> StoreResult<Option<LeaseRecord>> {
    let mut text = String::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_string(&mut text)?;
    let mut lines = text.lines();
    let (Some(lease_id), Some(expires)) = (lines.next(), lines.next()) else {
        return Ok(None);
    };
    let Ok(expires_at_epoch_ms) = expires.trim().parse::<u128>() else {
        return Ok(None);
    };
    Ok(Some(LeaseRecord {
        lease_id: lease_id.trim().to_string(),
        expires_at_epoch_ms,
    }))
}

fn write_record(file: &mut File, record: Option<&LeaseRecord>) -> StoreResult<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    if let Some(record) = record {
        writeln!(file, "{}\n{}", record.lease_id, record.expires_at_epoch_ms)?;
    }
    file.sync_all()?;
    Ok(())
}

fn collect_names(dir: &Path, base: &Path, names: &mut Vec<String>) -> StoreResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_names(&path, base, names)?;
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
            continue;
        }
        let Ok(rel) = path.strip_prefix(base) else {
            continue;
        };
        let name = rel
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        names.push(name);
    }
    Ok(())
}

impl ObjectStore for FsObjectStore {
    fn ensure_container(&self, container: &str) -> StoreResult<()> {
        fs::create_dir_all(self.container_dir(container)?)?;
        Ok(())
    }

    fn put(&self, container: &str, name: &str, bytes: &[u8]) -> StoreResult<()> {
        let dir = self.container_dir(container)?;
        if !dir.is_dir() {
            return Err(StoreError::ContainerNotFound(container.to_string()));
        }
        let path = self.object_path(container, name)?;
        let parent = path.parent().unwrap_or(&dir);
        fs::create_dir_all(parent)?;
        let mut staged = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(parent)?;
        staged.write_all(bytes)?;
        staged.as_file().sync_all()?;
        staged.persist(&path).map_err(|err| StoreError::Io(err.error))?;
        Ok(())
    }

    fn get(&self, container: &str, name: &str) -> StoreResult<Vec<u8>> {
        let path = self.object_path(container, name)?;
        fs::read(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound(format!("{container}/{name}")),
            _ => StoreError::Io(err),
        })
    }

    fn exists(&self, container: &str, name: &str) -> StoreResult<bool> {
        Ok(self.object_path(container, name)?.is_file())
    }

    fn list(&self, container: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let dir = self.container_dir(container)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        collect_names(&dir, &dir, &mut names)?;
        names.retain(|name| name.starts_with(prefix));
        names.sort();
        Ok(names)
    }

    fn acquire_lease(&self, container: &str, name: &str, ttl: Duration) -> StoreResult<LeaseId> {
        if !self.exists(container, name)? {
            return Err(StoreError::NotFound(format!("{container}/{name}")));
        }
        self.with_lease_record(container, name, |current, file| {
            let now_ms = now_epoch_ms();
            if current.is_some_and(|record| record.is_active(now_ms)) {
                return Err(StoreError::LeaseConflict(format!("{container}/{name}")));
            }
            let lease = LeaseId::generate();
            let record = LeaseRecord {
                lease_id: lease.as_str().to_string(),
                expires_at_epoch_ms: now_ms + ttl.as_millis(),
            };
            write_record(file, Some(&record))?;
            Ok(lease)
        })
    }

    fn release_lease(&self, container: &str, name: &str, lease: &LeaseId) -> StoreResult<()> {
        self.with_lease_record(container, name, |current, file| {
            match current {
                Some(record) if record.lease_id == lease.as_str() => write_record(file, None),
                _ => Err(StoreError::LeaseMismatch(format!("{container}/{name}"))),
            }
        })
    }
}
