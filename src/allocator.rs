//! Next-version computation for a contract namespace.
//!
//! The allocator only reads: it lists what is stored and returns one past the
//! highest version folder. Callers must hold the contract lock, otherwise two
//! writers can observe the same maximum.
use crate::domain::{ContractName, Version};
use crate::error::{Result, TemplateError};
use crate::layout::{parse_version_folder, StorageLayout};
use crate::store::ObjectStore;
use std::sync::Arc;

pub struct VersionAllocator {
    store: Arc<dyn ObjectStore>,
    layout: StorageLayout,
}

impl VersionAllocator {
    pub fn new(store: Arc<dyn ObjectStore>, layout: StorageLayout) -> Self {
        Self { store, layout }
    }

    /// Highest stored version for `contract`, if any.
    pub fn latest_version(&self, contract: &ContractName) -> Result<Option<Version>> {
        let prefix = self.layout.contract_prefix(contract);
        let container = self.layout.output_container();
        let names = self
            .store
            .list(container, &prefix)
            .map_err(|err| {
                TemplateError::storage("list versions", format!("{container}/{prefix}"), err)
            })?;
        Ok(names
            .iter()
            .filter_map(|name| parse_version_folder(&prefix, name))
            .max())
    }

    /// `max(existing) + 1`, or `v1` for a contract with no versions.
    pub fn next_version(&self, contract: &ContractName) -> Result<Version> {
        let next = match self.latest_version(contract)? {
            Some(latest) => latest.next(),
            None => Version::FIRST,
        };
        tracing::debug!(contract = contract.key(), version = %next, "next version computed");
        Ok(next)
    }
}

#[cfg(test)]
#[path = "allocator_tests.rs"]
mod tests;
