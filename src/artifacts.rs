//! Versioned artifact persistence and "current template" lookup.
//!
//! "Current" is never tracked separately: it is the highest version folder
//! holding an editable document, recomputed from a listing on every call.
use crate::domain::{ContractName, Version};
use crate::error::{Result, TemplateError};
use crate::layout::{parse_version_folder, StorageLayout, DOCX_EXTENSION};
use crate::store::{ObjectStore, StoreError};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub struct ArtifactStore {
    store: Arc<dyn ObjectStore>,
    layout: StorageLayout,
}

impl ArtifactStore {
    pub fn new(store: Arc<dyn ObjectStore>, layout: StorageLayout) -> Self {
        Self { store, layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    fn ensure_container(&self, container: &str) -> Result<()> {
        self.store
            .ensure_container(container)
            .map_err(|err| TemplateError::storage("create container", container, err))
    }

    /// Upload `source` to `contratos/{key}/v{n}/{file_name}`.
    pub fn save(
        &self,
        contract: &ContractName,
        version: Version,
        file_name: &str,
        source: &Path,
    ) -> Result<String> {
        let bytes = fs::read(source).map_err(|err| {
            TemplateError::storage(
                "read artifact source",
                source.display().to_string(),
                StoreError::Io(err),
            )
        })?;
        let container = self.layout.output_container();
        let name = self.layout.artifact_name(contract, version, file_name);
        self.ensure_container(container)?;
        self.store
            .put(container, &name, &bytes)
            .map_err(|err| {
                TemplateError::storage("upload artifact", format!("{container}/{name}"), err)
            })?;
        tracing::info!(
            contract = contract.key(),
            version = %version,
            object = %name,
            bytes = bytes.len(),
            "artifact persisted"
        );
        Ok(name)
    }

    /// Overwrite the base template kept in the templates container.
    pub fn save_current_template(&self, contract: &ContractName, docx: &[u8]) -> Result<()> {
        if docx.is_empty() {
            return Err(TemplateError::validation("template document must not be empty"));
        }
        let container = self.layout.templates_container();
        let name = self.layout.current_template_name(contract);
        self.ensure_container(container)?;
        self.store
            .put(container, &name, docx)
            .map_err(|err| {
                TemplateError::storage("save base template", format!("{container}/{name}"), err)
            })
    }

    /// Highest version holding an editable document, with its object name.
    pub fn latest_document(&self, contract: &ContractName) -> Result<Option<(Version, String)>> {
        let container = self.layout.output_container();
        let prefix = self.layout.contract_prefix(contract);
        let suffix = format!(".{DOCX_EXTENSION}");
        let names = self
            .store
            .list(container, &prefix)
            .map_err(|err| {
                TemplateError::storage("list versions", format!("{container}/{prefix}"), err)
            })?;
        Ok(names
            .into_iter()
            .filter(|name| name.to_ascii_lowercase().ends_with(&suffix))
            .filter_map(|name| parse_version_folder(&prefix, &name).map(|version| (version, name)))
            .max_by_key(|(version, _)| *version))
    }

    pub fn template_exists(&self, contract: &ContractName) -> Result<bool> {
        Ok(self.latest_document(contract)?.is_some())
    }

    /// Bytes of the current editable document.
    pub fn load_current_template(&self, contract: &ContractName) -> Result<Vec<u8>> {
        let Some((version, name)) = self.latest_document(contract)? else {
            return Err(TemplateError::NotFound(format!(
                "no version stored for contract {}",
                contract.value()
            )));
        };
        let container = self.layout.output_container();
        tracing::debug!(contract = contract.key(), version = %version, "loading current template");
        self.store.get(container, &name).map_err(|err| match err {
            StoreError::NotFound(path) => TemplateError::NotFound(path),
            other => {
                TemplateError::storage("download template", format!("{container}/{name}"), other)
            }
        })
    }
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
