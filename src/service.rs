//! End-to-end template update workflow.
//!
//! Under the contract lock: save the uploaded base template, allocate the next
//! version, inject clauses into a working copy, render it, then persist both
//! artifacts. Any failure after the lock is taken is wrapped with the stage it
//! happened in; nothing already persisted is rolled back.
use crate::allocator::VersionAllocator;
use crate::artifacts::ArtifactStore;
use crate::docx;
use crate::domain::{Clause, ContractName, TemplateUpdate, TemplateVersionCreated, Version};
use crate::error::{Result, TemplateError, UpdateStage};
use crate::layout::{contract_lock_key, StorageLayout, DOCX_EXTENSION, PDF_EXTENSION};
use crate::lock::{LeaseLock, LockPolicy};
use crate::render::Renderer;
use crate::store::{ObjectStore, StoreError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Knobs the orchestrator needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    /// Local scratch root; each update works in `{work_dir}/{key}/v{n}/`,
    /// removed once the version is persisted.
    pub work_dir: PathBuf,
    pub lock_ttl: Duration,
    pub lock_policy: LockPolicy,
}

pub struct TemplateService {
    lock: LeaseLock,
    allocator: VersionAllocator,
    artifacts: ArtifactStore,
    renderer: Arc<dyn Renderer>,
    work_dir: PathBuf,
    lock_ttl: Duration,
}

fn at_stage(
    stage: UpdateStage,
    contract: &ContractName,
    version: Option<Version>,
) -> impl FnOnce(TemplateError) -> TemplateError {
    let contract = contract.key().to_string();
    move |source| TemplateError::Update {
        stage,
        contract,
        version,
        source: Box::new(source),
    }
}

fn io_error(operation: &'static str, path: &Path, err: std::io::Error) -> TemplateError {
    TemplateError::storage(operation, path.display().to_string(), StoreError::Io(err))
}

/// Scratch files are only needed until both artifacts are stored. A failed
/// attempt keeps its directory for inspection.
fn remove_work_dir(dir: &Path) {
    if let Err(err) = fs::remove_dir_all(dir) {
        tracing::warn!(path = %dir.display(), error = %err, "work directory not removed");
    }
}

impl TemplateService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        layout: StorageLayout,
        renderer: Arc<dyn Renderer>,
        settings: UpdateSettings,
    ) -> Self {
        Self {
            lock: LeaseLock::new(store.clone(), layout.clone(), settings.lock_policy),
            allocator: VersionAllocator::new(store.clone(), layout.clone()),
            artifacts: ArtifactStore::new(store, layout),
            renderer,
            work_dir: settings.work_dir,
            lock_ttl: settings.lock_ttl,
        }
    }

    /// Store a new version of `update.contract` with its clauses applied.
    pub fn update_template(&self, update: &TemplateUpdate) -> Result<TemplateVersionCreated> {
        let lock_key = contract_lock_key(&update.contract);
        let start = Instant::now();
        let created = self
            .lock
            .with_lock(&lock_key, self.lock_ttl, || self.run_locked(update))?;
        tracing::info!(
            contract = created.contract_key.as_str(),
            version = %created.version,
            clauses = created.clauses_applied,
            elapsed_ms = start.elapsed().as_millis(),
            "template version created"
        );
        Ok(created)
    }

    fn run_locked(&self, update: &TemplateUpdate) -> Result<TemplateVersionCreated> {
        let contract = &update.contract;
        let layout = self.artifacts.layout();

        self.artifacts
            .save_current_template(contract, &update.template_docx)
            .map_err(at_stage(UpdateStage::SavingTemplate, contract, None))?;

        let version = self
            .allocator
            .next_version(contract)
            .map_err(at_stage(UpdateStage::AllocatingVersion, contract, None))?;
        tracing::info!(
            contract = contract.key(),
            version = version.number(),
            "version allocated"
        );

        let docx_name = layout.artifact_file_name(contract, DOCX_EXTENSION);
        let pdf_name = layout.artifact_file_name(contract, PDF_EXTENSION);
        let dir = self.work_dir.join(contract.key()).join(version.to_string());
        let editable = dir.join(&docx_name);
        let outcome = self
            .prepare_editable(update, &dir, &editable)
            .map_err(at_stage(UpdateStage::Injecting, contract, Some(version)))?;

        let rendered = self
            .renderer
            .convert(&editable, &dir)
            .map_err(at_stage(UpdateStage::Rendering, contract, Some(version)))?;

        let persist = at_stage(UpdateStage::PersistingArtifacts, contract, Some(version));
        self.artifacts
            .save(contract, version, &docx_name, &editable)
            .and_then(|_| self.artifacts.save(contract, version, &pdf_name, &rendered))
            .map_err(persist)?;
        remove_work_dir(&dir);

        Ok(TemplateVersionCreated {
            contract_name: contract.value().to_string(),
            contract_key: contract.key().to_string(),
            version,
            docx_path: layout.artifact_display_path(contract, version, DOCX_EXTENSION),
            pdf_path: layout.artifact_display_path(contract, version, PDF_EXTENSION),
            clauses_applied: outcome.clauses_applied(),
            placeholder_found: outcome.placeholder_found(),
        })
    }

    /// Write the raw upload into the work directory and inject clauses into
    /// `editable`.
    fn prepare_editable(
        &self,
        update: &TemplateUpdate,
        dir: &Path,
        editable: &Path,
    ) -> Result<docx::InjectionOutcome> {
        fs::create_dir_all(dir).map_err(|err| io_error("create work directory", dir, err))?;
        let input = dir.join(format!("{}-input.{DOCX_EXTENSION}", update.contract.key()));
        fs::write(&input, &update.template_docx)
            .map_err(|err| io_error("write uploaded template", &input, err))?;
        let clauses: Vec<&str> = update.clauses.iter().map(Clause::text).collect();
        docx::apply_extra_clauses(&input, editable, &clauses)
    }

    pub fn template_exists(&self, contract: &str) -> Result<bool> {
        let contract = ContractName::new(contract)?;
        self.artifacts.template_exists(&contract)
    }

    pub fn load_current_template(&self, contract: &str) -> Result<Vec<u8>> {
        let contract = ContractName::new(contract)?;
        self.artifacts.load_current_template(&contract)
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
