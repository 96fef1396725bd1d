//! Error taxonomy for template updates.
//!
//! Every failure a caller can observe maps to one [`ErrorKind`]; the CLI uses
//! the kind to pick an exit code and to tell retryable conflicts apart from
//! client faults.
use crate::domain::Version;
use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

pub type Result<T, E = TemplateError> = std::result::Result<T, E>;

/// Coarse classification used at the process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    ExternalTool,
    Storage,
    Document,
}

impl ErrorKind {
    /// Only lock contention is worth retrying as a whole operation.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Conflict)
    }

    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Validation => 2,
            ErrorKind::NotFound => 3,
            ErrorKind::Conflict => 4,
            ErrorKind::ExternalTool | ErrorKind::Storage | ErrorKind::Document => 1,
        }
    }
}

/// Orchestration stages that run while the contract lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    SavingTemplate,
    AllocatingVersion,
    Injecting,
    Rendering,
    PersistingArtifacts,
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UpdateStage::SavingTemplate => "saving template",
            UpdateStage::AllocatingVersion => "allocating version",
            UpdateStage::Injecting => "injecting clauses",
            UpdateStage::Rendering => "rendering",
            UpdateStage::PersistingArtifacts => "persisting artifacts",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("lock not acquired for {lock_key} after {attempts} attempts")]
    Conflict { lock_key: String, attempts: u32 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{message}\n{output}")]
    ExternalTool { message: String, output: String },

    #[error("storage {operation} failed for {path}")]
    Storage {
        operation: &'static str,
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("document edit failed for {path}")]
    Document {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("update of {contract} failed while {stage}{}", version_suffix(.version))]
    Update {
        stage: UpdateStage,
        contract: String,
        version: Option<Version>,
        #[source]
        source: Box<TemplateError>,
    },
}

fn version_suffix(version: &Option<Version>) -> String {
    match version {
        Some(version) => format!(" (version {version})"),
        None => String::new(),
    }
}

impl TemplateError {
    pub fn validation(message: impl Into<String>) -> Self {
        TemplateError::Validation(message.into())
    }

    pub fn storage(operation: &'static str, path: impl Into<String>, source: StoreError) -> Self {
        TemplateError::Storage {
            operation,
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TemplateError::Validation(_) => ErrorKind::Validation,
            TemplateError::Conflict { .. } => ErrorKind::Conflict,
            TemplateError::NotFound(_) => ErrorKind::NotFound,
            TemplateError::ExternalTool { .. } => ErrorKind::ExternalTool,
            TemplateError::Storage { .. } => ErrorKind::Storage,
            TemplateError::Document { .. } => ErrorKind::Document,
            TemplateError::Update { source, .. } => source.kind(),
        }
    }
}
