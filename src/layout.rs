//! Typed object names for the persisted layout.
//!
//! Centralizing name construction keeps the lock, allocator and artifact store
//! agreeing on where things live.
use crate::domain::{ContractName, Version};
use regex::Regex;
use std::sync::OnceLock;

pub const DOCX_EXTENSION: &str = "docx";
pub const PDF_EXTENSION: &str = "pdf";
const CONTRACTS_DIR: &str = "contratos";
const LOCKS_DIR: &str = "locks";

/// Object names inside the templates and output containers.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    templates_container: String,
    output_container: String,
}

impl StorageLayout {
    pub fn new(templates_container: &str, output_container: &str) -> Self {
        Self {
            templates_container: templates_container.to_string(),
            output_container: output_container.to_string(),
        }
    }

    pub fn templates_container(&self) -> &str {
        &self.templates_container
    }

    pub fn output_container(&self) -> &str {
        &self.output_container
    }

    /// `{key}.docx` in the templates container.
    pub fn current_template_name(&self, contract: &ContractName) -> String {
        format!("{}.{DOCX_EXTENSION}", contract.key())
    }

    /// `contratos/{key}/` in the output container.
    pub fn contract_prefix(&self, contract: &ContractName) -> String {
        format!("{CONTRACTS_DIR}/{}/", contract.key())
    }

    /// `contratos/{key}/v{n}/{file_name}` in the output container.
    pub fn artifact_name(
        &self,
        contract: &ContractName,
        version: Version,
        file_name: &str,
    ) -> String {
        format!("{}{version}/{file_name}", self.contract_prefix(contract))
    }

    /// `{key}.{extension}`, the file name both artifacts share.
    pub fn artifact_file_name(&self, contract: &ContractName, extension: &str) -> String {
        format!("{}.{extension}", contract.key())
    }

    /// Artifact location as reported to callers, container included.
    pub fn artifact_display_path(
        &self,
        contract: &ContractName,
        version: Version,
        extension: &str,
    ) -> String {
        let file_name = self.artifact_file_name(contract, extension);
        format!(
            "{}/{}",
            self.output_container,
            self.artifact_name(contract, version, &file_name)
        )
    }

    /// `locks/{sanitized}.lock` in the output container.
    pub fn lock_object_name(&self, lock_key: &str) -> String {
        format!("{LOCKS_DIR}/{}.lock", sanitize_lock_key(lock_key))
    }
}

/// Lock key for serializing updates of one contract.
pub fn contract_lock_key(contract: &ContractName) -> String {
    format!("template-lock:{}", contract.key())
}

/// Replace every character outside `[a-zA-Z0-9_-]` with `_`.
pub fn sanitize_lock_key(lock_key: &str) -> String {
    let trimmed = lock_key.trim();
    if trimmed.is_empty() {
        return "lock".to_string();
    }
    trimmed
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn version_folder_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[vV](\d+)$").expect("version folder regex"))
}

/// Parse the version folder of `name` relative to `prefix`.
///
/// Only `{prefix}v{n}/{file}` matches; anything else (loose files under the
/// prefix, malformed or zero versions, numbers that overflow) yields `None`.
pub fn parse_version_folder(prefix: &str, name: &str) -> Option<Version> {
    let rest = name.strip_prefix(prefix)?;
    let (folder, file) = rest.split_once('/')?;
    if file.is_empty() {
        return None;
    }
    let captures = version_folder_regex().captures(folder)?;
    let number = captures.get(1)?.as_str().parse::<u32>().ok()?;
    Version::new(number).ok()
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
