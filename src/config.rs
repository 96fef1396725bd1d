//! Runtime configuration.
//!
//! Values resolve in layers: built-in defaults, then an optional JSON file,
//! then `CTPL_*` environment variables, then command-line flags.
use crate::layout::StorageLayout;
use crate::lock::LockPolicy;
use crate::service::UpdateSettings;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
const CONFIG_DIR_NAME: &str = "contract-templates";
const CONFIG_FILE_NAME: &str = "config.json";

pub const ENV_STORE_ROOT: &str = "CTPL_STORE_ROOT";
pub const ENV_WORK_DIR: &str = "CTPL_WORK_DIR";
pub const ENV_SOFFICE: &str = "CTPL_SOFFICE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub schema_version: u32,
    /// Root directory of the filesystem object store.
    pub store_root: PathBuf,
    pub templates_container: String,
    pub output_container: String,
    pub work_dir: PathBuf,
    /// Shell-style command line; extra arguments are passed before the
    /// conversion flags.
    pub soffice_command: String,
    pub lock_ttl_secs: u64,
    pub lock_max_attempts: u32,
    pub lock_backoff_step_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let policy = LockPolicy::default();
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            store_root: PathBuf::from("out/store"),
            templates_container: "templates".to_string(),
            output_container: "output".to_string(),
            work_dir: PathBuf::from("out/work"),
            soffice_command: "/usr/bin/soffice".to_string(),
            lock_ttl_secs: 60,
            lock_max_attempts: policy.max_attempts,
            lock_backoff_step_ms: u64::try_from(policy.backoff_step.as_millis()).unwrap_or(200),
        }
    }
}

impl AppConfig {
    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(&self.templates_container, &self.output_container)
    }

    pub fn update_settings(&self) -> UpdateSettings {
        UpdateSettings {
            work_dir: self.work_dir.clone(),
            lock_ttl: Duration::from_secs(self.lock_ttl_secs),
            lock_policy: LockPolicy {
                max_attempts: self.lock_max_attempts,
                backoff_step: Duration::from_millis(self.lock_backoff_step_ms),
            },
        }
    }
}

/// Values supplied on the command line; `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub store_root: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub soffice_command: Option<String>,
}

/// `$XDG_CONFIG_HOME/contract-templates/config.json` (or the platform
/// equivalent).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// The file to load: an explicit path always wins, the default location is
/// used only when it exists.
pub fn config_file(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| default_config_path().filter(|path| path.is_file()))
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: AppConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    Ok(config)
}

pub fn resolve_config(
    file: Option<&Path>,
    overrides: &ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig> {
    let mut config = match file {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    let env_value = |key: &str| env(key).filter(|value| !value.trim().is_empty());
    if let Some(value) = env_value(ENV_STORE_ROOT) {
        config.store_root = PathBuf::from(value);
    }
    if let Some(value) = env_value(ENV_WORK_DIR) {
        config.work_dir = PathBuf::from(value);
    }
    if let Some(value) = env_value(ENV_SOFFICE) {
        config.soffice_command = value;
    }

    if let Some(path) = &overrides.store_root {
        config.store_root = path.clone();
    }
    if let Some(path) = &overrides.work_dir {
        config.work_dir = path.clone();
    }
    if let Some(command) = &overrides.soffice_command {
        config.soffice_command = command.clone();
    }

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.store_root.as_os_str().is_empty() {
        return Err(anyhow!("store_root must be non-empty"));
    }
    if config.work_dir.as_os_str().is_empty() {
        return Err(anyhow!("work_dir must be non-empty"));
    }
    validate_container(&config.templates_container, "templates_container")?;
    validate_container(&config.output_container, "output_container")?;
    if config.lock_max_attempts == 0 {
        return Err(anyhow!("lock_max_attempts must be at least 1"));
    }
    let argv = shell_words::split(&config.soffice_command)
        .with_context(|| format!("parse soffice_command {:?}", config.soffice_command))?;
    if argv.is_empty() {
        return Err(anyhow!("soffice_command must be non-empty"));
    }
    Ok(())
}

fn validate_container(name: &str, label: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-');
    if !valid {
        return Err(anyhow!(
            "{label} must be non-empty and use only [a-z0-9-] (got {name:?})"
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
