use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

mod allocator;
mod artifacts;
mod cli;
mod config;
mod docx;
mod domain;
mod error;
mod layout;
mod lock;
mod logging;
mod render;
mod service;
mod store;
mod util;

use cli::{Command, ContractArgs, LoadArgs, RootArgs, UpdateArgs};
use config::{AppConfig, ConfigOverrides};
use domain::TemplateUpdate;
use error::TemplateError;
use render::SofficeRenderer;
use service::TemplateService;
use store::FsObjectStore;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    logging::init(args.verbose, args.log_json);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kind = err.downcast_ref::<TemplateError>().map(TemplateError::kind);
            eprintln!("error: {err:#}");
            if kind.is_some_and(|kind| kind.is_retryable()) {
                eprintln!("hint: the contract is busy; retry the update later");
            }
            ExitCode::from(kind.map_or(1, |kind| kind.exit_code()))
        }
    }
}

fn run(args: RootArgs) -> Result<()> {
    let overrides = ConfigOverrides {
        store_root: args.store_root,
        work_dir: args.work_dir,
        soffice_command: args.soffice,
    };
    let file = config::config_file(args.config);
    let config = config::resolve_config(file.as_deref(), &overrides, |key| {
        std::env::var(key).ok()
    })?;
    tracing::debug!(
        config_file = ?file,
        store_root = %config.store_root.display(),
        "configuration resolved"
    );

    match args.command {
        Command::Update(args) => cmd_update(&config, args),
        Command::Exists(args) => cmd_exists(&config, args),
        Command::Load(args) => cmd_load(&config, args),
        Command::Config => print_json(&config),
    }
}

fn build_service(config: &AppConfig) -> Result<TemplateService> {
    let store = FsObjectStore::new(config.store_root.clone());
    tracing::debug!(root = %store.root().display(), "object store opened");
    let renderer = SofficeRenderer::from_command(&config.soffice_command)?;
    Ok(TemplateService::new(
        Arc::new(store),
        config.layout(),
        Arc::new(renderer),
        config.update_settings(),
    ))
}

fn cmd_update(config: &AppConfig, args: UpdateArgs) -> Result<()> {
    let template = std::fs::read(&args.template)
        .with_context(|| format!("read template {}", args.template.display()))?;
    let mut clauses = args.clauses;
    if let Some(path) = &args.clauses_file {
        clauses.extend(read_clauses_file(path)?);
    }
    let update = TemplateUpdate::from_raw(&args.contract, template, &clauses)?;
    let service = build_service(config)?;
    let created = service.update_template(&update)?;
    print_json(&created)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExistsReport<'a> {
    contract_name: &'a str,
    exists: bool,
}

fn cmd_exists(config: &AppConfig, args: ContractArgs) -> Result<()> {
    let service = build_service(config)?;
    let exists = service.template_exists(&args.contract)?;
    print_json(&ExistsReport {
        contract_name: args.contract.trim(),
        exists,
    })
}

fn cmd_load(config: &AppConfig, args: LoadArgs) -> Result<()> {
    let service = build_service(config)?;
    let bytes = service.load_current_template(&args.contract)?;
    match &args.out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            std::fs::write(path, &bytes).with_context(|| format!("write {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = bytes.len(), "current template written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("write template to stdout")?;
            stdout.flush().context("flush stdout")?;
        }
    }
    Ok(())
}

fn read_clauses_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read clauses file {}", path.display()))?;
    let clauses: Vec<String> = serde_json::from_str(&content).with_context(|| {
        format!("parse clauses file {} as a JSON array of strings", path.display())
    })?;
    Ok(clauses)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}
