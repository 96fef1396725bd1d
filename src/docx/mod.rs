//! Editable contract documents (`.docx`).
//!
//! The only edit supported is injecting extra clauses at the
//! `{{CLAUSULAS_EXTRAS}}` placeholder. When the placeholder is absent the
//! output is a byte-for-byte copy of the input.
mod inject;
mod package;
#[cfg(test)]
pub(crate) mod test_support;
mod xml;

pub use inject::{InjectionOutcome, PLACEHOLDER};

use crate::error::{Result, TemplateError};
use anyhow::Context;
use package::DocxPackage;
use std::fs;
use std::path::Path;

/// Inject `clauses` into the document at `source` and write it to `target`.
pub fn apply_extra_clauses<S: AsRef<str>>(
    source: &Path,
    target: &Path,
    clauses: &[S],
) -> Result<InjectionOutcome> {
    apply(source, target, clauses).map_err(|err| TemplateError::Document {
        path: source.display().to_string(),
        source: err,
    })
}

fn apply<S: AsRef<str>>(
    source: &Path,
    target: &Path,
    clauses: &[S],
) -> anyhow::Result<InjectionOutcome> {
    let original = fs::read(source).with_context(|| format!("read {}", source.display()))?;
    let (rewritten, outcome) = inject_into_bytes(&original, clauses)?;
    let output = rewritten.as_deref().unwrap_or(&original);
    if let Some(parent) = target.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(target, output).with_context(|| format!("write {}", target.display()))?;

    match outcome {
        InjectionOutcome::Injected {
            first_number,
            clauses,
            rebuilt_paragraph,
        } => {
            if rebuilt_paragraph {
                tracing::warn!(
                    path = %source.display(),
                    "placeholder split across runs; paragraph runs were rebuilt"
                );
            }
            tracing::info!(first_number, clauses, path = %target.display(), "clauses injected");
        }
        InjectionOutcome::PlaceholderMissing => {
            tracing::warn!(
                path = %source.display(),
                placeholder = PLACEHOLDER,
                "placeholder not found; document copied unchanged"
            );
        }
    }
    Ok(outcome)
}

/// Returns the rewritten package, or `None` when nothing had to change.
pub fn inject_into_bytes<S: AsRef<str>>(
    docx: &[u8],
    clauses: &[S],
) -> anyhow::Result<(Option<Vec<u8>>, InjectionOutcome)> {
    let mut package = DocxPackage::from_bytes(docx)?;
    let main = package.main_document()?;
    let mut document = xml::parse(&main).context("parse main document part")?;
    let outcome = inject::inject_clauses(&mut document, clauses)?;
    if outcome == InjectionOutcome::PlaceholderMissing {
        return Ok((None, outcome));
    }
    package.set_main_document(document.to_xml())?;
    Ok((Some(package.to_bytes()?), outcome))
}
