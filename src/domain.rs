//! Contract, version and clause value types.
//!
//! Construction validates; once built, values are immutable and every derived
//! storage key is path-safe regardless of what the caller typed.
use crate::error::{Result, TemplateError};
use serde::Serialize;
use std::fmt;

/// A contract family as named by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractName {
    value: String,
    key: String,
}

impl ContractName {
    pub fn new(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(TemplateError::validation("contract name must not be empty"));
        }
        let key = normalize_key(value);
        if key.is_empty() {
            return Err(TemplateError::validation(format!(
                "contract name {value:?} has no characters usable in a storage key"
            )));
        }
        Ok(Self {
            value: value.to_string(),
            key,
        })
    }

    /// Trimmed display value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Normalized key used for storage paths and lock names.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Lower-case, fold accents to their base letter, collapse whitespace runs to
/// `-`, then keep only `[a-z0-9_-]`.
fn normalize_key(value: &str) -> String {
    let mut key = String::with_capacity(value.len());
    let mut in_space = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !in_space {
                key.push('-');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        for lower in ch.to_lowercase() {
            let folded = fold_accent(lower);
            if is_key_char(folded) {
                key.push(folded);
            }
        }
    }
    key
}

fn is_key_char(ch: char) -> bool {
    ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-'
}

fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// Positive version number, rendered as `v{n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u32);

impl Version {
    pub const FIRST: Version = Version(1);

    pub fn new(number: u32) -> Result<Self> {
        if number < 1 {
            return Err(TemplateError::validation("version must be >= 1"));
        }
        Ok(Self(number))
    }

    pub fn number(self) -> u32 {
        self.0
    }

    /// The version following `self`.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One extra clause supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause(String);

impl Clause {
    pub fn new(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TemplateError::validation("clause must not be blank"));
        }
        Ok(Self(text.to_string()))
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

/// Validated input of one update request.
#[derive(Debug, Clone)]
pub struct TemplateUpdate {
    pub contract: ContractName,
    pub template_docx: Vec<u8>,
    pub clauses: Vec<Clause>,
}

impl TemplateUpdate {
    /// Validate raw inbound values before any I/O happens.
    pub fn from_raw(
        contract: &str,
        template_docx: Vec<u8>,
        clause_texts: &[String],
    ) -> Result<Self> {
        let contract = ContractName::new(contract)?;
        if template_docx.is_empty() {
            return Err(TemplateError::validation("template document must not be empty"));
        }
        let clauses = clause_texts
            .iter()
            .enumerate()
            .map(|(idx, text)| {
                Clause::new(text).map_err(|_| {
                    TemplateError::validation(format!("clause #{} must not be blank", idx + 1))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            contract,
            template_docx,
            clauses,
        })
    }
}

/// Result of one successful update; produced once and never mutated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersionCreated {
    pub contract_name: String,
    pub contract_key: String,
    pub version: Version,
    pub docx_path: String,
    pub pdf_path: String,
    pub clauses_applied: u32,
    pub placeholder_found: bool,
}

#[cfg(test)]
#[path = "domain_tests.rs"]
mod tests;
