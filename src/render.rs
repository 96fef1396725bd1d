//! PDF rendering through an external office suite.
//!
//! Each conversion runs headless with a throwaway user profile so concurrent
//! conversions never share LibreOffice state.
use crate::error::{Result, TemplateError};
use crate::util::truncate_bytes;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Instant;

const MAX_TOOL_OUTPUT_BYTES: usize = 4096;

pub trait Renderer: Send + Sync {
    /// Convert `editable` to PDF inside `out_dir` and return the PDF path.
    fn convert(&self, editable: &Path, out_dir: &Path) -> Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct SofficeRenderer {
    program: PathBuf,
    base_args: Vec<String>,
}

impl SofficeRenderer {
    /// Build from a shell-style command line such as `/usr/bin/soffice` or
    /// `flatpak run org.libreoffice.LibreOffice`.
    pub fn from_command(command: &str) -> Result<Self> {
        let mut argv = shell_words::split(command).map_err(|err| {
            TemplateError::validation(format!("parse renderer command {command:?}: {err}"))
        })?;
        if argv.is_empty() {
            return Err(TemplateError::validation("renderer command is empty"));
        }
        let program = argv.remove(0);
        Ok(Self {
            program: resolve_program(&program),
            base_args: argv,
        })
    }
}

/// Bare names are looked up on `PATH`; anything with a separator is used as is.
fn resolve_program(program: &str) -> PathBuf {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.to_path_buf();
    }
    which::which(program).unwrap_or_else(|_| path.to_path_buf())
}

fn combined_output(output: &Output) -> String {
    let mut bytes = output.stdout.clone();
    if !output.stderr.is_empty() {
        if !bytes.is_empty() && !bytes.ends_with(b"\n") {
            bytes.push(b'\n');
        }
        bytes.extend_from_slice(&output.stderr);
    }
    truncate_bytes(&bytes, MAX_TOOL_OUTPUT_BYTES)
        .trim_end()
        .to_string()
}

/// A PDF left by an earlier attempt must not pass for this conversion's output.
fn remove_stale_output(expected: &Path) -> Result<()> {
    match std::fs::remove_file(expected) {
        Ok(()) => {
            tracing::debug!(path = %expected.display(), "removed stale rendered output");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(TemplateError::ExternalTool {
            message: format!("remove stale output {}", expected.display()),
            output: err.to_string(),
        }),
    }
}

impl Renderer for SofficeRenderer {
    fn convert(&self, editable: &Path, out_dir: &Path) -> Result<PathBuf> {
        let stem = editable
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| {
                TemplateError::validation(format!(
                    "editable document {} has no usable file name",
                    editable.display()
                ))
            })?;
        let expected = out_dir.join(format!("{stem}.pdf"));
        remove_stale_output(&expected)?;

        let profile = tempfile::Builder::new()
            .prefix("soffice-profile-")
            .tempdir()
            .map_err(|err| TemplateError::ExternalTool {
                message: "create renderer profile directory".to_string(),
                output: err.to_string(),
            })?;

        let start = Instant::now();
        let output = Command::new(&self.program)
            .args(&self.base_args)
            .args([
                "--headless",
                "--nologo",
                "--nolockcheck",
                "--nodefault",
                "--nofirststartwizard",
            ])
            .arg(format!(
                "-env:UserInstallation=file://{}",
                profile.path().display()
            ))
            .args(["--convert-to", "pdf", "--outdir"])
            .arg(out_dir)
            .arg(editable)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| TemplateError::ExternalTool {
                message: format!("failed to start renderer {}", self.program.display()),
                output: err.to_string(),
            })?;
        let elapsed_ms = start.elapsed().as_millis();
        let combined = combined_output(&output);

        tracing::info!(
            elapsed_ms,
            status = %output.status,
            input = %editable.display(),
            "renderer finished"
        );
        if !combined.is_empty() {
            tracing::debug!(output = %combined, "renderer output");
        }

        if !output.status.success() {
            return Err(TemplateError::ExternalTool {
                message: format!("renderer exited with {}", output.status),
                output: combined,
            });
        }
        if !expected.is_file() {
            return Err(TemplateError::ExternalTool {
                message: format!("renderer did not produce {}", expected.display()),
                output: combined,
            });
        }
        Ok(expected)
    }
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
