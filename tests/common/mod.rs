//! Shared harness for driving the `ctpl` binary in a scratch directory.
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Stand-in for `soffice --convert-to pdf`: writes `{stem}.pdf` into `--outdir`.
pub const FAKE_SOFFICE: &str = r#"outdir=""
input=""
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    *) input="$1"; shift ;;
  esac
done
base=$(basename "$input")
base="${base%.*}"
printf '%%PDF-1.4 fake\n' > "$outdir/$base.pdf"
"#;

/// Like [`FAKE_SOFFICE`] but slow enough for concurrent runs to overlap.
pub const SLOW_SOFFICE: &str = r#"sleep 0.3
outdir=""
input=""
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    *) input="$1"; shift ;;
  esac
done
base=$(basename "$input")
base="${base%.*}"
printf '%%PDF-1.4 slow\n' > "$outdir/$base.pdf"
"#;

pub const FAILING_SOFFICE: &str = "echo 'source file could not be loaded' >&2\nexit 1\n";

pub struct Sandbox {
    dir: TempDir,
    config: PathBuf,
}

impl Sandbox {
    /// Scratch store, work dir and config file wired to `soffice_script`.
    pub fn new(soffice_script: &str) -> Self {
        Self::with_lock_budget(soffice_script, 3, 10)
    }

    pub fn with_lock_budget(soffice_script: &str, attempts: u32, backoff_step_ms: u64) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let script = dir.path().join("fake-soffice.sh");
        std::fs::write(&script, soffice_script).expect("write soffice script");
        let config = dir.path().join("config.json");
        let body = serde_json::json!({
            "schema_version": 1,
            "store_root": dir.path().join("store"),
            "work_dir": dir.path().join("work"),
            "soffice_command": format!("sh {}", shell_words::quote(&script.to_string_lossy())),
            "lock_max_attempts": attempts,
            "lock_backoff_step_ms": backoff_step_ms,
        });
        std::fs::write(&config, serde_json::to_vec_pretty(&body).expect("config json"))
            .expect("write config");
        Self { dir, config }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn store_root(&self) -> PathBuf {
        self.dir.path().join("store")
    }

    pub fn write_file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, bytes).expect("write fixture");
        path
    }

    /// `ctpl --config <sandbox config> args...` with a clean environment.
    pub fn ctpl_command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_ctpl"));
        command
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .env_remove("RUST_LOG")
            .env_remove("CTPL_STORE_ROOT")
            .env_remove("CTPL_WORK_DIR")
            .env_remove("CTPL_SOFFICE")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    pub fn ctpl(&self, args: &[&str]) -> Output {
        self.ctpl_command(args).output().expect("run ctpl")
    }
}

pub fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "ctpl failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

pub fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Minimal `.docx` whose body holds `paragraphs`, one run each.
pub fn template_docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|text| format!("<w:p><w:r><w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>"))
        .collect();
    let document = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}<w:sectPr/></w:body></w:document>"
    );
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer
        .start_file("[Content_Types].xml", options)
        .expect("start content types");
    writer
        .write_all(b"<?xml version=\"1.0\"?><Types/>")
        .expect("write content types");
    writer
        .start_file("word/document.xml", options)
        .expect("start document");
    writer.write_all(document.as_bytes()).expect("write document");
    writer.finish().expect("finish docx").into_inner()
}

pub fn document_xml(docx: &[u8]) -> String {
    let mut archive = ZipArchive::new(Cursor::new(docx)).expect("open docx");
    let mut entry = archive.by_name("word/document.xml").expect("main part");
    let mut xml = String::new();
    entry.read_to_string(&mut xml).expect("read main part");
    xml
}
