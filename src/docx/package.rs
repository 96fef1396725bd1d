//! OOXML package (zip) access for `.docx` files.
//!
//! Entries are read fully into memory and written back in their original
//! order; only the main document part is ever replaced.
use anyhow::{anyhow, Context, Result};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";

#[derive(Debug, Clone)]
struct PackageEntry {
    name: String,
    is_dir: bool,
    stored: bool,
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct DocxPackage {
    entries: Vec<PackageEntry>,
}

impl DocxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).context("read document package")?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .with_context(|| format!("read package entry #{index}"))?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)
                .with_context(|| format!("decompress package entry {}", file.name()))?;
            entries.push(PackageEntry {
                name: file.name().to_string(),
                is_dir: file.is_dir(),
                stored: file.compression() == CompressionMethod::Stored,
                data,
            });
        }
        let package = Self { entries };
        if package.entry(MAIN_DOCUMENT_PART).is_none() {
            return Err(anyhow!(
                "package has no {MAIN_DOCUMENT_PART}; not a WordprocessingML document"
            ));
        }
        Ok(package)
    }

    fn entry(&self, name: &str) -> Option<&PackageEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn main_document(&self) -> Result<String> {
        let entry = self
            .entry(MAIN_DOCUMENT_PART)
            .ok_or_else(|| anyhow!("package has no {MAIN_DOCUMENT_PART}"))?;
        String::from_utf8(entry.data.clone())
            .with_context(|| format!("{MAIN_DOCUMENT_PART} is not valid UTF-8"))
    }

    pub fn set_main_document(&mut self, xml: String) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.name == MAIN_DOCUMENT_PART)
            .ok_or_else(|| anyhow!("package has no {MAIN_DOCUMENT_PART}"))?;
        entry.data = xml.into_bytes();
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &self.entries {
            let method = if entry.stored {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflated
            };
            let options = SimpleFileOptions::default().compression_method(method);
            if entry.is_dir {
                writer
                    .add_directory(entry.name.as_str(), options)
                    .with_context(|| format!("write package directory {}", entry.name))?;
                continue;
            }
            writer
                .start_file(entry.name.as_str(), options)
                .with_context(|| format!("write package entry {}", entry.name))?;
            writer
                .write_all(&entry.data)
                .with_context(|| format!("write package entry {}", entry.name))?;
        }
        let cursor = writer.finish().context("finish document package")?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
#[path = "package_tests.rs"]
mod tests;
