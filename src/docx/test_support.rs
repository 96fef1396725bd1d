//! In-memory `.docx` fixtures for injector tests.
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const CONTENT_TYPES: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\"/>";

/// Wrap body content in a minimal `w:document`.
pub fn document_xml(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}<w:sectPr/></w:body></w:document>"
    )
}

pub fn docx_with_document(xml: &str) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer
        .start_file("[Content_Types].xml", options)
        .expect("start content types");
    writer
        .write_all(CONTENT_TYPES.as_bytes())
        .expect("write content types");
    writer
        .start_file("word/document.xml", options)
        .expect("start document");
    writer.write_all(xml.as_bytes()).expect("write document");
    writer
        .start_file("word/media/image1.png", options.compression_method(CompressionMethod::Stored))
        .expect("start media");
    writer.write_all(&[0x89, b'P', b'N', b'G']).expect("write media");
    writer.finish().expect("finish").into_inner()
}

pub fn docx_with_body(body: &str) -> Vec<u8> {
    docx_with_document(&document_xml(body))
}

pub fn read_entry(docx: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(docx)).expect("open docx");
    let mut file = archive.by_name(name).expect("entry present");
    let mut data = Vec::new();
    file.read_to_end(&mut data).expect("read entry");
    data
}

pub fn read_document(docx: &[u8]) -> String {
    String::from_utf8(read_entry(docx, "word/document.xml")).expect("utf8 document")
}

/// Paragraph with one run per text, sharing an optional font.
pub fn paragraph(runs: &[&str]) -> String {
    let runs: String = runs
        .iter()
        .map(|text| {
            format!(
                "<w:r><w:rPr><w:rFonts w:ascii=\"Arial\" w:hAnsi=\"Arial\"/><w:sz w:val=\"22\"/></w:rPr>\
                 <w:t xml:space=\"preserve\">{text}</w:t></w:r>"
            )
        })
        .collect();
    format!("<w:p><w:pPr><w:jc w:val=\"both\"/></w:pPr>{runs}</w:p>")
}
