//! Text extraction for binary documents found in the staging directory.
//!
//! PDF goes through `pdf-extract`; DOCX is a zip of OOXML parts from which
//! the `<w:t>` runs of `word/document.xml` are collected.

use std::io::Read;

use thiserror::Error;

/// Maximum decompressed bytes read from a single zip entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Binary formats that need extraction before indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFormat {
    Pdf,
    Docx,
}

impl BinaryFormat {
    /// Format for a file extension, or `None` for plain text.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(BinaryFormat::Pdf),
            "docx" => Some(BinaryFormat::Docx),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Extract plain UTF-8 text from `bytes`.
pub fn extract_text(bytes: &[u8], format: BinaryFormat) -> Result<String, ExtractError> {
    match format {
        BinaryFormat::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        BinaryFormat::Docx => extract_docx(bytes),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_w_t_elements(&doc_xml)
}

/// Concatenate `<w:t>` text runs, starting a new line at each `</w:p>`.
fn extract_w_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                in_text = true;
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}
