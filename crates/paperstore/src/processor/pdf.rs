//! PDF reading with lopdf: first-pages text and the document info dictionary.
//!
//! lopdf is only ever driven from the extraction worker thread.

use lopdf::{Dictionary, Document, Object};

use crate::error::ProcessError;

/// Title and authors from a PDF's `Info` dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfInfo {
    pub title: Option<String>,
    pub authors: Vec<String>,
}

/// Extracts the text of the first `max_pages` pages.
///
/// Fails if the bytes are not a readable PDF or the pages carry no text.
pub fn extract_first_pages(bytes: &[u8], max_pages: usize) -> Result<String, ProcessError> {
    let _span = tracing::info_span!("processor.pdf", max_pages).entered();

    let doc = Document::load_mem(bytes)
        .map_err(|e| ProcessError::PdfProcessing(format!("Failed to load PDF: {}", e)))?;

    let mut text = String::new();
    for (page_num, _) in doc.get_pages().into_iter().take(max_pages) {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => tracing::debug!(page_num, error = %e, "Skipping page without text"),
        }
    }

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(ProcessError::NoText { pages: max_pages });
    }
    Ok(text)
}

/// Reads Title and Author from the `Info` dictionary. Author is split on `;`.
pub fn read_info(bytes: &[u8]) -> Result<PdfInfo, ProcessError> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| ProcessError::PdfProcessing(format!("Failed to load PDF: {}", e)))?;

    let Some(info) = info_dictionary(&doc) else {
        return Ok(PdfInfo::default());
    };

    let title = text_entry(info, b"Title");
    let authors = text_entry(info, b"Author")
        .map(|raw| {
            raw.split(';')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(PdfInfo { title, authors })
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        },
        _ => None,
    }
}

fn text_entry(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::String(bytes, _) => {
            let text = decode_pdf_string(bytes);
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        _ => None,
    }
}

/// Decodes a PDF text string: UTF-16BE when it carries a BOM, otherwise
/// a byte-per-character encoding.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
