//! Text extraction: turns an uploaded document into normalized plain text.
//!
//! Backends are keyed by lowercased file-type tag. Only PDF is registered today;
//! everything else is reported as unsupported.

pub mod pdf;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use self::pdf::PdfExtractor;

/// Line placed between the text of consecutive pages.
pub fn page_marker(page_number: usize) -> String {
    format!("--- Page {page_number} ---")
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("failed to extract text: {0}")]
    ExtractionFailed(String),

    #[error("no text content found in document")]
    NoTextFound,
}

/// A document-to-text backend for one file type.
///
/// Extraction is CPU-bound and synchronous; callers run it on the blocking pool.
pub trait TextExtractor: Send + Sync {
    /// Returns raw per-page text, in page order.
    fn extract_pages(&self, data: &[u8]) -> Result<Vec<String>, ExtractError>;

    /// Normalized document text with page markers between non-blank pages.
    fn extract(&self, data: &[u8]) -> Result<String, ExtractError> {
        join_pages(&self.extract_pages(data)?)
    }
}

/// Dispatch table from file-type tag to extractor.
#[derive(Clone)]
pub struct ExtractorRegistry {
    backends: HashMap<String, Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    pub fn register(mut self, file_type: &str, extractor: Arc<dyn TextExtractor>) -> Self {
        self.backends.insert(canonical_type(file_type), extractor);
        self
    }

    pub fn get(&self, file_type: &str) -> Result<Arc<dyn TextExtractor>, ExtractError> {
        self.backends
            .get(&canonical_type(file_type))
            .cloned()
            .ok_or_else(|| ExtractError::UnsupportedType(file_type.to_string()))
    }

}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::empty().register("pdf", Arc::new(PdfExtractor))
    }
}

/// "PDF", ".pdf" and "pdf" all name the same backend.
fn canonical_type(file_type: &str) -> String {
    file_type.trim().trim_start_matches('.').to_lowercase()
}

/// Normalizes each page, drops blank pages and joins the rest with page markers.
/// Page numbers in markers are the 1-based position in the source document.
pub fn join_pages(pages: &[String]) -> Result<String, ExtractError> {
    let mut out = String::new();
    for (index, page) in pages.iter().enumerate() {
        let text = normalize_text(page);
        if text.is_empty() {
            continue;
        }
        if index > 0 && !out.is_empty() {
            out.push('\n');
            out.push_str(&page_marker(index + 1));
            out.push('\n');
        }
        out.push_str(&text);
    }

    if out.is_empty() {
        return Err(ExtractError::NoTextFound);
    }
    Ok(out)
}

/// CR/CRLF become LF, control characters other than whitespace (NUL included)
/// are removed, blank lines are dropped, whitespace runs inside a line collapse
/// to one space, and the result is trimmed.
pub fn normalize_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect::<String>()
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
