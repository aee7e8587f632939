use std::panic::{self, AssertUnwindSafe};

use tracing::debug;

use super::{ExtractError, TextExtractor};

/// PDF backend built on `pdf-extract`.
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract_pages(&self, data: &[u8]) -> Result<Vec<String>, ExtractError> {
        if !data.starts_with(b"%PDF") {
            return Err(ExtractError::ExtractionFailed(
                "file is not a PDF document".to_string(),
            ));
        }

        // pdf-extract panics on some malformed documents instead of returning an error.
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(data)
        }));

        match result {
            Ok(Ok(pages)) => {
                debug!("Extracted {} PDF page(s)", pages.len());
                Ok(pages)
            }
            Ok(Err(e)) => Err(ExtractError::ExtractionFailed(format!(
                "failed to parse PDF: {e:?}"
            ))),
            Err(_) => Err(ExtractError::ExtractionFailed(
                "PDF parser aborted on malformed input".to_string(),
            )),
        }
    }
}

/// Builds a minimal, valid PDF with one Helvetica text line per page.
#[cfg(test)]
pub(crate) fn build_test_pdf(pages: &[&str]) -> Vec<u8> {
    let page_count = pages.len();
    let mut objects: Vec<String> = Vec::new();

    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    let kids = (0..page_count)
        .map(|i| format!("{} 0 R", 4 + i * 2))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!(
        "<< /Type /Pages /Kids [{kids}] /Count {page_count} >>"
    ));
    objects.push(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    );
    for (i, text) in pages.iter().enumerate() {
        let content_id = 5 + i * 2;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>"
        ));
        let stream = format!("BT /F1 18 Tf 72 720 Td ({text}) Tj ET");
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}\nendstream",
            stream.len()
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref_offset = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        xref.push_str(&format!("{offset:010} 00000 n \n"));
    }
    xref.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    ));
    out.extend_from_slice(xref.as_bytes());
    out
}
