//! PDF text extraction with a two-library fallback chain.
//!
//! `pdf-extract` runs first against a temporary copy of the upload; when it
//! errors or finds no text, `lopdf` extracts page by page from memory. The
//! temporary file is removed on every path when its guard drops.

use serde::Serialize;
use std::io::Write;

/// Magic bytes every PDF starts with.
const PDF_MAGIC: &[u8] = b"%PDF";

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("file is not a PDF (missing %PDF header)")]
    NotPdf,

    #[error("file is empty")]
    Empty,

    #[error("no extractable text; the PDF may be a scanned (image-only) document")]
    Scanned {
        primary: String,
        fallback: String,
    },

    #[error("failed to stage PDF for extraction: {0}")]
    Io(#[from] std::io::Error),
}

/// Which library produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Extractor {
    PdfExtract,
    Lopdf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfMetadata {
    pub pages: usize,
    pub characters: usize,
    pub extractor: Extractor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfExtraction {
    pub text: String,
    pub metadata: PdfMetadata,
}

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Extract the text of a PDF held in memory.
pub fn extract_pdf(bytes: &[u8]) -> Result<PdfExtraction, PdfError> {
    if bytes.is_empty() {
        return Err(PdfError::Empty);
    }
    if !is_pdf(bytes) {
        return Err(PdfError::NotPdf);
    }
    let pages = page_count(bytes);

    let primary_err = match extract_primary(bytes) {
        Ok(text) if !text.trim().is_empty() => {
            return Ok(finish(text, pages, Extractor::PdfExtract));
        }
        Ok(_) => "no text found".to_string(),
        Err(Attempt::Io(e)) => return Err(PdfError::Io(e)),
        Err(Attempt::Failed(reason)) => reason,
    };
    tracing::warn!("pdf-extract failed ({}), trying lopdf", primary_err);

    match extract_fallback(bytes) {
        Ok(text) if !text.trim().is_empty() => Ok(finish(text, pages, Extractor::Lopdf)),
        Ok(_) => Err(PdfError::Scanned {
            primary: primary_err,
            fallback: "no text found".to_string(),
        }),
        Err(fallback) => {
            tracing::warn!("lopdf failed: {}", fallback);
            Err(PdfError::Scanned {
                primary: primary_err,
                fallback,
            })
        }
    }
}

/// Why the first extractor gave up. Staging errors abort extraction; a
/// failure inside pdf-extract only moves on to the fallback.
#[derive(Debug)]
enum Attempt {
    Io(std::io::Error),
    Failed(String),
}

impl From<std::io::Error> for Attempt {
    fn from(e: std::io::Error) -> Self {
        Attempt::Io(e)
    }
}

fn extract_primary(bytes: &[u8]) -> Result<String, Attempt> {
    let mut staged = tempfile::Builder::new()
        .prefix("courseconnect-")
        .suffix(".pdf")
        .tempfile()?;
    staged.write_all(bytes)?;
    staged.flush()?;

    // pdf-extract panics on some malformed inputs; treat a panic as a failed attempt.
    let path = staged.path().to_path_buf();
    let result = std::panic::catch_unwind(move || pdf_extract::extract_text(&path));
    match result {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(Attempt::Failed(e.to_string())),
        Err(_) => Err(Attempt::Failed("pdf-extract panicked".to_string())),
    }
    // `staged` drops here and deletes the temporary file
}

fn extract_fallback(bytes: &[u8]) -> Result<String, String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| e.to_string())?;
    let mut out = String::new();
    for page in doc.get_pages().keys() {
        match doc.extract_text(&[*page]) {
            Ok(text) => {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&text);
            }
            Err(e) => tracing::debug!("lopdf skipped page {}: {}", page, e),
        }
    }
    Ok(out)
}

fn page_count(bytes: &[u8]) -> usize {
    lopdf::Document::load_mem(bytes)
        .map(|doc| doc.get_pages().len())
        .unwrap_or(0)
}

fn finish(raw: String, pages: usize, extractor: Extractor) -> PdfExtraction {
    let text = normalize_text(&raw);
    PdfExtraction {
        metadata: PdfMetadata {
            pages,
            characters: text.chars().count(),
            extractor,
        },
        text,
    }
}

/// CRLF to LF, trailing spaces trimmed, runs of blank lines collapsed to one.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;
    for line in raw.replace("\r\n", "\n").replace('\r', "\n").lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}
