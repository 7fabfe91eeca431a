//! Text extraction and cleanup for uploaded documents.
//!
//! The cleanup steps run in a fixed order: hyphenated line breaks are joined
//! before blank lines become tabs, and both happen before generic whitespace
//! is collapsed. Any other order corrupts split words or paragraph breaks.

use std::path::Path;
use std::sync::LazyLock;

use parley_core::error::DocumentError;
use regex_lite::Regex;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

static HYPHEN_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\n").expect("valid hyphen-break regex"));

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("valid blank-line regex"));

static NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n").expect("valid newline regex"));

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[\\s\u{a0}\u{1680}\u{2000}-\u{200a}\u{2028}\u{2029}\u{202f}\u{205f}\u{3000}]{2,}")
        .expect("valid whitespace regex")
});

/// Supported document kinds, by filename suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Classify by suffix, case-insensitively. Looks only at the name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("pdf") {
            Some(Self::Pdf)
        } else if ext.eq_ignore_ascii_case("txt") {
            Some(Self::Text)
        } else {
            None
        }
    }
}

/// Clean extracted text into a single line.
///
/// Paragraph breaks survive as tab characters; everything else collapses to
/// single spaces. The result is in NFC. Idempotent.
pub fn normalize_text(raw: &str) -> String {
    let text = HYPHEN_BREAK.replace_all(raw, "");
    let text = BLANK_LINES.replace_all(&text, "\t");
    let text = NEWLINE.replace_all(&text, " ");
    let text = WHITESPACE_RUN.replace_all(&text, " ");
    text.nfc().collect()
}

/// Extract and normalize the text of a `.pdf` or `.txt` file.
///
/// An unsupported suffix fails with [`DocumentError::UnsupportedType`]
/// before the file is touched.
pub fn normalize(path: &Path) -> Result<String, DocumentError> {
    let kind = DocumentKind::from_path(path).ok_or(DocumentError::UnsupportedType)?;
    let raw = match kind {
        DocumentKind::Text => read_text(path)?,
        DocumentKind::Pdf => read_pdf(path)?,
    };

    let text = normalize_text(&raw);
    debug!(path = %path.display(), ?kind, raw_len = raw.len(), len = text.len(), "Document normalized");
    Ok(text)
}

/// Async wrapper running extraction on a blocking thread.
pub async fn normalize_file(path: &Path) -> Result<String, DocumentError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || normalize(&owned))
        .await
        .map_err(|e| DocumentError::Extraction {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, DocumentError> {
    std::fs::read(path).map_err(|e| DocumentError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Extract the text layer of a PDF. A malformed file is an extraction error,
/// including one that makes the extractor panic.
fn read_pdf(path: &Path) -> Result<String, DocumentError> {
    let bytes = read_bytes(path)?;
    let extraction_error = |reason: String| DocumentError::Extraction {
        path: path.display().to_string(),
        reason,
    };
    std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes))
        .map_err(|_| extraction_error("PDF extractor panicked".into()))?
        .map_err(|e| extraction_error(e.to_string()))
}

/// Read a text file with universal newlines.
fn read_text(path: &Path) -> Result<String, DocumentError> {
    let bytes = read_bytes(path)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.replace("\r\n", "\n").replace('\r', "\n"))
}
