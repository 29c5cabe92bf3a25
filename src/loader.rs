//! Source document loading.
//!
//! Turns a file on disk into [`Document`]s ready for chunking:
//!
//! - `.pdf`: one document per page (1-based page numbers), text extracted
//!   with `pdf-extract`. Blank pages are skipped.
//! - anything else: read as UTF-8 text and returned as a single document.
//!
//! Failures never panic; they surface as [`RagError::Document`] and the
//! ingestion run stops before touching the index.

use std::path::Path;

use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::Document;

pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let bytes = std::fs::read(path).map_err(|e| doc_error(path, e.to_string()))?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let docs = if is_pdf(path) {
        extract_pdf_pages(&bytes)
            .map_err(|e| doc_error(path, e))?
            .into_iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, text)| Document {
                id: Uuid::new_v4().to_string(),
                source: source.clone(),
                page: Some(i as u32 + 1),
                text,
            })
            .collect()
    } else {
        let text = String::from_utf8(bytes)
            .map_err(|_| doc_error(path, "file is not valid UTF-8 text".to_string()))?;
        let text = text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text);
        if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![Document {
                id: Uuid::new_v4().to_string(),
                source,
                page: None,
                text,
            }]
        }
    };

    tracing::info!(path = %path.display(), documents = docs.len(), "loaded source");
    Ok(docs)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn extract_pdf_pages(bytes: &[u8]) -> std::result::Result<Vec<String>, String> {
    pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| format!("PDF extraction failed: {}", e))
}

fn doc_error(path: &Path, message: String) -> RagError {
    RagError::Document {
        path: path.display().to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_text_file_is_one_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.md");
        std::fs::write(&path, "Health is wealth.\n\nWHO defines health broadly.").unwrap();

        let docs = load_documents(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "notes.md");
        assert_eq!(docs[0].page, None);
        assert!(docs[0].text.starts_with("Health is wealth."));
    }

    #[test]
    fn test_byte_order_mark_stripped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bom.txt");
        std::fs::write(&path, "\u{feff}Hello").unwrap();
        assert_eq!(load_documents(&path).unwrap()[0].text, "Hello");
    }

    #[test]
    fn test_blank_file_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.txt");
        std::fs::write(&path, " \n\n ").unwrap();
        assert!(load_documents(&path).unwrap().is_empty());
    }

    #[test]
    fn test_binary_text_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x80]).unwrap();
        let err = load_documents(&path).unwrap_err();
        assert!(matches!(err, RagError::Document { .. }));
    }

    #[test]
    fn test_invalid_pdf_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.PDF");
        std::fs::write(&path, b"not a pdf").unwrap();
        let err = load_documents(&path).unwrap_err();
        assert!(err.to_string().contains("PDF extraction failed"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_documents(Path::new("/nonexistent/health_data.pdf")).unwrap_err();
        assert!(matches!(err, RagError::Document { .. }));
    }
}
