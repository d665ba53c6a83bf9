//! PDF text extraction using pdf-extract

use docchat_core::{DocChatError, Result};
use std::path::Path;

/// Extract the plain text content of a PDF file.
///
/// A PDF that yields no text at all (scanned images, empty file) is an
/// extraction error: there is nothing to index, and retrying cannot
/// change that.
pub fn extract_pdf_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| {
        DocChatError::Extraction(format!("failed to read {}: {e}", path.display()))
    })?;

    let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
        DocChatError::Extraction(format!("failed to parse {}: {e}", path.display()))
    })?;

    if text.trim().is_empty() {
        return Err(DocChatError::Extraction(format!(
            "{} contains no extractable text",
            path.display()
        )));
    }

    tracing::debug!(path = %path.display(), bytes = text.len(), "extracted PDF text");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_is_extraction_error() {
        let err = extract_pdf_text(Path::new("/nonexistent/file.pdf")).unwrap_err();
        assert!(matches!(err, DocChatError::Extraction(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_garbage_bytes_are_extraction_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"this is not a pdf").unwrap();

        let err = extract_pdf_text(file.path()).unwrap_err();
        assert!(matches!(err, DocChatError::Extraction(_)));
    }
}
