use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor: Send + Sync {
    /// One entry per page in page order; pages without text yield empty text.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let label = path.display().to_string();
        let document =
            Document::load(path).map_err(|error| IngestError::invalid_document(&label, error))?;

        let pages = document.get_pages();
        if pages.is_empty() {
            return Err(IngestError::invalid_document(label, "pdf has no pages"));
        }

        let mut extracted = Vec::with_capacity(pages.len());
        for page_no in pages.keys() {
            let text = document
                .extract_text(&[*page_no])
                .map_err(|error| {
                    IngestError::invalid_document(&label, format!("page {page_no}: {error}"))
                })?;

            extracted.push(PageText {
                number: *page_no,
                text,
            });
        }

        Ok(extracted)
    }
}
