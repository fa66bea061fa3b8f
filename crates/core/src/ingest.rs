use crate::error::IngestError;
use crate::extractor::{LopdfExtractor, PageText, PdfExtractor};
use crate::models::{TextUnit, UploadedDocument};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if has_pdf_extension(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

pub fn load_document(path: &Path) -> Result<UploadedDocument, IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;
    Ok(UploadedDocument::new(name, fs::read(path)?))
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Identifies an upload set by file names and contents, in upload order.
pub fn batch_fingerprint(documents: &[UploadedDocument]) -> String {
    let mut hasher = Sha256::new();
    for document in documents {
        hasher.update(document.file_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(digest_bytes(&document.bytes).as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Turns uploaded PDFs into per-page [`TextUnit`]s.
///
/// Each upload is written to a temporary file for the extractor and the file
/// is removed when extraction returns, whether it succeeded or not.
#[derive(Clone)]
pub struct DocumentIngestor {
    extractor: Arc<dyn PdfExtractor>,
    temp_dir: Option<PathBuf>,
}

impl Default for DocumentIngestor {
    fn default() -> Self {
        Self::new(Arc::new(LopdfExtractor))
    }
}

impl DocumentIngestor {
    pub fn new(extractor: Arc<dyn PdfExtractor>) -> Self {
        Self {
            extractor,
            temp_dir: None,
        }
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn ingest(&self, documents: &[UploadedDocument]) -> Result<Vec<TextUnit>, IngestError> {
        let mut units = Vec::new();
        for document in documents {
            units.extend(self.ingest_one(document)?);
        }
        Ok(units)
    }

    fn ingest_one(&self, document: &UploadedDocument) -> Result<Vec<TextUnit>, IngestError> {
        if document.file_name.trim().is_empty() {
            return Err(IngestError::MissingFileName("upload without a name".to_string()));
        }
        if !has_pdf_extension(Path::new(&document.file_name)) {
            return Err(IngestError::invalid_document(
                &document.file_name,
                "only .pdf uploads are accepted",
            ));
        }

        let document_id = digest_bytes(&document.bytes);
        let pages = self
            .extract_via_temp_file(document)
            .map_err(|error| match error {
                IngestError::InvalidDocument { reason, .. } => {
                    IngestError::invalid_document(&document.file_name, reason)
                }
                other => other,
            })?;

        Ok(pages
            .into_iter()
            .map(|page| TextUnit {
                document_id: document_id.clone(),
                source_name: document.file_name.clone(),
                page: page.number,
                text: page.text,
            })
            .collect())
    }

    fn extract_via_temp_file(&self, document: &UploadedDocument) -> Result<Vec<PageText>, IngestError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("docux-").suffix(".pdf");
        // Dropping the handle deletes the file on every return path below.
        let mut temp = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        temp.write_all(&document.bytes)?;
        temp.flush()?;

        debug!(file = %document.file_name, temp = %temp.path().display(), "extracting pdf");
        let pages = self.extractor.extract_pages(temp.path())?;
        Ok(pages)
    }
}
