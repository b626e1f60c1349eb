use crate::extractor::PdfExtractor;
use crate::normalize::TextNormalizer;
use crate::{IngestError, NormalizedPage};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const PROGRESS_EVERY: usize = 10;

/// Lists the PDFs directly inside `folder`, sorted by path.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipKind {
    /// The file could not be parsed as a PDF.
    Damaged,
    /// Anything else: unreadable file, odd path, ...
    Failed,
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub kind: SkipKind,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub pages: Vec<NormalizedPage>,
    pub skipped_files: Vec<SkippedPdf>,
}

pub fn ingest_folder_pages<E: PdfExtractor>(
    folder: &Path,
    extractor: &E,
    normalizer: &TextNormalizer,
) -> Result<Vec<NormalizedPage>, IngestError> {
    let report = ingest_folder_pages_best_effort(folder, extractor, normalizer)?;
    Ok(report.pages)
}

/// Extracts and normalizes every PDF in `folder`.
///
/// A file that fails is recorded in `skipped_files` and ingestion moves on;
/// only a missing folder or a folder without PDFs is an error.
pub fn ingest_folder_pages_best_effort<E: PdfExtractor>(
    folder: &Path,
    extractor: &E,
    normalizer: &TextNormalizer,
) -> Result<IngestionReport, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "folder does not exist: {}",
            folder.display()
        )));
    }

    let files = discover_pdf_files(folder);
    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            folder.display()
        )));
    }

    let total = files.len();
    info!(folder = %folder.display(), total, "loading pdf files");

    let mut report = IngestionReport::default();

    for (position, path) in files.into_iter().enumerate() {
        let processed = position + 1;

        match load_document_pages(&path, extractor, normalizer) {
            Ok(pages) => {
                report.pages.extend(pages);
                if processed % PROGRESS_EVERY == 0 {
                    info!(processed, total, "processing pdf files");
                }
            }
            Err(error) => {
                let kind = match error {
                    IngestError::PdfParse(_) => SkipKind::Damaged,
                    _ => SkipKind::Failed,
                };
                match kind {
                    SkipKind::Damaged => {
                        warn!(processed, total, path = %path.display(), %error, "skipping damaged pdf")
                    }
                    SkipKind::Failed => {
                        warn!(processed, total, path = %path.display(), %error, "skipping pdf after unexpected failure")
                    }
                }
                report.skipped_files.push(SkippedPdf {
                    path,
                    kind,
                    reason: error.to_string(),
                });
            }
        }
    }

    info!(
        pages = report.pages.len(),
        skipped = report.skipped_files.len(),
        "pdf loading finished"
    );

    Ok(report)
}

fn load_document_pages<E: PdfExtractor>(
    path: &Path,
    extractor: &E,
    normalizer: &TextNormalizer,
) -> Result<Vec<NormalizedPage>, IngestError> {
    let source = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
        .to_string();

    let pages = extractor.extract_pages(path)?;

    Ok(pages
        .into_iter()
        .map(|page| NormalizedPage {
            text: normalizer.normalize(&page.text),
            source: source.clone(),
            page: page.number,
        })
        .collect())
}
