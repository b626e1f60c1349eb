use crate::chunking::{build_chunks, ChunkingConfig};
use crate::config::IngestionOptions;
use crate::embeddings::Embedder;
use crate::extractor::PdfExtractor;
use crate::ingest::{ingest_folder_pages_best_effort, SkippedPdf};
use crate::normalize::TextNormalizer;
use crate::traits::VectorIndex;
use crate::{Chunk, IndexedVector, IngestError, QueryError};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBuildReport {
    pub indexed: usize,
    pub dimensions: usize,
    pub replaced_existing: bool,
}

/// Replaces whatever index exists with one built from `chunks`.
///
/// There is no incremental mode: an existing index is destroyed first. Any
/// embedding or storage failure aborts the build.
pub async fn rebuild_index(
    chunks: &[Chunk],
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    batch_size: usize,
) -> Result<IndexBuildReport, IngestError> {
    if batch_size == 0 {
        return Err(IngestError::InvalidArgument(
            "batch_size must be at least 1".to_string(),
        ));
    }

    let replaced_existing = index.exists().await?;
    if replaced_existing {
        info!("removing existing vector index before rebuild");
        index.destroy().await?;
    }

    if chunks.is_empty() {
        info!("no chunks to index; leaving the index absent");
        return Ok(IndexBuildReport {
            indexed: 0,
            dimensions: 0,
            replaced_existing,
        });
    }

    let mut embeddings = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(QueryError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!(
                    "embedding count {} doesn't match chunk count {}",
                    vectors.len(),
                    batch.len()
                ),
            }
            .into());
        }
        embeddings.extend(vectors);
        info!(embedded = embeddings.len(), total = chunks.len(), "embedding chunks");
    }

    let dimensions = embeddings.first().map(Vec::len).unwrap_or_default();
    if dimensions == 0 || embeddings.iter().any(|vector| vector.len() != dimensions) {
        return Err(QueryError::BackendResponse {
            backend: "embeddings".to_string(),
            details: "embeddings have inconsistent or zero dimensions".to_string(),
        }
        .into());
    }

    index.create(dimensions, embedder.model_name()).await?;

    let vectors: Vec<IndexedVector> = chunks
        .iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| IndexedVector {
            id: Uuid::new_v4().to_string(),
            embedding,
            chunk: chunk.clone(),
        })
        .collect();
    index.upsert(&vectors).await?;

    info!(indexed = vectors.len(), dimensions, "vector index built");

    Ok(IndexBuildReport {
        indexed: vectors.len(),
        dimensions,
        replaced_existing,
    })
}

#[derive(Debug)]
pub struct IngestionSummary {
    pub pages: usize,
    pub chunks: usize,
    pub skipped_files: Vec<SkippedPdf>,
    pub index: IndexBuildReport,
}

/// Folder of PDFs in, freshly rebuilt index out.
pub async fn build_index_from_folder<E: PdfExtractor>(
    folder: &Path,
    options: &IngestionOptions,
    extractor: &E,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<IngestionSummary, IngestError> {
    options.validate()?;
    let normalizer = TextNormalizer::new()?;

    let report = ingest_folder_pages_best_effort(folder, extractor, &normalizer)?;
    let chunks = build_chunks(&report.pages, ChunkingConfig::from(options))?;
    info!(pages = report.pages.len(), chunks = chunks.len(), "split pages into chunks");

    let index_report = rebuild_index(&chunks, embedder, index, options.embed_batch_size).await?;

    Ok(IngestionSummary {
        pages: report.pages.len(),
        chunks: chunks.len(),
        skipped_files: report.skipped_files,
        index: index_report,
    })
}
