pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod fallback;
pub mod generator;
pub mod grader;
pub mod index_builder;
pub mod ingest;
pub mod llm;
pub mod mmr;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod retriever;
pub mod router;
pub mod stores;
pub mod traits;

pub use chunking::{build_chunks, split_text, ChunkingConfig, TextSpan};
pub use config::{
    AgentConfig, IndexBackend, IngestionOptions, RetrievalOptions, SearchStrategy,
    DEFAULT_API_BASE, DEFAULT_DB_PATH, DEFAULT_EMBEDDING_MODEL, DEFAULT_MODEL_NAME,
};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{IngestError, QueryError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use fallback::{FallbackReason, FallbackResponder};
pub use generator::{is_refusal, AnswerGenerator};
pub use grader::grade;
pub use index_builder::{build_index_from_folder, rebuild_index, IndexBuildReport, IngestionSummary};
pub use ingest::{
    discover_pdf_files, ingest_folder_pages, ingest_folder_pages_best_effort, IngestionReport,
    SkipKind, SkippedPdf,
};
pub use llm::{LanguageModel, OpenAiChatModel, PromptTemplate};
pub use models::{
    Answer, Chunk, EvaluationRecord, IndexedVector, NormalizedPage, Passage, Relevance,
    ScoredVector,
};
pub use normalize::TextNormalizer;
pub use orchestrator::{build_embedder, open_index, AnswerOrchestrator, GraphState, Node};
pub use retriever::Retriever;
pub use router::{QueryRouter, RouteDecision};
pub use stores::{IndexManifest, LocalIndexStore, QdrantStore};
pub use traits::VectorIndex;
