use crate::error::{IngestError, QueryError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "./chroma_db_final";
pub const DEFAULT_MODEL_NAME: &str = "gpt-5";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Similarity,
    Mmr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOptions {
    pub strategy: SearchStrategy,
    pub k: usize,
    pub fetch_k: usize,
    /// 0.0 favours diversity, 1.0 favours pure relevance.
    pub lambda_mult: f32,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Mmr,
            k: 10,
            fetch_k: 30,
            lambda_mult: 0.6,
        }
    }
}

impl RetrievalOptions {
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.k == 0 {
            return Err(QueryError::InvalidConfig("k must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.lambda_mult) {
            return Err(QueryError::InvalidConfig(format!(
                "lambda_mult {} is outside [0, 1]",
                self.lambda_mult
            )));
        }
        if self.strategy == SearchStrategy::Mmr && self.fetch_k < self.k {
            return Err(QueryError::InvalidConfig(format!(
                "fetch_k {} must not be smaller than k {}",
                self.fetch_k, self.k
            )));
        }
        Ok(())
    }

    /// How many candidates to pull from the index before selection.
    pub fn candidate_pool(&self) -> usize {
        match self.strategy {
            SearchStrategy::Similarity => self.k,
            SearchStrategy::Mmr => self.fetch_k.max(self.k),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Local,
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub db_path: PathBuf,
    pub index_backend: IndexBackend,
    pub qdrant_url: String,
    pub model_name: String,
    pub embedding_model: String,
    pub api_base: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub retrieval: RetrievalOptions,
    pub call_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            index_backend: IndexBackend::Local,
            qdrant_url: "http://localhost:6333".to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            retrieval: RetrievalOptions::default(),
            call_timeout_secs: 60,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.call_timeout_secs == 0 {
            return Err(QueryError::InvalidConfig(
                "call_timeout_secs must be at least 1".to_string(),
            ));
        }
        url::Url::parse(&self.api_base)?;
        if self.index_backend == IndexBackend::Qdrant {
            url::Url::parse(&self.qdrant_url)?;
        }
        self.retrieval.validate()
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Name used for the index location when the backend is addressed by name rather than path.
    pub fn collection_name(&self) -> String {
        self.db_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.trim_start_matches('.').to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "bid_chunks".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embed_batch_size: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            embed_batch_size: 64,
        }
    }
}

impl IngestionOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.embed_batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "embed_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AgentConfig::default().validate().is_ok());
        assert!(IngestionOptions::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let options = IngestionOptions {
            chunk_size: 100,
            chunk_overlap: 100,
            embed_batch_size: 8,
        };
        assert!(matches!(
            options.validate(),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }

    #[test]
    fn mmr_requires_fetch_k_at_least_k() {
        let options = RetrievalOptions {
            strategy: SearchStrategy::Mmr,
            k: 10,
            fetch_k: 5,
            lambda_mult: 0.5,
        };
        assert!(options.validate().is_err());

        let similarity = RetrievalOptions {
            strategy: SearchStrategy::Similarity,
            ..options
        };
        assert!(similarity.validate().is_ok());
        assert_eq!(similarity.candidate_pool(), 10);
    }

    #[test]
    fn lambda_out_of_range_is_rejected() {
        let options = RetrievalOptions {
            lambda_mult: 1.5,
            ..RetrievalOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn collection_name_comes_from_db_path() {
        let config = AgentConfig::default();
        assert_eq!(config.collection_name(), "chroma_db_final");
    }
}
