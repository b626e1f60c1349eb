use crate::config::{RetrievalOptions, SearchStrategy};
use crate::embeddings::Embedder;
use crate::mmr::maximal_marginal_relevance;
use crate::traits::VectorIndex;
use crate::{Passage, QueryError, ScoredVector};
use std::sync::Arc;
use tracing::debug;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    options: RetrievalOptions,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        options: RetrievalOptions,
    ) -> Result<Self, QueryError> {
        options.validate()?;
        Ok(Self {
            embedder,
            index,
            options,
        })
    }

    pub fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    /// Fails when the index was built with a different embedding model than
    /// the one used for queries.
    pub async fn check_index(&self) -> Result<(), QueryError> {
        let current = self.embedder.model_name();
        match self.index.embedding_model().await? {
            Some(built_with) if built_with != current => Err(QueryError::InvalidConfig(format!(
                "index was built with embedding model `{built_with}` but queries use `{current}`; \
                 rebuild the index or select the matching embedding model"
            ))),
            _ => Ok(()),
        }
    }

    /// At most `k` passages, best first. An index with no matches yields an empty list.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Passage>, QueryError> {
        let query_vector = self.embedder.embed(question).await?;
        let candidates = self
            .index
            .query(&query_vector, self.options.candidate_pool())
            .await?;

        debug!(
            candidates = candidates.len(),
            strategy = ?self.options.strategy,
            "retrieved candidates"
        );

        let selected = match self.options.strategy {
            SearchStrategy::Similarity => candidates.into_iter().take(self.options.k).collect(),
            SearchStrategy::Mmr => select_diverse(
                &query_vector,
                candidates,
                self.options.lambda_mult,
                self.options.k,
            ),
        };

        Ok(selected.into_iter().map(Passage::from).collect())
    }
}

fn select_diverse(
    query_vector: &[f32],
    candidates: Vec<ScoredVector>,
    lambda: f32,
    k: usize,
) -> Vec<ScoredVector> {
    let embeddings: Vec<Vec<f32>> = candidates
        .iter()
        .map(|candidate| candidate.embedding.clone())
        .collect();
    let order = maximal_marginal_relevance(query_vector, &embeddings, lambda, k);

    let mut slots: Vec<Option<ScoredVector>> = candidates.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots.get_mut(index).and_then(Option::take))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::stores::LocalIndexStore;
    use crate::{Chunk, IndexedVector};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, QueryError> {
            Ok(vec![1.0, 0.2])
        }

        fn model_name(&self) -> &str {
            "axis"
        }
    }

    /// Returns its fixed hits, truncated to the requested limit.
    struct FixedIndex {
        hits: Vec<ScoredVector>,
    }

    #[async_trait]
    impl VectorIndex for FixedIndex {
        async fn exists(&self) -> Result<bool, QueryError> {
            Ok(true)
        }

        async fn destroy(&self) -> Result<(), QueryError> {
            Ok(())
        }

        async fn create(&self, _dimensions: usize, _model: &str) -> Result<(), QueryError> {
            Ok(())
        }

        async fn upsert(&self, _vectors: &[IndexedVector]) -> Result<(), QueryError> {
            Ok(())
        }

        async fn query(
            &self,
            _vector: &[f32],
            limit: usize,
        ) -> Result<Vec<ScoredVector>, QueryError> {
            Ok(self.hits.iter().take(limit).cloned().collect())
        }
    }

    fn hit(text: &str, embedding: Vec<f32>, score: f32) -> ScoredVector {
        ScoredVector {
            id: text.to_string(),
            score,
            embedding,
            chunk: Chunk {
                chunk_id: text.to_string(),
                source: format!("{text}.pdf"),
                page: 1,
                chunk_index: 0,
                start_offset: 0,
                text: text.to_string(),
            },
        }
    }

    fn retriever(hits: Vec<ScoredVector>, options: RetrievalOptions) -> Retriever {
        Retriever::new(Arc::new(AxisEmbedder), Arc::new(FixedIndex { hits }), options)
            .expect("valid options")
    }

    fn sample_hits() -> Vec<ScoredVector> {
        vec![
            hit("budget", vec![1.0, 0.2], 1.0),
            hit("budget-copy", vec![1.0, 0.21], 0.99),
            hit("schedule", vec![0.3, 1.0], 0.47),
        ]
    }

    #[tokio::test]
    async fn similarity_takes_top_k_in_index_order() -> Result<(), QueryError> {
        let options = RetrievalOptions {
            strategy: SearchStrategy::Similarity,
            k: 2,
            fetch_k: 2,
            lambda_mult: 0.5,
        };
        let passages = retriever(sample_hits(), options).retrieve("예산").await?;

        let texts: Vec<_> = passages.iter().map(|passage| passage.text.as_str()).collect();
        assert_eq!(texts, vec!["budget", "budget-copy"]);
        assert_eq!(passages[0].source, "budget.pdf");
        Ok(())
    }

    #[tokio::test]
    async fn diversity_replaces_near_duplicates() -> Result<(), QueryError> {
        let options = RetrievalOptions {
            strategy: SearchStrategy::Mmr,
            k: 2,
            fetch_k: 3,
            lambda_mult: 0.3,
        };
        let passages = retriever(sample_hits(), options).retrieve("예산").await?;

        let texts: Vec<_> = passages.iter().map(|passage| passage.text.as_str()).collect();
        assert_eq!(texts, vec!["budget", "schedule"]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_index_gives_no_passages() -> Result<(), QueryError> {
        let passages = retriever(Vec::new(), RetrievalOptions::default())
            .retrieve("예산")
            .await?;
        assert!(passages.is_empty());
        Ok(())
    }

    #[test]
    fn invalid_options_are_rejected() {
        let options = RetrievalOptions {
            k: 0,
            ..RetrievalOptions::default()
        };
        let result = Retriever::new(
            Arc::new(AxisEmbedder),
            Arc::new(FixedIndex { hits: Vec::new() }),
            options,
        );
        assert!(result.is_err());
    }

    /// The trigram embedder under another model's name.
    struct Relabelled(&'static str);

    #[async_trait]
    impl Embedder for Relabelled {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, QueryError> {
            Ok(CharacterNgramEmbedder::default().embed_text(text))
        }

        fn model_name(&self) -> &str {
            self.0
        }
    }

    async fn trigram_index(location: &std::path::Path) -> Result<LocalIndexStore, QueryError> {
        let embedder = CharacterNgramEmbedder::default();
        let store = LocalIndexStore::open(location).await?;
        store.create(embedder.dimensions, embedder.model_name()).await?;
        let text = "소요 예산: 352,000,000원";
        store
            .upsert(&[IndexedVector {
                id: "1".to_string(),
                embedding: embedder.embed_text(text),
                chunk: hit(text, Vec::new(), 1.0).chunk,
            }])
            .await?;
        Ok(store)
    }

    #[tokio::test]
    async fn index_built_by_another_embedding_model_is_refused(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = trigram_index(&dir.path().join("db")).await?;
        let retriever = Retriever::new(
            Arc::new(Relabelled("text-embedding-3-small")),
            Arc::new(store),
            RetrievalOptions::default(),
        )?;

        let result = retriever.check_index().await;

        match result {
            Err(QueryError::InvalidConfig(message)) => {
                assert!(message.contains("char-trigram"));
                assert!(message.contains("text-embedding-3-small"));
            }
            other => panic!("expected an embedding model mismatch, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn matching_or_unknown_embedding_model_passes() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = trigram_index(&dir.path().join("db")).await?;
        let retriever = Retriever::new(
            Arc::new(CharacterNgramEmbedder::default()),
            Arc::new(store),
            RetrievalOptions::default(),
        )?;
        retriever.check_index().await?;
        assert_eq!(retriever.retrieve("예산").await?.len(), 1);

        retriever_without_manifest().check_index().await?;
        Ok(())
    }

    fn retriever_without_manifest() -> Retriever {
        retriever(Vec::new(), RetrievalOptions::default())
    }
}
