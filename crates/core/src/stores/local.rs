//! Directory-backed vector index.
//!
//! The directory holds `manifest.json` (dimensions, embedding model, build
//! time) and `vectors.json` (every chunk with its embedding). The whole index
//! is loaded on open and searched by brute-force cosine similarity, which is
//! plenty for a corpus of a few hundred RFPs.

use crate::mmr::cosine_similarity;
use crate::traits::VectorIndex;
use crate::{IndexedVector, QueryError, ScoredVector};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const MANIFEST_FILE: &str = "manifest.json";
const VECTORS_FILE: &str = "vectors.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub dimensions: usize,
    pub embedding_model: String,
    pub built_at: DateTime<Utc>,
}

#[derive(Default)]
struct LocalState {
    manifest: Option<IndexManifest>,
    entries: Vec<IndexedVector>,
}

pub struct LocalIndexStore {
    location: PathBuf,
    state: RwLock<LocalState>,
}

impl LocalIndexStore {
    /// Opens the index at `location`. A missing index opens empty.
    pub async fn open(location: impl Into<PathBuf>) -> Result<Self, QueryError> {
        let location = location.into();
        let state = load_state(&location).await?;

        if state.manifest.is_none() {
            warn!(location = %location.display(), "no vector index found; queries will return nothing");
        } else {
            debug!(location = %location.display(), entries = state.entries.len(), "vector index loaded");
        }

        Ok(Self {
            location,
            state: RwLock::new(state),
        })
    }

    pub async fn manifest(&self) -> Option<IndexManifest> {
        self.state.read().await.manifest.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    async fn persist_entries(&self, entries: &[IndexedVector]) -> Result<(), QueryError> {
        write_json_atomic(&self.location.join(VECTORS_FILE), &entries).await
    }
}

async fn load_state(location: &Path) -> Result<LocalState, QueryError> {
    let manifest_path = location.join(MANIFEST_FILE);
    if !fs::try_exists(&manifest_path).await? {
        return Ok(LocalState::default());
    }

    let manifest: IndexManifest = serde_json::from_slice(&fs::read(&manifest_path).await?)?;

    let vectors_path = location.join(VECTORS_FILE);
    let entries = if fs::try_exists(&vectors_path).await? {
        serde_json::from_slice(&fs::read(&vectors_path).await?)?
    } else {
        Vec::new()
    };

    Ok(LocalState {
        manifest: Some(manifest),
        entries,
    })
}

async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), QueryError> {
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, serde_json::to_vec(value)?).await?;
    fs::rename(&staging, path).await?;
    Ok(())
}

#[async_trait]
impl VectorIndex for LocalIndexStore {
    async fn exists(&self) -> Result<bool, QueryError> {
        Ok(fs::try_exists(self.location.join(MANIFEST_FILE)).await?)
    }

    async fn destroy(&self) -> Result<(), QueryError> {
        let mut state = self.state.write().await;
        if fs::try_exists(&self.location).await? {
            fs::remove_dir_all(&self.location).await?;
        }
        *state = LocalState::default();
        Ok(())
    }

    async fn create(&self, dimensions: usize, embedding_model: &str) -> Result<(), QueryError> {
        let mut state = self.state.write().await;
        fs::create_dir_all(&self.location).await?;

        let manifest = IndexManifest {
            dimensions,
            embedding_model: embedding_model.to_string(),
            built_at: Utc::now(),
        };
        write_json_atomic(&self.location.join(MANIFEST_FILE), &manifest).await?;
        write_json_atomic(&self.location.join(VECTORS_FILE), &Vec::<IndexedVector>::new()).await?;

        *state = LocalState {
            manifest: Some(manifest),
            entries: Vec::new(),
        };
        Ok(())
    }

    async fn upsert(&self, vectors: &[IndexedVector]) -> Result<(), QueryError> {
        let mut state = self.state.write().await;
        let dimensions = state
            .manifest
            .as_ref()
            .map(|manifest| manifest.dimensions)
            .ok_or_else(|| {
                QueryError::Request(format!(
                    "index at {} has not been created",
                    self.location.display()
                ))
            })?;

        if let Some(bad) = vectors.iter().find(|vector| vector.embedding.len() != dimensions) {
            return Err(QueryError::Request(format!(
                "embedding dimension {} != {}",
                bad.embedding.len(),
                dimensions
            )));
        }

        let mut positions: HashMap<String, usize> = state
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.id.clone(), position))
            .collect();
        for vector in vectors {
            match positions.get(&vector.id) {
                Some(&position) => state.entries[position] = vector.clone(),
                None => {
                    positions.insert(vector.id.clone(), state.entries.len());
                    state.entries.push(vector.clone());
                }
            }
        }

        self.persist_entries(&state.entries).await
    }

    async fn embedding_model(&self) -> Result<Option<String>, QueryError> {
        Ok(self
            .state
            .read()
            .await
            .manifest
            .as_ref()
            .map(|manifest| manifest.embedding_model.clone()))
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredVector>, QueryError> {
        let state = self.state.read().await;
        let Some(manifest) = &state.manifest else {
            return Ok(Vec::new());
        };

        if vector.len() != manifest.dimensions {
            return Err(QueryError::Request(format!(
                "query vector dim {} is not {}",
                vector.len(),
                manifest.dimensions
            )));
        }

        let mut scored: Vec<(f32, &IndexedVector)> = state
            .entries
            .iter()
            .map(|entry| (cosine_similarity(vector, &entry.embedding), entry))
            .collect();
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, entry)| ScoredVector {
                id: entry.id.clone(),
                score,
                embedding: entry.embedding.clone(),
                chunk: entry.chunk.clone(),
            })
            .collect())
    }
}
