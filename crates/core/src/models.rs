use serde::{Deserialize, Serialize};

/// Cleaned text of one PDF page, tagged with the file it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPage {
    pub text: String,
    pub source: String,
    pub page: u32,
}

/// A bounded span of a single page, the unit that gets embedded and retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub source: String,
    pub page: u32,
    pub chunk_index: u64,
    /// Character offset of `text` inside the page it was cut from.
    pub start_offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedVector {
    pub id: String,
    pub embedding: Vec<f32>,
    pub chunk: Chunk,
}

#[derive(Debug, Clone)]
pub struct ScoredVector {
    pub id: String,
    pub score: f32,
    pub embedding: Vec<f32>,
    pub chunk: Chunk,
}

/// A retrieved passage handed to the generator and returned to the caller as a citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub source: String,
    pub page: u32,
}

impl From<ScoredVector> for Passage {
    fn from(hit: ScoredVector) -> Self {
        Self {
            text: hit.chunk.text,
            source: hit.chunk.source,
            page: hit.chunk.page,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    Yes,
    No,
}

/// Final answer text together with the passages that support it.
///
/// `passages` is always empty when `text` is a refusal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub passages: Vec<Passage>,
}

/// Question, answer and raw contexts in the shape evaluation harnesses consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
}
