pub mod local;
pub mod qdrant;

pub use local::{IndexManifest, LocalIndexStore};
pub use qdrant::QdrantStore;
