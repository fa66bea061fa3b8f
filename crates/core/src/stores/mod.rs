pub mod memory;
pub mod qdrant;

pub use memory::{cosine_similarity, InMemoryVectorIndex};
pub use qdrant::QdrantIndex;
