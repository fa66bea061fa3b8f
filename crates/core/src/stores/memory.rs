//! In-process vector index: brute-force cosine similarity over every chunk.

use async_trait::async_trait;
use std::sync::RwLock;

use crate::error::ChatError;
use crate::models::{EmbeddedChunk, RetrievedChunk};
use crate::traits::VectorIndex;

const BACKEND: &str = "memory";

#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<Vec<EmbeddedChunk>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

fn poisoned<T>(_: T) -> ChatError {
    ChatError::index(BACKEND, "index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn rebuild(&self, chunks: &[EmbeddedChunk]) -> Result<(), ChatError> {
        if let Some(first) = chunks.first() {
            let dimensions = first.vector.len();
            if let Some(bad) = chunks.iter().find(|entry| entry.vector.len() != dimensions) {
                return Err(ChatError::index(
                    BACKEND,
                    format!(
                        "chunk {} has dimension {} but batch uses {dimensions}",
                        bad.chunk.chunk_id,
                        bad.vector.len()
                    ),
                ));
            }
        }

        let mut entries = self.entries.write().map_err(poisoned)?;
        *entries = chunks.to_vec();
        Ok(())
    }

    async fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, ChatError> {
        let entries = self.entries.read().map_err(poisoned)?;
        let mut scored: Vec<RetrievedChunk> = entries
            .iter()
            .map(|entry| RetrievedChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query_vector, &entry.vector),
            })
            .collect();

        // Stable sort keeps document order among equal scores.
        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn len(&self) -> Result<usize, ChatError> {
        Ok(self.entries.read().map_err(poisoned)?.len())
    }
}
