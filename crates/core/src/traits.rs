use crate::error::{ChatError, ProviderError};
use crate::models::{ChatMessage, EmbeddedChunk, RetrievedChunk};
use async_trait::async_trait;

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}

/// Nearest-neighbour store for the current document set.
///
/// The index is not incremental: [`VectorIndex::rebuild`] discards whatever
/// was indexed before and replaces it with the given batch.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn backend(&self) -> &str;

    async fn rebuild(&self, chunks: &[EmbeddedChunk]) -> Result<(), ChatError>;

    async fn search_vector(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, ChatError>;

    async fn len(&self) -> Result<usize, ChatError>;

    async fn is_empty(&self) -> Result<bool, ChatError> {
        Ok(self.len().await? == 0)
    }
}
