pub mod chunking;
pub mod composer;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod rewriter;
pub mod session;
pub mod stores;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use chunking::{build_chunks, ChunkingConfig, TextSplitter};
pub use composer::AnswerComposer;
pub use config::{
    ApiKey, AppConfig, EmbeddingConfig, IndexConfig, ProviderConfig, RetrievalConfig,
    DEFAULT_SESSION_ID,
};
pub use context::{CancelHandle, RequestContext};
pub use embeddings::{CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use engine::ChatEngine;
pub use error::{ChatError, ErrorKind, IngestError, ProviderError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{batch_fingerprint, discover_pdf_files, load_document, DocumentIngestor};
pub use llm::OpenAiCompatibleChat;
pub use models::{
    Answer, ChatMessage, Chunk, EmbeddedChunk, IndexSummary, RequestPhase, RetrievedChunk, Role,
    TextUnit, Turn, TurnReport, UploadedDocument,
};
pub use orchestrator::SessionOrchestrator;
pub use pipeline::IndexingPipeline;
pub use prompts::PromptSet;
pub use rewriter::QueryRewriter;
pub use session::{SessionStore, SessionTranscript, SharedTranscript};
pub use stores::{InMemoryVectorIndex, QdrantIndex};
pub use traits::{ChatModel, VectorIndex};
