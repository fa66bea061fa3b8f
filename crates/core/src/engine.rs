//! Wires configuration and a provider key into a ready-to-use chat engine.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::chunking::TextSplitter;
use crate::composer::AnswerComposer;
use crate::config::{ApiKey, AppConfig, EmbeddingConfig, IndexConfig};
use crate::context::RequestContext;
use crate::embeddings::{CharacterNgramEmbedder, Embedder, HttpEmbedder};
use crate::error::ChatError;
use crate::ingest::DocumentIngestor;
use crate::llm::OpenAiCompatibleChat;
use crate::models::{IndexSummary, TurnReport, UploadedDocument};
use crate::orchestrator::SessionOrchestrator;
use crate::pipeline::IndexingPipeline;
use crate::rewriter::QueryRewriter;
use crate::session::SessionStore;
use crate::stores::{InMemoryVectorIndex, QdrantIndex};
use crate::traits::{ChatModel, VectorIndex};

pub struct ChatEngine {
    pipeline: IndexingPipeline,
    orchestrator: SessionOrchestrator,
    request_timeout: Option<Duration>,
}

impl ChatEngine {
    /// Builds the engine from configuration; `sessions` outlives any single engine.
    pub fn from_config(
        config: &AppConfig,
        api_key: ApiKey,
        sessions: Arc<SessionStore>,
    ) -> Result<Self, ChatError> {
        config.validate()?;
        let http_timeout = config.provider.http_timeout_secs.map(Duration::from_secs);

        let embedder: Arc<dyn Embedder> = match &config.embedding {
            EmbeddingConfig::Hashed {
                dimensions,
                normalize,
            } => Arc::new(CharacterNgramEmbedder {
                dimensions: *dimensions,
                normalize: *normalize,
            }),
            EmbeddingConfig::Http {
                base_url,
                model,
                dimensions,
                batch_size,
            } => Arc::new(HttpEmbedder::new(
                base_url,
                model.as_str(),
                *dimensions,
                *batch_size,
                Some(api_key.clone()),
                http_timeout,
            )?),
        };

        let index: Arc<dyn VectorIndex> = match &config.index {
            IndexConfig::Memory => Arc::new(InMemoryVectorIndex::new()),
            IndexConfig::Qdrant { url, collection } => Arc::new(QdrantIndex::new(
                url.as_str(),
                collection.as_str(),
                embedder.dimensions(),
            )),
        };

        let llm: Arc<dyn ChatModel> = Arc::new(OpenAiCompatibleChat::new(&config.provider, api_key)?);
        info!(
            model = llm.model_name(),
            embedder = embedder.model_name(),
            index = index.backend(),
            prompt_version = %config.prompts.version,
            "chat engine ready"
        );

        let splitter = TextSplitter::new(config.chunking.clone())?;
        Ok(Self::from_parts(
            llm,
            embedder,
            index,
            splitter,
            config,
            sessions,
        ))
    }

    /// Assembles an engine around already-built providers.
    pub fn from_parts(
        llm: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        splitter: TextSplitter,
        config: &AppConfig,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let prompts = Arc::new(config.prompts.clone());
        let pipeline = IndexingPipeline::new(
            DocumentIngestor::default(),
            splitter,
            Arc::clone(&embedder),
            Arc::clone(&index),
        );
        let orchestrator = SessionOrchestrator::new(
            sessions,
            QueryRewriter::new(Arc::clone(&llm), Arc::clone(&prompts)),
            AnswerComposer::new(
                llm,
                embedder,
                Arc::clone(&index),
                prompts,
                config.retrieval.top_k,
            ),
            index,
        );

        Self {
            pipeline,
            orchestrator,
            request_timeout: config.request_timeout,
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Fresh context carrying the configured request timeout.
    pub fn context(&self) -> RequestContext {
        match self.request_timeout {
            Some(timeout) => RequestContext::with_timeout(timeout),
            None => RequestContext::background(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        self.orchestrator.sessions()
    }

    pub fn pipeline(&self) -> &IndexingPipeline {
        &self.pipeline
    }

    pub async fn index_if_changed(
        &self,
        documents: &[UploadedDocument],
        ctx: &RequestContext,
    ) -> Result<Option<IndexSummary>, ChatError> {
        self.pipeline.index_if_changed(documents, ctx).await
    }

    pub async fn ask(
        &self,
        session_id: &str,
        question: &str,
        ctx: &RequestContext,
    ) -> Result<TurnReport, ChatError> {
        self.orchestrator.ask(session_id, question, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pdf_with_pages, PageKeywordEmbedder, ScriptedChatModel};

    #[tokio::test]
    async fn default_config_builds_without_network() {
        let sessions = Arc::new(SessionStore::new());
        let engine = ChatEngine::from_config(
            &AppConfig::default(),
            ApiKey::parse(Some("gsk_test")).unwrap(),
            Arc::clone(&sessions),
        )
        .unwrap();

        assert!(engine.context().timeout().is_none());
        let result = engine.ask("s", "anything?", &engine.context()).await;
        assert!(matches!(result, Err(ChatError::NoDocuments)));
        assert!(Arc::ptr_eq(engine.sessions(), &sessions));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.chunking.overlap_chars = config.chunking.max_chars;
        let result = ChatEngine::from_config(
            &config,
            ApiKey::parse(Some("gsk_test")).unwrap(),
            Arc::new(SessionStore::new()),
        );
        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[tokio::test]
    async fn upload_then_ask_round() {
        let config = AppConfig {
            request_timeout: Some(Duration::from_secs(30)),
            ..AppConfig::default()
        };
        let engine = ChatEngine::from_parts(
            Arc::new(ScriptedChatModel::new(|_| Ok("Beta.".to_string()))),
            Arc::new(PageKeywordEmbedder),
            Arc::new(InMemoryVectorIndex::new()),
            TextSplitter::new(config.chunking.clone()).unwrap(),
            &config,
            Arc::new(SessionStore::new()),
        );
        let ctx = engine.context();
        assert_eq!(ctx.timeout(), Some(Duration::from_secs(30)));

        let batch = [UploadedDocument::new("a.pdf", pdf_with_pages(&["Alpha.", "Beta."]))];
        let summary = engine.index_if_changed(&batch, &ctx).await.unwrap().unwrap();
        assert_eq!(summary.chunks, 2);

        let report = engine.ask("s", "What is on page 2?", &ctx).await.unwrap();
        assert_eq!(report.answer.text, "Beta.");
        assert_eq!(engine.sessions().history("s").len(), 2);
    }
}
