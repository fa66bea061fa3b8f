use std::sync::Arc;
use tracing::debug;

use crate::context::RequestContext;
use crate::embeddings::Embedder;
use crate::error::ChatError;
use crate::models::{Answer, ChatMessage, RetrievedChunk, Turn};
use crate::prompts::PromptSet;
use crate::traits::{ChatModel, VectorIndex};

const CONTEXT_SEPARATOR: &str = "\n\n";

/// Retrieves supporting chunks and asks the chat model for a grounded answer.
pub struct AnswerComposer {
    llm: Arc<dyn ChatModel>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    prompts: Arc<PromptSet>,
    top_k: usize,
}

impl AnswerComposer {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        prompts: Arc<PromptSet>,
        top_k: usize,
    ) -> Self {
        Self {
            llm,
            embedder,
            index,
            prompts,
            top_k,
        }
    }

    pub async fn retrieve(
        &self,
        standalone_question: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<RetrievedChunk>, ChatError> {
        let query_vector = ctx
            .run("query embedding", async {
                Ok(self.embedder.embed(standalone_question).await?)
            })
            .await?;

        let hits = ctx
            .run("vector search", self.index.search_vector(&query_vector, self.top_k))
            .await?;
        debug!(backend = self.index.backend(), hits = hits.len(), "retrieved context");
        Ok(hits)
    }

    pub fn messages(
        &self,
        question: &str,
        history: &[Turn],
        sources: &[RetrievedChunk],
    ) -> Vec<ChatMessage> {
        let context = sources
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.prompts.render_answer_system(&context)));
        messages.extend(history.iter().map(ChatMessage::from_turn));
        messages.push(ChatMessage::user(question));
        messages
    }

    /// `question` is what the user typed; retrieval already used the standalone form.
    pub async fn compose(
        &self,
        question: &str,
        history: &[Turn],
        sources: Vec<RetrievedChunk>,
        ctx: &RequestContext,
    ) -> Result<Answer, ChatError> {
        let messages = self.messages(question, history, &sources);
        let reply = ctx
            .run("answer completion", async {
                Ok(self.llm.complete(&messages).await?)
            })
            .await?;

        Ok(Answer {
            text: reply.trim().to_string(),
            sources,
        })
    }
}
