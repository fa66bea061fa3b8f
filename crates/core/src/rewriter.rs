use std::sync::Arc;
use tracing::debug;

use crate::context::RequestContext;
use crate::error::ChatError;
use crate::models::{ChatMessage, Turn};
use crate::prompts::PromptSet;
use crate::traits::ChatModel;

/// Turns a follow-up question into one that stands on its own.
pub struct QueryRewriter {
    llm: Arc<dyn ChatModel>,
    prompts: Arc<PromptSet>,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn ChatModel>, prompts: Arc<PromptSet>) -> Self {
        Self { llm, prompts }
    }

    pub fn messages(&self, history: &[Turn], question: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(&self.prompts.contextualize_system));
        messages.extend(history.iter().map(ChatMessage::from_turn));
        messages.push(ChatMessage::user(question));
        messages
    }

    /// With no history there is nothing to resolve and the question is used as is.
    pub async fn rewrite(
        &self,
        history: &[Turn],
        question: &str,
        ctx: &RequestContext,
    ) -> Result<String, ChatError> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let messages = self.messages(history, question);
        let reply = ctx
            .run("question rewrite", async {
                Ok(self.llm.complete(&messages).await?)
            })
            .await?;

        let standalone = reply.trim();
        debug!(prompt_version = %self.prompts.version, standalone, "rewrote question");
        if standalone.is_empty() {
            Ok(question.to_string())
        } else {
            Ok(standalone.to_string())
        }
    }
}
