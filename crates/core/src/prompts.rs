//! Prompt text that steers the chat model, kept as swappable configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ChatError;

pub const CONTEXT_PLACEHOLDER: &str = "{context}";

const CONTEXTUALIZE_V1: &str = "Given the chat history and the latest user question \
which might reference context in the chat history, \
formulate a standalone question which can be understood \
without the chat history. Do Not answer the question, \
just reformulate it if needed and otherwise return it as is.";

const ANSWER_V1: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer \
the question. If you don't know the answer, say that you \
don't know. Use three sentences maximum and keep the \
answer concise.\n\n{context}";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptSet {
    pub version: String,
    pub contextualize_system: String,
    pub answer_system: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            contextualize_system: CONTEXTUALIZE_V1.to_string(),
            answer_system: ANSWER_V1.to_string(),
        }
    }
}

impl PromptSet {
    pub fn from_toml_str(raw: &str) -> Result<Self, ChatError> {
        let prompts: PromptSet =
            toml::from_str(raw).map_err(|error| ChatError::Config(error.to_string()))?;
        prompts.validate()?;
        Ok(prompts)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ChatError> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            ChatError::Config(format!("cannot read prompts {}: {error}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if !self.answer_system.contains(CONTEXT_PLACEHOLDER) {
            return Err(ChatError::Config(format!(
                "answer_system prompt {} must contain {CONTEXT_PLACEHOLDER}",
                self.version
            )));
        }
        if self.contextualize_system.trim().is_empty() {
            return Err(ChatError::Config(format!(
                "contextualize_system prompt {} is empty",
                self.version
            )));
        }
        Ok(())
    }

    pub fn render_answer_system(&self, context: &str) -> String {
        self.answer_system.replace(CONTEXT_PLACEHOLDER, context)
    }
}
