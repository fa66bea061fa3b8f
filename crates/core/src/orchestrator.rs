use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::composer::AnswerComposer;
use crate::context::RequestContext;
use crate::error::ChatError;
use crate::models::{RequestPhase, TurnReport};
use crate::rewriter::QueryRewriter;
use crate::session::SessionStore;
use crate::traits::VectorIndex;

/// Phases one request has passed through; rejects moves the state machine forbids.
#[derive(Debug)]
struct PhaseTrail<'a> {
    session_id: &'a str,
    current: RequestPhase,
    visited: Vec<RequestPhase>,
}

impl<'a> PhaseTrail<'a> {
    fn new(session_id: &'a str) -> Self {
        Self {
            session_id,
            current: RequestPhase::Idle,
            visited: vec![RequestPhase::Idle],
        }
    }

    fn advance(&mut self, next: RequestPhase) -> Result<(), ChatError> {
        if !self.current.can_advance_to(next) {
            return Err(ChatError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        debug!(session_id = self.session_id, from = ?self.current, to = ?next, "request phase");
        self.current = next;
        self.visited.push(next);
        Ok(())
    }

    fn fail(&mut self, error: &ChatError) {
        warn!(
            session_id = self.session_id,
            phase = ?self.current,
            kind = ?error.kind(),
            %error,
            "request failed"
        );
        if self.current.can_advance_to(RequestPhase::Failed) {
            self.current = RequestPhase::Failed;
            self.visited.push(RequestPhase::Failed);
        }
    }
}

/// Runs one question through rewrite, retrieval, answer, and transcript update.
pub struct SessionOrchestrator {
    sessions: Arc<SessionStore>,
    rewriter: QueryRewriter,
    composer: AnswerComposer,
    index: Arc<dyn VectorIndex>,
}

impl SessionOrchestrator {
    pub fn new(
        sessions: Arc<SessionStore>,
        rewriter: QueryRewriter,
        composer: AnswerComposer,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            sessions,
            rewriter,
            composer,
            index,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// The transcript only changes when the whole request succeeds.
    pub async fn ask(
        &self,
        session_id: &str,
        question: &str,
        ctx: &RequestContext,
    ) -> Result<TurnReport, ChatError> {
        let mut trail = PhaseTrail::new(session_id);
        match self.run(&mut trail, question, ctx).await {
            Ok(report) => Ok(report),
            Err(error) => {
                trail.fail(&error);
                Err(error)
            }
        }
    }

    async fn run(
        &self,
        trail: &mut PhaseTrail<'_>,
        question: &str,
        ctx: &RequestContext,
    ) -> Result<TurnReport, ChatError> {
        let session_id = trail.session_id;
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyQuestion);
        }
        if ctx.run("index lookup", self.index.is_empty()).await? {
            return Err(ChatError::NoDocuments);
        }

        trail.advance(RequestPhase::Rewriting)?;
        let history = self.sessions.history(session_id);
        let standalone_question = self.rewriter.rewrite(&history, question, ctx).await?;

        trail.advance(RequestPhase::Retrieving)?;
        let sources = self.composer.retrieve(&standalone_question, ctx).await?;

        trail.advance(RequestPhase::Composing)?;
        let answer = self.composer.compose(question, &history, sources, ctx).await?;

        trail.advance(RequestPhase::Appending)?;
        self.sessions.append_exchange(session_id, question, &answer.text);

        trail.advance(RequestPhase::Done)?;
        info!(
            session_id,
            turns = history.len() + 2,
            sources = answer.sources.len(),
            "answered question"
        );

        Ok(TurnReport {
            session_id: session_id.to_string(),
            question: question.to_string(),
            standalone_question,
            answer,
            phases: trail.visited.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{ChunkingConfig, TextSplitter};
    use crate::embeddings::Embedder;
    use crate::error::ProviderError;
    use crate::ingest::DocumentIngestor;
    use crate::models::{ChatMessage, Role, UploadedDocument};
    use crate::pipeline::IndexingPipeline;
    use crate::prompts::PromptSet;
    use crate::stores::InMemoryVectorIndex;
    use crate::test_support::{pdf_with_pages, PageKeywordEmbedder, ScriptedChatModel};

    /// Rewrites follow-ups to a page-1 question and answers with the top retrieved chunk.
    fn reply(messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let system = &messages[0].content;
        if system.starts_with("Given the chat history") {
            return Ok("What is on page 1 of the document?".to_string());
        }
        let top = system.split("\n\n").nth(1).unwrap_or_default();
        Ok(format!("The page says {top}"))
    }

    struct Fixture {
        orchestrator: SessionOrchestrator,
        llm: Arc<ScriptedChatModel>,
    }

    async fn fixture(llm: ScriptedChatModel, with_documents: bool) -> Fixture {
        let llm = Arc::new(llm);
        let embedder: Arc<dyn Embedder> = Arc::new(PageKeywordEmbedder);
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
        let prompts = Arc::new(PromptSet::default());

        if with_documents {
            let pipeline = IndexingPipeline::new(
                DocumentIngestor::default(),
                TextSplitter::new(ChunkingConfig::default()).unwrap(),
                Arc::clone(&embedder),
                Arc::clone(&index),
            );
            let upload = UploadedDocument::new("notes.pdf", pdf_with_pages(&["Alpha.", "Beta."]));
            pipeline
                .index_batch(&[upload], &RequestContext::background())
                .await
                .unwrap();
        }

        let orchestrator = SessionOrchestrator::new(
            Arc::new(SessionStore::new()),
            QueryRewriter::new(llm.clone(), Arc::clone(&prompts)),
            AnswerComposer::new(llm.clone(), embedder, Arc::clone(&index), prompts, 4),
            index,
        );
        Fixture { orchestrator, llm }
    }

    #[tokio::test]
    async fn first_question_is_answered_from_the_matching_page() {
        let Fixture { orchestrator, llm } = fixture(ScriptedChatModel::new(reply), true).await;

        let report = orchestrator
            .ask("default_session", "What is on page 2?", &RequestContext::background())
            .await
            .unwrap();

        assert_eq!(report.standalone_question, "What is on page 2?");
        assert!(report.answer.sources[0].chunk.text.contains("Beta."));
        assert!(report.answer.text.contains("Beta."));
        assert_eq!(
            report.phases,
            vec![
                RequestPhase::Idle,
                RequestPhase::Rewriting,
                RequestPhase::Retrieving,
                RequestPhase::Composing,
                RequestPhase::Appending,
                RequestPhase::Done,
            ]
        );
        // Only the answer call; the first question needs no rewrite.
        assert_eq!(llm.calls().len(), 1);

        let turns = orchestrator.sessions().history("default_session");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::Human);
        assert_eq!(turns[0].text, "What is on page 2?");
        assert_eq!(turns[1].text, report.answer.text);
    }

    #[tokio::test]
    async fn follow_up_is_retrieved_through_the_standalone_question() {
        let Fixture { orchestrator, llm } = fixture(ScriptedChatModel::new(reply), true).await;
        let ctx = RequestContext::background();

        orchestrator
            .ask("s", "What is on page 2?", &ctx)
            .await
            .unwrap();
        let report = orchestrator
            .ask("s", "And what about the other one?", &ctx)
            .await
            .unwrap();

        assert_eq!(report.standalone_question, "What is on page 1 of the document?");
        assert_ne!(report.standalone_question, report.question);
        assert!(report.answer.sources[0].chunk.text.contains("Alpha."));

        let calls = llm.calls();
        let answer_call = calls.last().unwrap();
        assert_eq!(answer_call.last().unwrap().content, "And what about the other one?");
        assert_eq!(orchestrator.sessions().history("s").len(), 4);
    }

    #[tokio::test]
    async fn provider_failure_leaves_the_transcript_untouched() {
        // Succeeds for the first question, fails on the follow-up rewrite.
        let llm = ScriptedChatModel::new(|messages| {
            if messages.len() > 2 {
                Err(ProviderError::Status {
                    provider: "scripted".to_string(),
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                reply(messages)
            }
        });
        let Fixture { orchestrator, .. } = fixture(llm, true).await;
        let ctx = RequestContext::background();

        orchestrator.ask("s", "What is on page 2?", &ctx).await.unwrap();
        let before = orchestrator.sessions().history("s");

        let error = orchestrator.ask("s", "And the first?", &ctx).await.unwrap_err();
        assert!(matches!(error, ChatError::Provider(_)));

        let after = orchestrator.sessions().history("s");
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].text, before[0].text);
        assert_eq!(after[1].text, before[1].text);
    }

    #[tokio::test]
    async fn failed_first_answer_records_nothing() {
        let Fixture { orchestrator, .. } = fixture(ScriptedChatModel::failing(), true).await;
        let result = orchestrator
            .ask("s", "What is on page 2?", &RequestContext::background())
            .await;
        assert!(matches!(result, Err(ChatError::Provider(_))));
        assert!(orchestrator.sessions().history("s").is_empty());
    }

    #[tokio::test]
    async fn asking_before_upload_reports_no_documents() {
        let Fixture { orchestrator, llm } = fixture(ScriptedChatModel::new(reply), false).await;
        let result = orchestrator
            .ask("s", "What is on page 2?", &RequestContext::background())
            .await;
        assert!(matches!(result, Err(ChatError::NoDocuments)));
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let Fixture { orchestrator, .. } = fixture(ScriptedChatModel::new(reply), true).await;
        let result = orchestrator
            .ask("s", "   ", &RequestContext::background())
            .await;
        assert!(matches!(result, Err(ChatError::EmptyQuestion)));
    }

    #[test]
    fn trail_rejects_skipping_phases() {
        let mut trail = PhaseTrail::new("s");
        assert!(matches!(
            trail.advance(RequestPhase::Composing),
            Err(ChatError::InvalidTransition {
                from: RequestPhase::Idle,
                to: RequestPhase::Composing
            })
        ));

        trail.advance(RequestPhase::Rewriting).unwrap();
        trail.fail(&ChatError::NoDocuments);
        assert_eq!(trail.current, RequestPhase::Failed);
        assert!(trail.advance(RequestPhase::Retrieving).is_err());
    }
}
