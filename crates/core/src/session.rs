//! Process-lifetime conversation transcripts keyed by session id.
//!
//! The store is an explicit value owned by whoever hosts the chat (the web
//! server state or the terminal loop) and handed to the orchestrator. It is
//! created empty and lives exactly as long as its owner; nothing is evicted.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::models::{Role, Turn};

#[derive(Debug, Default, Clone, Serialize)]
pub struct SessionTranscript {
    turns: Vec<Turn>,
}

impl SessionTranscript {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn push(&mut self, role: Role, text: String) -> Turn {
        let turn = Turn {
            role,
            text,
            sequence: self.turns.len() as u64,
            at: Utc::now(),
        };
        self.turns.push(turn.clone());
        turn
    }
}

pub type SharedTranscript = Arc<RwLock<SessionTranscript>>;

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<BTreeMap<String, SharedTranscript>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the transcript for `session_id`, creating an empty one on first use.
    /// Repeated calls hand out the same shared transcript.
    pub fn get_or_create(&self, session_id: &str) -> SharedTranscript {
        if let Some(existing) = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
        {
            return Arc::clone(existing);
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(sessions.entry(session_id.to_string()).or_default())
    }

    /// Copy of the turns recorded so far for `session_id`.
    pub fn history(&self, session_id: &str) -> Vec<Turn> {
        let transcript = self.get_or_create(session_id);
        let turns = transcript
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .turns()
            .to_vec();
        turns
    }

    /// Appends `turns` in order under one write lock and returns them as recorded.
    pub fn append<I, S>(&self, session_id: &str, turns: I) -> Vec<Turn>
    where
        I: IntoIterator<Item = (Role, S)>,
        S: Into<String>,
    {
        let transcript = self.get_or_create(session_id);
        let mut guard = transcript.write().unwrap_or_else(PoisonError::into_inner);
        turns
            .into_iter()
            .map(|(role, text)| guard.push(role, text.into()))
            .collect()
    }

    /// Records a question and its answer together so a transcript never ends on
    /// an unanswered question.
    pub fn append_exchange(&self, session_id: &str, question: &str, answer: &str) -> Vec<Turn> {
        self.append(
            session_id,
            [(Role::Human, question), (Role::Assistant, answer)],
        )
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Every session with its turns, ordered by session id.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<Turn>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .iter()
            .map(|(id, transcript)| {
                let turns = transcript
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .turns()
                    .to_vec();
                (id.clone(), turns)
            })
            .collect()
    }
}
