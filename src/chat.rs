use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::assistant::Assistant;
use crate::config::ChatConfig;
use crate::models::{ChatEntry, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Input was empty or whitespace
    Empty,
    /// A previous question is still waiting for its answer
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Answered,
    /// The assistant failed; the fallback message was appended
    Failed,
    Rejected(RejectReason),
    /// The session was reset while the question was in flight
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSnapshot {
    pub open: bool,
    pub input: String,
    pub pending: bool,
    pub transcript: Vec<ChatEntry>,
}

struct ChatState {
    transcript: Vec<ChatEntry>,
    input: String,
    pending: bool,
    open: bool,
    session: CancellationToken,
}

struct Inner {
    assistant: Arc<dyn Assistant>,
    greeting: String,
    fallback_error: String,
    state: Mutex<ChatState>,
}

/// Turn-based chat with one outstanding question at a time.
///
/// The transcript starts with the greeting and grows by a user entry on submit
/// and exactly one assistant entry (answer or fallback) when the exchange ends.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

impl ChatSession {
    pub fn new(assistant: Arc<dyn Assistant>, config: &ChatConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                assistant,
                greeting: config.greeting.clone(),
                fallback_error: config.fallback_error.clone(),
                state: Mutex::new(ChatState {
                    transcript: vec![ChatEntry::assistant(config.greeting.clone())],
                    input: String::new(),
                    pending: false,
                    open: false,
                    session: CancellationToken::new(),
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_input(&self, text: &str) {
        self.state().input = text.to_string();
    }

    pub fn open(&self) {
        self.state().open = true;
    }

    /// Hides the panel. An in-flight question still completes into the transcript.
    pub fn close(&self) {
        self.state().open = false;
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn is_pending(&self) -> bool {
        self.state().pending
    }

    pub fn transcript(&self) -> Vec<ChatEntry> {
        self.state().transcript.clone()
    }

    /// Sends the current input.
    pub async fn submit(&self) -> SubmitOutcome {
        self.exchange(None).await
    }

    /// Sets the input and submits it in one step. While a question is
    /// outstanding the input is left untouched.
    pub async fn send(&self, text: &str) -> SubmitOutcome {
        self.exchange(Some(text)).await
    }

    /// Validates and opens an exchange under a single lock, so a concurrent
    /// send can never submit another caller's text.
    fn begin(&self, text: Option<&str>) -> Result<(String, CancellationToken), RejectReason> {
        let mut state = self.state();
        if text.is_some() && state.pending {
            tracing::debug!("Chat send ignored: previous question still pending");
            return Err(RejectReason::Busy);
        }
        if let Some(text) = text {
            state.input = text.to_string();
        }

        let question = state.input.trim().to_string();
        if question.is_empty() {
            return Err(RejectReason::Empty);
        }
        if state.pending {
            tracing::debug!("Chat send ignored: previous question still pending");
            return Err(RejectReason::Busy);
        }
        state.transcript.push(ChatEntry::user(question.clone()));
        state.input.clear();
        state.pending = true;
        Ok((question, state.session.clone()))
    }

    async fn exchange(&self, text: Option<&str>) -> SubmitOutcome {
        let (question, session) = match self.begin(text) {
            Ok(opened) => opened,
            Err(reason) => return SubmitOutcome::Rejected(reason),
        };

        let assistant = Arc::clone(&self.inner.assistant);
        let result = tokio::select! {
            _ = session.cancelled() => None,
            result = assistant.ask(&question) => Some(result),
        };

        let mut state = self.state();
        let Some(result) = result.filter(|_| !session.is_cancelled()) else {
            tracing::debug!("Chat answer for '{}' dropped: session reset", question);
            return SubmitOutcome::Discarded;
        };

        let outcome = match result {
            Ok(answer) => {
                state.transcript.push(ChatEntry::assistant(answer));
                SubmitOutcome::Answered
            }
            Err(e) => {
                tracing::error!("Chat error: {}", e);
                state
                    .transcript
                    .push(ChatEntry::assistant(self.inner.fallback_error.clone()));
                SubmitOutcome::Failed
            }
        };
        state.pending = false;
        outcome
    }

    /// Starts over from the greeting. Any in-flight answer is dropped.
    pub fn reset(&self) {
        let mut state = self.state();
        state.session.cancel();
        state.session = CancellationToken::new();
        state.transcript = vec![ChatEntry::assistant(self.inner.greeting.clone())];
        state.input.clear();
        state.pending = false;
        tracing::debug!("Chat transcript reset");
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        let state = self.state();
        ChatSnapshot {
            open: state.open,
            input: state.input.clone(),
            pending: state.pending,
            transcript: state.transcript.clone(),
        }
    }

    /// Number of questions that have a terminal assistant entry.
    pub fn completed_exchanges(&self) -> usize {
        let state = self.state();
        let users = state
            .transcript
            .iter()
            .filter(|e| e.role == Role::User)
            .count();
        if state.pending { users - 1 } else { users }
    }
}
