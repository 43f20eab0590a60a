//! Conversation state and the single-flight exchange owner.
//!
//! `ChatSession` owns the ordered history, the model selection, the
//! system prompt, and the one in-flight cancellation handle. Exactly
//! one exchange can be active per session; a second `submit` fails
//! with `AlreadyInFlight` instead of queuing, and `cancel_active` is a
//! separate operation so the caller decides whether to map a repeated
//! send action onto it.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::warn;

use crate::client::{CancelHandle, StreamingClient};
use crate::config::{Config, ModelEntry};
use crate::error::{ChatError, ChatResult};
use crate::message::{ContextMessage, Message};
use crate::transcript;

/// Lifecycle of one exchange.
///
/// Transitions are written only by the `submit` path: Idle → Sending
/// on entry, Sending → Streaming on the first delta, → Settling once
/// the client settles, → Idle after history is updated. Readable from
/// other threads so a signal handler can check for an active exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Sending = 1,
    Streaming = 2,
    Settling = 3,
}

#[derive(Debug, Clone, Default)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn get(&self) -> SessionState {
        match self.0.load(Ordering::SeqCst) {
            1 => SessionState::Sending,
            2 => SessionState::Streaming,
            3 => SessionState::Settling,
            _ => SessionState::Idle,
        }
    }

    fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Holder for the cancellation handle of the active exchange.
///
/// Shared with [`SessionCanceller`] clones so cancellation can be
/// requested from another task or a signal handler thread.
#[derive(Debug, Clone, Default)]
struct ActiveSlot(Arc<Mutex<Option<CancelHandle>>>);

impl ActiveSlot {
    fn put(&self, handle: CancelHandle) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(handle);
        }
    }

    fn take(&self) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = None;
        }
    }

    fn cancel(&self) {
        if let Ok(slot) = self.0.lock()
            && let Some(handle) = slot.as_ref()
        {
            handle.cancel();
        }
    }
}

/// Cheap, cloneable cancel entry point detached from the session
/// borrow, so Ctrl+C handlers can cancel while `submit` is suspended.
#[derive(Debug, Clone)]
pub struct SessionCanceller {
    active: ActiveSlot,
}

impl SessionCanceller {
    /// Cancels the in-flight exchange, if any.
    pub fn cancel(&self) {
        self.active.cancel();
    }
}

/// One chat conversation against a configured backend.
pub struct ChatSession {
    config: Config,
    current_model: Option<String>,
    history: Vec<Message>,
    client: StreamingClient,
    state: StateCell,
    active: ActiveSlot,
}

impl ChatSession {
    pub fn new(config: Config) -> Self {
        let client = StreamingClient::new(&config.endpoint);
        let current_model = config
            .model(&config.default_model)
            .map(|model| model.id.clone());
        Self {
            current_model,
            history: Vec::new(),
            client,
            state: StateCell::default(),
            active: ActiveSlot::default(),
            config,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn models(&self) -> &[ModelEntry] {
        &self.config.models
    }

    pub fn current_model(&self) -> Option<&ModelEntry> {
        self.current_model
            .as_deref()
            .and_then(|id| self.config.model(id))
    }

    /// Selects a model by id. Unknown ids are ignored.
    pub fn set_model(&mut self, id: &str) {
        if self.config.model(id).is_some() {
            self.current_model = Some(id.to_string());
        }
    }

    /// Returns a handle that can cancel whatever exchange is active.
    pub fn canceller(&self) -> SessionCanceller {
        SessionCanceller {
            active: self.active.clone(),
        }
    }

    /// Cancels the in-flight exchange, if any. No-op when idle.
    pub fn cancel_active(&self) {
        self.active.cancel();
    }

    /// Submits one user turn and streams the response.
    ///
    /// Appends the user message to history before sending (not flagged
    /// for context). On success the assistant message is appended the
    /// same way. On any failure no assistant message is recorded; the
    /// user message stays, since the user's turn happened regardless.
    /// The cancellation handle and state are released on every exit
    /// path.
    ///
    /// # Errors
    /// `AlreadyInFlight` when an exchange is active, plus every
    /// [`crate::client::StreamingClient::send`] failure.
    pub async fn submit(
        &mut self,
        user_text: &str,
        on_reasoning: impl FnMut(&str),
        on_answer: impl FnMut(&str),
    ) -> ChatResult<String> {
        if self.state.get() != SessionState::Idle {
            return Err(ChatError::AlreadyInFlight);
        }
        self.state.set(SessionState::Sending);
        let handle = CancelHandle::new();
        self.active.put(handle.clone());

        self.history.push(Message::user(user_text));
        let messages = self.context_messages(user_text);
        let model = self.current_model.clone().unwrap_or_default();

        let result = self
            .client
            .send(
                &model,
                &messages,
                mark_streaming(&self.state, on_reasoning),
                mark_streaming(&self.state, on_answer),
                &handle,
            )
            .await;

        self.state.set(SessionState::Settling);
        self.active.take();

        let result = match result {
            Ok(answer) => {
                self.history.push(Message::assistant(&answer));
                Ok(answer)
            }
            Err(err) => Err(err),
        };
        self.state.set(SessionState::Idle);
        result
    }

    /// Wraps raw tool/program output in a fixed explanation prompt and
    /// submits it as a user turn.
    ///
    /// # Errors
    /// Same failures as [`ChatSession::submit`].
    pub async fn explain_output(
        &mut self,
        raw_output: &str,
        on_reasoning: impl FnMut(&str),
        on_answer: impl FnMut(&str),
    ) -> ChatResult<String> {
        let prompt = format!("Please explain this output:\n\n{raw_output}");
        self.submit(&prompt, on_reasoning, on_answer).await
    }

    /// Builds the request context: system prompt, then every flagged
    /// history message in insertion order, then the new user turn.
    pub fn context_messages(&self, user_text: &str) -> Vec<ContextMessage> {
        let mut messages = vec![ContextMessage::system(&self.config.system_prompt)];
        messages.extend(
            self.history
                .iter()
                .filter(|message| message.include_in_context)
                .map(Message::as_context),
        );
        messages.push(ContextMessage::user(user_text));
        messages
    }

    /// Flips the context flag of the message at `index` in place.
    /// Out-of-range indices are a no-op, not a fault.
    pub fn toggle_context(&mut self, index: usize) {
        if let Some(message) = self.history.get_mut(index) {
            message.include_in_context = !message.include_in_context;
        }
    }

    /// Clears the history in bulk.
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Serializes the history as pretty-printed JSON.
    pub fn export_transcript(&self) -> String {
        transcript::export(&self.history)
    }

    /// Replaces the history with an imported transcript.
    ///
    /// # Errors
    /// `ImportParse` on malformed input; the prior history is left
    /// intact.
    pub fn import_transcript(&mut self, json: &str) -> ChatResult<()> {
        match transcript::import(json) {
            Ok(history) => {
                self.history = history;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "ignoring malformed transcript");
                Err(err)
            }
        }
    }
}

/// Wraps a channel callback so the first delta moves the session from
/// Sending to Streaming.
fn mark_streaming<'a>(
    state: &StateCell,
    mut inner: impl FnMut(&str) + 'a,
) -> impl FnMut(&str) + 'a {
    let state = state.clone();
    move |text: &str| {
        if state.get() == SessionState::Sending {
            state.set(SessionState::Streaming);
        }
        inner(text);
    }
}
