//! Speaker selection strategies.
//!
//! Before every turn the [`GroupChat`](crate::group_chat::GroupChat) engine asks its
//! [`SelectionStrategy`] who speaks next. A strategy only *names* the speaker; the engine
//! resolves that name against the registered participants and fails the session with
//! [`ChatError::UnknownParticipant`] when nothing matches.
//!
//! Strategies must not mutate the history, and given the same history they should return the
//! same answer. The model-delegated strategy is deterministic only as far as the model is.
//!
//! | Strategy | Decides by |
//! |---|---|
//! | [`SequentialSelection`] | round-robin in registration order |
//! | [`RuleSelection`] | explicit "after X, Y speaks" transitions |
//! | [`FnSelection`] | a plain closure |
//! | [`ModelSelection`] | asking a model with a prompt template |
//!
//! # Example
//!
//! ```
//! use groupchat::selection::{RuleSelection, SelectionContext, SelectionStrategy};
//! use groupchat::{ChatHistory, Message};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let rules = RuleSelection::new()
//!     .after_user("translatoragent")
//!     .after("translatoragent", "summaryagent");
//!
//! let mut history = ChatHistory::new();
//! history.add_message(Message::user("Buongiorno"));
//! let ctx = SelectionContext::new(vec!["translatoragent".into(), "summaryagent".into()], 0);
//! assert_eq!(rules.select_next(&history, &ctx).await.unwrap(), "translatoragent");
//!
//! history.add_message(Message::assistant("translatoragent", "Good morning"));
//! assert_eq!(rules.select_next(&history, &ctx).await.unwrap(), "summaryagent");
//! # }
//! ```

use crate::groupchat::client_wrapper::{ClientWrapper, Message, Role};
use crate::groupchat::error::ChatError;
use crate::groupchat::history::ChatHistory;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Placeholder replaced with the rendered history in model prompt templates.
pub const HISTORY_PLACEHOLDER: &str = "{{$history}}";
/// Placeholder replaced with the participant list in selection prompt templates.
pub const PARTICIPANTS_PLACEHOLDER: &str = "{{$participants}}";

/// Default template used by [`ModelSelection`].
pub const DEFAULT_SELECTION_PROMPT: &str = "\
Your job is to determine which participant takes the next turn in a conversation according to the action of the most recent participant.
State only the name of the participant to take the next turn.

Choose only from these participants:
{{$participants}}

History:
{{$history}}";

/// What the engine knows about the session when it asks for a speaker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionContext {
    /// Registered participant names, in registration order.
    pub participants: Vec<String>,
    /// Number of turns completed so far.
    pub iteration: usize,
}

impl SelectionContext {
    pub fn new(participants: Vec<String>, iteration: usize) -> Self {
        Self {
            participants,
            iteration,
        }
    }
}

/// Decides which participant takes the next turn.
#[async_trait]
pub trait SelectionStrategy: Send + Sync {
    /// Name of the participant that should speak next.
    async fn select_next(
        &self,
        history: &ChatHistory,
        context: &SelectionContext,
    ) -> Result<String, ChatError>;
}

/// Round-robin over the participants in registration order.
///
/// After a user message (or on an empty history) the first participant speaks; after
/// participant `i` speaks, participant `i + 1` does, wrapping around.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialSelection;

impl SequentialSelection {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SelectionStrategy for SequentialSelection {
    async fn select_next(
        &self,
        history: &ChatHistory,
        context: &SelectionContext,
    ) -> Result<String, ChatError> {
        let first = context
            .participants
            .first()
            .ok_or_else(|| ChatError::Selection("no participants to choose from".to_string()))?;

        for message in history.iter().rev() {
            if message.role == Role::User {
                return Ok(first.clone());
            }
            if let Some(author) = message.author_name.as_deref() {
                if let Some(index) = context.participants.iter().position(|p| p == author) {
                    let next = (index + 1) % context.participants.len();
                    return Ok(context.participants[next].clone());
                }
            }
        }

        Ok(first.clone())
    }
}

/// Explicit transition table: "after the user, X speaks", "after X, Y speaks".
///
/// The table is keyed on the most recent user or participant message. A history whose last
/// speaker has no rule is a [`ChatError::Selection`] failure rather than a silent fallback.
#[derive(Clone, Debug, Default)]
pub struct RuleSelection {
    initial: Option<String>,
    transitions: HashMap<String, String>,
}

impl RuleSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Participant that answers user input (and opens an empty conversation).
    pub fn after_user(mut self, next: impl Into<String>) -> Self {
        self.initial = Some(next.into());
        self
    }

    /// Participant that speaks after `speaker`.
    pub fn after(mut self, speaker: impl Into<String>, next: impl Into<String>) -> Self {
        self.transitions.insert(speaker.into(), next.into());
        self
    }

    /// Every participant name this table can produce.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.initial
            .iter()
            .chain(self.transitions.values())
            .map(String::as_str)
    }

    fn initial(&self) -> Result<String, ChatError> {
        self.initial
            .clone()
            .ok_or_else(|| ChatError::Selection("no rule for the turn after user input".to_string()))
    }
}

#[async_trait]
impl SelectionStrategy for RuleSelection {
    async fn select_next(
        &self,
        history: &ChatHistory,
        _context: &SelectionContext,
    ) -> Result<String, ChatError> {
        let last = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User || m.author_name.is_some());

        match last {
            None => self.initial(),
            Some(m) if m.role == Role::User => self.initial(),
            Some(m) => {
                let speaker = m.author_name.as_deref().unwrap_or_default();
                self.transitions.get(speaker).cloned().ok_or_else(|| {
                    ChatError::Selection(format!("no rule for the turn after '{}'", speaker))
                })
            }
        }
    }
}

type SelectFn = dyn Fn(&ChatHistory, &SelectionContext) -> Result<String, ChatError> + Send + Sync;

/// Selection delegated to a closure.
#[derive(Clone)]
pub struct FnSelection {
    select: Arc<SelectFn>,
}

impl FnSelection {
    pub fn new<F>(select: F) -> Self
    where
        F: Fn(&ChatHistory, &SelectionContext) -> Result<String, ChatError> + Send + Sync + 'static,
    {
        Self {
            select: Arc::new(select),
        }
    }
}

#[async_trait]
impl SelectionStrategy for FnSelection {
    async fn select_next(
        &self,
        history: &ChatHistory,
        context: &SelectionContext,
    ) -> Result<String, ChatError> {
        (self.select)(history, context)
    }
}

/// Selection delegated to a model.
///
/// The template's `{{$participants}}` is replaced with one `- name` line per participant
/// and `{{$history}}` with [`ChatHistory::render`]. The model's reply, trimmed, is taken as
/// the speaker name; the engine then resolves it leniently (quotes, trailing period, case).
pub struct ModelSelection {
    client: Arc<dyn ClientWrapper>,
    template: String,
}

impl ModelSelection {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            client,
            template: DEFAULT_SELECTION_PROMPT.to_string(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    fn prompt(&self, history: &ChatHistory, context: &SelectionContext) -> String {
        let participants = context
            .participants
            .iter()
            .map(|p| format!("- {}", p))
            .collect::<Vec<_>>()
            .join("\n");
        self.template
            .replace(PARTICIPANTS_PLACEHOLDER, &participants)
            .replace(HISTORY_PLACEHOLDER, &history.render())
    }
}

#[async_trait]
impl SelectionStrategy for ModelSelection {
    async fn select_next(
        &self,
        history: &ChatHistory,
        context: &SelectionContext,
    ) -> Result<String, ChatError> {
        let prompt = self.prompt(history, context);
        let reply = self.client.send_message(&[Message::user(prompt)]).await?;
        let name = reply.content.trim();
        if name.is_empty() {
            return Err(ChatError::Selection(format!(
                "{} returned an empty speaker name",
                self.client.model_name()
            )));
        }
        log::debug!("ModelSelection picked '{}'", name);
        Ok(name.to_string())
    }
}
