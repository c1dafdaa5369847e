//! Termination strategies.
//!
//! After every turn the engine asks its [`TerminationStrategy`] whether the conversation has
//! reached its goal. The check can be scoped to a subset of participants (see
//! [`GroupChat::with_termination_agents`](crate::group_chat::GroupChat::with_termination_agents)),
//! and independent of any strategy the engine stops once `max_iterations` turns have run.
//!
//! ```
//! use groupchat::termination::{KeywordTermination, TerminationStrategy};
//! use groupchat::{ChatHistory, Message};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let done = KeywordTermination::new("yes");
//! let mut history = ChatHistory::new();
//! history.add_message(Message::assistant("summaryagent", "Summary complete. YES"));
//! assert!(done.should_terminate(&history).await.unwrap());
//! # }
//! ```

use crate::groupchat::client_wrapper::{ClientWrapper, Message};
use crate::groupchat::error::ChatError;
use crate::groupchat::history::ChatHistory;
use crate::groupchat::selection::HISTORY_PLACEHOLDER;
use async_trait::async_trait;
use std::sync::Arc;

/// Default template used by [`ModelTermination`].
pub const DEFAULT_TERMINATION_PROMPT: &str = "\
Determine if the text has been summarized. If so, respond with a single word: yes.

History:

{{$history}}";

/// Decides whether the conversation has reached its goal.
#[async_trait]
pub trait TerminationStrategy: Send + Sync {
    async fn should_terminate(&self, history: &ChatHistory) -> Result<bool, ChatError>;
}

/// Never ends the conversation; only `max_iterations` stops the session.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverTerminate;

#[async_trait]
impl TerminationStrategy for NeverTerminate {
    async fn should_terminate(&self, _history: &ChatHistory) -> Result<bool, ChatError> {
        Ok(false)
    }
}

/// Ends the conversation when the latest message contains a keyword (case-insensitive).
#[derive(Clone, Debug)]
pub struct KeywordTermination {
    keyword: String,
}

impl KeywordTermination {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into().to_lowercase(),
        }
    }
}

#[async_trait]
impl TerminationStrategy for KeywordTermination {
    async fn should_terminate(&self, history: &ChatHistory) -> Result<bool, ChatError> {
        Ok(history
            .last()
            .map(|m| m.content.to_lowercase().contains(&self.keyword))
            .unwrap_or(false))
    }
}

type TerminateFn = dyn Fn(&ChatHistory) -> Result<bool, ChatError> + Send + Sync;

/// Termination decided by a closure.
#[derive(Clone)]
pub struct FnTermination {
    decide: Arc<TerminateFn>,
}

impl FnTermination {
    pub fn new<F>(decide: F) -> Self
    where
        F: Fn(&ChatHistory) -> Result<bool, ChatError> + Send + Sync + 'static,
    {
        Self {
            decide: Arc::new(decide),
        }
    }
}

#[async_trait]
impl TerminationStrategy for FnTermination {
    async fn should_terminate(&self, history: &ChatHistory) -> Result<bool, ChatError> {
        (self.decide)(history)
    }
}

type ResultParser = dyn Fn(&str) -> bool + Send + Sync;

/// Returns true when `reply` contains "yes", ignoring case.
pub fn contains_yes(reply: &str) -> bool {
    reply.to_lowercase().contains("yes")
}

/// Termination delegated to a model.
///
/// The template's `{{$history}}` is replaced with the rendered history, the model's answer
/// is handed to the result parser ([`contains_yes`] unless replaced).
pub struct ModelTermination {
    client: Arc<dyn ClientWrapper>,
    template: String,
    parser: Arc<ResultParser>,
}

impl ModelTermination {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            client,
            template: DEFAULT_TERMINATION_PROMPT.to_string(),
            parser: Arc::new(contains_yes),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_result_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.parser = Arc::new(parser);
        self
    }
}

#[async_trait]
impl TerminationStrategy for ModelTermination {
    async fn should_terminate(&self, history: &ChatHistory) -> Result<bool, ChatError> {
        let prompt = self.template.replace(HISTORY_PLACEHOLDER, &history.render());
        let reply = self.client.send_message(&[Message::user(prompt)]).await?;
        let done = (self.parser)(&reply.content);
        log::debug!(
            "ModelTermination: {} answered {:?} -> {}",
            self.client.model_name(),
            reply.content,
            done
        );
        Ok(done)
    }
}
