//! Participant contract
//!
//! Everything that can take a turn in a [`GroupChat`](crate::group_chat::GroupChat) implements
//! [`Participant`]: a name plus two ways of answering a conversation history, either with one
//! complete [`Message`] or with an incremental stream of [`StreamingDelta`]s.
//!
//! Two implementations ship with the crate:
//!
//! - [`LocalAgent`]: answers in-process through a [`ClientWrapper`] model backend.
//! - [`RemoteAgent`](crate::remote_agent::RemoteAgent): answers by calling another process
//!   over HTTP.
//!
//! The engine only ever sees `Arc<dyn Participant>`, so a session can mix both freely.
//!
//! # Example
//!
//! ```rust,no_run
//! use groupchat::agent::{LocalAgent, Participant};
//! use groupchat::clients::openai::OpenAIClient;
//! use groupchat::{ChatHistory, Message};
//! use std::sync::Arc;
//!
//! # async {
//! let client = Arc::new(OpenAIClient::new("key", "gpt-4o").unwrap());
//! let agent = LocalAgent::new("summaryagent", "Summarize user input", client);
//!
//! let mut history = ChatHistory::new();
//! history.add_message(Message::user("Rust is a systems programming language..."));
//!
//! let reply = agent.invoke(&history).await.unwrap();
//! assert_eq!(reply.author_name.as_deref(), Some("summaryagent"));
//! # };
//! ```

use crate::groupchat::client_wrapper::{ClientWrapper, Message, Role, StreamingDelta};
use crate::groupchat::error::ChatError;
use crate::groupchat::history::ChatHistory;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

/// Lazy, finite stream of deltas produced by one streaming invocation.
///
/// The stream is not restartable. Dropping it stops the underlying producer.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamingDelta, ChatError>> + Send>>;

/// Capability contract shared by local and remote agents.
///
/// Implementations must treat the history as read-only; only the engine appends to it.
#[async_trait]
pub trait Participant: Send + Sync {
    /// Name of the participant, unique within a session.
    fn name(&self) -> &str;

    /// Produce exactly one reply to `history`.
    async fn invoke(&self, history: &ChatHistory) -> Result<Message, ChatError>;

    /// Produce the reply to `history` as a stream of deltas.
    ///
    /// Concatenating every `content_fragment` yields the same text `invoke` would return
    /// for identical model output.
    async fn invoke_stream(&self, history: &ChatHistory) -> Result<DeltaStream, ChatError>;
}

/// Static description of an agent, served by `GET /agent/details`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDetails {
    pub name: String,
    pub instructions: String,
}

/// An agent that answers in-process by calling a model backend.
///
/// Its `instructions` are sent as a system message ahead of the conversation on every call,
/// and each reply is stamped with the agent's name. Streaming ends at the chunk the backend
/// marks final; empty chunks produce no delta.
pub struct LocalAgent {
    name: String,
    instructions: String,
    client: Arc<dyn ClientWrapper>,
}

impl LocalAgent {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        client: Arc<dyn ClientWrapper>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            client,
        }
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn details(&self) -> AgentDetails {
        AgentDetails {
            name: self.name.clone(),
            instructions: self.instructions.clone(),
        }
    }

    fn prompt(&self, history: &ChatHistory) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !self.instructions.is_empty() {
            messages.push(Message::system(self.instructions.clone()));
        }
        messages.extend(history.iter().cloned());
        messages
    }
}

#[async_trait]
impl Participant for LocalAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, history: &ChatHistory) -> Result<Message, ChatError> {
        log::debug!(
            "LocalAgent '{}' invoking {} with {} message(s)",
            self.name,
            self.client.model_name(),
            history.len()
        );
        let reply = self.client.send_message(&self.prompt(history)).await?;
        Ok(Message {
            role: Role::Assistant,
            author_name: Some(self.name.clone()),
            content: reply.content,
        })
    }

    async fn invoke_stream(&self, history: &ChatHistory) -> Result<DeltaStream, ChatError> {
        log::debug!(
            "LocalAgent '{}' streaming from {} with {} message(s)",
            self.name,
            self.client.model_name(),
            history.len()
        );
        let mut chunks = self.client.send_message_stream(&self.prompt(history)).await?;
        let author = self.name.clone();
        Ok(Box::pin(async_stream::stream! {
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(chunk) => {
                        // Role-only and finish chunks carry no text.
                        if !chunk.content.is_empty() {
                            yield Ok(StreamingDelta::new(Some(author.clone()), chunk.content));
                        }
                        if chunk.is_final {
                            break;
                        }
                    }
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        }))
    }
}
