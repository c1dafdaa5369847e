use crate::groupchat::error::ChatError;
use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A ClientWrapper is a wrapper around a specific LLM completion service.
/// It provides a common interface to interact with the model behind an agent.
/// It does not keep track of the conversation, for that we use a ChatHistory
/// which is owned by the group chat engine and handed to agents on every turn.
// src/groupchat/client_wrapper

/// Represents the possible roles for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    // set by the developer to steer the model's responses
    User,
    // a message sent by a human user (or app user)
    Assistant,
    // lets the model know the content was generated as a response to a user message
    Tool,
}

impl Role {
    /// Lowercase wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A single conversation entry.
///
/// On the wire a message is `{"role": "...", "authorName": "...", "content": "..."}`.
/// `authorName` is `null` for messages that have no agent origin (user prompts, system
/// directives).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// Name of the participant that produced the message, if any.
    #[serde(default)]
    pub author_name: Option<String>,
    /// The actual content of the message.
    pub content: String,
}

impl Message {
    /// Create a message without an author.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            author_name: None,
            content: content.into(),
        }
    }

    /// Shorthand for a user-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Shorthand for a system-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Shorthand for an assistant-role message attributed to `author`.
    pub fn assistant(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content).with_author(author)
    }

    /// Attach an author name (builder pattern).
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author_name = Some(author.into());
        self
    }
}

/// A partial, non-final piece of a reply produced while an agent streams.
///
/// On the wire a delta is `{"authorName": "...", "contentFragment": "..."}`, one per line of
/// an `application/jsonl` body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingDelta {
    /// Name of the participant producing the reply.
    #[serde(default)]
    pub author_name: Option<String>,
    /// Incremental text; fragments concatenate to the full reply.
    pub content_fragment: String,
}

impl StreamingDelta {
    pub fn new(author_name: Option<String>, content_fragment: impl Into<String>) -> Self {
        Self {
            author_name,
            content_fragment: content_fragment.into(),
        }
    }
}

/// Represents a chunk of a streaming completion from the model backend.
#[derive(Clone, Debug)]
pub struct MessageChunk {
    /// The incremental content in this chunk.
    pub content: String,
    /// Whether the backend reported a finish reason with this chunk. Consumers stop reading
    /// after a final chunk.
    pub is_final: bool,
}

/// Stream of completion chunks returned by [`ClientWrapper::send_message_stream`].
pub type MessageChunkStream = Pin<Box<dyn Stream<Item = Result<MessageChunk, ChatError>> + Send>>;

/// Trait defining the interface to interact with various LLM services.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Model identifier, used in logs.
    fn model_name(&self) -> &str;

    /// Send the messages to the LLM and get the complete response.
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ChatError>;

    /// Send the messages to the LLM and get a streaming response.
    ///
    /// The default implementation waits for [`send_message`](ClientWrapper::send_message)
    /// and yields its content as one final chunk, so backends without native streaming
    /// still satisfy the streaming contract.
    async fn send_message_stream(&self, messages: &[Message]) -> Result<MessageChunkStream, ChatError> {
        let reply = self.send_message(messages).await?;
        let chunk = MessageChunk {
            content: reply.content,
            is_final: true,
        };
        Ok(Box::pin(stream::once(async move { Ok(chunk) })))
    }
}
