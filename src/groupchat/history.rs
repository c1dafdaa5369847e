//! Append-only conversation history shared by the participants of one group chat.
//!
//! The history is the single source of truth every strategy and participant reads from.
//! Insertion order is the only index: message `i` was created before message `i + 1`, and
//! nothing ever rewrites or removes an appended entry.
//!
//! On the wire (the body of `POST /agent/invoke`) a history is a bare JSON array:
//!
//! ```
//! use groupchat::{ChatHistory, Message};
//!
//! let mut history = ChatHistory::new();
//! history.add_message(Message::user("Ciao!"));
//!
//! let json = serde_json::to_string(&history).unwrap();
//! assert_eq!(json, r#"[{"role":"user","authorName":null,"content":"Ciao!"}]"#);
//! ```

use crate::groupchat::client_wrapper::{Message, Role};
use serde::{Deserialize, Serialize};
use std::slice::Iter;

/// Ordered, append-only log of [`Message`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatHistory {
    messages: Vec<Message>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message at the end of the history.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The most recent message authored by `name`.
    pub fn last_from(&self, name: &str) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.author_name.as_deref() == Some(name))
    }

    /// Render the history as plain text for prompt templates.
    ///
    /// One line per message, `role - author: content`, with `*` standing in for a missing
    /// author.
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|m| {
                format!(
                    "{} - {}: {}",
                    m.role.as_str(),
                    m.author_name.as_deref().unwrap_or("*"),
                    m.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Messages produced by participants (assistant role), in order.
    pub fn turns(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role == Role::Assistant)
    }
}

impl From<Vec<Message>> for ChatHistory {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

impl<'a> IntoIterator for &'a ChatHistory {
    type Item = &'a Message;
    type IntoIter = Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
