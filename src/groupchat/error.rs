//! Error taxonomy for group-chat sessions.
//!
//! Every failure that can stop a session, whether it comes from a remote participant, a
//! strategy, or the engine's own bookkeeping, is reported as a [`ChatError`]. Cancellation
//! is deliberately absent: a cancelled session ends in
//! [`ChatState::Cancelled`](crate::group_chat::ChatState::Cancelled) without an error.
//!
//! # Examples
//!
//! ```
//! use groupchat::ChatError;
//!
//! let err = ChatError::UnknownParticipant("reviewer".into());
//! assert_eq!(err.to_string(), "Unknown participant: reviewer");
//! ```

use crate::groupchat::history::ChatHistory;
use std::error::Error;
use std::fmt;

/// Errors raised by participants, strategies, and the group-chat engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatError {
    /// A remote participant answered with a non-success HTTP status.
    RemoteInvocation {
        /// Name of the participant that was invoked.
        agent: String,
        /// HTTP status code returned by the remote agent.
        status: u16,
        /// Reason phrase of the status line, followed by the response body when present.
        reason: String,
    },

    /// The request never produced a response (connection refused, timeout, reset).
    Transport {
        /// Name of the participant that was invoked.
        agent: String,
        /// Underlying transport error message.
        message: String,
    },

    /// A body that should contain exactly one well-formed message could not be decoded.
    Deserialization(String),

    /// A line of a streaming response could not be decoded into a delta.
    ///
    /// Only surfaced when the proxy runs with
    /// [`MalformedLinePolicy::Fail`](crate::remote_agent::MalformedLinePolicy::Fail);
    /// the default policy logs and skips the line.
    MalformedStreamLine {
        /// The offending line, verbatim.
        line: String,
        /// Decoder error message.
        message: String,
    },

    /// The selection strategy could not produce a usable speaker.
    Selection(String),

    /// The selection strategy named a participant that is not registered in the session.
    UnknownParticipant(String),

    /// The in-process model backend failed.
    Model(String),

    /// The session was started without any participants.
    NoParticipants,

    /// A participant with the same name is already registered.
    DuplicateParticipant(String),

    /// Configuration is structurally invalid.
    InvalidConfig(String),

    /// The session already ran; sessions cannot be restarted.
    SessionFinished(String),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::RemoteInvocation {
                agent,
                status,
                reason,
            } => write!(
                f,
                "Failed to invoke agent '{}': HTTP {} {}",
                agent, status, reason
            ),
            ChatError::Transport { agent, message } => {
                write!(f, "Transport error talking to agent '{}': {}", agent, message)
            }
            ChatError::Deserialization(msg) => write!(f, "Deserialization failed: {}", msg),
            ChatError::MalformedStreamLine { line, message } => {
                write!(f, "Malformed stream line '{}': {}", line, message)
            }
            ChatError::Selection(msg) => write!(f, "Selection failed: {}", msg),
            ChatError::UnknownParticipant(name) => write!(f, "Unknown participant: {}", name),
            ChatError::Model(msg) => write!(f, "Model call failed: {}", msg),
            ChatError::NoParticipants => write!(f, "No participants in group chat"),
            ChatError::DuplicateParticipant(name) => {
                write!(f, "Participant '{}' is already registered", name)
            }
            ChatError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            ChatError::SessionFinished(state) => {
                write!(f, "Session already ran (state: {}); start a new session", state)
            }
        }
    }
}

impl Error for ChatError {}

/// A terminal session failure together with everything that completed before it.
///
/// Returned by [`GroupChat::run`](crate::group_chat::GroupChat::run). The `history` holds
/// the seed messages plus every turn appended before the error; the failed turn itself is
/// never part of it.
#[derive(Debug, Clone)]
pub struct ChatFailure {
    /// Identifier of the failed session.
    pub session_id: String,
    /// The error that stopped the session.
    pub error: ChatError,
    /// History as it stood when the session failed.
    pub history: ChatHistory,
    /// Number of turns completed before the failure.
    pub iterations: usize,
}

impl fmt::Display for ChatFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Group chat {} failed after {} turn(s): {}",
            self.session_id, self.iterations, self.error
        )
    }
}

impl Error for ChatFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}
