//! Group-chat event system.
//!
//! Provides a callback-based observability layer for group-chat sessions. Implement
//! [`EventHandler`] to be notified about run boundaries, speaker selection, completed turns,
//! termination checks, and failures.
//!
//! The handler is wrapped in `Arc<dyn EventHandler>` and attached with
//! [`GroupChat::with_event_handler`](crate::group_chat::GroupChat::with_event_handler). It is
//! awaited inline by the engine, so a slow handler slows the session down.
//!
//! # Example
//!
//! ```rust,no_run
//! use groupchat::event::{EventHandler, GroupChatEvent};
//! use async_trait::async_trait;
//!
//! struct PrintHandler;
//!
//! #[async_trait]
//! impl EventHandler for PrintHandler {
//!     async fn on_group_chat_event(&self, event: &GroupChatEvent) {
//!         if let GroupChatEvent::TurnCompleted { agent_name, iteration, .. } = event {
//!             println!("turn {} by {}", iteration, agent_name);
//!         }
//!     }
//! }
//! ```

use crate::groupchat::error::ChatError;
use crate::groupchat::group_chat::ChatState;
use async_trait::async_trait;

/// Events emitted by a [`GroupChat`](crate::group_chat::GroupChat) while it runs.
///
/// # Event Flow (one session)
///
/// ```text
/// RunStarted
///   └─ SpeakerSelected { iteration: 1 }
///   └─ TurnCompleted { iteration: 1 }
///   └─ TerminationChecked { iteration: 1 }   (only for termination agents)
///   └─ ... repeated until terminated, bounded, or cancelled
/// RunFinished | RunFailed
/// ```
#[derive(Debug, Clone)]
pub enum GroupChatEvent {
    /// Fired once when the session leaves `Idle`.
    RunStarted {
        session_id: String,
        participant_count: usize,
        max_iterations: usize,
    },

    /// Fired after the selection strategy's answer resolved to a registered participant.
    SpeakerSelected {
        session_id: String,
        /// 1-based number of the turn about to run.
        iteration: usize,
        agent_name: String,
    },

    /// Fired after a reply was appended to the history.
    TurnCompleted {
        session_id: String,
        iteration: usize,
        agent_name: String,
        /// Character length of the reply.
        content_length: usize,
    },

    /// Fired after the termination strategy was consulted.
    TerminationChecked {
        session_id: String,
        iteration: usize,
        agent_name: String,
        terminate: bool,
    },

    /// Fired when the session reaches `Completed`, `Terminated`, or `Cancelled`.
    RunFinished {
        session_id: String,
        state: ChatState,
        iterations: usize,
    },

    /// Fired when the session reaches `Failed`.
    RunFailed {
        session_id: String,
        /// Turns completed before the failure.
        iteration: usize,
        error: ChatError,
    },
}

/// Receives [`GroupChatEvent`]s. The default implementation ignores them.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_group_chat_event(&self, _event: &GroupChatEvent) {}
}
