//! # groupchat
//!
//! groupchat orchestrates multi-agent conversations in which every agent may live in its own
//! process. A conversation is an ordered, append-only [`ChatHistory`]; on every turn a
//! [`selection`] strategy picks the next speaker, the speaker answers the whole history (in
//! one piece or as a stream of deltas), and a [`termination`] strategy decides whether the
//! goal has been reached.
//!
//! The crate provides:
//!
//! * **Participants**: the [`Participant`] contract, implemented by [`LocalAgent`] (answers
//!   through a [`ClientWrapper`] model backend) and by [`RemoteAgent`] (answers by calling
//!   another process over HTTP)
//! * **The engine**: [`GroupChat`], a lazy, cancellable, bounded turn loop with a
//!   [`ChatState`] lifecycle and [`EventHandler`] callbacks
//! * **Strategies**: round-robin, rule-based, closure, and model-delegated selection;
//!   keyword, closure, and model-delegated termination
//! * **Configuration**: [`GroupChatConfig`](config::GroupChatConfig), loaded from JSON
//! * **Servers** (`server` feature): `agent_server::AgentServer` hosts one agent over the
//!   agent wire protocol, `host::GroupChatHost` exposes whole sessions over HTTP
//!
//! ## Wire protocol
//!
//! | Endpoint | Body | Response |
//! |---|---|---|
//! | `POST /agent/invoke` | `[{"role":"user","authorName":null,"content":"..."}]` | `{"role":"assistant","authorName":"...","content":"..."}` |
//! | `POST /agent/invoke-streaming` | same | one `{"authorName":"...","contentFragment":"..."}` per line |
//! | `GET /agent/details` | | `{"name":"...","instructions":"..."}` |
//!
//! ## Example
//!
//! ```rust,no_run
//! use groupchat::{GroupChat, Message, RemoteAgent};
//! use groupchat::selection::RuleSelection;
//! use groupchat::termination::KeywordTermination;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     groupchat::init_logger();
//!
//!     let mut chat = GroupChat::new()
//!         .with_selection(Arc::new(
//!             RuleSelection::new()
//!                 .after_user("translatoragent")
//!                 .after("translatoragent", "summaryagent"),
//!         ))
//!         .with_termination(Arc::new(KeywordTermination::new("yes")))
//!         .with_termination_agents(["summaryagent"]);
//!     chat.add_participant(Arc::new(RemoteAgent::new("translatoragent", "http://localhost:5001")?))?;
//!     chat.add_participant(Arc::new(RemoteAgent::new("summaryagent", "http://localhost:5002")?))?;
//!     chat.add_chat_message(Message::user("Buongiorno a tutti"))?;
//!
//!     let transcript = chat.run().await?;
//!     for message in &transcript.messages {
//!         println!("# {} - {}: '{}'", message.role.as_str(), message.author_name.as_deref().unwrap_or("*"), message.content);
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding groupchat opt in to `RUST_LOG` driven diagnostics with this call;
/// repeated calls are no-ops.
///
/// ```rust
/// groupchat::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `groupchat` module.
pub mod groupchat;

// Re-exporting key items for easier external access.
pub use groupchat::agent;
pub use groupchat::agent::{AgentDetails, DeltaStream, LocalAgent, Participant};
pub use groupchat::client_wrapper;
pub use groupchat::client_wrapper::{
    ClientWrapper, Message, MessageChunk, MessageChunkStream, Role, StreamingDelta,
};
pub use groupchat::clients;
pub use groupchat::config;
pub use groupchat::error;
pub use groupchat::error::{ChatError, ChatFailure};
pub use groupchat::event;
pub use groupchat::event::{EventHandler, GroupChatEvent};
pub use groupchat::group_chat;
pub use groupchat::group_chat::{ChatState, ChatUpdate, GroupChat, Transcript};
pub use groupchat::history;
pub use groupchat::history::ChatHistory;
pub use groupchat::http_client_pool;
pub use groupchat::remote_agent;
pub use groupchat::remote_agent::{MalformedLinePolicy, RemoteAgent};
pub use groupchat::selection;
pub use groupchat::termination;

#[cfg(feature = "server")]
pub use groupchat::agent_server;
#[cfg(feature = "server")]
pub use groupchat::host;
