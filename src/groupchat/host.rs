//! Group-chat host
//!
//! [`GroupChatHost`] is the orchestrator's HTTP entry point. Each request builds a fresh
//! session from a [`GroupChatConfig`], seeds it with the caller's prompt as a user message, and
//! runs it against the configured remote agents:
//!
//! - `POST /group-chat` with `{"prompt": "..."}` answers with the session
//!   [`Transcript`](crate::group_chat::Transcript), or `502` with `{error, history}` when the
//!   session fails.
//! - `POST /group-chat/stream` answers with `application/jsonl`
//!   [`ChatUpdate`](crate::group_chat::ChatUpdate) records as they happen and ends with a
//!   `{"type":"error",...}` record if the session fails.
//!
//! Sessions are independent; the host keeps no per-session state. A client that disconnects
//! from the stream endpoint drops its session, which aborts the in-flight agent call.
//! Only available with the `server` feature.

use crate::groupchat::agent_server::{jsonl_response, ServerInstance};
use crate::groupchat::client_wrapper::{ClientWrapper, Message};
use crate::groupchat::config::GroupChatConfig;
use crate::groupchat::error::ChatError;
use crate::groupchat::group_chat::GroupChat;
use crate::groupchat::history::ChatHistory;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures_util::{pin_mut, StreamExt};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const GROUP_CHAT_PATH: &str = "/group-chat";
pub const GROUP_CHAT_STREAM_PATH: &str = "/group-chat/stream";

/// Body of both host endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupChatRequest {
    pub prompt: String,
}

/// Body of a failed `POST /group-chat`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupChatErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// History as it stood when the session failed.
    #[serde(default)]
    pub history: ChatHistory,
}

/// Terminal record of a failed streaming session.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum StreamRecord {
    Error { error: String },
}

struct HostState {
    config: GroupChatConfig,
    model_client: Option<Arc<dyn ClientWrapper>>,
    shutdown: CancellationToken,
}

impl HostState {
    fn session(&self, prompt: &str) -> Result<GroupChat, ChatError> {
        if prompt.trim().is_empty() {
            return Err(ChatError::InvalidConfig("prompt must not be empty".to_string()));
        }
        let mut chat = self
            .config
            .build_group_chat(self.model_client.clone())?
            .with_cancellation_token(self.shutdown.child_token());
        chat.add_chat_message(Message::user(prompt))?;
        Ok(chat)
    }
}

/// HTTP host running group-chat sessions over remote agents.
pub struct GroupChatHost {
    config: GroupChatConfig,
    model_client: Option<Arc<dyn ClientWrapper>>,
    shutdown: CancellationToken,
}

impl GroupChatHost {
    pub fn new(config: GroupChatConfig) -> Self {
        Self {
            config,
            model_client: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Model backend for model-delegated selection or termination.
    pub fn with_model_client(mut self, client: Arc<dyn ClientWrapper>) -> Self {
        self.model_client = Some(client);
        self
    }

    /// Cancelling this token cancels every running session.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(HostState {
            config: self.config.clone(),
            model_client: self.model_client.clone(),
            shutdown: self.shutdown.clone(),
        });
        Router::new()
            .route(GROUP_CHAT_PATH, post(run_group_chat))
            .route(GROUP_CHAT_STREAM_PATH, post(stream_group_chat))
            .with_state(state)
    }

    /// Bind `addr` and serve in a background task.
    pub async fn start_at(
        self,
        addr: SocketAddr,
    ) -> Result<ServerInstance, Box<dyn Error + Send + Sync>> {
        if self.config.requires_model_client() && self.model_client.is_none() {
            return Err(Box::new(ChatError::InvalidConfig(
                "model-delegated strategy configured without a model client".to_string(),
            )));
        }
        let instance = ServerInstance::spawn(addr, self.router()).await?;
        log::info!(
            "GroupChatHost: {} agent(s) configured, listening on {}",
            self.config.agents.len(),
            instance.addr()
        );
        Ok(instance)
    }
}

async fn run_group_chat(
    State(host): State<Arc<HostState>>,
    Json(request): Json<GroupChatRequest>,
) -> Response {
    let mut chat = match host.session(&request.prompt) {
        Ok(chat) => chat,
        Err(err) => return rejected(err),
    };
    log::info!("GroupChatHost: session {} started", chat.id());

    match chat.run().await {
        Ok(transcript) => (StatusCode::OK, Json(transcript)).into_response(),
        Err(failure) => (
            StatusCode::BAD_GATEWAY,
            Json(GroupChatErrorBody {
                error: failure.error.to_string(),
                session_id: Some(failure.session_id),
                history: failure.history,
            }),
        )
            .into_response(),
    }
}

async fn stream_group_chat(
    State(host): State<Arc<HostState>>,
    Json(request): Json<GroupChatRequest>,
) -> Response {
    let chat = match host.session(&request.prompt) {
        Ok(chat) => chat,
        Err(err) => return rejected(err),
    };
    log::info!("GroupChatHost: streaming session {} started", chat.id());

    let lines = async_stream::stream! {
        let mut chat = chat;
        let updates = chat.invoke_streaming();
        pin_mut!(updates);
        while let Some(update) = updates.next().await {
            let line = match update {
                Ok(update) => serde_json::to_string(&update),
                Err(err) => serde_json::to_string(&StreamRecord::Error { error: err.to_string() }),
            };
            match line {
                Ok(mut line) => {
                    line.push('\n');
                    yield Ok(line);
                }
                Err(e) => {
                    yield Err(ChatError::Deserialization(e.to_string()));
                    break;
                }
            }
        }
    };
    jsonl_response(lines)
}

fn rejected(err: ChatError) -> Response {
    log::warn!("GroupChatHost: rejected request: {}", err);
    (
        StatusCode::BAD_REQUEST,
        Json(GroupChatErrorBody {
            error: err.to_string(),
            session_id: None,
            history: ChatHistory::new(),
        }),
    )
        .into_response()
}
