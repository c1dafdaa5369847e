//! Agent host
//!
//! [`AgentServer`] exposes one in-process [`LocalAgent`] over the agent wire protocol, so that
//! a [`RemoteAgent`](crate::remote_agent::RemoteAgent) in another process can call it:
//!
//! - `POST /agent/invoke`: history in, one [`Message`] out
//! - `POST /agent/invoke-streaming`: history in, `application/jsonl` deltas out
//! - `GET /agent/details`: the agent's name and instructions
//!
//! Replies are stamped with the hosted agent's name. Only available with the `server`
//! feature.
//!
//! # Example
//!
//! ```rust,no_run
//! use groupchat::agent::LocalAgent;
//! use groupchat::agent_server::AgentServer;
//! use groupchat::clients::openai::OpenAIClient;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Arc::new(OpenAIClient::new("sk-...", "gpt-4.1-nano").unwrap());
//!     let agent = LocalAgent::new("translatoragent", "Translate user input in english", client);
//!
//!     let server = AgentServer::new(agent)
//!         .start_at("127.0.0.1:5001".parse().unwrap())
//!         .await
//!         .unwrap();
//!     println!("listening on {}", server.addr());
//!     server.wait().await.unwrap();
//! }
//! ```

use crate::groupchat::agent::{AgentDetails, LocalAgent, Participant};
use crate::groupchat::client_wrapper::Message;
use crate::groupchat::error::ChatError;
use crate::groupchat::history::ChatHistory;
use crate::groupchat::remote_agent::{
    DETAILS_PATH, INVOKE_PATH, INVOKE_STREAMING_PATH, JSONL_CONTENT_TYPE,
};
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A running HTTP server.
pub struct ServerInstance {
    addr: SocketAddr,
    handle: JoinHandle<std::io::Result<()>>,
}

impl ServerInstance {
    pub(crate) async fn spawn(
        addr: SocketAddr,
        app: Router,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move { axum::serve(listener, app).await });
        Ok(Self { addr, handle })
    }

    /// Address the server is bound to; useful after binding port `0`.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://{addr}`, ready to hand to a [`RemoteAgent`](crate::remote_agent::RemoteAgent).
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections and abort in-flight requests.
    pub fn shutdown(self) {
        self.handle.abort();
    }

    /// Wait until the server stops.
    pub async fn wait(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.handle.await??;
        Ok(())
    }
}

/// HTTP host for a single [`LocalAgent`].
pub struct AgentServer {
    agent: Arc<LocalAgent>,
}

impl AgentServer {
    pub fn new(agent: LocalAgent) -> Self {
        Self {
            agent: Arc::new(agent),
        }
    }

    /// The axum router serving the three agent endpoints.
    pub fn router(&self) -> Router {
        Router::new()
            .route(INVOKE_PATH, post(invoke))
            .route(INVOKE_STREAMING_PATH, post(invoke_streaming))
            .route(DETAILS_PATH, get(details))
            .with_state(Arc::clone(&self.agent))
    }

    /// Bind `addr` and serve in a background task.
    pub async fn start_at(
        self,
        addr: SocketAddr,
    ) -> Result<ServerInstance, Box<dyn Error + Send + Sync>> {
        let instance = ServerInstance::spawn(addr, self.router()).await?;
        log::info!(
            "AgentServer: '{}' listening on {}",
            self.agent.name(),
            instance.addr()
        );
        Ok(instance)
    }
}

async fn invoke(
    State(agent): State<Arc<LocalAgent>>,
    Json(history): Json<ChatHistory>,
) -> Response {
    log::debug!(
        "AgentServer: '{}' invoke with {} message(s)",
        agent.name(),
        history.len()
    );
    match agent.invoke(&history).await {
        Ok(message) => (StatusCode::OK, Json::<Message>(message)).into_response(),
        Err(err) => error_response(agent.name(), err),
    }
}

async fn invoke_streaming(
    State(agent): State<Arc<LocalAgent>>,
    Json(history): Json<ChatHistory>,
) -> Response {
    log::debug!(
        "AgentServer: '{}' invoke-streaming with {} message(s)",
        agent.name(),
        history.len()
    );
    match agent.invoke_stream(&history).await {
        Ok(deltas) => jsonl_response(jsonl_lines(deltas)),
        Err(err) => error_response(agent.name(), err),
    }
}

async fn details(State(agent): State<Arc<LocalAgent>>) -> Json<AgentDetails> {
    Json(agent.details())
}

/// Encode each item as one JSON line. An error ends the body abruptly.
pub(crate) fn jsonl_lines<S, T>(items: S) -> impl Stream<Item = Result<String, ChatError>> + Send + 'static
where
    S: Stream<Item = Result<T, ChatError>> + Send + 'static,
    T: Serialize,
{
    items.map(|item| {
        let value = item.map_err(|err| {
            log::error!("AgentServer: stream aborted: {}", err);
            err
        })?;
        serde_json::to_string(&value)
            .map(|mut line| {
                line.push('\n');
                line
            })
            .map_err(|e| ChatError::Deserialization(e.to_string()))
    })
}

pub(crate) fn jsonl_response<S>(lines: S) -> Response
where
    S: Stream<Item = Result<String, ChatError>> + Send + 'static,
{
    (
        [(header::CONTENT_TYPE, JSONL_CONTENT_TYPE)],
        Body::from_stream(lines),
    )
        .into_response()
}

fn error_response(agent: &str, err: ChatError) -> Response {
    log::error!("AgentServer: '{}' failed: {}", agent, err);
    let status = match err {
        ChatError::Model(_) | ChatError::RemoteInvocation { .. } | ChatError::Transport { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}
