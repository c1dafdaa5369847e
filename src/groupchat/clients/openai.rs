//! The `OpenAIClient` struct implements `ClientWrapper` for OpenAI-compatible Chat
//! Completions APIs. It backs agents hosted with
//! [`AgentServer`](crate::agent_server::AgentServer) and the model-delegated selection and
//! termination strategies.
//!
//! # Example
//!
//! ```rust,no_run
//! use groupchat::clients::openai::OpenAIClient;
//! use groupchat::client_wrapper::{ClientWrapper, Message};
//!
//! #[tokio::main]
//! async fn main() {
//!     let secret_key = std::env::var("OPEN_AI_SECRET").expect("OPEN_AI_SECRET not set");
//!     let client = OpenAIClient::new(&secret_key, "gpt-4.1-nano").unwrap();
//!
//!     let resp = client
//!         .send_message(&[
//!             Message::system("Translate user input in english"),
//!             Message::user("Buongiorno a tutti"),
//!         ])
//!         .await
//!         .unwrap();
//!     println!("Assistant: {}", resp.content);
//! }
//! ```
//!
//! # Streaming
//!
//! `openai_rust2`'s chunk stream is not `Send`, so [`ClientWrapper::send_message_stream`]
//! drives it on a blocking worker and forwards each token chunk through a channel as it
//! arrives. Dropping the returned stream stops the worker and closes the HTTP response.
//!
//! Requests go to `/v1/chat/completions` under the configured base URL, so any
//! OpenAI-compatible server (Azure OpenAI proxies, local inference servers) works with
//! [`OpenAIClient::new_with_base_url`].

use async_trait::async_trait;
use futures_util::StreamExt;
use openai_rust::chat;
use openai_rust2 as openai_rust;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::groupchat::client_wrapper::{
    ClientWrapper, Message, MessageChunk, MessageChunkStream, Role,
};
use crate::groupchat::error::ChatError;
use crate::groupchat::http_client_pool::get_or_create_client;

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Client for OpenAI-compatible chat completion endpoints.
pub struct OpenAIClient {
    /// Underlying HTTP client used for API requests.
    client: Arc<openai_rust::Client>,
    /// Model identifier sent with each request.
    model: String,
}

impl OpenAIClient {
    /// Construct a client for api.openai.com.
    pub fn new(secret_key: &str, model_name: &str) -> Result<Self, ChatError> {
        Ok(OpenAIClient {
            client: Arc::new(openai_rust::Client::new_with_client(
                secret_key,
                get_or_create_client(DEFAULT_BASE_URL)?,
            )),
            model: model_name.to_string(),
        })
    }

    /// Construct a client against a custom OpenAI-compatible endpoint.
    pub fn new_with_base_url(
        secret_key: &str,
        model_name: &str,
        base_url: &str,
    ) -> Result<Self, ChatError> {
        Ok(OpenAIClient {
            client: Arc::new(openai_rust::Client::new_with_client_and_base_url(
                secret_key,
                get_or_create_client(base_url)?,
                base_url,
            )),
            model: model_name.to_string(),
        })
    }

    fn format_messages(messages: &[Message]) -> Vec<chat::Message> {
        messages
            .iter()
            .map(|msg| chat::Message {
                role: match msg.role {
                    Role::System => "system".to_owned(),
                    Role::User => "user".to_owned(),
                    Role::Assistant => "assistant".to_owned(),
                    Role::Tool => "tool".to_owned(),
                },
                content: msg.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_message(&self, messages: &[Message]) -> Result<Message, ChatError> {
        let chat_arguments = chat::ChatArguments::new(&self.model, Self::format_messages(messages));

        let response = self
            .client
            .create_chat(chat_arguments, Some(CHAT_COMPLETIONS_PATH.to_string()))
            .await
            .map_err(|err| {
                log::error!("OpenAIClient::send_message(...): OpenAI API Error: {}", err);
                ChatError::Model(err.to_string())
            })?;

        let content = response
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| ChatError::Model("completion contained no choices".to_string()))?;

        Ok(Message::new(Role::Assistant, content))
    }

    async fn send_message_stream(&self, messages: &[Message]) -> Result<MessageChunkStream, ChatError> {
        let chat_arguments = chat::ChatArguments::new(&self.model, Self::format_messages(messages));
        let client = Arc::clone(&self.client);
        let runtime = tokio::runtime::Handle::current();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), ChatError>>();
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<Result<MessageChunk, ChatError>>();

        tokio::task::spawn_blocking(move || {
            runtime.block_on(async move {
                let mut chunk_stream = match client
                    .create_chat_stream(chat_arguments, Some(CHAT_COMPLETIONS_PATH.to_string()))
                    .await
                {
                    Ok(chunk_stream) => chunk_stream,
                    Err(err) => {
                        log::error!(
                            "OpenAIClient::send_message_stream(...): OpenAI API Error: {}",
                            err
                        );
                        let _ = ready_tx.send(Err(ChatError::Model(err.to_string())));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }

                while let Some(chunk_result) = chunk_stream.next().await {
                    let message_chunk = match chunk_result {
                        Ok(chunk) => {
                            let choice = chunk.choices.first();
                            Ok(MessageChunk {
                                content: choice
                                    .and_then(|c| c.delta.content.clone())
                                    .unwrap_or_default(),
                                is_final: choice.map_or(false, |c| c.finish_reason.is_some()),
                            })
                        }
                        Err(err) => {
                            log::error!(
                                "OpenAIClient::send_message_stream(...): Stream chunk error: {}",
                                err
                            );
                            Err(ChatError::Model(format!("Stream chunk error: {}", err)))
                        }
                    };
                    let stop = message_chunk.is_err();
                    // A closed channel means the consumer dropped the stream.
                    if chunk_tx.send(message_chunk).is_err() || stop {
                        return;
                    }
                }
            })
        });

        ready_rx.await.map_err(|_| {
            ChatError::Model("streaming worker stopped before the request completed".to_string())
        })??;

        Ok(Box::pin(async_stream::stream! {
            while let Some(chunk) = chunk_rx.recv().await {
                yield chunk;
            }
        }))
    }
}
