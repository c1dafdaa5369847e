// src/groupchat/mod.rs

pub mod agent;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod error;
pub mod event;
pub mod group_chat;
pub mod history;
pub mod http_client_pool;
pub mod remote_agent;
pub mod selection;
pub mod termination;

#[cfg(feature = "server")]
pub mod agent_server;
#[cfg(feature = "server")]
pub mod host;

// Let's explicitly export GroupChat so we don't have to access it via groupchat::group_chat::GroupChat
pub use group_chat::GroupChat;
