//! Model backend [`ClientWrapper`](crate::client_wrapper::ClientWrapper) implementations.
//!
//! Agents hosted in-process (and model-delegated strategies) talk to their model through
//! one of these clients.

pub mod openai;
