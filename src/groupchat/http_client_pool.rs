//! HTTP Client Pool for maintaining persistent connections to agent processes.
//!
//! Every [`RemoteAgent`](crate::remote_agent::RemoteAgent) pointed at the same base URL shares
//! one `reqwest::Client`, so repeated turns against an agent reuse the same keep-alive
//! connections instead of paying for a new TCP (and TLS) handshake on every invocation.
//! The clients are read-only once built; each request still owns its own response.

use crate::groupchat::error::ChatError;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    /// Global cache of HTTP clients indexed by base URL.
    static ref CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> = Mutex::new(HashMap::new());
}

/// Creates or retrieves a shared HTTP client for the given base URL.
///
/// The client is configured with:
/// - Connection pooling with up to 16 idle connections per host
/// - 90-second idle timeout for persistent connections
/// - TCP keepalive to maintain long-lived connections
/// - 30-second connection timeout
///
/// No whole-request timeout is set here: streaming replies may legitimately stay open for as
/// long as the model keeps generating. Per-request timeouts are applied by the caller.
pub fn get_or_create_client(base_url: &str) -> Result<reqwest::Client, ChatError> {
    let mut pool = CLIENT_POOL
        .lock()
        .map_err(|_| ChatError::InvalidConfig("HTTP client pool lock poisoned".to_string()))?;

    if let Some(client) = pool.get(base_url) {
        return Ok(client.clone());
    }

    let client = create_pooled_client()?;
    pool.insert(base_url.to_string(), client.clone());
    Ok(client)
}

fn create_pooled_client() -> Result<reqwest::Client, ChatError> {
    reqwest::ClientBuilder::new()
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| ChatError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))
}
