//! Hosts one LLM-backed agent over the agent wire protocol.
//!
//! ```text
//! OPEN_AI_SECRET=sk-... AGENT_NAME=translatoragent \
//! AGENT_INSTRUCTIONS="Translate user input in english" BIND_ADDR=127.0.0.1:5001 \
//! RUST_LOG=info cargo run --example agent_server --features server
//! ```
//!
//! Run a second instance as `summaryagent` ("Summarize user input") on another port, then
//! start the `remote_group_chat` demo against both.

use groupchat::agent::LocalAgent;
use groupchat::agent_server::AgentServer;
use groupchat::clients::openai::OpenAIClient;
use std::env;
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    groupchat::init_logger();

    let secret_key = env::var("OPEN_AI_SECRET")?;
    let model = env::var("OPEN_AI_MODEL").unwrap_or_else(|_| "gpt-4.1-nano".to_string());
    let name = env::var("AGENT_NAME").unwrap_or_else(|_| "translatoragent".to_string());
    let instructions = env::var("AGENT_INSTRUCTIONS")
        .unwrap_or_else(|_| "Translate user input in english".to_string());
    let addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:5001".to_string());

    let client = match env::var("OPEN_AI_BASE_URL") {
        Ok(base_url) => OpenAIClient::new_with_base_url(&secret_key, &model, &base_url)?,
        Err(_) => OpenAIClient::new(&secret_key, &model)?,
    };
    let agent = LocalAgent::new(name.clone(), instructions, Arc::new(client));

    let server = AgentServer::new(agent).start_at(addr.parse()?).await?;
    println!("{} listening on {}", name, server.base_url());
    server.wait().await
}
