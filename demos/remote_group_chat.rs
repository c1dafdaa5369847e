//! Runs the translate-then-summarize group chat against two agent processes.
//!
//! With `GROUP_CHAT_BIND` set, serves `POST /group-chat` and `POST /group-chat/stream`
//! instead of running a single session from the command line:
//!
//! ```text
//! TRANSLATOR_URL=http://127.0.0.1:5001 SUMMARIZER_URL=http://127.0.0.1:5002 \
//! RUST_LOG=info cargo run --example remote_group_chat --features server -- "Buongiorno a tutti"
//! ```
//!
//! `GROUP_CHAT_CONFIG` may point at a JSON file replacing the built-in configuration.

use futures_util::{pin_mut, StreamExt};
use groupchat::config::GroupChatConfig;
use groupchat::host::GroupChatHost;
use groupchat::{ChatUpdate, Message};
use std::env;
use std::error::Error;
use std::io::Write;

fn default_config() -> Result<GroupChatConfig, Box<dyn Error + Send + Sync>> {
    let translator =
        env::var("TRANSLATOR_URL").unwrap_or_else(|_| "http://127.0.0.1:5001".to_string());
    let summarizer =
        env::var("SUMMARIZER_URL").unwrap_or_else(|_| "http://127.0.0.1:5002".to_string());
    let config = serde_json::json!({
        "agents": [
            { "name": "translatoragent", "baseUrl": translator },
            { "name": "summaryagent", "baseUrl": summarizer }
        ],
        "selection": {
            "type": "rules",
            "initial": "translatoragent",
            "transitions": { "translatoragent": "summaryagent", "summaryagent": "translatoragent" }
        },
        "termination": { "type": "keyword", "keyword": "yes", "agents": ["summaryagent"] },
        "maxIterations": 10
    });
    Ok(GroupChatConfig::from_json_str(&config.to_string())?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    groupchat::init_logger();

    let config = match env::var("GROUP_CHAT_CONFIG") {
        Ok(path) => GroupChatConfig::from_file(path)?,
        Err(_) => default_config()?,
    };

    if let Ok(addr) = env::var("GROUP_CHAT_BIND") {
        let server = GroupChatHost::new(config).start_at(addr.parse()?).await?;
        println!("group chat host listening on {}", server.base_url());
        return server.wait().await;
    }

    let prompt = env::args()
        .nth(1)
        .unwrap_or_else(|| "COME I FORNITORI INFLUENZANO I TUOI COSTI".to_string());

    let mut chat = config.build_group_chat(None)?;
    chat.add_chat_message(Message::user(prompt))?;

    let token = chat.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    {
        let updates = chat.invoke_streaming();
        pin_mut!(updates);
        while let Some(update) = updates.next().await {
            match update? {
                ChatUpdate::Delta(delta) => {
                    print!("{}", delta.content_fragment);
                    std::io::stdout().flush()?;
                }
                ChatUpdate::Message(message) => {
                    println!();
                    println!(
                        "# {} - {}: '{}'",
                        message.role.as_str(),
                        message.author_name.as_deref().unwrap_or("*"),
                        message.content
                    );
                }
            }
        }
    }

    println!(
        "\nSession {} ended {} after {} turn(s)",
        chat.id(),
        chat.state(),
        chat.iteration_count()
    );
    Ok(())
}
