//! Configuration for group-chat sessions.
//!
//! [`GroupChatConfig`] describes a session over remote participants: which agents take part
//! and where they listen, how the next speaker is chosen, when the conversation ends, and the
//! turn limit. It is plain `serde` data, loaded from JSON.
//!
//! # Example
//!
//! ```rust
//! use groupchat::config::{GroupChatConfig, SelectionConfig};
//!
//! let config = GroupChatConfig::from_json_str(r#"{
//!     "agents": [
//!         { "name": "translatoragent", "baseUrl": "http://localhost:5001" },
//!         { "name": "summaryagent", "baseUrl": "http://localhost:5002", "timeoutSecs": 120 }
//!     ],
//!     "selection": {
//!         "type": "rules",
//!         "initial": "translatoragent",
//!         "transitions": { "translatoragent": "summaryagent" }
//!     },
//!     "termination": { "type": "keyword", "keyword": "yes", "agents": ["summaryagent"] }
//! }"#).unwrap();
//!
//! assert_eq!(config.max_iterations, 10);
//! assert!(matches!(config.selection, SelectionConfig::Rules { .. }));
//! ```

use crate::groupchat::client_wrapper::ClientWrapper;
use crate::groupchat::error::ChatError;
use crate::groupchat::group_chat::{GroupChat, DEFAULT_MAX_ITERATIONS};
use crate::groupchat::remote_agent::RemoteAgent;
use crate::groupchat::selection::{
    ModelSelection, RuleSelection, SelectionStrategy, SequentialSelection,
};
use crate::groupchat::termination::{
    KeywordTermination, ModelTermination, NeverTerminate, TerminationStrategy,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One remote participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAgentConfig {
    pub name: String,
    /// Base URL of the agent process, e.g. `http://translatoragent:8080`.
    pub base_url: String,
    /// Round-trip limit for non-streaming invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Extra attempts for failed non-streaming invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<usize>,
}

/// How the next speaker is chosen.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionConfig {
    /// Round-robin in the order agents are listed.
    #[default]
    Sequential,
    /// Explicit transitions.
    Rules {
        /// Agent that answers user input.
        initial: String,
        /// `speaker -> next speaker`.
        #[serde(default)]
        transitions: BTreeMap<String, String>,
    },
    /// Ask the model client passed to [`GroupChatConfig::build_group_chat`].
    Model {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
}

/// When the conversation ends before the turn limit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminationConfig {
    #[default]
    None,
    /// The latest message contains `keyword`, ignoring case.
    Keyword {
        keyword: String,
        /// Only checked after these agents speak; empty means every agent.
        #[serde(default)]
        agents: Vec<String>,
    },
    /// Ask the model client; an answer containing "yes" ends the conversation.
    Model {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        #[serde(default)]
        agents: Vec<String>,
    },
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

/// A complete session description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupChatConfig {
    pub agents: Vec<RemoteAgentConfig>,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub termination: TerminationConfig,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl GroupChatConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ChatError> {
        let config: GroupChatConfig = serde_json::from_str(json)
            .map_err(|e| ChatError::InvalidConfig(format!("invalid group chat config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ChatError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ChatError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        log::info!("Loading group chat config from {}", path.display());
        Self::from_json_str(&json)
    }

    /// Check the structural rules a session needs before it can run.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.agents.is_empty() {
            return Err(ChatError::NoParticipants);
        }
        if self.max_iterations == 0 {
            return Err(ChatError::InvalidConfig(
                "maxIterations must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            let name = agent.name.trim();
            if name.is_empty() {
                return Err(ChatError::InvalidConfig(
                    "agent name must not be empty".to_string(),
                ));
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(ChatError::DuplicateParticipant(name.to_string()));
            }
            if !(agent.base_url.starts_with("http://") || agent.base_url.starts_with("https://")) {
                return Err(ChatError::InvalidConfig(format!(
                    "agent '{}' has an invalid baseUrl '{}'",
                    name, agent.base_url
                )));
            }
        }

        let registered = |name: &str| seen.contains(&name.trim().to_lowercase());

        if let SelectionConfig::Rules {
            initial,
            transitions,
        } = &self.selection
        {
            for name in std::iter::once(initial).chain(transitions.keys()).chain(transitions.values()) {
                if !registered(name) {
                    return Err(ChatError::InvalidConfig(format!(
                        "selection rule names unknown agent '{}'",
                        name
                    )));
                }
            }
        }

        let termination_agents = match &self.termination {
            TerminationConfig::None => &[][..],
            TerminationConfig::Keyword { keyword, agents } => {
                if keyword.trim().is_empty() {
                    return Err(ChatError::InvalidConfig(
                        "termination keyword must not be empty".to_string(),
                    ));
                }
                agents.as_slice()
            }
            TerminationConfig::Model { agents, .. } => agents.as_slice(),
        };
        for name in termination_agents {
            if !registered(name) {
                return Err(ChatError::InvalidConfig(format!(
                    "termination names unknown agent '{}'",
                    name
                )));
            }
        }

        Ok(())
    }

    /// True when building a session needs a model client.
    pub fn requires_model_client(&self) -> bool {
        matches!(self.selection, SelectionConfig::Model { .. })
            || matches!(self.termination, TerminationConfig::Model { .. })
    }

    /// Build an idle session with one [`RemoteAgent`] per configured agent.
    ///
    /// `model_client` backs model-delegated selection and termination and is required only
    /// when one of them is configured.
    pub fn build_group_chat(
        &self,
        model_client: Option<Arc<dyn ClientWrapper>>,
    ) -> Result<GroupChat, ChatError> {
        self.validate()?;

        let selection: Arc<dyn SelectionStrategy> = match &self.selection {
            SelectionConfig::Sequential => Arc::new(SequentialSelection),
            SelectionConfig::Rules {
                initial,
                transitions,
            } => {
                let rules = transitions
                    .iter()
                    .fold(RuleSelection::new().after_user(initial.clone()), |rules, (from, to)| {
                        rules.after(from.clone(), to.clone())
                    });
                Arc::new(rules)
            }
            SelectionConfig::Model { prompt } => {
                let mut selection = ModelSelection::new(required_client(&model_client, "selection")?);
                if let Some(prompt) = prompt {
                    selection = selection.with_template(prompt.clone());
                }
                Arc::new(selection)
            }
        };

        let (termination, agents): (Arc<dyn TerminationStrategy>, &[String]) = match &self.termination {
            TerminationConfig::None => (Arc::new(NeverTerminate), &[][..]),
            TerminationConfig::Keyword { keyword, agents } => (
                Arc::new(KeywordTermination::new(keyword.clone())),
                agents.as_slice(),
            ),
            TerminationConfig::Model { prompt, agents } => {
                let mut termination =
                    ModelTermination::new(required_client(&model_client, "termination")?);
                if let Some(prompt) = prompt {
                    termination = termination.with_template(prompt.clone());
                }
                (Arc::new(termination), agents.as_slice())
            }
        };

        let mut chat = GroupChat::new()
            .with_selection(selection)
            .with_termination(termination)
            .with_max_iterations(self.max_iterations);
        if !agents.is_empty() {
            chat = chat.with_termination_agents(agents.iter().cloned());
        }

        for agent in &self.agents {
            let mut remote = RemoteAgent::new(agent.name.trim(), agent.base_url.clone())?;
            if let Some(secs) = agent.timeout_secs {
                remote = remote.with_timeout(Duration::from_secs(secs));
            }
            if let Some(retries) = agent.retries {
                remote = remote.with_retries(retries);
            }
            chat.add_participant(Arc::new(remote))?;
        }

        Ok(chat)
    }
}

fn required_client(
    client: &Option<Arc<dyn ClientWrapper>>,
    purpose: &str,
) -> Result<Arc<dyn ClientWrapper>, ChatError> {
    client.clone().ok_or_else(|| {
        ChatError::InvalidConfig(format!("model {} configured without a model client", purpose))
    })
}
