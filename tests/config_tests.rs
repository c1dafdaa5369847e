use async_trait::async_trait;
use groupchat::config::{GroupChatConfig, SelectionConfig, TerminationConfig};
use groupchat::{ChatError, ClientWrapper, Message, Role};
use std::io::Write;
use std::sync::Arc;

const TRANSLATE_AND_SUMMARIZE: &str = r#"{
    "agents": [
        { "name": "translatoragent", "baseUrl": "http://translatoragent:8080" },
        { "name": "summaryagent", "baseUrl": "http://summaryagent:8080", "timeoutSecs": 120, "retries": 2 }
    ],
    "selection": {
        "type": "rules",
        "initial": "translatoragent",
        "transitions": { "translatoragent": "summaryagent" }
    },
    "termination": { "type": "keyword", "keyword": "yes", "agents": ["summaryagent"] },
    "maxIterations": 10
}"#;

struct MockClient;

#[async_trait]
impl ClientWrapper for MockClient {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn send_message(&self, _messages: &[Message]) -> Result<Message, ChatError> {
        Ok(Message::new(Role::Assistant, "yes"))
    }
}

#[test]
fn test_parse_full_config() {
    let config = GroupChatConfig::from_json_str(TRANSLATE_AND_SUMMARIZE).unwrap();
    assert_eq!(config.agents.len(), 2);
    assert_eq!(config.agents[1].base_url, "http://summaryagent:8080");
    assert_eq!(config.agents[1].timeout_secs, Some(120));
    assert_eq!(config.agents[1].retries, Some(2));
    assert_eq!(config.agents[0].timeout_secs, None);
    match &config.termination {
        TerminationConfig::Keyword { keyword, agents } => {
            assert_eq!(keyword, "yes");
            assert_eq!(agents, &vec!["summaryagent".to_string()]);
        }
        other => panic!("unexpected termination {:?}", other),
    }
}

#[test]
fn test_defaults() {
    let config = GroupChatConfig::from_json_str(
        r#"{ "agents": [{ "name": "a", "baseUrl": "https://a.example" }] }"#,
    )
    .unwrap();
    assert_eq!(config.selection, SelectionConfig::Sequential);
    assert_eq!(config.termination, TerminationConfig::None);
    assert_eq!(config.max_iterations, 10);
}

#[test]
fn test_validation_rejects_bad_configs() {
    let cases = [
        (r#"{ "agents": [] }"#, "no agents"),
        (
            r#"{ "agents": [{ "name": "a", "baseUrl": "http://a" }], "maxIterations": 0 }"#,
            "zero iterations",
        ),
        (
            r#"{ "agents": [{ "name": " ", "baseUrl": "http://a" }] }"#,
            "blank name",
        ),
        (
            r#"{ "agents": [{ "name": "a", "baseUrl": "http://a" }, { "name": "A", "baseUrl": "http://b" }] }"#,
            "duplicate name",
        ),
        (
            r#"{ "agents": [{ "name": "a", "baseUrl": "ftp://a" }] }"#,
            "bad url",
        ),
        (
            r#"{ "agents": [{ "name": "a", "baseUrl": "http://a" }],
                 "selection": { "type": "rules", "initial": "b" } }"#,
            "unknown rule target",
        ),
        (
            r#"{ "agents": [{ "name": "a", "baseUrl": "http://a" }],
                 "termination": { "type": "keyword", "keyword": "yes", "agents": ["b"] } }"#,
            "unknown termination agent",
        ),
        (
            r#"{ "agents": [{ "name": "a", "baseUrl": "http://a" }],
                 "termination": { "type": "keyword", "keyword": "" } }"#,
            "empty keyword",
        ),
        (r#"{ "agents": "#, "truncated json"),
    ];
    for (json, label) in cases {
        assert!(
            GroupChatConfig::from_json_str(json).is_err(),
            "expected {} to be rejected",
            label
        );
    }

    assert_eq!(
        GroupChatConfig::from_json_str(r#"{ "agents": [] }"#).unwrap_err(),
        ChatError::NoParticipants
    );
}

#[test]
fn test_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(TRANSLATE_AND_SUMMARIZE.as_bytes()).unwrap();

    let config = GroupChatConfig::from_file(file.path()).unwrap();
    assert_eq!(config.agents[0].name, "translatoragent");

    let missing = file.path().with_extension("missing");
    assert!(matches!(
        GroupChatConfig::from_file(&missing),
        Err(ChatError::InvalidConfig(_))
    ));
}

#[test]
fn test_build_group_chat_registers_remote_agents() {
    let config = GroupChatConfig::from_json_str(TRANSLATE_AND_SUMMARIZE).unwrap();
    let chat = config.build_group_chat(None).unwrap();
    assert_eq!(
        chat.participant_names(),
        vec!["translatoragent".to_string(), "summaryagent".to_string()]
    );
    assert_eq!(chat.max_iterations(), 10);
}

#[test]
fn test_model_strategies_need_a_client() {
    let config = GroupChatConfig::from_json_str(
        r#"{
            "agents": [{ "name": "a", "baseUrl": "http://a" }],
            "selection": { "type": "model" },
            "termination": { "type": "model", "prompt": "Done? {{$history}}", "agents": ["a"] }
        }"#,
    )
    .unwrap();
    assert!(config.requires_model_client());
    assert!(matches!(
        config.build_group_chat(None),
        Err(ChatError::InvalidConfig(_))
    ));
    assert!(config.build_group_chat(Some(Arc::new(MockClient))).is_ok());
}

#[test]
fn test_config_round_trips_through_json() {
    let config = GroupChatConfig::from_json_str(TRANSLATE_AND_SUMMARIZE).unwrap();
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(GroupChatConfig::from_json_str(&json).unwrap(), config);
}
