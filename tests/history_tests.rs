use groupchat::{ChatHistory, Message, Role, StreamingDelta};

#[test]
fn test_message_wire_format() {
    let message = Message::assistant("translatoragent", "Good morning everyone");
    let json = serde_json::to_value(&message).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "role": "assistant",
            "authorName": "translatoragent",
            "content": "Good morning everyone"
        })
    );

    let back: Message = serde_json::from_value(json).unwrap();
    assert_eq!(back, message);
}

#[test]
fn test_message_without_author_name_field_deserializes() {
    let message: Message = serde_json::from_str(r#"{"role":"user","content":"Ciao"}"#).unwrap();
    assert_eq!(message.role, Role::User);
    assert_eq!(message.author_name, None);
    assert_eq!(message.content, "Ciao");
}

#[test]
fn test_unknown_role_is_rejected() {
    let result: Result<Message, _> =
        serde_json::from_str(r#"{"role":"narrator","authorName":null,"content":"x"}"#);
    assert!(result.is_err());
}

#[test]
fn test_streaming_delta_wire_format() {
    let delta: StreamingDelta =
        serde_json::from_str(r#"{"authorName":"summaryagent","contentFragment":"Sum"}"#).unwrap();
    assert_eq!(delta.author_name.as_deref(), Some("summaryagent"));
    assert_eq!(delta.content_fragment, "Sum");

    let json = serde_json::to_string(&StreamingDelta::new(None, "mary")).unwrap();
    assert_eq!(json, r#"{"authorName":null,"contentFragment":"mary"}"#);
}

#[test]
fn test_history_is_a_bare_json_array() {
    let mut history = ChatHistory::new();
    history.add_message(Message::user("Buongiorno"));
    history.add_message(Message::assistant("translatoragent", "Good morning"));

    let json = serde_json::to_value(&history).unwrap();
    assert!(json.is_array());
    assert_eq!(json.as_array().unwrap().len(), 2);

    let back: ChatHistory = serde_json::from_value(json).unwrap();
    assert_eq!(back, history);
}

#[test]
fn test_history_preserves_insertion_order() {
    let mut history = ChatHistory::new();
    assert!(history.is_empty());
    for i in 0..5 {
        history.add_message(Message::assistant("a", format!("turn {}", i)));
    }
    let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["turn 0", "turn 1", "turn 2", "turn 3", "turn 4"]);
    assert_eq!(history.last().unwrap().content, "turn 4");
}

#[test]
fn test_last_from_and_turns() {
    let mut history = ChatHistory::new();
    history.add_message(Message::user("prompt"));
    history.add_message(Message::assistant("translatoragent", "first"));
    history.add_message(Message::assistant("summaryagent", "summary"));
    history.add_message(Message::assistant("translatoragent", "second"));

    assert_eq!(history.last_from("translatoragent").unwrap().content, "second");
    assert_eq!(history.last_from("summaryagent").unwrap().content, "summary");
    assert!(history.last_from("reviewer").is_none());
    assert_eq!(history.turns().count(), 3);
}

#[test]
fn test_render_uses_star_for_missing_author() {
    let mut history = ChatHistory::new();
    history.add_message(Message::user("Ciao"));
    history.add_message(Message::assistant("translatoragent", "Hello"));
    assert_eq!(
        history.render(),
        "user - *: Ciao\nassistant - translatoragent: Hello"
    );
}
