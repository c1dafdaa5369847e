use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use groupchat::agent::{DeltaStream, Participant};
use groupchat::event::{EventHandler, GroupChatEvent};
use groupchat::selection::{FnSelection, RuleSelection};
use groupchat::termination::{FnTermination, KeywordTermination};
use groupchat::{
    ChatError, ChatHistory, ChatState, ChatUpdate, GroupChat, Message, StreamingDelta,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct MockParticipant {
    name: String,
    replies: Mutex<VecDeque<Result<String, ChatError>>>,
    fallback: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockParticipant {
    fn new(name: &str, fallback: &str) -> Self {
        Self {
            name: name.to_string(),
            replies: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn with_replies(self, replies: Vec<Result<String, ChatError>>) -> Self {
        *self.replies.lock().unwrap() = replies.into_iter().collect();
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next_reply(&self) -> Result<String, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[async_trait]
impl Participant for MockParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _history: &ChatHistory) -> Result<Message, ChatError> {
        // Remote agents may report any author; the engine must stamp the real one.
        self.next_reply()
            .await
            .map(|content| Message::assistant("someone-else", content))
    }

    async fn invoke_stream(&self, _history: &ChatHistory) -> Result<DeltaStream, ChatError> {
        let content = self.next_reply().await?;
        let fragments: Vec<Result<StreamingDelta, ChatError>> = content
            .chars()
            .collect::<Vec<_>>()
            .chunks(3)
            .map(|chunk| Ok(StreamingDelta::new(None, chunk.iter().collect::<String>())))
            .collect();
        Ok(Box::pin(stream::iter(fragments)))
    }
}

/// Streams one fragment, then never produces another.
struct StallingStreamer;

#[async_trait]
impl Participant for StallingStreamer {
    fn name(&self) -> &str {
        "staller"
    }

    async fn invoke(&self, _history: &ChatHistory) -> Result<Message, ChatError> {
        std::future::pending().await
    }

    async fn invoke_stream(&self, _history: &ChatHistory) -> Result<DeltaStream, ChatError> {
        let first = stream::iter(vec![Ok::<_, ChatError>(StreamingDelta::new(None, "partial"))]);
        Ok(Box::pin(first.chain(stream::pending())))
    }
}

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<GroupChatEvent>>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn on_group_chat_event(&self, event: &GroupChatEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn translator_summary_chat(
    translator: Arc<MockParticipant>,
    summarizer: Arc<MockParticipant>,
) -> GroupChat {
    let mut chat = GroupChat::new()
        .with_selection(Arc::new(
            RuleSelection::new()
                .after_user("translatoragent")
                .after("translatoragent", "summaryagent")
                .after("summaryagent", "translatoragent"),
        ))
        .with_termination(Arc::new(KeywordTermination::new("yes")))
        .with_termination_agents(["summaryagent"])
        .with_max_iterations(10);
    chat.add_participant(translator).unwrap();
    chat.add_participant(summarizer).unwrap();
    chat.add_chat_message(Message::user("Testo italiano da tradurre"))
        .unwrap();
    chat
}

#[tokio::test]
async fn test_translate_then_summarize_until_yes() {
    // The translator says "yes" too, but only the summarizer's turns are checked.
    let translator = Arc::new(MockParticipant::new(
        "translatoragent",
        "Yes, here is the English text",
    ));
    let summarizer = Arc::new(
        MockParticipant::new("summaryagent", "unused").with_replies(vec![
            Ok("A first draft".to_string()),
            Ok("Final summary. YES".to_string()),
        ]),
    );
    let mut chat = translator_summary_chat(translator.clone(), summarizer.clone());

    let emitted: Vec<Message> = chat
        .invoke()
        .map(|turn| turn.unwrap())
        .collect()
        .await;

    let authors: Vec<_> = emitted
        .iter()
        .map(|m| m.author_name.clone().unwrap())
        .collect();
    assert_eq!(
        authors,
        vec!["translatoragent", "summaryagent", "translatoragent", "summaryagent"]
    );
    assert_eq!(chat.state(), ChatState::Completed);
    assert_eq!(chat.iteration_count(), 4);
    assert_eq!(emitted.len(), chat.iteration_count());
    assert_eq!(chat.history().len(), 5);
    assert_eq!(&chat.history().messages()[1..], &emitted[..]);
    assert_eq!(translator.calls(), 2);
    assert_eq!(summarizer.calls(), 2);
}

#[tokio::test]
async fn test_max_iterations_forces_terminated() {
    let mut chat = GroupChat::new().with_max_iterations(3);
    chat.add_participant(Arc::new(MockParticipant::new("a", "from a")))
        .unwrap();
    chat.add_participant(Arc::new(MockParticipant::new("b", "from b")))
        .unwrap();
    chat.add_chat_message(Message::user("go")).unwrap();

    let transcript = chat.run().await.unwrap();
    assert_eq!(transcript.state, ChatState::Terminated);
    assert_eq!(transcript.iterations, 3);
    assert_eq!(transcript.messages.len(), 4);
    let authors: Vec<_> = transcript.messages[1..]
        .iter()
        .map(|m| m.author_name.as_deref().unwrap())
        .collect();
    assert_eq!(authors, vec!["a", "b", "a"]);
}

#[tokio::test]
async fn test_default_bound_is_ten_turns() {
    let mut chat = GroupChat::new();
    chat.add_participant(Arc::new(MockParticipant::new("a", "again")))
        .unwrap();
    let transcript = chat.run().await.unwrap();
    assert_eq!(transcript.state, ChatState::Terminated);
    assert_eq!(transcript.iterations, 10);
}

#[tokio::test]
async fn test_unknown_participant_fails_before_any_invocation() {
    let translator = Arc::new(MockParticipant::new("translatoragent", "text"));
    let mut chat = GroupChat::new()
        .with_selection(Arc::new(FnSelection::new(|_, _| Ok("reviewer".to_string()))));
    chat.add_participant(translator.clone()).unwrap();
    chat.add_chat_message(Message::user("prompt")).unwrap();

    let items: Vec<_> = chat.invoke().collect().await;
    assert_eq!(items.len(), 1);
    assert_eq!(
        items[0].as_ref().unwrap_err(),
        &ChatError::UnknownParticipant("reviewer".into())
    );
    assert_eq!(chat.state(), ChatState::Failed);
    assert_eq!(chat.history().len(), 1);
    assert_eq!(translator.calls(), 0);
    assert_eq!(
        chat.last_error(),
        Some(&ChatError::UnknownParticipant("reviewer".into()))
    );
}

#[tokio::test]
async fn test_selected_name_is_resolved_leniently() {
    let mut chat = GroupChat::new()
        .with_selection(Arc::new(FnSelection::new(|_, _| {
            Ok(" \"SummaryAgent\".\n".to_string())
        })))
        .with_max_iterations(1);
    chat.add_participant(Arc::new(MockParticipant::new("summaryagent", "ok")))
        .unwrap();
    let transcript = chat.run().await.unwrap();
    assert_eq!(
        transcript.messages[0].author_name.as_deref(),
        Some("summaryagent")
    );
}

#[tokio::test]
async fn test_invocation_failure_keeps_partial_history() {
    let translator = Arc::new(MockParticipant::new("translatoragent", "English text"));
    let summarizer = Arc::new(MockParticipant::new("summaryagent", "unused").with_replies(
        vec![Err(ChatError::RemoteInvocation {
            agent: "summaryagent".into(),
            status: 500,
            reason: "Internal Server Error".into(),
        })],
    ));
    let mut chat = translator_summary_chat(translator, summarizer);

    let failure = chat.run().await.unwrap_err();
    assert!(matches!(
        failure.error,
        ChatError::RemoteInvocation { status: 500, .. }
    ));
    assert_eq!(failure.iterations, 1);
    assert_eq!(failure.history.len(), 2);
    assert_eq!(
        failure.history.last().unwrap().author_name.as_deref(),
        Some("translatoragent")
    );
    assert_eq!(chat.state(), ChatState::Failed);
    assert_eq!(chat.history(), &failure.history);
}

#[tokio::test]
async fn test_strategy_error_fails_session_after_append() {
    let mut chat = GroupChat::new().with_termination(Arc::new(FnTermination::new(|_| {
        Err(ChatError::Model("judge unavailable".into()))
    })));
    chat.add_participant(Arc::new(MockParticipant::new("a", "text")))
        .unwrap();

    let items: Vec<_> = chat.invoke().collect().await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap().content, "text");
    assert_eq!(
        items[1].as_ref().unwrap_err(),
        &ChatError::Model("judge unavailable".into())
    );
    assert_eq!(chat.state(), ChatState::Failed);
    assert_eq!(chat.iteration_count(), 1);
}

#[tokio::test]
async fn test_cancellation_stops_in_flight_turn() {
    let slow = Arc::new(
        MockParticipant::new("slow", "never seen").with_delay(Duration::from_secs(30)),
    );
    let mut chat = GroupChat::new();
    chat.add_participant(slow.clone()).unwrap();
    chat.add_chat_message(Message::user("hello")).unwrap();

    let token = chat.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let transcript = tokio::time::timeout(Duration::from_secs(5), chat.run())
        .await
        .expect("cancellation should end the session promptly")
        .unwrap();
    assert_eq!(transcript.state, ChatState::Cancelled);
    assert_eq!(transcript.iterations, 0);
    assert_eq!(transcript.messages.len(), 1);
    assert_eq!(slow.calls(), 1);
    assert!(chat.last_error().is_none());
}

#[tokio::test]
async fn test_cancellation_keeps_completed_turns() {
    let fast = Arc::new(MockParticipant::new("fast", "done quickly"));
    let slow = Arc::new(MockParticipant::new("slow", "late").with_delay(Duration::from_secs(30)));
    let mut chat = GroupChat::new();
    chat.add_participant(fast).unwrap();
    chat.add_participant(slow).unwrap();

    let token = chat.cancellation_token();
    let mut turns = Box::pin(chat.invoke());
    let first = turns.next().await.unwrap().unwrap();
    assert_eq!(first.author_name.as_deref(), Some("fast"));

    token.cancel();
    assert!(turns.next().await.is_none());
    drop(turns);

    assert_eq!(chat.state(), ChatState::Cancelled);
    assert_eq!(chat.iteration_count(), 1);
    assert_eq!(chat.history().len(), 1);
}

#[tokio::test]
async fn test_streaming_deltas_concatenate_to_message() {
    let translator = Arc::new(MockParticipant::new(
        "translatoragent",
        "Providers in the network lower your costs.",
    ));
    let summarizer = Arc::new(MockParticipant::new(
        "summaryagent",
        "Use in-network providers. yes",
    ));
    let mut chat = translator_summary_chat(translator, summarizer);

    let updates: Vec<ChatUpdate> = chat
        .invoke_streaming()
        .map(|update| update.unwrap())
        .collect()
        .await;

    let mut pending = String::new();
    let mut messages = Vec::new();
    for update in updates {
        match update {
            ChatUpdate::Delta(delta) => {
                assert!(delta.author_name.is_some());
                pending.push_str(&delta.content_fragment);
            }
            ChatUpdate::Message(message) => {
                assert_eq!(pending, message.content);
                pending.clear();
                messages.push(message);
            }
        }
    }
    assert!(pending.is_empty());
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].author_name.as_deref(), Some("summaryagent"));
    assert_eq!(chat.state(), ChatState::Completed);
    assert_eq!(&chat.history().messages()[1..], &messages[..]);
}

#[tokio::test]
async fn test_streaming_failure_surfaces_error_without_appending() {
    let broken = Arc::new(MockParticipant::new("a", "").with_replies(vec![Err(
        ChatError::Transport {
            agent: "a".into(),
            message: "connection refused".into(),
        },
    )]));
    let mut chat = GroupChat::new();
    chat.add_participant(broken).unwrap();

    let items: Vec<_> = chat.invoke_streaming().collect().await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(ChatError::Transport { .. })));
    assert_eq!(chat.state(), ChatState::Failed);
    assert!(chat.history().is_empty());
}

#[tokio::test]
async fn test_finished_session_cannot_restart() {
    let mut chat = GroupChat::new().with_max_iterations(1);
    chat.add_participant(Arc::new(MockParticipant::new("a", "x")))
        .unwrap();
    chat.run().await.unwrap();

    let items: Vec<_> = chat.invoke().collect().await;
    assert_eq!(
        items[0].as_ref().unwrap_err(),
        &ChatError::SessionFinished("terminated".into())
    );
    assert!(chat.add_chat_message(Message::user("more")).is_err());
    assert_eq!(chat.iteration_count(), 1);
    assert_eq!(chat.state(), ChatState::Terminated);
}

#[tokio::test]
async fn test_session_without_participants_fails() {
    let mut chat = GroupChat::new();
    let failure = chat.run().await.unwrap_err();
    assert_eq!(failure.error, ChatError::NoParticipants);
    assert_eq!(chat.state(), ChatState::Failed);
}

#[tokio::test]
async fn test_zero_max_iterations_is_rejected() {
    let mut chat = GroupChat::new().with_max_iterations(0);
    chat.add_participant(Arc::new(MockParticipant::new("a", "x")))
        .unwrap();
    let failure = chat.run().await.unwrap_err();
    assert!(matches!(failure.error, ChatError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_events_follow_the_turn_loop() {
    let handler = Arc::new(RecordingHandler::default());
    let mut chat = GroupChat::new()
        .with_id("session-1")
        .with_max_iterations(2)
        .with_event_handler(handler.clone());
    chat.add_participant(Arc::new(MockParticipant::new("a", "x")))
        .unwrap();
    chat.run().await.unwrap();

    let events = handler.events.lock().unwrap();
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            GroupChatEvent::RunStarted { .. } => "started",
            GroupChatEvent::SpeakerSelected { .. } => "selected",
            GroupChatEvent::TurnCompleted { .. } => "turn",
            GroupChatEvent::TerminationChecked { .. } => "checked",
            GroupChatEvent::RunFinished { .. } => "finished",
            GroupChatEvent::RunFailed { .. } => "failed",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "started", "selected", "turn", "checked", "selected", "turn", "checked", "finished"
        ]
    );
    match events.last().unwrap() {
        GroupChatEvent::RunFinished {
            session_id,
            state,
            iterations,
        } => {
            assert_eq!(session_id, "session-1");
            assert_eq!(*state, ChatState::Terminated);
            assert_eq!(*iterations, 2);
        }
        other => panic!("unexpected last event {:?}", other),
    }
}

#[tokio::test]
async fn test_transcript_serializes_camel_case() {
    let mut chat = GroupChat::new().with_max_iterations(1);
    chat.add_participant(Arc::new(MockParticipant::new("a", "x")))
        .unwrap();
    let transcript = chat.run().await.unwrap();
    let json = serde_json::to_value(&transcript).unwrap();
    assert_eq!(json["state"], "terminated");
    assert_eq!(json["iterations"], 1);
    assert!(json["sessionId"].is_string());
    assert!(json["startedAt"].is_string());
    assert!(json["finishedAt"].is_string());
    assert_eq!(json["messages"][0]["authorName"], "a");
}

#[tokio::test]
async fn test_cancellation_mid_stream_discards_partial_turn() {
    let mut chat = GroupChat::new();
    chat.add_participant(Arc::new(StallingStreamer)).unwrap();
    chat.add_chat_message(Message::user("hello")).unwrap();
    let token = chat.cancellation_token();

    {
        let mut updates = Box::pin(chat.invoke_streaming());
        let first = updates.next().await.unwrap().unwrap();
        assert_eq!(
            first,
            ChatUpdate::Delta(StreamingDelta::new(Some("staller".into()), "partial"))
        );

        token.cancel();
        let rest = tokio::time::timeout(Duration::from_secs(5), updates.next())
            .await
            .expect("cancellation should end the stream promptly");
        assert!(rest.is_none());
    }

    assert_eq!(chat.state(), ChatState::Cancelled);
    assert_eq!(chat.iteration_count(), 0);
    assert_eq!(chat.history().len(), 1);
    assert!(chat.last_error().is_none());
}

#[tokio::test]
async fn test_quoted_name_with_inner_period_resolves() {
    let mut chat = GroupChat::new()
        .with_selection(Arc::new(FnSelection::new(|_, _| {
            Ok("\"summaryagent.\"".to_string())
        })))
        .with_max_iterations(1);
    chat.add_participant(Arc::new(MockParticipant::new("summaryagent", "ok")))
        .unwrap();
    let transcript = chat.run().await.unwrap();
    assert_eq!(
        transcript.messages[0].author_name.as_deref(),
        Some("summaryagent")
    );
}

#[tokio::test]
async fn test_turn_completed_reports_characters_not_bytes() {
    let handler = Arc::new(RecordingHandler::default());
    let mut chat = GroupChat::new()
        .with_max_iterations(1)
        .with_event_handler(handler.clone());
    chat.add_participant(Arc::new(MockParticipant::new("a", "città è")))
        .unwrap();
    chat.run().await.unwrap();

    let events = handler.events.lock().unwrap();
    let length = events
        .iter()
        .find_map(|e| match e {
            GroupChatEvent::TurnCompleted { content_length, .. } => Some(*content_length),
            _ => None,
        })
        .unwrap();
    assert_eq!(length, 7);
}
