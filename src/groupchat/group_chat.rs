//! Group Chat Engine
//!
//! A [`GroupChat`] drives one multi-agent conversation. It owns the session's
//! [`ChatHistory`] and runs turns strictly one after another:
//!
//! ```text
//! Idle ──invoke──▶ Running ──┬──▶ Completed   (termination strategy said yes)
//!                            ├──▶ Terminated  (max_iterations reached)
//!                            ├──▶ Failed      (selection, invocation, or strategy error)
//!                            └──▶ Cancelled   (cancellation token fired)
//! ```
//!
//! Each turn is: select a speaker → invoke it (whole reply, or forwarding its deltas) →
//! stamp the reply with the speaker's name → append it → check termination. The engine never
//! retries; the first error stops the session with the partial history intact.
//!
//! Output is lazy: [`GroupChat::invoke`] and [`GroupChat::invoke_streaming`] return streams
//! that only advance the conversation while they are polled. A session runs once; invoking a
//! finished session yields [`ChatError::SessionFinished`].
//!
//! # Example
//!
//! ```rust,no_run
//! use groupchat::group_chat::GroupChat;
//! use groupchat::remote_agent::RemoteAgent;
//! use groupchat::selection::RuleSelection;
//! use groupchat::termination::KeywordTermination;
//! use groupchat::Message;
//! use futures_util::StreamExt;
//! use std::sync::Arc;
//!
//! # async {
//! let translator = RemoteAgent::new("translatoragent", "http://localhost:5001").unwrap();
//! let summarizer = RemoteAgent::new("summaryagent", "http://localhost:5002").unwrap();
//!
//! let mut chat = GroupChat::new()
//!     .with_selection(Arc::new(
//!         RuleSelection::new()
//!             .after_user("translatoragent")
//!             .after("translatoragent", "summaryagent"),
//!     ))
//!     .with_termination(Arc::new(KeywordTermination::new("yes")))
//!     .with_termination_agents(["summaryagent"])
//!     .with_max_iterations(10);
//! chat.add_participant(Arc::new(translator)).unwrap();
//! chat.add_participant(Arc::new(summarizer)).unwrap();
//! chat.add_chat_message(Message::user("Buongiorno a tutti")).unwrap();
//!
//! let mut turns = Box::pin(chat.invoke());
//! while let Some(turn) = turns.next().await {
//!     let message = turn.unwrap();
//!     println!("# {} - {}: '{}'", message.role.as_str(), message.author_name.as_deref().unwrap_or("*"), message.content);
//! }
//! # };
//! ```

use crate::groupchat::agent::Participant;
use crate::groupchat::client_wrapper::{Message, StreamingDelta};
use crate::groupchat::error::{ChatError, ChatFailure};
use crate::groupchat::event::{EventHandler, GroupChatEvent};
use crate::groupchat::history::ChatHistory;
use crate::groupchat::selection::{SelectionContext, SelectionStrategy, SequentialSelection};
use crate::groupchat::termination::{NeverTerminate, TerminationStrategy};
use chrono::{DateTime, Utc};
use futures_util::{pin_mut, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Upper bound on turns when none is configured.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatState {
    Idle,
    Running,
    /// The termination strategy ended the conversation.
    Completed,
    /// `max_iterations` turns ran without the strategy ending the conversation.
    Terminated,
    Failed,
    Cancelled,
}

impl ChatState {
    /// True for the four terminal states.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ChatState::Completed | ChatState::Terminated | ChatState::Failed | ChatState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatState::Idle => "idle",
            ChatState::Running => "running",
            ChatState::Completed => "completed",
            ChatState::Terminated => "terminated",
            ChatState::Failed => "failed",
            ChatState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ChatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item of [`GroupChat::invoke_streaming`].
///
/// Serialized with a `type` tag: `{"type":"delta","authorName":..,"contentFragment":..}` or
/// `{"type":"message","role":..,"authorName":..,"content":..}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatUpdate {
    /// A fragment of the reply currently being produced.
    Delta(StreamingDelta),
    /// The assembled reply, emitted once it has been appended to the history.
    Message(Message),
}

/// Summary of a finished session, returned by [`GroupChat::run`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub session_id: String,
    pub state: ChatState,
    pub iterations: usize,
    /// Full history, seed messages included.
    pub messages: Vec<Message>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A multi-agent conversation session.
pub struct GroupChat {
    id: String,
    participants: Vec<Arc<dyn Participant>>,
    selection: Arc<dyn SelectionStrategy>,
    termination: Arc<dyn TerminationStrategy>,
    termination_agents: Option<Vec<String>>,
    max_iterations: usize,
    history: ChatHistory,
    iteration_count: usize,
    state: ChatState,
    cancellation: CancellationToken,
    event_handler: Option<Arc<dyn EventHandler>>,
    last_error: Option<ChatError>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Default for GroupChat {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupChat {
    /// An idle session with sequential selection, no termination strategy, and
    /// [`DEFAULT_MAX_ITERATIONS`].
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            participants: Vec::new(),
            selection: Arc::new(SequentialSelection),
            termination: Arc::new(NeverTerminate),
            termination_agents: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            history: ChatHistory::new(),
            iteration_count: 0,
            state: ChatState::Idle,
            cancellation: CancellationToken::new(),
            event_handler: None,
            last_error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_selection(mut self, selection: Arc<dyn SelectionStrategy>) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_termination(mut self, termination: Arc<dyn TerminationStrategy>) -> Self {
        self.termination = termination;
        self
    }

    /// Only consult the termination strategy after one of these participants spoke.
    pub fn with_termination_agents<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.termination_agents = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Use an externally owned token, e.g. a child of a server-wide shutdown token.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Register a participant. Names must be unique, ignoring case.
    pub fn add_participant(&mut self, participant: Arc<dyn Participant>) -> Result<(), ChatError> {
        self.ensure_idle()?;
        let name = participant.name().trim();
        if name.is_empty() {
            return Err(ChatError::InvalidConfig(
                "participant name must not be empty".to_string(),
            ));
        }
        if self
            .participants
            .iter()
            .any(|p| p.name().eq_ignore_ascii_case(name))
        {
            return Err(ChatError::DuplicateParticipant(name.to_string()));
        }
        log::debug!("GroupChat {}: registered participant '{}'", self.id, name);
        self.participants.push(participant);
        Ok(())
    }

    /// Seed the history before the session starts.
    pub fn add_chat_message(&mut self, message: Message) -> Result<(), ChatError> {
        self.ensure_idle()?;
        self.history.add_message(message);
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    /// Turns completed so far.
    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn participant_names(&self) -> Vec<String> {
        self.participants
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Token that cancels this session when fired.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// The error that moved the session to `Failed`, if any.
    pub fn last_error(&self) -> Option<&ChatError> {
        self.last_error.as_ref()
    }

    /// Snapshot of the session as a [`Transcript`].
    pub fn transcript(&self) -> Transcript {
        let now = Utc::now();
        Transcript {
            session_id: self.id.clone(),
            state: self.state,
            iterations: self.iteration_count,
            messages: self.history.messages().to_vec(),
            started_at: self.started_at.unwrap_or(now),
            finished_at: self.finished_at.unwrap_or(now),
        }
    }

    /// Run the conversation, yielding each reply once it has been appended to the history.
    ///
    /// The stream ends when the session reaches a terminal state. On failure the last item is
    /// the error. Cancellation ends the stream without an error. Dropping the stream before
    /// it ends leaves the session `Running` and unusable.
    pub fn invoke(&mut self) -> impl Stream<Item = Result<Message, ChatError>> + Send + '_ {
        async_stream::stream! {
            if let Err(err) = self.begin().await {
                yield Err(err);
                return;
            }

            loop {
                let speaker = match self.select_speaker().await {
                    Ok(Some(speaker)) => speaker,
                    Ok(None) => return,
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                };

                let token = self.cancellation.clone();
                let outcome = cancellable(&token, speaker.invoke(&self.history)).await;
                let reply = match outcome {
                    None => {
                        self.mark_cancelled().await;
                        return;
                    }
                    Some(Err(err)) => {
                        yield Err(self.fail(err).await);
                        return;
                    }
                    Some(Ok(reply)) => reply,
                };

                let message = self.append_turn(speaker.name(), reply).await;
                let outcome = self.evaluate_termination(speaker.name()).await;
                yield Ok(message);
                match outcome {
                    Ok(false) => {}
                    Ok(true) => return,
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }
        }
    }

    /// Like [`invoke`](Self::invoke), but forwards every delta of the current speaker as it
    /// arrives, followed by the assembled [`ChatUpdate::Message`] once it is appended.
    ///
    /// For each turn the concatenated delta fragments equal the message content.
    pub fn invoke_streaming(
        &mut self,
    ) -> impl Stream<Item = Result<ChatUpdate, ChatError>> + Send + '_ {
        async_stream::stream! {
            if let Err(err) = self.begin().await {
                yield Err(err);
                return;
            }

            loop {
                let speaker = match self.select_speaker().await {
                    Ok(Some(speaker)) => speaker,
                    Ok(None) => return,
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                };
                let name = speaker.name().to_string();

                let token = self.cancellation.clone();
                let outcome = cancellable(&token, speaker.invoke_stream(&self.history)).await;
                let mut deltas = match outcome {
                    None => {
                        self.mark_cancelled().await;
                        return;
                    }
                    Some(Err(err)) => {
                        yield Err(self.fail(err).await);
                        return;
                    }
                    Some(Ok(deltas)) => deltas,
                };

                let mut content = String::new();
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = token.cancelled() => None,
                        item = deltas.next() => Some(item),
                    };
                    match next {
                        None => {
                            drop(deltas);
                            self.mark_cancelled().await;
                            return;
                        }
                        Some(None) => break,
                        Some(Some(Ok(delta))) => {
                            content.push_str(&delta.content_fragment);
                            yield Ok(ChatUpdate::Delta(StreamingDelta::new(
                                Some(name.clone()),
                                delta.content_fragment,
                            )));
                        }
                        Some(Some(Err(err))) => {
                            drop(deltas);
                            yield Err(self.fail(err).await);
                            return;
                        }
                    }
                }

                let message = self.append_turn(&name, Message::assistant(name.clone(), content)).await;
                let outcome = self.evaluate_termination(&name).await;
                yield Ok(ChatUpdate::Message(message));
                match outcome {
                    Ok(false) => {}
                    Ok(true) => return,
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }
        }
    }

    /// Drive [`invoke`](Self::invoke) to the end.
    ///
    /// Returns the transcript for `Completed`, `Terminated`, and `Cancelled` sessions, or a
    /// [`ChatFailure`] carrying the error and the history as it stood.
    pub async fn run(&mut self) -> Result<Transcript, ChatFailure> {
        let mut error = None;
        {
            let turns = self.invoke();
            pin_mut!(turns);
            while let Some(turn) = turns.next().await {
                if let Err(err) = turn {
                    error = Some(err);
                }
            }
        }

        match error {
            Some(error) => Err(ChatFailure {
                session_id: self.id.clone(),
                error,
                history: self.history.clone(),
                iterations: self.iteration_count,
            }),
            None => Ok(self.transcript()),
        }
    }

    fn ensure_idle(&self) -> Result<(), ChatError> {
        if self.state == ChatState::Idle {
            Ok(())
        } else {
            Err(ChatError::SessionFinished(self.state.to_string()))
        }
    }

    async fn begin(&mut self) -> Result<(), ChatError> {
        self.ensure_idle()?;
        if self.participants.is_empty() {
            return Err(self.fail(ChatError::NoParticipants).await);
        }
        if self.max_iterations == 0 {
            return Err(self
                .fail(ChatError::InvalidConfig(
                    "max_iterations must be at least 1".to_string(),
                ))
                .await);
        }

        self.state = ChatState::Running;
        self.started_at = Some(Utc::now());
        log::info!(
            "GroupChat {} started with {} participant(s), max {} turn(s)",
            self.id,
            self.participants.len(),
            self.max_iterations
        );
        self.emit(GroupChatEvent::RunStarted {
            session_id: self.id.clone(),
            participant_count: self.participants.len(),
            max_iterations: self.max_iterations,
        })
        .await;
        Ok(())
    }

    /// `Ok(None)` means the session was cancelled while choosing.
    async fn select_speaker(&mut self) -> Result<Option<Arc<dyn Participant>>, ChatError> {
        let context = SelectionContext::new(self.participant_names(), self.iteration_count);
        let selection = Arc::clone(&self.selection);
        let token = self.cancellation.clone();

        let outcome = cancellable(&token, selection.select_next(&self.history, &context)).await;
        let chosen = match outcome {
            None => {
                self.mark_cancelled().await;
                return Ok(None);
            }
            Some(Err(err)) => return Err(self.fail(err).await),
            Some(Ok(name)) => name,
        };

        let speaker = match self.resolve(&chosen) {
            Ok(speaker) => speaker,
            Err(err) => return Err(self.fail(err).await),
        };

        log::debug!(
            "GroupChat {}: turn {} goes to '{}'",
            self.id,
            self.iteration_count + 1,
            speaker.name()
        );
        self.emit(GroupChatEvent::SpeakerSelected {
            session_id: self.id.clone(),
            iteration: self.iteration_count + 1,
            agent_name: speaker.name().to_string(),
        })
        .await;
        Ok(Some(speaker))
    }

    /// Match a strategy's answer to a registered participant.
    ///
    /// Surrounding whitespace and quotes, and trailing periods inside or outside the quotes,
    /// are ignored. An exact match wins
    /// over a case-insensitive one.
    fn resolve(&self, chosen: &str) -> Result<Arc<dyn Participant>, ChatError> {
        let mut name = chosen.trim();
        loop {
            let stripped = name
                .trim_end_matches('.')
                .trim_matches(|c| c == '"' || c == '\'' || c == '`')
                .trim();
            if stripped == name {
                break;
            }
            name = stripped;
        }

        self.participants
            .iter()
            .find(|p| p.name() == name)
            .or_else(|| {
                self.participants
                    .iter()
                    .find(|p| p.name().eq_ignore_ascii_case(name))
            })
            .cloned()
            .ok_or_else(|| ChatError::UnknownParticipant(chosen.trim().to_string()))
    }

    async fn append_turn(&mut self, speaker: &str, reply: Message) -> Message {
        let message = reply.with_author(speaker);
        self.history.add_message(message.clone());
        self.iteration_count += 1;
        let content_length = message.content.chars().count();
        log::debug!(
            "GroupChat {}: turn {} by '{}' ({} chars)",
            self.id,
            self.iteration_count,
            speaker,
            content_length
        );
        self.emit(GroupChatEvent::TurnCompleted {
            session_id: self.id.clone(),
            iteration: self.iteration_count,
            agent_name: speaker.to_string(),
            content_length,
        })
        .await;
        message
    }

    /// Returns `Ok(true)` when the session reached a terminal state after this turn.
    async fn evaluate_termination(&mut self, speaker: &str) -> Result<bool, ChatError> {
        let applies = self
            .termination_agents
            .as_ref()
            .map(|agents| agents.iter().any(|a| a.eq_ignore_ascii_case(speaker)))
            .unwrap_or(true);

        if applies {
            let termination = Arc::clone(&self.termination);
            let token = self.cancellation.clone();
            let outcome = cancellable(&token, termination.should_terminate(&self.history)).await;
            let terminate = match outcome {
                None => {
                    self.mark_cancelled().await;
                    return Ok(true);
                }
                Some(Err(err)) => return Err(self.fail(err).await),
                Some(Ok(terminate)) => terminate,
            };

            self.emit(GroupChatEvent::TerminationChecked {
                session_id: self.id.clone(),
                iteration: self.iteration_count,
                agent_name: speaker.to_string(),
                terminate,
            })
            .await;

            if terminate {
                self.finish(ChatState::Completed).await;
                return Ok(true);
            }
        }

        if self.iteration_count >= self.max_iterations {
            self.finish(ChatState::Terminated).await;
            return Ok(true);
        }
        Ok(false)
    }

    async fn finish(&mut self, state: ChatState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
        log::info!(
            "GroupChat {} {} after {} turn(s)",
            self.id,
            state,
            self.iteration_count
        );
        self.emit(GroupChatEvent::RunFinished {
            session_id: self.id.clone(),
            state,
            iterations: self.iteration_count,
        })
        .await;
    }

    async fn mark_cancelled(&mut self) {
        self.finish(ChatState::Cancelled).await;
    }

    /// Move to `Failed`, record the error, and hand it back for surfacing.
    async fn fail(&mut self, error: ChatError) -> ChatError {
        self.state = ChatState::Failed;
        self.finished_at = Some(Utc::now());
        self.last_error = Some(error.clone());
        log::error!(
            "GroupChat {} failed after {} turn(s): {}",
            self.id,
            self.iteration_count,
            error
        );
        self.emit(GroupChatEvent::RunFailed {
            session_id: self.id.clone(),
            iteration: self.iteration_count,
            error: error.clone(),
        })
        .await;
        error
    }

    async fn emit(&self, event: GroupChatEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_group_chat_event(&event).await;
        }
    }
}

/// Race `future` against `token`; `None` means the token fired first.
async fn cancellable<F>(token: &CancellationToken, future: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        output = future => Some(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groupchat::agent::DeltaStream;
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Participant for Named {
        fn name(&self) -> &str {
            self.0
        }
        async fn invoke(&self, _h: &ChatHistory) -> Result<Message, ChatError> {
            Ok(Message::assistant(self.0, "ok"))
        }
        async fn invoke_stream(&self, _h: &ChatHistory) -> Result<DeltaStream, ChatError> {
            Err(ChatError::Model("not streaming".into()))
        }
    }

    fn chat() -> GroupChat {
        let mut chat = GroupChat::new();
        chat.add_participant(Arc::new(Named("translatoragent"))).unwrap();
        chat.add_participant(Arc::new(Named("SummaryAgent"))).unwrap();
        chat
    }

    #[test]
    fn test_resolve_is_lenient_about_decoration_and_case() {
        let chat = chat();
        assert_eq!(chat.resolve("translatoragent").unwrap().name(), "translatoragent");
        assert_eq!(chat.resolve("  \"summaryagent\".\n").unwrap().name(), "SummaryAgent");
        assert_eq!(chat.resolve("`TRANSLATORAGENT`").unwrap().name(), "translatoragent");
        assert_eq!(chat.resolve("\"summaryagent.\"").unwrap().name(), "SummaryAgent");
        assert_eq!(chat.resolve("'translatoragent.'.").unwrap().name(), "translatoragent");
    }

    #[test]
    fn test_resolve_rejects_unknown_names() {
        let chat = chat();
        assert_eq!(
            chat.resolve(" reviewer ").err(),
            Some(ChatError::UnknownParticipant("reviewer".into()))
        );
    }

    #[test]
    fn test_duplicate_names_are_rejected_ignoring_case() {
        let mut chat = chat();
        let err = chat
            .add_participant(Arc::new(Named("summaryagent")))
            .unwrap_err();
        assert_eq!(err, ChatError::DuplicateParticipant("summaryagent".into()));
    }

    #[test]
    fn test_chat_update_wire_format() {
        let delta = ChatUpdate::Delta(StreamingDelta::new(Some("a".into()), "Hi"));
        assert_eq!(
            serde_json::to_string(&delta).unwrap(),
            r#"{"type":"delta","authorName":"a","contentFragment":"Hi"}"#
        );
        let message = ChatUpdate::Message(Message::assistant("a", "Hi"));
        assert_eq!(
            serde_json::to_string(&message).unwrap(),
            r#"{"type":"message","role":"assistant","authorName":"a","content":"Hi"}"#
        );
    }
}
