//! Remote Agent Proxy
//!
//! [`RemoteAgent`] lets an agent that lives in another process take part in a group chat as
//! if it were local. It speaks the agent wire protocol:
//!
//! | Endpoint | Request body | Response |
//! |---|---|---|
//! | `POST /agent/invoke` | history (JSON array) | one message, `application/json` |
//! | `POST /agent/invoke-streaming` | history (JSON array) | one delta per line, `application/jsonl` |
//! | `GET /agent/details` | – | `{name, instructions}` |
//!
//! The proxy never touches the session's history; it only serializes it into request bodies.
//!
//! # Streaming framing
//!
//! The streaming body is read incrementally and split on `\n`. Blank lines are ignored, a
//! line split across network chunks is reassembled, and a trailing line without a newline is
//! still decoded when the body ends. Lines that do not decode into a [`StreamingDelta`]
//! (including a literal `null`) are logged and skipped under the default
//! [`MalformedLinePolicy::Skip`]; [`MalformedLinePolicy::Fail`] turns them into a
//! [`ChatError::MalformedStreamLine`] that ends the stream.
//!
//! # Example
//!
//! ```rust,no_run
//! use groupchat::agent::Participant;
//! use groupchat::remote_agent::RemoteAgent;
//! use groupchat::{ChatHistory, Message};
//! use futures_util::StreamExt;
//!
//! # async {
//! let agent = RemoteAgent::new("translatoragent", "http://localhost:5001").unwrap();
//!
//! let mut history = ChatHistory::new();
//! history.add_message(Message::user("Buongiorno a tutti"));
//!
//! let mut deltas = agent.invoke_stream(&history).await.unwrap();
//! while let Some(delta) = deltas.next().await {
//!     print!("{}", delta.unwrap().content_fragment);
//! }
//! # };
//! ```

use crate::groupchat::agent::{AgentDetails, DeltaStream, Participant};
use crate::groupchat::client_wrapper::{Message, StreamingDelta};
use crate::groupchat::error::ChatError;
use crate::groupchat::history::ChatHistory;
use crate::groupchat::http_client_pool::get_or_create_client;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;

/// Path of the non-streaming invocation endpoint.
pub const INVOKE_PATH: &str = "/agent/invoke";
/// Path of the streaming invocation endpoint.
pub const INVOKE_STREAMING_PATH: &str = "/agent/invoke-streaming";
/// Path of the informational details endpoint.
pub const DETAILS_PATH: &str = "/agent/details";
/// Content type of streaming responses (newline-delimited JSON).
pub const JSONL_CONTENT_TYPE: &str = "application/jsonl";

/// Longest slice of an error body copied into [`ChatError::RemoteInvocation`].
const MAX_REASON_BODY_CHARS: usize = 512;

/// What to do with a streaming line that is not a valid delta.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MalformedLinePolicy {
    /// Log a warning and keep reading.
    #[default]
    Skip,
    /// Yield [`ChatError::MalformedStreamLine`] and stop reading.
    Fail,
}

/// HTTP-backed [`Participant`].
#[derive(Clone, Debug)]
pub struct RemoteAgent {
    name: String,
    base_url: String,
    client: reqwest::Client,
    timeout: Option<Duration>,
    retries: usize,
    malformed_lines: MalformedLinePolicy,
}

impl RemoteAgent {
    /// Create a proxy for the agent listening at `base_url`, using the shared connection pool.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ChatError> {
        let base_url = normalize_base_url(base_url.into());
        let client = get_or_create_client(&base_url)?;
        Ok(Self::with_client(name, base_url, client))
    }

    /// Create a proxy that uses the provided `reqwest::Client`.
    pub fn with_client(
        name: impl Into<String>,
        base_url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: normalize_base_url(base_url.into()),
            client,
            timeout: None,
            retries: 0,
            malformed_lines: MalformedLinePolicy::default(),
        }
    }

    /// Bound the whole round trip of `invoke` and `details` calls.
    ///
    /// Streaming invocations are not bounded; cancel them through the session instead.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Retry failed non-streaming invocations up to `retries` extra times.
    ///
    /// Only HTTP and transport failures are retried; a malformed body fails immediately.
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_malformed_line_policy(mut self, policy: MalformedLinePolicy) -> Self {
        self.malformed_lines = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the agent's static configuration from `GET /agent/details`.
    pub async fn details(&self) -> Result<AgentDetails, ChatError> {
        let mut request = self.client.get(self.url(DETAILS_PATH));
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let response = self.check_status(response).await?;
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_str(&body).map_err(|e| {
            ChatError::Deserialization(format!(
                "agent '{}' returned invalid details: {}",
                self.name, e
            ))
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(&self, err: reqwest::Error) -> ChatError {
        ChatError::Transport {
            agent: self.name.clone(),
            message: err.to_string(),
        }
    }

    async fn post_history(
        &self,
        path: &str,
        history: &ChatHistory,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, ChatError> {
        let mut request = self.client.post(self.url(path)).json(history);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        self.check_status(response).await
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut reason = status
            .canonical_reason()
            .unwrap_or("Unknown Status")
            .to_string();
        let body = response.text().await.unwrap_or_default();
        let body = body.trim();
        if !body.is_empty() {
            reason.push_str(": ");
            reason.extend(body.chars().take(MAX_REASON_BODY_CHARS));
        }

        log::warn!(
            "RemoteAgent '{}' at {} answered HTTP {}",
            self.name,
            self.base_url,
            status.as_u16()
        );
        Err(ChatError::RemoteInvocation {
            agent: self.name.clone(),
            status: status.as_u16(),
            reason,
        })
    }

    async fn invoke_once(&self, history: &ChatHistory) -> Result<Message, ChatError> {
        let response = self.post_history(INVOKE_PATH, history, self.timeout).await?;
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_str::<Message>(&body).map_err(|e| {
            ChatError::Deserialization(format!(
                "agent '{}' returned an invalid message: {}",
                self.name, e
            ))
        })
    }
}

#[async_trait]
impl Participant for RemoteAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, history: &ChatHistory) -> Result<Message, ChatError> {
        let mut attempt = 0;
        loop {
            match self.invoke_once(history).await {
                Ok(message) => return Ok(message),
                Err(err @ (ChatError::RemoteInvocation { .. } | ChatError::Transport { .. }))
                    if attempt < self.retries =>
                {
                    attempt += 1;
                    log::warn!(
                        "RemoteAgent '{}' attempt {}/{} failed: {}",
                        self.name,
                        attempt,
                        self.retries + 1,
                        err
                    );
                    tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn invoke_stream(&self, history: &ChatHistory) -> Result<DeltaStream, ChatError> {
        let response = self
            .post_history(INVOKE_STREAMING_PATH, history, None)
            .await?;
        Ok(decode_delta_lines(
            self.name.clone(),
            response.bytes_stream(),
            self.malformed_lines,
        ))
    }
}

fn normalize_base_url(base_url: String) -> String {
    base_url.trim_end_matches('/').to_string()
}

enum LineOutcome {
    Delta(StreamingDelta),
    Skip,
    Fail(ChatError),
}

fn decode_line(agent: &str, raw: &[u8], policy: MalformedLinePolicy) -> LineOutcome {
    let start = raw.iter().position(|b| !b.is_ascii_whitespace());
    let end = raw.iter().rposition(|b| !b.is_ascii_whitespace());
    let line = match (start, end) {
        (Some(start), Some(end)) => &raw[start..=end],
        _ => return LineOutcome::Skip,
    };

    // Invalid UTF-8 is rejected by the decoder; lossy text is only for diagnostics.
    match serde_json::from_slice::<StreamingDelta>(line) {
        Ok(delta) => LineOutcome::Delta(delta),
        Err(e) => {
            let text = String::from_utf8_lossy(line);
            match policy {
                MalformedLinePolicy::Skip => {
                    log::warn!(
                        "RemoteAgent '{}': skipping malformed stream line ({}): {}",
                        agent,
                        e,
                        text
                    );
                    LineOutcome::Skip
                }
                MalformedLinePolicy::Fail => LineOutcome::Fail(ChatError::MalformedStreamLine {
                    line: text.into_owned(),
                    message: e.to_string(),
                }),
            }
        }
    }
}

/// Turn a raw `application/jsonl` body into a stream of deltas.
///
/// Reading is pull-driven: the next network chunk is only requested when the consumer asks
/// for the next delta, and dropping the returned stream drops the body (and its connection).
pub(crate) fn decode_delta_lines<S, B, E>(
    agent: String,
    body: S,
    policy: MalformedLinePolicy,
) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut body = Box::pin(body);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => buffer.extend_from_slice(bytes.as_ref()),
                Err(e) => {
                    yield Err(ChatError::Transport {
                        agent: agent.clone(),
                        message: format!("stream interrupted: {}", e),
                    });
                    return;
                }
            }

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                match decode_line(&agent, &line, policy) {
                    LineOutcome::Delta(delta) => yield Ok(delta),
                    LineOutcome::Skip => {}
                    LineOutcome::Fail(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }
        }

        match decode_line(&agent, &buffer, policy) {
            LineOutcome::Delta(delta) => yield Ok(delta),
            LineOutcome::Skip => {}
            LineOutcome::Fail(err) => yield Err(err),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    async fn collect(chunks: Vec<&'static str>, policy: MalformedLinePolicy) -> Vec<Result<StreamingDelta, ChatError>> {
        let body = stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
        decode_delta_lines("agent".to_string(), body, policy)
            .collect()
            .await
    }

    fn fragments(items: &[Result<StreamingDelta, ChatError>]) -> Vec<String> {
        items
            .iter()
            .map(|r| r.as_ref().unwrap().content_fragment.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks_are_reassembled() {
        let items = collect(
            vec![
                "{\"authorName\":\"a\",\"conte",
                "ntFragment\":\"Hel\"}\n{\"authorName\":\"a\",\"contentFragment\":\"lo\"}",
                "\n",
            ],
            MalformedLinePolicy::Skip,
        )
        .await;
        assert_eq!(fragments(&items), vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline_is_decoded() {
        let items = collect(
            vec!["{\"authorName\":null,\"contentFragment\":\"tail\"}"],
            MalformedLinePolicy::Skip,
        )
        .await;
        assert_eq!(fragments(&items), vec!["tail"]);
        assert_eq!(items[0].as_ref().unwrap().author_name, None);
    }

    #[tokio::test]
    async fn test_blank_null_and_garbage_lines_are_skipped() {
        let items = collect(
            vec![
                "\n\r\n   \n",
                "null\n",
                "not json\n",
                "{\"authorName\":\"a\",\"contentFragment\":\"ok\"}\r\n",
            ],
            MalformedLinePolicy::Skip,
        )
        .await;
        assert_eq!(fragments(&items), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_malformed() {
        let body = stream::iter(vec![
            Ok::<Vec<u8>, std::io::Error>(b"{\"authorName\":\"a\",\"contentFragment\":\"x\xFFy\"}\n".to_vec()),
            Ok(b"{\"authorName\":\"a\",\"contentFragment\":\"ok\"}\n".to_vec()),
        ]);
        let items: Vec<_> = decode_delta_lines("agent".into(), body, MalformedLinePolicy::Skip)
            .collect()
            .await;
        assert_eq!(fragments(&items), vec!["ok"]);

        let body = stream::iter(vec![Ok::<Vec<u8>, std::io::Error>(
            b"{\"authorName\":\"a\",\"contentFragment\":\"x\xFFy\"}\n".to_vec(),
        )]);
        let items: Vec<_> = decode_delta_lines("agent".into(), body, MalformedLinePolicy::Fail)
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Err(ChatError::MalformedStreamLine { .. })));
    }

    #[tokio::test]
    async fn test_fail_policy_stops_at_first_malformed_line() {
        let items = collect(
            vec![
                "{\"authorName\":\"a\",\"contentFragment\":\"one\"}\n",
                "{broken\n",
                "{\"authorName\":\"a\",\"contentFragment\":\"two\"}\n",
            ],
            MalformedLinePolicy::Fail,
        )
        .await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        match &items[1] {
            Err(ChatError::MalformedStreamLine { line, .. }) => assert_eq!(line, "{broken"),
            other => panic!("expected malformed line error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_body_error_surfaces_as_transport_error() {
        let body = stream::iter(vec![
            Ok::<&'static str, String>("{\"authorName\":\"a\",\"contentFragment\":\"x\"}\n"),
            Err("connection reset".to_string()),
        ]);
        let items: Vec<_> = decode_delta_lines("agent".into(), body, MalformedLinePolicy::Skip)
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[1], Err(ChatError::Transport { agent, .. }) if agent == "agent"));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let agent = RemoteAgent::with_client("a", "http://localhost:5000/", reqwest::Client::new());
        assert_eq!(agent.base_url(), "http://localhost:5000");
        assert_eq!(agent.url(INVOKE_PATH), "http://localhost:5000/agent/invoke");
    }
}
