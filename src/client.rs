//! Chat-completions transport
//!
//! [`ChatTransport`] is the seam between the runner and the network. The
//! production implementation, [`OpenAiClient`], speaks the OpenAI-compatible
//! `/chat/completions` protocol, streaming over SSE when asked to.
//!
//! A transport hands back a stream of [`ChatEvent`]s. Non-streaming requests
//! yield the whole completion as a single delta, followed by usage and
//! `Done`. Timing is left to the caller.

use crate::error::TransportError;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One request as seen by a transport
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

/// Token counts reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Incremental output text
    Delta(String),
    /// Server-reported token counts
    Usage(TokenUsage),
    /// End of the completion
    Done,
}

pub type EventStream = BoxStream<'static, Result<ChatEvent, TransportError>>;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Start a completion and return its event stream.
    ///
    /// Errors returned here (bad status, auth, connection) happen before any
    /// output is produced; errors inside the stream happen mid-completion.
    async fn open(&self, request: &ChatRequest) -> Result<EventStream, TransportError>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ResponseChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// OpenAI-compatible client
// ============================================================================

/// reqwest-based client for OpenAI-compatible `/chat/completions` endpoints
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        concurrency: usize,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .pool_max_idle_per_host(concurrency.max(1) * 2)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| TransportError::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(OpenAiClient {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request_builder(&self, request: &ChatRequest) -> reqwest::RequestBuilder {
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            stream: request.stream,
            temperature: request.temperature,
            // Ask for usage in the final chunk; servers that always send it ignore this
            stream_options: request.stream.then_some(StreamOptions {
                include_usage: true,
            }),
        };

        let mut builder = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .timeout(self.timeout);

        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        builder.json(&body)
    }

    async fn open_streaming(&self, request: &ChatRequest) -> Result<EventStream, TransportError> {
        let mut es = EventSource::new(self.request_builder(request))
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        // Surface status and auth failures before handing out the stream
        match es.next().await {
            Some(Ok(Event::Open)) => debug!("SSE connection opened"),
            Some(Ok(Event::Message(msg))) => {
                // Some servers skip the open event; keep the first message
                let mut state = SseState::new(es, self.timeout);
                state.push_message(&msg.data);
                return Ok(state.into_stream());
            }
            Some(Err(e)) => {
                es.close();
                return Err(map_sse_error(e, self.timeout).await);
            }
            None => return Err(TransportError::Malformed("empty event stream".to_string())),
        }

        Ok(SseState::new(es, self.timeout).into_stream())
    }

    async fn open_blocking(&self, request: &ChatRequest) -> Result<EventStream, TransportError> {
        let response = self
            .request_builder(request)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, self.timeout))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status.as_u16(), body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(e, self.timeout))?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| TransportError::Malformed(format!("{}: {}", e, truncate(&body, 200))))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TransportError::Malformed("response has no choices".to_string()))?;

        let mut events = vec![Ok(ChatEvent::Delta(text))];
        if let Some(usage) = parsed.usage {
            events.push(Ok(ChatEvent::Usage(usage)));
        }
        events.push(Ok(ChatEvent::Done));
        Ok(stream::iter(events).boxed())
    }
}

#[async_trait]
impl ChatTransport for OpenAiClient {
    #[tracing::instrument(skip(self, request), fields(model = %request.model, stream = request.stream))]
    async fn open(&self, request: &ChatRequest) -> Result<EventStream, TransportError> {
        if request.stream {
            self.open_streaming(request).await
        } else {
            self.open_blocking(request).await
        }
    }
}

/// Unfolding state for an SSE completion stream
struct SseState {
    es: EventSource,
    pending: VecDeque<Result<ChatEvent, TransportError>>,
    finished: bool,
    timeout: Duration,
}

impl SseState {
    fn new(es: EventSource, timeout: Duration) -> Self {
        SseState {
            es,
            pending: VecDeque::new(),
            finished: false,
            timeout,
        }
    }

    fn push_message(&mut self, data: &str) {
        if data.trim() == "[DONE]" {
            self.finish(Ok(ChatEvent::Done));
            return;
        }

        match serde_json::from_str::<ChatCompletionChunk>(data) {
            Ok(chunk) => {
                if let Some(content) = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                {
                    if !content.is_empty() {
                        self.pending.push_back(Ok(ChatEvent::Delta(content)));
                    }
                }
                // Usage may arrive in a final chunk with empty choices
                if let Some(usage) = chunk.usage {
                    debug!(
                        "Got usage stats: input={}, output={}",
                        usage.prompt_tokens, usage.completion_tokens
                    );
                    self.pending.push_back(Ok(ChatEvent::Usage(usage)));
                }
            }
            Err(e) => {
                debug!("Failed to parse chunk: {} - {}", e, data);
                self.finish(Err(TransportError::Malformed(format!(
                    "unparseable chunk: {}",
                    truncate(data, 200)
                ))));
            }
        }
    }

    fn finish(&mut self, last: Result<ChatEvent, TransportError>) {
        self.pending.push_back(last);
        self.finished = true;
        self.es.close();
    }

    async fn next_event(&mut self) -> Option<Result<ChatEvent, TransportError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }
            match self.es.next().await {
                Some(Ok(Event::Open)) => {}
                Some(Ok(Event::Message(msg))) => self.push_message(&msg.data),
                // Server closed the stream without a [DONE] sentinel
                Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => {
                    self.finish(Ok(ChatEvent::Done));
                }
                Some(Err(e)) => {
                    warn!("SSE error mid-stream: {}", e);
                    let err = map_sse_error(e, self.timeout).await;
                    self.finish(Err(err));
                }
            }
        }
    }

    fn into_stream(self) -> EventStream {
        stream::unfold(self, |mut state| async move {
            state.next_event().await.map(|event| (event, state))
        })
        .boxed()
    }
}

async fn map_sse_error(e: reqwest_eventsource::Error, timeout: Duration) -> TransportError {
    use reqwest_eventsource::Error;
    match e {
        Error::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            TransportError::from_status(status.as_u16(), body)
        }
        Error::Transport(e) => TransportError::from_reqwest(e, timeout),
        Error::InvalidContentType(content_type, _) => TransportError::Malformed(format!(
            "expected text/event-stream, got {:?}",
            content_type
        )),
        Error::Utf8(e) => TransportError::Malformed(e.to_string()),
        Error::Parser(e) => TransportError::Malformed(e.to_string()),
        Error::StreamEnded => TransportError::Malformed("stream ended early".to_string()),
        other => TransportError::Connection(other.to_string()),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
