//! Generation producers: anything that turns a [`GenerationInput`] into an
//! ordered stream of cumulative newsletter snapshots.
//!
//! Each item of a [`SnapshotStream`] supersedes the previous one. An `Err`
//! item ends generation; the orchestrator reports it and stops polling.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ai::AiConfig;
use crate::feeds::types::Article;
use crate::generate::partial_json::{parse_complete, parse_partial};
use crate::generate::prompt::{build_prompt, SYSTEM_PROMPT};
use crate::stream::parser::LineBuffer;

pub type SnapshotStream = BoxStream<'static, Result<Value>>;

/// Everything the model sees for one request.
#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub articles: Vec<Article>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub user_input: Option<String>,
}

pub trait NewsletterProducer: Send + Sync {
    fn stream_generate(&self, input: GenerationInput) -> SnapshotStream;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynProducer = Arc<dyn NewsletterProducer>;

/// Factory: build a producer according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns the deterministic sample producer.
/// * Else if `config.enabled==false`, returns a disabled producer.
/// * Else builds the configured provider.
pub fn build_producer(config: &AiConfig) -> DynProducer {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockProducer::sample());
    }

    if !config.enabled {
        return Arc::new(DisabledProducer);
    }

    match config.provider.as_str() {
        "openai" if config.api_key.is_empty() => {
            warn!("openai provider enabled without an API key; generation disabled");
            Arc::new(DisabledProducer)
        }
        "openai" => match OpenAiProducer::new(&config.api_key, &config.model) {
            Ok(p) => Arc::new(p),
            Err(e) => {
                warn!(error = ?e, "openai producer unavailable; generation disabled");
                Arc::new(DisabledProducer)
            }
        },
        "mock" => Arc::new(MockProducer::sample()),
        _ => Arc::new(DisabledProducer),
    }
}

// ------------------------------------------------------------
// OpenAI (chat completions, streamed)
// ------------------------------------------------------------

pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiProducer {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiProducer {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        // no overall timeout: the stream may legitimately run for minutes
        let http = reqwest::Client::builder()
            .user_agent("newsletter-stream/0.1")
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("building openai http client")?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: OPENAI_CHAT_URL.to_string(),
        })
    }

    /// Point at a compatible endpoint (proxy, self-hosted gateway).
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }
}

impl NewsletterProducer for OpenAiProducer {
    fn stream_generate(&self, input: GenerationInput) -> SnapshotStream {
        let body = json!({
            "model": self.model,
            "stream": true,
            "temperature": 0.7,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(&input) },
            ],
        });
        let request = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body);

        let open = async move {
            let resp = request.send().await.context("calling OpenAI")?;
            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(anyhow!(
                    "OpenAI request failed ({status}): {}",
                    api_error_message(&text)
                ));
            }
            let chunks: BoxStream<'static, Result<Vec<u8>>> = resp
                .bytes_stream()
                .map(|r| r.map(|b| b.to_vec()).map_err(anyhow::Error::from))
                .boxed();
            Ok(chunks)
        };

        stream::once(open)
            .flat_map(|opened| match opened {
                Ok(chunks) => snapshots_from_sse(chunks),
                Err(e) => stream::iter(vec![Err(e)]).boxed(),
            })
            .boxed()
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Decode an OpenAI chat-completions SSE body into cumulative snapshots.
///
/// Text deltas are accumulated; after each delta the accumulated text is
/// parsed as partial JSON and emitted when it changed. A final strict parse
/// runs at `[DONE]` or end of body. Non-JSON output falls back to
/// `{"body": <text>}`.
pub fn snapshots_from_sse(chunks: BoxStream<'static, Result<Vec<u8>>>) -> SnapshotStream {
    stream::unfold(CompletionState::new(chunks), |mut st| async move {
        loop {
            if let Some(item) = st.ready.pop_front() {
                return Some((item, st));
            }
            if st.done {
                return None;
            }
            match st.chunks.next().await {
                Some(Ok(chunk)) => {
                    for line in st.lines.push(&chunk) {
                        st.absorb(&line);
                    }
                }
                Some(Err(e)) => st.fail(e.context("reading OpenAI stream")),
                None => {
                    if let Some(line) = st.lines.finish() {
                        st.absorb(&line);
                    }
                    st.finish();
                }
            }
        }
    })
    .boxed()
}

struct CompletionState {
    chunks: BoxStream<'static, Result<Vec<u8>>>,
    lines: LineBuffer,
    text: String,
    last: Option<Value>,
    ready: VecDeque<Result<Value>>,
    done: bool,
}

impl CompletionState {
    fn new(chunks: BoxStream<'static, Result<Vec<u8>>>) -> Self {
        Self {
            chunks,
            lines: LineBuffer::new(),
            text: String::new(),
            last: None,
            ready: VecDeque::new(),
            done: false,
        }
    }

    fn absorb(&mut self, line: &str) {
        if self.done {
            return;
        }
        let Some(payload) = line.trim_end_matches('\r').strip_prefix("data:").map(str::trim) else {
            return;
        };
        if payload.is_empty() {
            return;
        }
        if payload == "[DONE]" {
            self.finish();
            return;
        }
        let v: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                debug!(target: "generate", error = %e, "skipping undecodable completion chunk");
                return;
            }
        };
        if let Some(err) = v.get("error") {
            let msg = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            self.fail(anyhow!("OpenAI stream error: {msg}"));
            return;
        }
        let delta = v
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if delta.is_empty() {
            return;
        }
        self.text.push_str(delta);
        if let Some(snapshot) = parse_partial(&self.text).filter(Value::is_object) {
            self.offer(snapshot);
        }
    }

    fn offer(&mut self, snapshot: Value) {
        if self.last.as_ref() == Some(&snapshot) {
            return;
        }
        self.last = Some(snapshot.clone());
        self.ready.push_back(Ok(snapshot));
    }

    fn finish(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        if self.text.trim().is_empty() {
            self.ready.push_back(Err(anyhow!("Model returned no content")));
            return;
        }
        match parse_complete(&self.text).filter(Value::is_object) {
            Some(full) => self.offer(full),
            None if self.last.is_none() => self.offer(json!({ "body": self.text })),
            None => {}
        }
    }

    fn fail(&mut self, e: anyhow::Error) {
        self.done = true;
        self.ready.push_back(Err(e));
    }
}

// ------------------------------------------------------------
// Disabled + mock producers
// ------------------------------------------------------------

/// Always fails; used when AI is disabled or misconfigured.
pub struct DisabledProducer;

impl NewsletterProducer for DisabledProducer {
    fn stream_generate(&self, _input: GenerationInput) -> SnapshotStream {
        stream::iter(vec![Err(anyhow!(
            "AI generation is disabled; enable it in config/ai.json"
        ))])
        .boxed()
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Replays fixed snapshots, optionally spaced out and optionally followed by
/// an error.
#[derive(Debug, Clone)]
pub struct MockProducer {
    snapshots: Vec<Value>,
    fail_with: Option<String>,
    delay: Duration,
}

impl MockProducer {
    pub fn new(snapshots: Vec<Value>) -> Self {
        Self {
            snapshots,
            fail_with: None,
            delay: Duration::ZERO,
        }
    }

    /// After the snapshots, yield an error with this message.
    pub fn failing_after(mut self, msg: impl Into<String>) -> Self {
        self.fail_with = Some(msg.into());
        self
    }

    /// Sleep before every item.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Canned three-step newsletter used by `AI_TEST_MODE=mock`.
    pub fn sample() -> Self {
        let titles = json!(["This Week in Your Feeds", "The Weekly Roundup"]);
        Self::new(vec![
            json!({ "suggestedTitles": titles }),
            json!({ "suggestedTitles": titles, "body": "## Highlights\n\n" }),
            json!({
                "suggestedTitles": titles,
                "suggestedSubjectLines": ["Your weekly digest is here"],
                "body": "## Highlights\n\nA quick look at what happened this week.",
                "topAnnouncements": ["Mock announcement"],
                "additionalInfo": "Generated by the mock producer."
            }),
        ])
    }
}

impl NewsletterProducer for MockProducer {
    fn stream_generate(&self, _input: GenerationInput) -> SnapshotStream {
        let mut items: Vec<Result<Value>> = self.snapshots.iter().cloned().map(Ok).collect();
        if let Some(msg) = &self.fail_with {
            items.push(Err(anyhow!(msg.clone())));
        }
        let delay = self.delay;
        stream::iter(items)
            .then(move |item| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .boxed()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
