//! HTTP consumer of the generation endpoint.
//!
//! Reads the response body chunk by chunk, runs each chunk through the
//! carry-over [`ChunkParser`] and folds the recovered events into a
//! [`GenerationState`]. The next chunk is only requested after the current one
//! has been fully processed.

use anyhow::{anyhow, Context, Result};
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::pipeline::GenerationRequest;
use crate::stream::event::StreamEvent;
use crate::stream::parser::ChunkParser;
use crate::stream::reducer::{apply, GenerationState, StreamFailure};

/// Incremental consumer for one stream.
#[derive(Debug, Default)]
pub struct StreamConsumer {
    parser: ChunkParser,
    state: GenerationState,
    terminated: bool,
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    /// Process one transport chunk. Returns the events it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, StreamFailure> {
        let events = self.parser.push_bytes(chunk);
        for ev in &events {
            self.accept(ev)?;
        }
        Ok(events)
    }

    /// Transport closed. Silence without a terminal event is a failure.
    pub fn finish(mut self) -> Result<GenerationState, StreamFailure> {
        if let Some(ev) = self.parser.finish() {
            self.accept(&ev)?;
        }
        if !self.terminated {
            return Err(StreamFailure::incomplete());
        }
        Ok(self.state)
    }

    fn accept(&mut self, ev: &StreamEvent) -> Result<(), StreamFailure> {
        if self.terminated {
            debug!(target: "stream", kind = ev.kind(), "event after terminal marker ignored");
            return Ok(());
        }
        let current = std::mem::take(&mut self.state);
        match apply(current, ev) {
            Ok(next) => {
                self.state = next;
                self.terminated = ev.is_terminal();
                Ok(())
            }
            Err(failure) => {
                // content is discarded on failure; state is already back to idle
                self.terminated = true;
                Err(failure)
            }
        }
    }
}

/// Drive a chunk stream to completion, calling `on_event` after each event
/// has been applied.
pub async fn consume<S, B, E, F>(chunks: S, mut on_event: F) -> Result<GenerationState>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
    F: FnMut(&StreamEvent, &GenerationState),
{
    let mut chunks = std::pin::pin!(chunks);
    let mut consumer = StreamConsumer::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.context("reading event stream")?;
        for ev in consumer.feed(chunk.as_ref())? {
            on_event(&ev, consumer.state());
        }
    }
    Ok(consumer.finish()?)
}

/// POST a generation request to `{base_url}/api/newsletter/generate` and
/// consume the resulting event stream.
pub async fn generate<F>(
    client: &reqwest::Client,
    base_url: &str,
    request: &GenerationRequest,
    on_event: F,
) -> Result<GenerationState>
where
    F: FnMut(&StreamEvent, &GenerationState),
{
    let url = format!("{}/api/newsletter/generate", base_url.trim_end_matches('/'));
    let resp = client
        .post(&url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .json(request)
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;

    let status = resp.status();
    if !status.is_success() {
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        let msg = body
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("request rejected");
        warn!(target: "stream", %status, "generation request rejected");
        return Err(anyhow!("{msg} (HTTP {status})"));
    }

    consume(resp.bytes_stream(), on_event).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::event::encode;
    use crate::stream::reducer::Phase;
    use serde_json::json;

    #[test]
    fn consumer_tracks_state_across_chunks() {
        let wire: String = [
            StreamEvent::Analyzing { feed_count: 1 },
            StreamEvent::Metadata {
                articles_analyzed: 2,
            },
            StreamEvent::Partial {
                data: json!({"body": "hi"}),
            },
            StreamEvent::Complete,
        ]
        .iter()
        .map(encode)
        .collect();

        let mut c = StreamConsumer::new();
        for piece in wire.as_bytes().chunks(5) {
            c.feed(piece).unwrap();
        }
        let state = c.finish().unwrap();
        assert_eq!(state.phase, Phase::Complete);
        assert_eq!(state.content, Some(json!({"body": "hi"})));
    }

    #[test]
    fn silence_is_not_success() {
        let mut c = StreamConsumer::new();
        c.feed(encode(&StreamEvent::Analyzing { feed_count: 1 }).as_bytes())
            .unwrap();
        assert_eq!(c.finish().unwrap_err(), StreamFailure::incomplete());
    }
}
