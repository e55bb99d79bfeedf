//! # Event Codec
//! Wire form of every message on the generation stream.
//!
//! One event is one line: `data: ` followed by a single-line JSON object whose
//! `type` field names the event kind, terminated by a blank line. Decoding is
//! lenient by contract: anything that is not a well-formed `data:` line yields
//! `None` and is dropped by the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Literal prefix of every payload line.
pub const DATA_PREFIX: &str = "data: ";

/// Events exchanged between the generation endpoint and its consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// N stale feeds are about to be re-fetched.
    Refreshing {
        #[serde(rename = "feedCount")]
        feed_count: u64,
    },
    /// N requested feeds are being scanned for articles.
    Analyzing {
        #[serde(rename = "feedCount")]
        feed_count: u64,
    },
    /// Article count, fixed before generation starts.
    Metadata {
        #[serde(rename = "articlesAnalyzed")]
        articles_analyzed: u64,
    },
    /// Latest cumulative snapshot of the generated newsletter (never a diff).
    Partial { data: Value },
    /// Terminal success marker.
    Complete,
    /// Terminal failure marker with a human-readable message.
    Error { error: String },
}

impl StreamEvent {
    pub fn error(msg: impl Into<String>) -> Self {
        StreamEvent::Error { error: msg.into() }
    }

    /// `complete` and `error` end the stream; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete | StreamEvent::Error { .. })
    }

    /// Wire name of the event kind (the JSON `type` field).
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Refreshing { .. } => "refreshing",
            StreamEvent::Analyzing { .. } => "analyzing",
            StreamEvent::Metadata { .. } => "metadata",
            StreamEvent::Partial { .. } => "partial",
            StreamEvent::Complete => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }
}

/// Encode one event as a complete wire message: `data: <json>\n\n`.
pub fn encode(event: &StreamEvent) -> String {
    let json = serde_json::to_string(event).unwrap_or_else(|e| {
        warn!(target: "stream", error = %e, kind = event.kind(), "event serialization failed");
        r#"{"type":"error","error":"failed to encode event"}"#.to_string()
    });
    format!("{DATA_PREFIX}{json}\n\n")
}

/// Decode a single line (without its trailing `\n`).
///
/// Returns `None` for blank separators, comments, other SSE fields and for
/// payloads that do not parse; the latter are expected when a line was cut by
/// chunking, so they are only logged at debug level.
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let payload = line.strip_prefix(DATA_PREFIX)?;
    match serde_json::from_str::<StreamEvent>(payload) {
        Ok(ev) => Some(ev),
        Err(e) => {
            debug!(target: "stream", error = %e, len = payload.len(), "dropping undecodable data line");
            None
        }
    }
}
