//! # Stream Consumer
//! Pure fold of decoded events into UI-facing generation state.
//!
//! No clock, no randomness: replaying the same events from the same initial
//! state always lands on the same final state.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::stream::event::StreamEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Refreshing,
    Analyzing,
    Generating,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationState {
    pub phase: Phase,
    pub feed_count: Option<u64>,
    /// Set by the first `metadata` event and kept for the rest of the session.
    pub articles_analyzed: Option<u64>,
    /// Last `partial` snapshot, replaced wholesale on every update.
    pub content: Option<Value>,
}

impl GenerationState {
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// What a caller does on failure: drop partial content, go back to idle.
    pub fn reset(&mut self) {
        *self = GenerationState::default();
    }
}

/// Terminal `error` event surfaced to the caller, or a stream that ended
/// without any terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFailure {
    pub message: String,
}

impl StreamFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn incomplete() -> Self {
        Self::new("Stream ended before generation completed")
    }
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StreamFailure {}

/// Apply one event. Events arriving after `complete` leave the state untouched.
pub fn apply(mut state: GenerationState, event: &StreamEvent) -> Result<GenerationState, StreamFailure> {
    if state.is_complete() {
        return Ok(state);
    }
    match event {
        StreamEvent::Refreshing { feed_count } => {
            state.phase = Phase::Refreshing;
            state.feed_count = Some(*feed_count);
        }
        StreamEvent::Analyzing { feed_count } => {
            state.phase = Phase::Analyzing;
            state.feed_count = Some(*feed_count);
        }
        StreamEvent::Metadata { articles_analyzed } => {
            state.phase = Phase::Generating;
            state.articles_analyzed.get_or_insert(*articles_analyzed);
        }
        StreamEvent::Partial { data } => {
            state.phase = Phase::Generating;
            state.content = Some(data.clone());
        }
        StreamEvent::Complete => {
            state.phase = Phase::Complete;
        }
        StreamEvent::Error { error } => return Err(StreamFailure::new(error.clone())),
    }
    Ok(state)
}

/// Left fold of [`apply`] over an ordered event sequence.
pub fn fold<'a, I>(initial: GenerationState, events: I) -> Result<GenerationState, StreamFailure>
where
    I: IntoIterator<Item = &'a StreamEvent>,
{
    events.into_iter().try_fold(initial, apply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<StreamEvent> {
        vec![
            StreamEvent::Refreshing { feed_count: 2 },
            StreamEvent::Analyzing { feed_count: 5 },
            StreamEvent::Metadata {
                articles_analyzed: 7,
            },
            StreamEvent::Partial {
                data: json!({"body": "A"}),
            },
            StreamEvent::Partial {
                data: json!({"body": "B"}),
            },
            StreamEvent::Complete,
        ]
    }

    #[test]
    fn replay_is_deterministic() {
        let events = sample();
        let a = fold(GenerationState::default(), &events).unwrap();
        let b = fold(GenerationState::default(), &events).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn last_partial_wins() {
        let events = vec![
            StreamEvent::Metadata {
                articles_analyzed: 7,
            },
            StreamEvent::Partial { data: json!("A") },
            StreamEvent::Partial { data: json!("B") },
            StreamEvent::Complete,
        ];
        let s = fold(GenerationState::default(), &events).unwrap();
        assert_eq!(s.phase, Phase::Complete);
        assert_eq!(s.articles_analyzed, Some(7));
        assert_eq!(s.content, Some(json!("B")));
    }

    #[test]
    fn shrinking_snapshot_still_replaces() {
        let events = vec![
            StreamEvent::Partial {
                data: json!({"body": "long text", "titles": ["x"]}),
            },
            StreamEvent::Partial {
                data: json!({"body": "short"}),
            },
        ];
        let s = fold(GenerationState::default(), &events).unwrap();
        assert_eq!(s.content, Some(json!({"body": "short"})));
    }

    #[test]
    fn phases_follow_events() {
        let events = sample();
        let mut s = GenerationState::default();
        let mut phases = Vec::new();
        for ev in &events {
            s = apply(s, ev).unwrap();
            phases.push(s.phase);
        }
        assert_eq!(
            phases,
            vec![
                Phase::Refreshing,
                Phase::Analyzing,
                Phase::Generating,
                Phase::Generating,
                Phase::Generating,
                Phase::Complete
            ]
        );
        assert_eq!(s.feed_count, Some(5));
    }

    #[test]
    fn article_count_is_latched() {
        let events = vec![
            StreamEvent::Metadata {
                articles_analyzed: 3,
            },
            StreamEvent::Metadata {
                articles_analyzed: 9,
            },
        ];
        let s = fold(GenerationState::default(), &events).unwrap();
        assert_eq!(s.articles_analyzed, Some(3));
    }

    #[test]
    fn error_propagates_as_failure() {
        let events = vec![
            StreamEvent::Analyzing { feed_count: 1 },
            StreamEvent::error("No articles found"),
        ];
        let err = fold(GenerationState::default(), &events).unwrap_err();
        assert_eq!(err.message, "No articles found");
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut s = fold(GenerationState::default(), &sample()).unwrap();
        s.reset();
        assert_eq!(s.phase, Phase::Idle);
        assert!(s.content.is_none());
    }
}
