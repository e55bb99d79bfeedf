//! # Generation Orchestrator
//! Server half of the event protocol for one generation request:
//!
//! `start → (refreshing?) → analyzing → metadata → partial* → complete | error`
//!
//! Every failure after the stream has opened becomes exactly one `error`
//! event. A closed receiver (client went away) stops the run at the next
//! emission, which also drops the producer stream and its upstream call.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use axum::http::HeaderMap;
use chrono::{DateTime, NaiveDate, Utc};
use futures::StreamExt;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::feeds::refresh::{refresh_feeds, DEFAULT_REFRESH_CONCURRENCY};
use crate::feeds::staleness::stale_feeds;
use crate::feeds::types::{ArticleStore, FeedStore};
use crate::generate::{DynProducer, GenerationInput};
use crate::stream::event::StreamEvent;

/// Hard cap on articles handed to the model.
pub const MAX_ARTICLES: usize = 100;
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(300);
/// Buffered events between the pipeline and the response body.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

pub const NO_ARTICLES_MESSAGE: &str = "No articles found for the selected feeds and date range";

// ------------------------------------------------------------
// Request
// ------------------------------------------------------------

/// Validated generation request. Consumed once by [`Orchestrator::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub feed_ids: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
}

/// Raw request body; every field optional so validation can report what is
/// missing instead of failing deserialization.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequestBody {
    pub feed_ids: Option<Vec<String>>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub user_input: Option<String>,
}

impl GenerationRequestBody {
    pub fn validate(self) -> Result<GenerationRequest, String> {
        // a set of ids: blanks dropped, first occurrence wins
        let mut seen = HashSet::new();
        let feed_ids: Vec<String> = self
            .feed_ids
            .unwrap_or_default()
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();
        if feed_ids.is_empty() {
            return Err("feedIds must be a non-empty array".to_string());
        }
        let (Some(start), Some(end)) = (self.start_date, self.end_date) else {
            return Err("startDate and endDate are required".to_string());
        };
        let start_date = parse_iso8601(&start).ok_or_else(|| format!("invalid startDate: {start}"))?;
        let end_date = parse_iso8601(&end).ok_or_else(|| format!("invalid endDate: {end}"))?;
        if start_date > end_date {
            return Err("startDate must not be after endDate".to_string());
        }
        Ok(GenerationRequest {
            feed_ids,
            start_date,
            end_date,
            user_input: self.user_input.filter(|s| !s.trim().is_empty()),
        })
    }
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` taken as midnight UTC.
pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Per-request facts the pipeline needs, passed in explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
    pub user_id: Option<String>,
    /// Reference time for staleness decisions.
    pub received_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            request_id: next_request_id(),
            user_id,
            received_at: Utc::now(),
        }
    }

    /// `x-request-id` / `x-user-id` headers when present.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let mut ctx = Self::new(header("x-user-id"));
        if let Some(id) = header("x-request-id") {
            ctx.request_id = id;
        }
        ctx
    }
}

fn next_request_id() -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    format!("gen-{:x}-{n}", Utc::now().timestamp_millis())
}

// ------------------------------------------------------------
// Orchestrator
// ------------------------------------------------------------

/// How a run ended, for callers and tests. The client only ever sees events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { partials: usize },
    Failed(String),
    /// Receiver dropped before the terminal event could be sent.
    Cancelled,
}

enum Halt {
    Disconnected,
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for Halt {
    fn from(e: anyhow::Error) -> Self {
        Halt::Failed(e)
    }
}

struct Emitter {
    tx: mpsc::Sender<StreamEvent>,
    partials: usize,
}

impl Emitter {
    async fn emit(&mut self, ev: StreamEvent) -> Result<(), Halt> {
        if matches!(ev, StreamEvent::Partial { .. }) {
            self.partials += 1;
            counter!("newsletter_partials_total").increment(1);
        }
        self.tx.send(ev).await.map_err(|_| Halt::Disconnected)
    }

    /// Await `fut` unless the receiver goes away first; the losing future is
    /// dropped, which cancels any upstream call it owns.
    async fn unless_disconnected<F: Future>(&self, fut: F) -> Result<F::Output, Halt> {
        tokio::select! {
            biased;
            _ = self.tx.closed() => Err(Halt::Disconnected),
            out = fut => Ok(out),
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    feeds: Arc<dyn FeedStore>,
    articles: Arc<dyn ArticleStore>,
    producer: DynProducer,
    refresh_concurrency: usize,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(feeds: Arc<dyn FeedStore>, articles: Arc<dyn ArticleStore>, producer: DynProducer) -> Self {
        Self {
            feeds,
            articles,
            producer,
            refresh_concurrency: DEFAULT_REFRESH_CONCURRENCY,
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_refresh_concurrency(mut self, n: usize) -> Self {
        self.refresh_concurrency = n.max(1);
        self
    }

    pub fn producer_name(&self) -> &'static str {
        self.producer.name()
    }

    /// Run on a background task; events arrive on the returned receiver.
    /// Dropping the receiver cancels the run.
    pub fn spawn(&self, ctx: RequestContext, req: GenerationRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let this = self.clone();
        tokio::spawn(async move {
            this.run(ctx, req, tx).await;
        });
        rx
    }

    /// Run the whole pipeline, sending events to `tx`, ending with exactly one
    /// terminal event unless the receiver went away first.
    pub async fn run(&self, ctx: RequestContext, req: GenerationRequest, tx: mpsc::Sender<StreamEvent>) -> RunOutcome {
        let t0 = Instant::now();
        counter!("newsletter_generations_total").increment(1);
        info!(
            target: "pipeline",
            request_id = %ctx.request_id,
            user_id = ctx.user_id.as_deref().unwrap_or("-"),
            feeds = req.feed_ids.len(),
            producer = self.producer.name(),
            "generation started"
        );

        let mut emitter = Emitter { tx, partials: 0 };
        let result = tokio::time::timeout(self.timeout, self.execute(&ctx, &req, &mut emitter)).await;

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(Halt::Disconnected)) => {
                info!(target: "pipeline", request_id = %ctx.request_id, "client disconnected; generation cancelled");
                counter!("newsletter_generation_cancelled_total").increment(1);
                return RunOutcome::Cancelled;
            }
            Ok(Err(Halt::Failed(e))) => {
                warn!(target: "pipeline", request_id = %ctx.request_id, error = ?e, "generation failed");
                Some(e.to_string())
            }
            Err(_) => {
                warn!(target: "pipeline", request_id = %ctx.request_id, timeout_secs = self.timeout.as_secs(), "generation timed out");
                Some(format!("Generation timed out after {}s", self.timeout.as_secs()))
            }
        };

        histogram!("newsletter_generation_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        let partials = emitter.partials;
        let (terminal, outcome) = match failure {
            None => (StreamEvent::Complete, RunOutcome::Completed { partials }),
            Some(msg) => {
                counter!("newsletter_generation_errors_total").increment(1);
                (StreamEvent::error(msg.clone()), RunOutcome::Failed(msg))
            }
        };
        if emitter.emit(terminal).await.is_err() {
            return RunOutcome::Cancelled;
        }
        info!(
            target: "pipeline",
            request_id = %ctx.request_id,
            partials,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "generation finished"
        );
        outcome
    }

    async fn execute(&self, ctx: &RequestContext, req: &GenerationRequest, out: &mut Emitter) -> Result<(), Halt> {
        // 1-2) refresh whatever is stale; failures stay inside the report
        let stale = out
            .unless_disconnected(stale_feeds(self.feeds.as_ref(), &req.feed_ids, ctx.received_at))
            .await?;
        if !stale.is_empty() {
            out.emit(StreamEvent::Refreshing {
                feed_count: stale.len() as u64,
            })
            .await?;
            let report = out
                .unless_disconnected(refresh_feeds(self.feeds.as_ref(), &stale, self.refresh_concurrency))
                .await?;
            if !report.failed.is_empty() {
                warn!(
                    target: "pipeline",
                    request_id = %ctx.request_id,
                    failed = report.failed.len(),
                    attempted = report.attempted(),
                    "some feeds could not be refreshed"
                );
            }
        }

        // 3)
        out.emit(StreamEvent::Analyzing {
            feed_count: req.feed_ids.len() as u64,
        })
        .await?;

        // 4)
        let articles = out
            .unless_disconnected(self.articles.articles_in_window(
                &req.feed_ids,
                req.start_date,
                req.end_date,
                MAX_ARTICLES,
            ))
            .await?
            .context("loading articles")?;
        if articles.is_empty() {
            return Err(anyhow!(NO_ARTICLES_MESSAGE).into());
        }

        // 5) frozen from here on
        out.emit(StreamEvent::Metadata {
            articles_analyzed: articles.len() as u64,
        })
        .await?;

        // 6) forward every snapshot, in order
        let mut snapshots = self.producer.stream_generate(GenerationInput {
            articles,
            start: req.start_date,
            end: req.end_date,
            user_input: req.user_input.clone(),
        });
        while let Some(snapshot) = out.unless_disconnected(snapshots.next()).await? {
            let data = snapshot?;
            out.emit(StreamEvent::Partial { data }).await?;
        }
        Ok(())
    }
}
