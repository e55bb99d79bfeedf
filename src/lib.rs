// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod feeds;
pub mod generate;
pub mod history;
pub mod metrics;
pub mod pipeline;
pub mod stream;

pub use crate::api::{router, AppState};
pub use crate::pipeline::{GenerationRequest, Orchestrator, RequestContext};
pub use crate::stream::{GenerationState, StreamEvent};

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tracing::info;

use crate::config::ai::AiConfig;
use crate::config::app::AppConfig;
use crate::feeds::config::load_feeds_default;
use crate::feeds::memory::MemoryStore;
use crate::feeds::rss::RssFetcher;
use crate::generate::build_producer;
use crate::history::NewsletterHistory;

/// Build the full application router from environment and config files.
///
/// Used by the Shuttle entrypoint and by HTTP tests that want the real wiring.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = AppConfig::from_env();

    let feeds = load_feeds_default().context("loading feed subscriptions")?;
    let fetcher = Arc::new(RssFetcher::http()?);
    let store = Arc::new(MemoryStore::with_feeds(fetcher, feeds));

    let ai = AiConfig::load_default();
    let producer = build_producer(&ai);
    info!(
        feeds = store.feeds().len(),
        producer = producer.name(),
        timeout_secs = cfg.generation_timeout.as_secs(),
        "newsletter service configured"
    );

    let orchestrator = Orchestrator::new(store.clone(), store.clone(), producer)
        .with_timeout(cfg.generation_timeout)
        .with_refresh_concurrency(cfg.refresh_concurrency);

    let state = AppState {
        orchestrator,
        store,
        history: Arc::new(NewsletterHistory::with_capacity(cfg.history_capacity)),
    };

    let handle = crate::metrics::init();
    Ok(router(state).merge(crate::metrics::router(handle)))
}
