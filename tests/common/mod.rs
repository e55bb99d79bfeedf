// tests/common/mod.rs
// Shared builders for integration tests. Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

use newsletter_stream::api::AppState;
use newsletter_stream::feeds::memory::MemoryStore;
use newsletter_stream::feeds::rss::RssFetcher;
use newsletter_stream::feeds::types::{Article, FeedFetcher, FetchedItem};
use newsletter_stream::generate::DynProducer;
use newsletter_stream::history::NewsletterHistory;
use newsletter_stream::pipeline::Orchestrator;
use newsletter_stream::StreamEvent;

pub fn fixture_rss() -> String {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/sample_rss.xml");
    std::fs::read_to_string(path).expect("read sample_rss.xml")
}

/// Midday UTC on the given October 2025 day.
pub fn oct(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, day, 12, 0, 0).unwrap()
}

pub fn article(feed: &str, guid: &str, at: DateTime<Utc>) -> Article {
    Article {
        feed_id: feed.to_string(),
        guid: guid.to_string(),
        title: format!("Title {guid}"),
        link: Some(format!("https://example.test/{feed}/{guid}")),
        summary: format!("Summary for {guid}"),
        published_at: at,
    }
}

/// Fetcher that fails for any URL containing `broken`, else serves the fixture.
pub struct FlakyFetcher {
    inner: RssFetcher,
}

impl FlakyFetcher {
    pub fn new() -> Self {
        Self {
            inner: RssFetcher::from_fixture(&fixture_rss()),
        }
    }
}

#[async_trait]
impl FeedFetcher for FlakyFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<FetchedItem>> {
        if url.contains("broken") {
            bail!("upstream returned 503 for {url}");
        }
        self.inner.fetch(url).await
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

pub fn fixture_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(Arc::new(FlakyFetcher::new())))
}

pub fn orchestrator(store: &Arc<MemoryStore>, producer: DynProducer) -> Orchestrator {
    Orchestrator::new(store.clone(), store.clone(), producer)
}

pub fn app_state(store: Arc<MemoryStore>, producer: DynProducer, timeout: Duration) -> AppState {
    AppState {
        orchestrator: orchestrator(&store, producer).with_timeout(timeout),
        store,
        history: Arc::new(NewsletterHistory::with_capacity(50)),
    }
}

pub async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut out = Vec::new();
    while let Some(ev) = rx.recv().await {
        out.push(ev);
    }
    out
}

pub fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
    events.iter().map(StreamEvent::kind).collect()
}
