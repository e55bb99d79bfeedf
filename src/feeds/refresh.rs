// src/feeds/refresh.rs
//! Best-effort concurrent refresh of stale feeds.
//!
//! Every feed is attempted; failures are collected next to successes instead
//! of short-circuiting the batch. Upstream feeds are third-party, so a partial
//! failure here is routine.

use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use tracing::{info, warn};

use crate::feeds::types::FeedStore;

/// Default fan-out width.
pub const DEFAULT_REFRESH_CONCURRENCY: usize = 8;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: Vec<String>,
    /// `(feed_id, error message)`
    pub failed: Vec<(String, String)>,
    pub new_articles: usize,
}

impl RefreshReport {
    pub fn attempted(&self) -> usize {
        self.refreshed.len() + self.failed.len()
    }
}

/// Refresh `feed_ids` with at most `concurrency` fetches in flight and
/// wait for all of them to settle.
pub async fn refresh_feeds(store: &dyn FeedStore, feed_ids: &[String], concurrency: usize) -> RefreshReport {
    let t0 = std::time::Instant::now();
    let outcomes: Vec<(String, anyhow::Result<usize>)> = stream::iter(feed_ids.iter().cloned())
        .map(move |id| async move {
            let res = store.refresh_feed(&id).await;
            (id, res)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut report = RefreshReport::default();
    for (id, res) in outcomes {
        match res {
            Ok(n) => {
                report.new_articles += n;
                report.refreshed.push(id);
            }
            Err(e) => {
                warn!(target: "feeds", feed_id = %id, error = ?e, "feed refresh failed");
                report.failed.push((id, format!("{e:#}")));
            }
        }
    }

    counter!("feeds_refreshed_total").increment(report.refreshed.len() as u64);
    counter!("feeds_refresh_errors_total").increment(report.failed.len() as u64);
    histogram!("feeds_refresh_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    info!(
        target: "feeds",
        refreshed = report.refreshed.len(),
        failed = report.failed.len(),
        new_articles = report.new_articles,
        "refresh batch settled"
    );
    report
}
