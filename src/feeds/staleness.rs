// src/feeds/staleness.rs
//! # Feed Staleness Evaluator
//! Decides which requested feeds must be re-fetched before generation.
//!
//! Freshness is judged per source URL, not per record: if *any* subscriber's
//! record for the same URL was fetched within the window, every record
//! sharing that URL counts as fresh.
//!
//! Lookup failures (unknown feed id, store error) never abort the batch; the
//! affected feed is reported stale and a warning is logged.

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use metrics::counter;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::feeds::types::FeedStore;

/// Fixed freshness window: 3 hours.
pub const FRESHNESS_WINDOW_SECS: i64 = 3 * 3600;

pub fn freshness_window() -> Duration {
    Duration::seconds(FRESHNESS_WINDOW_SECS)
}

/// `true` when never fetched, or fetched strictly longer ago than the window.
pub fn is_stale(last_fetched: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_fetched {
        None => true,
        Some(t) => now.signed_duration_since(t) > freshness_window(),
    }
}

/// Per-feed verdict, derived on demand and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStaleness {
    pub feed_id: String,
    pub url: Option<String>,
    /// Newest fetch among all records sharing `url`.
    pub most_recent_fetch: Option<DateTime<Utc>>,
    pub needs_refresh: bool,
}

/// Evaluate every distinct id in `feed_ids`, preserving request order.
pub async fn evaluate(
    store: &dyn FeedStore,
    feed_ids: &[String],
    now: DateTime<Utc>,
) -> Vec<FeedStaleness> {
    let mut seen = HashSet::new();
    let ids: Vec<&String> = feed_ids.iter().filter(|id| seen.insert(id.as_str())).collect();

    let records = join_all(ids.iter().map(|id| store.feed(id))).await;

    // one lookup per distinct URL
    let mut urls: Vec<&str> = Vec::new();
    for rec in records.iter().flatten().flatten() {
        if !urls.contains(&rec.url.as_str()) {
            urls.push(rec.url.as_str());
        }
    }
    let latest = join_all(urls.iter().map(|url| store.latest_fetch_for_url(url))).await;
    let by_url: HashMap<&str, anyhow::Result<Option<DateTime<Utc>>>> =
        urls.iter().copied().zip(latest).collect();

    ids.iter()
        .zip(records.iter())
        .map(|(id, rec)| match rec {
            Ok(Some(rec)) => match by_url.get(rec.url.as_str()) {
                Some(Ok(last)) => FeedStaleness {
                    feed_id: id.to_string(),
                    url: Some(rec.url.clone()),
                    most_recent_fetch: *last,
                    needs_refresh: is_stale(*last, now),
                },
                Some(Err(e)) => {
                    warn!(target: "feeds", feed_id = %id, url = %rec.url, error = %e, "latest-fetch lookup failed; treating as stale");
                    counter!("feeds_staleness_lookup_errors_total").increment(1);
                    conservative(id, Some(rec.url.clone()))
                }
                None => conservative(id, Some(rec.url.clone())),
            },
            Ok(None) => {
                warn!(target: "feeds", feed_id = %id, "feed record not found; treating as stale");
                counter!("feeds_staleness_lookup_errors_total").increment(1);
                conservative(id, None)
            }
            Err(e) => {
                warn!(target: "feeds", feed_id = %id, error = %e, "feed lookup failed; treating as stale");
                counter!("feeds_staleness_lookup_errors_total").increment(1);
                conservative(id, None)
            }
        })
        .collect()
}

fn conservative(id: &str, url: Option<String>) -> FeedStaleness {
    FeedStaleness {
        feed_id: id.to_string(),
        url,
        most_recent_fetch: None,
        needs_refresh: true,
    }
}

/// Subset of `feed_ids` that needs a refresh, in request order.
pub async fn stale_feeds(store: &dyn FeedStore, feed_ids: &[String], now: DateTime<Utc>) -> Vec<String> {
    let stale: Vec<String> = evaluate(store, feed_ids, now)
        .await
        .into_iter()
        .filter(|s| s.needs_refresh)
        .map(|s| s.feed_id)
        .collect();
    counter!("feeds_stale_total").increment(stale.len() as u64);
    stale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_boundary_is_exclusive() {
        let now = Utc::now();
        assert!(is_stale(None, now));
        assert!(!is_stale(Some(now - Duration::hours(2)), now));
        assert!(!is_stale(Some(now - freshness_window()), now));
        assert!(is_stale(Some(now - freshness_window() - Duration::seconds(1)), now));
        assert!(is_stale(Some(now - Duration::hours(4)), now));
    }

    #[test]
    fn future_timestamp_counts_as_fresh() {
        let now = Utc::now();
        assert!(!is_stale(Some(now + Duration::minutes(5)), now));
    }
}
