// tests/staleness.rs
//
// Staleness decisions against the in-memory store and a store whose
// lookups fail.

mod common;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use newsletter_stream::feeds::staleness::{evaluate, is_stale, stale_feeds, FRESHNESS_WINDOW_SECS};
use newsletter_stream::feeds::types::{FeedRecord, FeedStore};

use common::fixture_store;

fn s(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn never_fetched_feed_needs_refresh() {
    let store = fixture_store();
    store.insert_feed(FeedRecord::new("new", "https://new.test/rss"));

    let out = evaluate(store.as_ref(), &s(&["new"]), Utc::now()).await;
    assert_eq!(out.len(), 1);
    assert!(out[0].needs_refresh);
    assert_eq!(out[0].most_recent_fetch, None);
}

#[tokio::test]
async fn shared_url_fetched_recently_by_another_record_counts_as_fresh() {
    let store = fixture_store();
    let now = Utc::now();
    let url = "https://shared.test/rss";
    store.insert_feed(FeedRecord::new("mine", url).fetched_at(now - Duration::hours(5)));
    store.insert_feed(FeedRecord::new("theirs", url).fetched_at(now - Duration::hours(1)));

    let out = evaluate(store.as_ref(), &s(&["mine"]), now).await;
    assert!(!out[0].needs_refresh, "fresh fetch by another subscriber must win");
    assert_eq!(out[0].most_recent_fetch, Some(now - Duration::hours(1)));
    assert!(stale_feeds(store.as_ref(), &s(&["mine"]), now).await.is_empty());
}

#[tokio::test]
async fn two_and_four_hours_ago_fall_either_side_of_the_window() {
    let store = fixture_store();
    let now = Utc::now();
    store.insert_feed(FeedRecord::new("two", "https://two.test/rss").fetched_at(now - Duration::hours(2)));
    store.insert_feed(FeedRecord::new("four", "https://four.test/rss").fetched_at(now - Duration::hours(4)));
    store.insert_feed(FeedRecord::new("never", "https://never.test/rss"));

    let stale = stale_feeds(store.as_ref(), &s(&["two", "four", "never"]), now).await;
    assert_eq!(stale, s(&["four", "never"]));
}

#[tokio::test]
async fn never_fetched_record_shares_freshness_of_its_url() {
    let store = fixture_store();
    let now = Utc::now();
    let url = "https://popular.test/rss";
    store.insert_feed(FeedRecord::new("tenant-a", url).fetched_at(now - Duration::hours(1)));
    store.insert_feed(FeedRecord::new("tenant-b", url));

    let stale = stale_feeds(store.as_ref(), &s(&["tenant-a", "tenant-b"]), now).await;
    assert!(stale.is_empty(), "both records ride on the 1h fetch: {stale:?}");
}

#[tokio::test]
async fn every_record_older_than_window_is_stale() {
    let store = fixture_store();
    let now = Utc::now();
    let url = "https://old.test/rss";
    store.insert_feed(FeedRecord::new("a", url).fetched_at(now - Duration::hours(4)));
    store.insert_feed(FeedRecord::new("b", url).fetched_at(now - Duration::hours(6)));
    store.insert_feed(FeedRecord::new("fresh", "https://fresh.test/rss").fetched_at(now));

    let stale = stale_feeds(store.as_ref(), &s(&["a", "b", "fresh"]), now).await;
    assert_eq!(stale, s(&["a", "b"]));
}

#[tokio::test]
async fn duplicate_ids_are_evaluated_once_in_request_order() {
    let store = fixture_store();
    store.insert_feed(FeedRecord::new("x", "https://x.test/rss"));
    store.insert_feed(FeedRecord::new("y", "https://y.test/rss"));

    let out = evaluate(store.as_ref(), &s(&["y", "x", "y"]), Utc::now()).await;
    let ids: Vec<_> = out.iter().map(|v| v.feed_id.as_str()).collect();
    assert_eq!(ids, vec!["y", "x"]);
}

#[test]
fn window_edge_is_still_fresh() {
    let now = Utc::now();
    let edge = now - Duration::seconds(FRESHNESS_WINDOW_SECS);
    assert!(!is_stale(Some(edge), now));
    assert!(is_stale(Some(edge - Duration::seconds(1)), now));
    assert!(is_stale(None, now));
}

/// Store whose URL lookup fails for one URL and whose record lookup fails for one id.
struct BrokenLookups;

#[async_trait]
impl FeedStore for BrokenLookups {
    async fn feed(&self, id: &str) -> Result<Option<FeedRecord>> {
        match id {
            "db-down" => Err(anyhow!("connection reset")),
            "url-down" => Ok(Some(FeedRecord::new(id, "https://url-down.test/rss"))),
            _ => Ok(Some(FeedRecord::new(id, "https://ok.test/rss").fetched_at(Utc::now()))),
        }
    }

    async fn latest_fetch_for_url(&self, url: &str) -> Result<Option<DateTime<Utc>>> {
        if url.contains("url-down") {
            return Err(anyhow!("timeout"));
        }
        Ok(Some(Utc::now()))
    }

    async fn refresh_feed(&self, _id: &str) -> Result<usize> {
        Ok(0)
    }
}

#[tokio::test]
async fn lookup_failures_are_treated_as_stale_without_aborting() {
    let now = Utc::now();
    let out = evaluate(&BrokenLookups, &s(&["db-down", "url-down", "ok"]), now).await;

    assert_eq!(out.len(), 3);
    assert!(out[0].needs_refresh);
    assert!(out[1].needs_refresh);
    assert!(!out[2].needs_refresh);
}
