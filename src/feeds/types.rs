// src/feeds/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One subscription to an upstream feed. Several records may share a URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl FeedRecord {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: None,
            last_fetched_at: None,
        }
    }

    pub fn fetched_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_fetched_at = Some(at);
        self
    }
}

/// Stored article, attached to the feed record it was fetched for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub feed_id: String,
    /// Stable per-feed identity (guid, else link, else title hash).
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    pub summary: String,
    pub published_at: DateTime<Utc>,
}

/// Item as parsed from upstream, before it is attached to a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedItem {
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    pub summary: String,
    pub published_at: DateTime<Utc>,
}

impl FetchedItem {
    pub fn into_article(self, feed_id: &str) -> Article {
        Article {
            feed_id: feed_id.to_string(),
            guid: self.guid,
            title: self.title,
            link: self.link,
            summary: self.summary,
            published_at: self.published_at,
        }
    }
}

/// Feed persistence as seen by the staleness evaluator and the refresher.
#[async_trait::async_trait]
pub trait FeedStore: Send + Sync {
    async fn feed(&self, id: &str) -> Result<Option<FeedRecord>>;
    /// Most recent fetch across *every* record whose URL equals `url`.
    async fn latest_fetch_for_url(&self, url: &str) -> Result<Option<DateTime<Utc>>>;
    /// Re-fetch one feed upstream; returns the number of new articles stored.
    async fn refresh_feed(&self, id: &str) -> Result<usize>;
}

#[async_trait::async_trait]
pub trait ArticleStore: Send + Sync {
    /// Articles of `feed_ids` published within `[start, end]`, newest first,
    /// at most `limit`.
    async fn articles_in_window(
        &self,
        feed_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Article>>;
}

/// Upstream source of feed items.
#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<FetchedItem>>;
    fn name(&self) -> &'static str;
}
