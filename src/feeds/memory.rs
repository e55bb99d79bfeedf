// src/feeds/memory.rs
//! In-process feed + article store.
//!
//! Backs both [`FeedStore`] and [`ArticleStore`]. Articles are keyed by
//! `(feed_id, guid)` so a re-fetch upserts rather than duplicates. Locks are
//! never held across an upstream fetch.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::feeds::types::{Article, ArticleStore, FeedFetcher, FeedRecord, FeedStore};

pub struct MemoryStore {
    inner: RwLock<Inner>,
    fetcher: Arc<dyn FeedFetcher>,
}

#[derive(Default)]
struct Inner {
    feeds: BTreeMap<String, FeedRecord>,
    articles: HashMap<(String, String), Article>,
}

impl MemoryStore {
    pub fn new(fetcher: Arc<dyn FeedFetcher>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            fetcher,
        }
    }

    pub fn with_feeds(fetcher: Arc<dyn FeedFetcher>, feeds: Vec<FeedRecord>) -> Self {
        let store = Self::new(fetcher);
        for f in feeds {
            store.insert_feed(f);
        }
        store
    }

    /// Insert or replace a feed record.
    pub fn insert_feed(&self, feed: FeedRecord) {
        let mut g = self.inner.write().expect("feed store lock poisoned");
        g.feeds.insert(feed.id.clone(), feed);
    }

    /// Upsert articles; returns how many were not present before.
    pub fn insert_articles(&self, articles: Vec<Article>) -> usize {
        let mut g = self.inner.write().expect("feed store lock poisoned");
        let mut fresh = 0;
        for a in articles {
            let key = (a.feed_id.clone(), a.guid.clone());
            if g.articles.insert(key, a).is_none() {
                fresh += 1;
            }
        }
        fresh
    }

    pub fn feeds(&self) -> Vec<FeedRecord> {
        let g = self.inner.read().expect("feed store lock poisoned");
        g.feeds.values().cloned().collect()
    }

    pub fn article_count(&self) -> usize {
        let g = self.inner.read().expect("feed store lock poisoned");
        g.articles.len()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| anyhow!("feed store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| anyhow!("feed store lock poisoned"))
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn feed(&self, id: &str) -> Result<Option<FeedRecord>> {
        Ok(self.read()?.feeds.get(id).cloned())
    }

    async fn latest_fetch_for_url(&self, url: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .read()?
            .feeds
            .values()
            .filter(|f| f.url == url)
            .filter_map(|f| f.last_fetched_at)
            .max())
    }

    async fn refresh_feed(&self, id: &str) -> Result<usize> {
        let url = self
            .read()?
            .feeds
            .get(id)
            .map(|f| f.url.clone())
            .ok_or_else(|| anyhow!("unknown feed {id}"))?;

        let items = self.fetcher.fetch(&url).await?;
        let fetched = items.len();

        let mut g = self.write()?;
        let mut fresh = 0;
        for item in items {
            let article = item.into_article(id);
            let key = (article.feed_id.clone(), article.guid.clone());
            if g.articles.insert(key, article).is_none() {
                fresh += 1;
            }
        }
        // last writer wins; staleness is approximate anyway
        if let Some(f) = g.feeds.get_mut(id) {
            f.last_fetched_at = Some(Utc::now());
        }
        debug!(target: "feeds", feed_id = id, fetcher = self.fetcher.name(), fetched, fresh, "feed refreshed");
        Ok(fresh)
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn articles_in_window(
        &self,
        feed_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Article>> {
        let g = self.read()?;
        let mut out: Vec<Article> = g
            .articles
            .values()
            .filter(|a| feed_ids.contains(&a.feed_id))
            .filter(|a| a.published_at >= start && a.published_at <= end)
            .cloned()
            .collect();
        drop(g);
        // newest first; guid breaks ties so the order is stable
        out.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.guid.cmp(&b.guid))
        });
        out.truncate(limit);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::rss::RssFetcher;
    use chrono::{Duration, TimeZone};

    fn art(feed: &str, guid: &str, at: DateTime<Utc>) -> Article {
        Article {
            feed_id: feed.into(),
            guid: guid.into(),
            title: guid.to_uppercase(),
            link: None,
            summary: String::new(),
            published_at: at,
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(RssFetcher::from_fixture(
            r#"<rss><channel></channel></rss>"#,
        )))
    }

    #[tokio::test]
    async fn latest_fetch_spans_records_sharing_a_url() {
        let s = store();
        let now = Utc::now();
        s.insert_feed(FeedRecord::new("a", "https://same.test/rss"));
        s.insert_feed(FeedRecord::new("b", "https://same.test/rss").fetched_at(now - Duration::hours(1)));
        s.insert_feed(FeedRecord::new("c", "https://other.test/rss").fetched_at(now));

        let latest = s.latest_fetch_for_url("https://same.test/rss").await.unwrap();
        assert_eq!(latest, Some(now - Duration::hours(1)));
        assert_eq!(s.latest_fetch_for_url("https://none.test").await.unwrap(), None);
    }

    #[tokio::test]
    async fn window_query_filters_orders_and_caps() {
        let s = store();
        let t = |d: u32| Utc.with_ymd_and_hms(2025, 10, d, 12, 0, 0).unwrap();
        s.insert_articles(vec![
            art("a", "x1", t(1)),
            art("a", "x2", t(3)),
            art("b", "y1", t(5)),
            art("c", "z1", t(4)),
            art("a", "x3", t(20)),
        ]);
        let ids = vec!["a".to_string(), "b".to_string()];
        let got = s.articles_in_window(&ids, t(1), t(10), 100).await.unwrap();
        let guids: Vec<_> = got.iter().map(|a| a.guid.as_str()).collect();
        assert_eq!(guids, vec!["y1", "x2", "x1"]);

        let capped = s.articles_in_window(&ids, t(1), t(10), 2).await.unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].guid, "y1");
    }

    #[tokio::test]
    async fn refresh_unknown_feed_fails() {
        let s = store();
        assert!(s.refresh_feed("missing").await.is_err());
    }

    #[test]
    fn upsert_does_not_duplicate() {
        let s = store();
        let at = Utc::now();
        assert_eq!(s.insert_articles(vec![art("a", "1", at), art("a", "2", at)]), 2);
        assert_eq!(s.insert_articles(vec![art("a", "1", at)]), 0);
        assert_eq!(s.article_count(), 2);
    }
}
