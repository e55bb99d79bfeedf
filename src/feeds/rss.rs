use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::feeds::types::{FeedFetcher, FetchedItem};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}
#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text", default)]
    value: String,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

fn title_key(title: &str) -> String {
    let digest = Sha256::digest(title.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// RSS 2.0 fetcher. `Http` hits the network; `Fixture` replays fixed XML for
/// any URL (tests, local runs).
pub struct RssFetcher {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http(reqwest::Client),
}

impl RssFetcher {
    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn http() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("newsletter-stream/0.1 (+rss refresh)")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .context("building rss http client")?;
        Ok(Self {
            mode: Mode::Http(client),
        })
    }

    /// Parse a channel. Items without a title are skipped; items without a
    /// parseable `pubDate` are stamped with `fetched_at`.
    pub fn parse_items(xml: &str, fetched_at: DateTime<Utc>) -> Result<Vec<FetchedItem>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = crate::feeds::normalize_text(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let summary = crate::feeds::normalize_text(it.description.as_deref().unwrap_or_default());
            let link = it
                .link
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty());
            let guid = it
                .guid
                .map(|g| g.value.trim().to_string())
                .filter(|g| !g.is_empty())
                .or_else(|| link.clone())
                .unwrap_or_else(|| title_key(&title));

            out.push(FetchedItem {
                guid,
                title,
                link,
                summary,
                published_at: it
                    .pub_date
                    .as_deref()
                    .and_then(parse_rfc2822)
                    .unwrap_or(fetched_at),
            });
        }

        histogram!("feeds_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("feeds_items_parsed_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl FeedFetcher for RssFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<FetchedItem>> {
        let now = Utc::now();
        match &self.mode {
            Mode::Fixture(xml) => Self::parse_items(xml, now),
            Mode::Http(client) => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .with_context(|| format!("GET {url}"))?
                    .text()
                    .await
                    .with_context(|| format!("reading body of {url}"))?;
                Self::parse_items(&body, now).with_context(|| format!("feed {url}"))
            }
        }
    }

    fn name(&self) -> &'static str {
        match self.mode {
            Mode::Fixture(_) => "rss-fixture",
            Mode::Http(_) => "rss-http",
        }
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
