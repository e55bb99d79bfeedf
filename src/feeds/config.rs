// src/feeds/config.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::feeds::types::FeedRecord;

pub const ENV_FEEDS_CONFIG_PATH: &str = "FEEDS_CONFIG_PATH";

#[derive(Debug, serde::Deserialize)]
struct FeedEntry {
    id: String,
    url: String,
    #[serde(default)]
    title: Option<String>,
}

/// Load seed feeds from an explicit path. Supports TOML or JSON formats.
pub fn load_feeds_from(path: &Path) -> Result<Vec<FeedRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feeds from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_feeds(&content, ext.as_str())
}

/// Load seed feeds using env var + fallbacks:
/// 1) $FEEDS_CONFIG_PATH
/// 2) config/feeds.toml
/// 3) config/feeds.json
pub fn load_feeds_default() -> Result<Vec<FeedRecord>> {
    if let Ok(p) = std::env::var(ENV_FEEDS_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_feeds_from(&pb);
        }
        return Err(anyhow!("FEEDS_CONFIG_PATH points to non-existent path"));
    }
    let toml_p = PathBuf::from("config/feeds.toml");
    if toml_p.exists() {
        return load_feeds_from(&toml_p);
    }
    let json_p = PathBuf::from("config/feeds.json");
    if json_p.exists() {
        return load_feeds_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_feeds(s: &str, hint_ext: &str) -> Result<Vec<FeedRecord>> {
    match hint_ext {
        "toml" => parse_toml(s),
        "json" => parse_json(s),
        _ => parse_toml(s).or_else(|_| parse_json(s)),
    }
}

fn parse_toml(s: &str) -> Result<Vec<FeedRecord>> {
    #[derive(serde::Deserialize)]
    struct TomlFeeds {
        #[serde(default)]
        feeds: Vec<FeedEntry>,
    }
    let v: TomlFeeds = toml::from_str(s).context("parsing feeds toml")?;
    clean_list(v.feeds)
}

fn parse_json(s: &str) -> Result<Vec<FeedRecord>> {
    let v: Vec<FeedEntry> = serde_json::from_str(s).context("parsing feeds json")?;
    clean_list(v)
}

/// Trim fields, reject blanks, keep the first entry per id.
fn clean_list(items: Vec<FeedEntry>) -> Result<Vec<FeedRecord>> {
    let mut out: Vec<FeedRecord> = Vec::with_capacity(items.len());
    for it in items {
        let id = it.id.trim();
        let url = it.url.trim();
        if id.is_empty() || url.is_empty() {
            return Err(anyhow!("feed entry with blank id or url"));
        }
        if out.iter().any(|f| f.id == id) {
            continue;
        }
        let mut rec = FeedRecord::new(id, url);
        rec.title = it
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        out.push(rec);
    }
    Ok(out)
}
