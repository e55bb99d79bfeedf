// src/feeds/mod.rs
//! Feed records, staleness decisions and upstream refresh.

pub mod config;
pub mod memory;
pub mod refresh;
pub mod rss;
pub mod staleness;
pub mod types;

use once_cell::sync::OnceCell;
use regex::Regex;

/// Upper bound on stored summary length (chars).
pub const SUMMARY_MAX_CHARS: usize = 1500;

/// Normalize upstream text: decode entities, strip tags, straighten quotes,
/// collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > SUMMARY_MAX_CHARS {
        out = out.chars().take(SUMMARY_MAX_CHARS).collect();
    }
    out
}
