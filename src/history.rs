//! history.rs: bounded in-memory store of saved newsletters.
//!
//! Generated content is only persisted when a client explicitly saves it;
//! the generation stream itself never writes here.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedNewsletter {
    pub id: String,
    pub feed_ids: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub articles_analyzed: Option<u64>,
    pub content: Value,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the client on save; id and timestamp are assigned here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSavedNewsletter {
    pub feed_ids: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub user_input: Option<String>,
    #[serde(default)]
    pub articles_analyzed: Option<u64>,
    /// Final snapshot from the generation stream.
    pub content: Value,
}

#[derive(Debug)]
pub struct NewsletterHistory {
    inner: Mutex<Vec<SavedNewsletter>>,
    cap: usize,
}

impl NewsletterHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(Vec::with_capacity(cap)),
            cap,
        }
    }

    /// Store a newsletter, evicting the oldest entries beyond capacity.
    pub fn save(&self, new: NewSavedNewsletter, user_id: Option<String>) -> SavedNewsletter {
        let created_at = Utc::now();
        let entry = SavedNewsletter {
            id: newsletter_id(&new, created_at),
            feed_ids: new.feed_ids,
            start_date: new.start_date,
            end_date: new.end_date,
            user_input: new.user_input,
            user_id,
            articles_analyzed: new.articles_analyzed,
            content: new.content,
            created_at,
        };

        let mut v = self.lock();
        v.push(entry.clone());
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
        entry
    }

    pub fn get(&self, id: &str) -> Option<SavedNewsletter> {
        self.lock().iter().find(|n| n.id == id).cloned()
    }

    /// Most recent first.
    pub fn list_recent(&self, n: usize) -> Vec<SavedNewsletter> {
        self.lock().iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SavedNewsletter>> {
        // a panic mid-push leaves the Vec intact, so a poisoned lock is still usable
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn newsletter_id(new: &NewSavedNewsletter, created_at: DateTime<Utc>) -> String {
    let mut h = Sha256::new();
    h.update(new.feed_ids.join(",").as_bytes());
    h.update(new.start_date.to_rfc3339().as_bytes());
    h.update(new.end_date.to_rfc3339().as_bytes());
    h.update(new.content.to_string().as_bytes());
    h.update(
        created_at
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_le_bytes(),
    );
    let digest = h.finalize();
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample(body: &str) -> NewSavedNewsletter {
        NewSavedNewsletter {
            feed_ids: vec!["f1".into()],
            start_date: Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2025, 10, 8, 0, 0, 0).unwrap(),
            user_input: None,
            articles_analyzed: Some(3),
            content: json!({ "body": body }),
        }
    }

    #[test]
    fn save_then_get() {
        let h = NewsletterHistory::with_capacity(10);
        let saved = h.save(sample("hello"), Some("u1".into()));
        assert_eq!(saved.id.len(), 16);
        let got = h.get(&saved.id).unwrap();
        assert_eq!(got, saved);
        assert_eq!(got.user_id.as_deref(), Some("u1"));
        assert!(h.get("nope").is_none());
    }

    #[test]
    fn capacity_evicts_oldest_and_lists_newest_first() {
        let h = NewsletterHistory::with_capacity(2);
        let a = h.save(sample("a"), None);
        let b = h.save(sample("b"), None);
        let c = h.save(sample("c"), None);
        assert_eq!(h.len(), 2);
        assert!(h.get(&a.id).is_none());
        let ids: Vec<_> = h.list_recent(10).into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![c.id, b.id]);
    }
}
