//! TTL-keyed cache for computed trend reports (§4.7 "Caching": key =
//! `(repository, window, floor(now/cache_ttl))`, 30-minute ttl). Keying on
//! the ttl bucket rather than a last-write timestamp means two calls
//! within the same bucket return byte-identical reports without needing
//! to track expiry per entry (§8 "stable within a ttl window").

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pipelinectl_types::trend::{TrendReport, Window};
use pipelinectl_types::Repository;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    repository: Repository,
    window: WindowKey,
    bucket: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WindowKey {
    Short,
    Medium,
    Long,
}

impl From<Window> for WindowKey {
    fn from(w: Window) -> Self {
        match w {
            Window::Short => WindowKey::Short,
            Window::Medium => WindowKey::Medium,
            Window::Long => WindowKey::Long,
        }
    }
}

pub struct TrendCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, TrendReport>>,
}

impl TrendCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    fn bucket(&self, now: DateTime<Utc>) -> i64 {
        let ttl_s = self.ttl.as_secs().max(1) as i64;
        now.timestamp() / ttl_s
    }

    pub fn get(&self, repository: &Repository, window: Window, now: DateTime<Utc>) -> Option<TrendReport> {
        let key = CacheKey { repository: repository.clone(), window: window.into(), bucket: self.bucket(now) };
        self.entries.lock().expect("trend cache mutex poisoned").get(&key).cloned()
    }

    pub fn put(&self, repository: &Repository, window: Window, now: DateTime<Utc>, report: TrendReport) {
        let key = CacheKey { repository: repository.clone(), window: window.into(), bucket: self.bucket(now) };
        let mut entries = self.entries.lock().expect("trend cache mutex poisoned");
        entries.insert(key, report);
        // Bound growth: old buckets are never read again, so drop them.
        let current_bucket = self.bucket(now);
        entries.retain(|k, _| k.bucket == current_bucket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insufficient(repository: &Repository, window: Window) -> TrendReport {
        TrendReport::InsufficientData { repository: repository.clone(), window, have: 1, required: 5 }
    }

    #[test]
    fn same_bucket_returns_cached_value() {
        let cache = TrendCache::new(Duration::from_secs(1800));
        let repo = Repository::new("owner/r");
        let now = Utc::now();
        cache.put(&repo, Window::Short, now, insufficient(&repo, Window::Short));
        assert!(cache.get(&repo, Window::Short, now + chrono::Duration::seconds(60)).is_some());
    }

    #[test]
    fn different_window_is_a_separate_entry() {
        let cache = TrendCache::new(Duration::from_secs(1800));
        let repo = Repository::new("owner/r");
        let now = Utc::now();
        cache.put(&repo, Window::Short, now, insufficient(&repo, Window::Short));
        assert!(cache.get(&repo, Window::Medium, now).is_none());
    }

    #[test]
    fn new_bucket_misses_and_evicts_old_entries() {
        let cache = TrendCache::new(Duration::from_secs(1800));
        let repo = Repository::new("owner/r");
        let now = Utc::now();
        cache.put(&repo, Window::Short, now, insufficient(&repo, Window::Short));
        let later = now + chrono::Duration::seconds(1900);
        assert!(cache.get(&repo, Window::Short, later).is_none());
    }
}
