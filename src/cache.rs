//! Suggestion cache (A3): a process-scoped, mutex-guarded map consulted
//! by the orchestrator before constructing the retry/breaker pipeline and
//! populated on every successful provider response.
//!
//! Cache key: `(provider, classified ErrorKind + command)` for the
//! capture path, `(provider, prompt)` for the prompt path — the
//! orchestrator builds the key string, this module only stores and expires.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::provider::Suggestion;

struct Entry {
    suggestion: Suggestion,
    inserted_at: Instant,
}

/// Builds the cache key for the capture path: classified kind plus the
/// literal failing command, scoped to a provider name.
pub fn capture_key(provider: &str, error_kind: &str, command: &str) -> String {
    format!("{provider}:{error_kind}:{command}")
}

/// Builds the cache key for the prompt path: provider name plus prompt text.
pub fn prompt_key(provider: &str, prompt: &str) -> String {
    format!("{provider}:prompt:{prompt}")
}

pub struct SuggestionCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    max_entries: usize,
}

impl SuggestionCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    /// Returns a cached suggestion if present and not yet expired.
    pub fn get(&self, key: &str) -> Option<Suggestion> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.suggestion.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or refresh a cache entry, evicting the oldest entry first
    /// when `max_entries` would otherwise be exceeded.
    pub fn put(&self, key: String, suggestion: Suggestion) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            if let Some(oldest_key) = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest_key);
            }
        }
        entries.insert(
            key,
            Entry {
                suggestion,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestion() -> Suggestion {
        Suggestion {
            explanation: "typo".to_string(),
            corrected_command: "git status".to_string(),
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = SuggestionCache::new(Duration::from_secs(60), 100);
        cache.put("k".to_string(), suggestion());
        assert_eq!(cache.get("k"), Some(suggestion()));
    }

    #[test]
    fn get_misses_on_unknown_key() {
        let cache = SuggestionCache::new(Duration::from_secs(60), 100);
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = SuggestionCache::new(Duration::from_millis(1), 100);
        cache.put("k".to_string(), suggestion());
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn evicts_oldest_entry_when_at_capacity() {
        let cache = SuggestionCache::new(Duration::from_secs(60), 2);
        cache.put("a".to_string(), suggestion());
        std::thread::sleep(Duration::from_millis(5));
        cache.put("b".to_string(), suggestion());
        std::thread::sleep(Duration::from_millis(5));
        cache.put("c".to_string(), suggestion());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn capture_key_and_prompt_key_are_distinguishable() {
        assert_ne!(
            capture_key("openai", "CommandNotFound", "gti"),
            prompt_key("openai", "gti")
        );
    }
}
