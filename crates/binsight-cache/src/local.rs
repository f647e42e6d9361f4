//! In-process key-value store with per-key expiry.
//!
//! Mirrors the subset of Redis semantics the overlay relies on: expired keys
//! are invisible and removed lazily on access, `INCR` creates missing keys at
//! 1 without an expiry, and `KEYS` takes Redis glob patterns.
//!
//! Keys that are never read again are collected by [`LocalStore::purge_expired`],
//! which runs on every `keys` scan and once every [`PURGE_INTERVAL`] writes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use regex::Regex;
use tracing::debug;

use crate::error::{CacheError, CacheResult};

#[derive(Debug, Clone)]
struct LocalEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl LocalEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Writes between two sweeps of expired entries.
pub const PURGE_INTERVAL: u64 = 1024;

/// Process-local cache storage.
#[derive(Debug, Default)]
pub struct LocalStore {
    entries: DashMap<String, LocalEntry>,
    writes: AtomicU64,
}

impl LocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, including expired keys not yet collected.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let value = {
            let entry = self.entries.get(key)?;
            (!entry.is_expired(now)).then(|| entry.value.clone())
        };
        if value.is_none() {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
        }
        value
    }

    pub fn set_ex(&self, key: &str, value: String, ttl: Duration) {
        self.entries
            .insert(key.to_string(), LocalEntry::new(value, Some(ttl)));
        self.record_write();
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            if entry.is_expired(now) {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Purged expired cache entries");
        }
        removed
    }

    /// Counts a write and sweeps once every [`PURGE_INTERVAL`] writes.
    ///
    /// Must not be called while a map guard is held.
    fn record_write(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % PURGE_INTERVAL == 0 {
            self.purge_expired();
        }
    }

    /// Increments the integer at `key`, atomically under the key's shard lock.
    pub fn incr(&self, key: &str) -> CacheResult<i64> {
        let result = self.incr_in_place(key);
        self.record_write();
        result
    }

    fn incr_in_place(&self, key: &str) -> CacheResult<i64> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired(now) => {
                let entry = occupied.get_mut();
                let next = entry
                    .value
                    .parse::<i64>()
                    .ok()
                    .and_then(|n| n.checked_add(1))
                    .ok_or_else(|| CacheError::NotAnInteger {
                        key: key.to_string(),
                    })?;
                entry.value = next.to_string();
                Ok(next)
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(LocalEntry::new("1".to_string(), None));
                Ok(1)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LocalEntry::new("1".to_string(), None));
                Ok(1)
            }
        }
    }

    /// Sets a key's expiry. Returns false if the key does not exist.
    pub fn expire(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            _ => false,
        }
    }

    /// Returns live keys matching a Redis glob pattern.
    ///
    /// The scan visits every entry, so it also drops expired ones.
    pub fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let matcher = glob_to_regex(pattern)?;
        self.purge_expired();
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(now) && matcher.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    pub fn mget(&self, keys: &[String]) -> Vec<Option<String>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Deletes keys and returns how many live keys were removed.
    pub fn del(&self, keys: &[String]) -> u64 {
        let now = Instant::now();
        keys.iter()
            .filter_map(|key| self.entries.remove(key))
            .filter(|(_, entry)| !entry.is_expired(now))
            .count() as u64
    }
}

/// Compiles a Redis glob (`*`, `?`, `[...]`, `[^...]`, `\` escapes) to an
/// anchored regex.
pub fn glob_to_regex(pattern: &str) -> CacheResult<Regex> {
    let mut re = String::with_capacity(pattern.len() * 2 + 8);
    re.push_str("(?s)^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                re.push_str(&regex::escape(&chars[i].to_string()));
            }
            '[' => match class_end(&chars[i + 1..]) {
                Some(len) if len > 0 => {
                    push_class(&mut re, &chars[i + 1..i + 1 + len]);
                    i += len + 1;
                }
                _ => re.push_str(r"\["),
            },
            c => re.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    re.push('$');
    Regex::new(&re).map_err(|source| CacheError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Offset of the `]` closing a class body, skipping `\`-escaped characters.
fn class_end(body: &[char]) -> Option<usize> {
    let mut n = 0;
    while n < body.len() {
        match body[n] {
            '\\' => n += 2,
            ']' => return Some(n),
            _ => n += 1,
        }
    }
    None
}

/// Writes a glob class body as a regex class. `\x` inside the body is the
/// literal `x`.
fn push_class(re: &mut String, class: &[char]) {
    re.push('[');
    let mut n = 0;
    while n < class.len() {
        let (c, escaped) = match class[n] {
            '\\' if n + 1 < class.len() => {
                n += 1;
                (class[n], true)
            }
            c => (c, false),
        };
        match c {
            '^' if n == 0 && !escaped => re.push('^'),
            '-' if !escaped && n > 0 && n + 1 < class.len() => re.push('-'),
            '\\' | '[' | ']' | '^' | '-' | '&' | '~' => {
                re.push('\\');
                re.push(c);
            }
            c => re.push(c),
        }
        n += 1;
    }
    re.push(']');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_patterns() {
        let re = glob_to_regex("bin:status:*").unwrap();
        assert!(re.is_match("bin:status:bin-1"));
        assert!(!re.is_match("xbin:status:bin-1"));

        let re = glob_to_regex("h?llo").unwrap();
        assert!(re.is_match("hello"));
        assert!(!re.is_match("heello"));

        let re = glob_to_regex("h[ae]llo").unwrap();
        assert!(re.is_match("hallo"));
        assert!(!re.is_match("hillo"));

        let re = glob_to_regex("h[^e]llo").unwrap();
        assert!(re.is_match("hallo"));
        assert!(!re.is_match("hello"));

        let re = glob_to_regex("bin[0-9]").unwrap();
        assert!(re.is_match("bin7"));
        assert!(!re.is_match("bin-"));
    }

    #[test]
    fn test_escaped_glob_is_literal() {
        let re = glob_to_regex("mqtt:message:waste_bins/bin\\*/*").unwrap();
        assert!(re.is_match("mqtt:message:waste_bins/bin*/fill"));
        assert!(!re.is_match("mqtt:message:waste_bins/bin-2/fill"));

        let re = glob_to_regex("a.b[").unwrap();
        assert!(re.is_match("a.b["));
        assert!(!re.is_match("axb["));
    }

    #[test]
    fn test_incr_and_expire() {
        let store = LocalStore::new();
        assert_eq!(store.incr("rl").unwrap(), 1);
        assert_eq!(store.incr("rl").unwrap(), 2);
        assert!(store.expire("rl", Duration::from_secs(60)));
        assert!(!store.expire("missing", Duration::from_secs(60)));

        store.set_ex("text", "abc".into(), Duration::from_secs(60));
        assert!(matches!(
            store.incr("text"),
            Err(CacheError::NotAnInteger { .. })
        ));
    }

    #[test]
    fn test_expired_entries_are_invisible() {
        let store = LocalStore::new();
        store.set_ex("k", "v".into(), Duration::ZERO);
        assert_eq!(store.get("k"), None);
        assert!(store.is_empty());

        store.set_ex("gone", "1".into(), Duration::ZERO);
        assert_eq!(store.incr("gone").unwrap(), 1);
        assert!(store.keys("*").unwrap().contains(&"gone".to_string()));
    }

    #[test]
    fn test_escaped_bracket_inside_class() {
        let re = glob_to_regex(r"tag[\]x]").unwrap();
        assert!(re.is_match("tag]"));
        assert!(re.is_match("tagx"));
        assert!(!re.is_match("tag\\"));
        assert!(!re.is_match("tag\\]"));

        let re = glob_to_regex(r"a[\^b]").unwrap();
        assert!(re.is_match("a^"));
        assert!(re.is_match("ab"));
        assert!(!re.is_match("ac"));
    }

    #[test]
    fn test_keys_scan_drops_unread_expired_entries() {
        let store = LocalStore::new();
        for n in 0..100 {
            store.set_ex(&format!("msg:{n}"), "{}".into(), Duration::ZERO);
            store.incr(&format!("rl:{n}")).unwrap();
            assert!(store.expire(&format!("rl:{n}"), Duration::ZERO));
        }
        store.set_ex("live", "1".into(), Duration::from_secs(60));
        assert_eq!(store.len(), 201);

        assert_eq!(store.keys("*").unwrap(), vec!["live".to_string()]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_writes_sweep_expired_entries() {
        let store = LocalStore::new();
        for n in 0..PURGE_INTERVAL {
            store.set_ex(&format!("conn:{n}"), "\"u\"".into(), Duration::ZERO);
        }
        assert!(store.is_empty());

        store.set_ex("kept", "1".into(), Duration::from_secs(60));
        for n in 0..PURGE_INTERVAL - 2 {
            store.incr(&format!("rl:{n}")).unwrap();
            store.expire(&format!("rl:{n}"), Duration::ZERO);
        }
        assert_eq!(store.len(), PURGE_INTERVAL as usize - 1);

        // Completes the second interval of writes.
        assert_eq!(store.incr("rl:last").unwrap(), 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.purge_expired(), 0);
    }

    #[test]
    fn test_del_counts_live_keys() {
        let store = LocalStore::new();
        store.set_ex("a", "1".into(), Duration::from_secs(60));
        store.set_ex("b", "2".into(), Duration::ZERO);
        assert_eq!(store.del(&["a".into(), "b".into(), "c".into()]), 1);
        assert!(store.is_empty());
    }
}
