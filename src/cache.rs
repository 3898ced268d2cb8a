/* src/cache.rs */

use crate::records::{Answer, Question};
use moka::{Expiry, sync::Cache};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_CAPACITY: u64 = 10_000;

/// A previously assembled answer set.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub answers: Vec<Answer>,
    pub authoritative: bool,
    /// Unix seconds at insertion.
    pub cached_at: i64,
    pub ttl: u32,
}

impl CacheEntry {
    pub fn new(answers: Vec<Answer>, authoritative: bool, cached_at: i64, ttl: u32) -> Self {
        Self {
            answers,
            authoritative,
            cached_at,
            ttl,
        }
    }

    /// Copies of the cached answers with the time spent in the cache taken
    /// off their TTLs. A TTL never drops below 1.
    pub fn aged_answers(&self, now: i64) -> Vec<Answer> {
        let elapsed = now.saturating_sub(self.cached_at).max(0);
        self.answers
            .iter()
            .cloned()
            .map(|mut answer| {
                let remaining = i64::from(answer.ttl).saturating_sub(elapsed).max(1);
                answer.ttl = u32::try_from(remaining).unwrap_or(u32::MAX);
                answer
            })
            .collect()
    }
}

/// TTL-indexed store of answer sets keyed by question identity.
///
/// The backing store drops an entry once its own TTL has passed; the TTLs
/// handed out to clients are aged separately by [`CacheEntry::aged_answers`].
#[derive(Clone)]
pub struct AnswerCache {
    cache: Cache<String, Arc<CacheEntry>>,
}

impl Default for AnswerCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AnswerCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .expire_after(EntryExpiry)
                .build(),
        }
    }

    /// Stable key for a question: a hash of its name, class and type.
    pub fn key(question: &Question) -> String {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(question).unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, question: &Question) -> Option<Arc<CacheEntry>> {
        self.cache.get(&Self::key(question))
    }

    /// Stores `entry` for `ttl` seconds of wall-clock time. Concurrent
    /// writers for the same question overwrite each other.
    pub fn set(&self, question: &Question, mut entry: CacheEntry, ttl: u32) {
        entry.ttl = ttl;
        self.cache.insert(Self::key(question), Arc::new(entry));
    }

    pub fn invalidate(&self, question: &Question) {
        self.cache.invalidate(&Self::key(question));
    }
}

struct EntryExpiry;

impl Expiry<String, Arc<CacheEntry>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<CacheEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(Duration::from_secs(u64::from(value.ttl)))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<CacheEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(Duration::from_secs(u64::from(value.ttl)))
    }
}
