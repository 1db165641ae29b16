//! Ledger of written keys for time-based expiration.
//!
//! A rank records every key it writes together with the write instant.
//! Writes happen in real-time order, so the ledger is sorted oldest-first
//! and expiration only ever needs to look at the front.
//!
//! The ledger never deletes anything itself: the caller asks for the oldest
//! expired key, deletes it from the store, and only then pops it. A failed
//! delete leaves the entry in place for the next attempt.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Time-ordered queue of keys this rank has written.
#[derive(Debug, Clone)]
pub struct ExpiryLedger {
    entries: VecDeque<(String, Instant)>,
    ttl: Duration,
}

impl ExpiryLedger {
    /// Create an empty ledger whose entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            ttl,
        }
    }

    /// Record that `key` was written at `at`.
    ///
    /// `at` must not precede the newest recorded instant.
    pub fn record(&mut self, key: impl Into<String>, at: Instant) {
        debug_assert!(
            self.entries.back().map_or(true, |(_, last)| *last <= at),
            "ledger entries must be recorded in time order"
        );
        self.entries.push_back((key.into(), at));
    }

    /// The oldest key whose age at `now` strictly exceeds the TTL.
    pub fn oldest_expired(&self, now: Instant) -> Option<&str> {
        let (key, written) = self.entries.front()?;
        if now.saturating_duration_since(*written) > self.ttl {
            Some(key.as_str())
        } else {
            None
        }
    }

    /// Remove the oldest entry.
    pub fn pop_oldest(&mut self) -> Option<(String, Instant)> {
        self.entries.pop_front()
    }

    /// Number of keys still tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked keys, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}
