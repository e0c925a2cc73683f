//! Loop and duplicate suppression: a message-id seen recently is never
//! forwarded or delivered twice.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mesh_core::envelope::MessageId;

const EXPIRY_SECS: i64 = 5 * 60;

pub struct RecentMessageCache {
    seen: DashMap<MessageId, DateTime<Utc>>,
}

impl RecentMessageCache {
    pub fn new() -> Self {
        Self { seen: DashMap::new() }
    }

    /// `true` if `id` was already recorded (and thus should be dropped).
    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains_key(id)
    }

    pub fn insert(&self, id: MessageId) {
        self.seen.insert(id, Utc::now());
    }

    /// Evict entries older than five minutes.
    pub fn expire_old(&self) {
        let now = Utc::now();
        self.seen.retain(|_, seen_at| now.signed_duration_since(*seen_at).num_seconds() < EXPIRY_SECS);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for RecentMessageCache {
    fn default() -> Self {
        Self::new()
    }
}
