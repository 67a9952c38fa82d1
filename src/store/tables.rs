//! Table state for the store.
//!
//! Epistemic foundation:
//! - K_i: Cache entries carry an absolute expiry; reads never return expired values
//! - K_i: Analytics event ids are strictly increasing
//! - K_i: At most `MAX_RETAINED_EVENTS` events are held in memory, newest kept
//! - B_i: A user or session may not exist → Option

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Analytics events kept in memory; older ones live only in the event log.
pub const MAX_RETAINED_EVENTS: usize = 10_000;

/// A known user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub preferences: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A persisted assistant session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cached value with an absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// A recorded user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: u64,
    pub user_id: String,
    pub action: String,
    #[serde(default)]
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

/// Users, sessions and cache, serialized as one snapshot.
///
/// Analytics events are not part of the snapshot; see [`EventLog`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    pub users: HashMap<String, User>,
    #[serde(default)]
    pub sessions: HashMap<String, SessionRecord>,
    #[serde(default)]
    pub cache: HashMap<String, CacheEntry>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            users: HashMap::new(),
            sessions: HashMap::new(),
            cache: HashMap::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Most recent analytics events plus the id counter.
#[derive(Debug, Clone)]
pub struct EventLog {
    recent: VecDeque<AnalyticsEvent>,
    next_id: u64,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(MAX_RETAINED_EVENTS)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            recent: VecDeque::new(),
            next_id: 1,
            capacity: capacity.max(1),
        }
    }

    /// Build the next event without recording it.
    pub fn next_event(
        &self,
        user_id: &str,
        action: &str,
        details: &str,
        now: DateTime<Utc>,
    ) -> AnalyticsEvent {
        AnalyticsEvent {
            id: self.next_id,
            user_id: user_id.to_string(),
            action: action.to_string(),
            details: details.to_string(),
            timestamp: now,
        }
    }

    /// Keep `event`, evicting the oldest retained one when full.
    pub fn record(&mut self, event: AnalyticsEvent) {
        self.next_id = self.next_id.max(event.id + 1);
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(event);
    }

    /// Build, record and return the id of a new event.
    pub fn log(&mut self, user_id: &str, action: &str, details: &str, now: DateTime<Utc>) -> u64 {
        let event = self.next_event(user_id, action, details, now);
        let id = event.id;
        self.record(event);
        id
    }

    /// Retained events for a user, oldest first.
    pub fn for_user(&self, user_id: &str) -> Vec<AnalyticsEvent> {
        self.recent
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}

impl Tables {
    /// Value for `key` if present and not yet expired.
    pub fn get_cached(&self, key: &str, now: DateTime<Utc>) -> Option<&str> {
        self.cache
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.as_str())
    }

    /// Insert or replace a cache entry.
    pub fn set_cached(&mut self, key: &str, value: String, ttl_minutes: i64, now: DateTime<Utc>) {
        self.cache.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value,
                expires_at: now + Duration::minutes(ttl_minutes),
                created_at: now,
            },
        );
        self.updated_at = now;
    }

    /// Drop expired cache entries, returning how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, entry| entry.is_live(now));
        let removed = before - self.cache.len();
        if removed > 0 {
            self.updated_at = now;
        }
        removed
    }

    /// Create the user if missing; an existing user keeps its creation time.
    pub fn upsert_user(
        &mut self,
        id: &str,
        name: Option<&str>,
        preferences: serde_json::Value,
        now: DateTime<Utc>,
    ) -> &User {
        let user = self.users.entry(id.to_string()).or_insert_with(|| User {
            id: id.to_string(),
            name: None,
            preferences: serde_json::Value::Null,
            created_at: now,
        });
        if let Some(name) = name {
            user.name = Some(name.to_string());
        }
        if !preferences.is_null() {
            user.preferences = preferences;
        }
        self.updated_at = now;
        user
    }

    /// Create or update a session record.
    pub fn save_session(
        &mut self,
        id: &str,
        user_id: &str,
        data: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        self.sessions
            .entry(id.to_string())
            .and_modify(|s| {
                s.data = data.clone();
                s.updated_at = now;
            })
            .or_insert_with(|| SessionRecord {
                id: id.to_string(),
                user_id: user_id.to_string(),
                data,
                created_at: now,
                updated_at: now,
            });
        self.updated_at = now;
    }
}
