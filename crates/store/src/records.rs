//! Persisted record types for the whitelist/quota snapshot.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// QuotaRecord
// ---------------------------------------------------------------------------

/// Per-user daily quota bookkeeping.
///
/// Invariant: `remaining <= daily_limit`. The daily reset is lazy, applied
/// by [`roll_over`](Self::roll_over) the first time the record is touched on
/// a new calendar date, never by a background timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub daily_limit: u32,
    pub remaining: u32,
    pub last_reset: NaiveDate,
    pub last_used_at: Option<DateTime<Utc>>,
    pub nickname: Option<String>,
}

impl QuotaRecord {
    /// Fresh record with a full day's allowance.
    pub fn new(daily_limit: u32, today: NaiveDate, nickname: Option<String>) -> Self {
        Self {
            daily_limit,
            remaining: daily_limit,
            last_reset: today,
            last_used_at: None,
            nickname,
        }
    }

    /// Apply the lazy daily reset: the first touch on a new calendar date
    /// restores `remaining` to `daily_limit`. Idempotent within a day.
    pub fn roll_over(&mut self, today: NaiveDate) {
        if self.last_reset != today {
            self.last_reset = today;
            self.remaining = self.daily_limit;
        }
    }
}

// ---------------------------------------------------------------------------
// GroupRecord
// ---------------------------------------------------------------------------

/// Group allow-list entry. Presence in the snapshot is itself the allow
/// flag; the name is display-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Users and groups for one chat platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformState {
    #[serde(default)]
    pub users: HashMap<String, QuotaRecord>,
    #[serde(default)]
    pub groups: HashMap<String, GroupRecord>,
}

/// The whole persisted store, as serialized to `whitelist.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub platforms: HashMap<String, PlatformState>,
}

impl Snapshot {
    /// Platform bucket, created on demand.
    pub fn platform_mut(&mut self, platform: &str) -> &mut PlatformState {
        self.platforms.entry(platform.to_string()).or_default()
    }

    pub fn platform(&self, platform: &str) -> Option<&PlatformState> {
        self.platforms.get(platform)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
