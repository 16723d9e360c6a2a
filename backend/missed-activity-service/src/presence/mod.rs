//! Per-user presence timelines.
//!
//! Each user gets an append-only list of status transitions. Samples must arrive
//! with strictly increasing timestamps; repeating the current status is a no-op.
//! `status_at` answers what the platform saw at a given instant, which decides
//! whether the real-time notifier already reached the user.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Online,
    Away,
    Offline,
    #[serde(rename = "dnd")]
    DoNotDisturb,
    Custom,
    #[default]
    Unknown,
}

impl UserStatus {
    /// Maps a raw platform status. Only online, away and offline are recognised.
    pub fn from_platform(raw: &str) -> Self {
        match raw {
            "online" => UserStatus::Online,
            "away" => UserStatus::Away,
            "offline" => UserStatus::Offline,
            _ => UserStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Online => "online",
            UserStatus::Away => "away",
            UserStatus::Offline => "offline",
            UserStatus::DoNotDisturb => "dnd",
            UserStatus::Custom => "custom",
            UserStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PresenceError {
    #[error("status sample for user {user_id} at {timestamp} is not after last recorded {last}")]
    OrderingViolation {
        user_id: String,
        timestamp: i64,
        last: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSample {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub status: UserStatus,
}

/// Ordered transitions of a single user.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusHistory {
    samples: Vec<StatusSample>,
}

impl StatusHistory {
    pub fn samples(&self) -> &[StatusSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn last(&self) -> Option<&StatusSample> {
        self.samples.last()
    }

    fn push(&mut self, user_id: &str, timestamp: i64, status: UserStatus) -> Result<(), PresenceError> {
        if let Some(last) = self.last() {
            if timestamp <= last.timestamp {
                return Err(PresenceError::OrderingViolation {
                    user_id: user_id.to_string(),
                    timestamp,
                    last: last.timestamp,
                });
            }
            if last.status == status {
                return Ok(());
            }
        }
        self.samples.push(StatusSample { timestamp, status });
        Ok(())
    }

    /// Status of the latest sample taken at or before `at`.
    pub fn status_at(&self, at: i64) -> UserStatus {
        // Number of samples with timestamp <= at
        let idx = self.samples.partition_point(|s| s.timestamp <= at);
        if idx == 0 {
            return UserStatus::Unknown;
        }
        self.samples[idx - 1].status
    }

    fn evict_older_than(&mut self, horizon: i64) {
        let older = self.samples.partition_point(|s| s.timestamp < horizon);
        // Unless a sample sits exactly on the horizon, the last older one is still in effect.
        let drop = match self.samples.get(older) {
            Some(next) if next.timestamp == horizon => older,
            _ => older.saturating_sub(1),
        };
        self.samples.drain(..drop);
    }
}

/// Presence timelines for every tracked user, shared between the run and the sampling hooks.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    histories: RwLock<HashMap<String, StatusHistory>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sample(
        &self,
        user_id: &str,
        status: &str,
        timestamp: i64,
    ) -> Result<(), PresenceError> {
        let status = UserStatus::from_platform(status);
        let mut histories = self.histories.write();
        histories
            .entry(user_id.to_string())
            .or_default()
            .push(user_id, timestamp, status)
    }

    pub fn status_at(&self, user_id: &str, at: i64) -> UserStatus {
        self.histories
            .read()
            .get(user_id)
            .map(|h| h.status_at(at))
            .unwrap_or_default()
    }

    pub fn evict_older_than(&self, horizon: i64) {
        let mut histories = self.histories.write();
        for history in histories.values_mut() {
            history.evict_older_than(horizon);
        }
    }

    pub fn tracked_user_ids(&self) -> Vec<String> {
        self.histories.read().keys().cloned().collect()
    }

    pub fn history_of(&self, user_id: &str) -> Vec<StatusSample> {
        self.histories
            .read()
            .get(user_id)
            .map(|h| h.samples().to_vec())
            .unwrap_or_default()
    }
}
