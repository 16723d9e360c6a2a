use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-user settings for missed-activity reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    /// Receive missed-activity emails at all
    pub enabled: bool,
    /// Report replies in threads the user does not follow
    pub notify_replies_in_not_followed_threads: bool,
    /// Count (instead of silently dropping) replies in threads the user does not follow
    pub count_replies_in_not_followed_threads: bool,
    /// Count messages the platform already notified in real time
    pub count_notified_by_platform: bool,
    /// Count messages covered by a previous report
    pub count_previously_notified: bool,
    pub include_system_messages: bool,
    pub include_bot_messages: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            notify_replies_in_not_followed_threads: false,
            count_replies_in_not_followed_threads: true,
            count_notified_by_platform: true,
            count_previously_notified: false,
            include_system_messages: true,
            include_bot_messages: true,
        }
    }
}

/// Named toggle of [`UserPreferences`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceKey {
    Enabled,
    NotifyRepliesInNotFollowedThreads,
    CountRepliesInNotFollowedThreads,
    CountNotifiedByPlatform,
    CountPreviouslyNotified,
    IncludeSystemMessages,
    IncludeBotMessages,
}

impl PreferenceKey {
    pub const ALL: [PreferenceKey; 7] = [
        PreferenceKey::Enabled,
        PreferenceKey::NotifyRepliesInNotFollowedThreads,
        PreferenceKey::CountRepliesInNotFollowedThreads,
        PreferenceKey::CountNotifiedByPlatform,
        PreferenceKey::CountPreviouslyNotified,
        PreferenceKey::IncludeSystemMessages,
        PreferenceKey::IncludeBotMessages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceKey::Enabled => "enabled",
            PreferenceKey::NotifyRepliesInNotFollowedThreads => {
                "notify_replies_in_not_followed_threads"
            }
            PreferenceKey::CountRepliesInNotFollowedThreads => {
                "count_replies_in_not_followed_threads"
            }
            PreferenceKey::CountNotifiedByPlatform => "count_notified_by_platform",
            PreferenceKey::CountPreviouslyNotified => "count_previously_notified",
            PreferenceKey::IncludeSystemMessages => "include_system_messages",
            PreferenceKey::IncludeBotMessages => "include_bot_messages",
        }
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreferenceKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PreferenceKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| AppError::InvalidPreference(s.to_string()))
    }
}

impl UserPreferences {
    pub fn get(&self, key: PreferenceKey) -> bool {
        match key {
            PreferenceKey::Enabled => self.enabled,
            PreferenceKey::NotifyRepliesInNotFollowedThreads => {
                self.notify_replies_in_not_followed_threads
            }
            PreferenceKey::CountRepliesInNotFollowedThreads => {
                self.count_replies_in_not_followed_threads
            }
            PreferenceKey::CountNotifiedByPlatform => self.count_notified_by_platform,
            PreferenceKey::CountPreviouslyNotified => self.count_previously_notified,
            PreferenceKey::IncludeSystemMessages => self.include_system_messages,
            PreferenceKey::IncludeBotMessages => self.include_bot_messages,
        }
    }

    pub fn set(&mut self, key: PreferenceKey, value: bool) {
        let slot = match key {
            PreferenceKey::Enabled => &mut self.enabled,
            PreferenceKey::NotifyRepliesInNotFollowedThreads => {
                &mut self.notify_replies_in_not_followed_threads
            }
            PreferenceKey::CountRepliesInNotFollowedThreads => {
                &mut self.count_replies_in_not_followed_threads
            }
            PreferenceKey::CountNotifiedByPlatform => &mut self.count_notified_by_platform,
            PreferenceKey::CountPreviouslyNotified => &mut self.count_previously_notified,
            PreferenceKey::IncludeSystemMessages => &mut self.include_system_messages,
            PreferenceKey::IncludeBotMessages => &mut self.include_bot_messages,
        };
        *slot = value;
    }

    /// (name, value) pairs in declaration order.
    pub fn items(&self) -> Vec<(&'static str, bool)> {
        PreferenceKey::ALL
            .iter()
            .map(|key| (key.as_str(), self.get(*key)))
            .collect()
    }
}
