//! Data access for the missed-activity engine.
//!
//! [`Backend`] is everything the engine and the scheduled job need from the chat
//! platform and from persistent storage. [`MattermostBackend`] talks to a real
//! server; [`CachedBackend`] wraps any implementation with TTL caches.

mod cached;
mod mattermost;

pub use cached::CachedBackend;
pub use mattermost::MattermostBackend;

use crate::error::Result;
use crate::models::{ChannelMembership, Post, Team, User, UserPreferences};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Edit applied to one user's stored preferences.
pub type PreferenceChange = Box<dyn FnOnce(&mut UserPreferences) + Send>;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Users that may receive a report, with their preferences resolved.
    async fn get_notifiable_users(&self) -> Result<Vec<User>>;

    async fn get_user(&self, user_id: &str) -> Result<User>;

    async fn get_teams_for_user(&self, user_id: &str) -> Result<Vec<Team>>;

    /// Memberships of `user_id` in channels of `team_id`.
    ///
    /// An empty `team_id` selects the direct and group channels only. With
    /// `include_direct` set, direct and group channels are returned as well.
    async fn get_channel_memberships_for_user(
        &self,
        team_id: &str,
        user_id: &str,
        include_direct: bool,
    ) -> Result<Vec<ChannelMembership>>;

    /// Posts created in `[from, to]` (milliseconds), oldest first.
    ///
    /// The root of every returned reply is included even when it was created before `from`.
    async fn get_channel_posts(&self, channel_id: &str, from: i64, to: i64) -> Result<Vec<Post>>;

    async fn is_user_following_post(&self, post_id: &str, user_id: &str) -> Result<bool>;

    /// Current raw platform status per user id.
    async fn get_user_statuses(&self) -> Result<HashMap<String, String>>;

    async fn send_email(&self, user: &User, subject: &str, body: &str) -> Result<()>;

    async fn get_last_notified_timestamp(&self) -> Result<DateTime<Utc>>;

    async fn set_last_notified_timestamp(&self, at: DateTime<Utc>) -> Result<()>;

    async fn get_preferences_for_user(&self, user_id: &str) -> Result<UserPreferences>;

    /// Applies `change` to the user's preferences atomically and returns the result.
    async fn modify_preferences_for_user(
        &self,
        user_id: &str,
        change: PreferenceChange,
    ) -> Result<UserPreferences>;

    /// Returns the preferences in effect after the reset.
    async fn reset_preferences_for_user(&self, user_id: &str) -> Result<UserPreferences>;

    async fn reset_all_preferences(&self) -> Result<()>;
}
