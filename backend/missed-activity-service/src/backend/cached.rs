use super::{Backend, PreferenceChange};
use crate::error::Result;
use crate::metrics;
use crate::models::{ChannelMembership, Post, Team, User, UserPreferences};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cached value with TTL metadata
#[derive(Debug, Clone)]
struct CachedEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CachedEntry<V> {
    #[inline]
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug)]
struct TtlCache<V> {
    kind: &'static str,
    ttl: Duration,
    store: DashMap<String, CachedEntry<V>>,
}

impl<V: Clone> TtlCache<V> {
    fn new(kind: &'static str, ttl: Duration) -> Self {
        Self {
            kind,
            ttl,
            store: DashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<V> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                metrics::record_cache(self.kind, true);
                debug!(kind = self.kind, key, "cache HIT");
                return Some(entry.value.clone());
            }
        }
        // Expired entries are dropped lazily
        self.store.remove_if(key, |_, entry| entry.is_expired());
        metrics::record_cache(self.kind, false);
        debug!(kind = self.kind, key, "cache MISS");
        None
    }

    fn insert(&self, key: String, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        self.store.insert(
            key,
            CachedEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    fn clear(&self) {
        self.store.clear();
    }
}

/// TTL cache in front of another [`Backend`].
///
/// Reads of users, teams, memberships, posts and statuses are cached; writes and
/// thread-following lookups go straight through. Preference writes drop every
/// cached user, since users carry their resolved preferences.
pub struct CachedBackend<B> {
    inner: B,
    users: TtlCache<User>,
    notifiable_users: TtlCache<Vec<User>>,
    teams: TtlCache<Vec<Team>>,
    memberships: TtlCache<Vec<ChannelMembership>>,
    posts: TtlCache<Vec<Post>>,
    statuses: TtlCache<HashMap<String, String>>,
}

impl<B: Backend> CachedBackend<B> {
    pub fn new(inner: B, ttl: Duration, status_ttl: Duration) -> Self {
        Self {
            inner,
            users: TtlCache::new("user", ttl),
            notifiable_users: TtlCache::new("notifiable_users", ttl),
            teams: TtlCache::new("teams", ttl),
            memberships: TtlCache::new("memberships", ttl),
            posts: TtlCache::new("posts", ttl),
            statuses: TtlCache::new("statuses", status_ttl),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn invalidate_users(&self) {
        self.users.clear();
        self.notifiable_users.clear();
        self.memberships.clear();
    }
}

#[async_trait]
impl<B: Backend> Backend for CachedBackend<B> {
    async fn get_notifiable_users(&self) -> Result<Vec<User>> {
        if let Some(users) = self.notifiable_users.get("all") {
            return Ok(users);
        }
        let users = self.inner.get_notifiable_users().await?;
        self.notifiable_users.insert("all".to_string(), users.clone());
        Ok(users)
    }

    async fn get_user(&self, user_id: &str) -> Result<User> {
        if let Some(user) = self.users.get(user_id) {
            return Ok(user);
        }
        let user = self.inner.get_user(user_id).await?;
        self.users.insert(user_id.to_string(), user.clone());
        Ok(user)
    }

    async fn get_teams_for_user(&self, user_id: &str) -> Result<Vec<Team>> {
        if let Some(teams) = self.teams.get(user_id) {
            return Ok(teams);
        }
        let teams = self.inner.get_teams_for_user(user_id).await?;
        self.teams.insert(user_id.to_string(), teams.clone());
        Ok(teams)
    }

    async fn get_channel_memberships_for_user(
        &self,
        team_id: &str,
        user_id: &str,
        include_direct: bool,
    ) -> Result<Vec<ChannelMembership>> {
        let key = format!("{}/{}/{}", team_id, user_id, include_direct);
        if let Some(memberships) = self.memberships.get(&key) {
            return Ok(memberships);
        }
        let memberships = self
            .inner
            .get_channel_memberships_for_user(team_id, user_id, include_direct)
            .await?;
        self.memberships.insert(key, memberships.clone());
        Ok(memberships)
    }

    async fn get_channel_posts(&self, channel_id: &str, from: i64, to: i64) -> Result<Vec<Post>> {
        let key = format!("{}/{}/{}", channel_id, from, to);
        if let Some(posts) = self.posts.get(&key) {
            return Ok(posts);
        }
        let posts = self.inner.get_channel_posts(channel_id, from, to).await?;
        self.posts.insert(key, posts.clone());
        Ok(posts)
    }

    async fn is_user_following_post(&self, post_id: &str, user_id: &str) -> Result<bool> {
        self.inner.is_user_following_post(post_id, user_id).await
    }

    async fn get_user_statuses(&self) -> Result<HashMap<String, String>> {
        if let Some(statuses) = self.statuses.get("all") {
            return Ok(statuses);
        }
        let statuses = self.inner.get_user_statuses().await?;
        self.statuses.insert("all".to_string(), statuses.clone());
        Ok(statuses)
    }

    async fn send_email(&self, user: &User, subject: &str, body: &str) -> Result<()> {
        self.inner.send_email(user, subject, body).await
    }

    async fn get_last_notified_timestamp(&self) -> Result<DateTime<Utc>> {
        self.inner.get_last_notified_timestamp().await
    }

    async fn set_last_notified_timestamp(&self, at: DateTime<Utc>) -> Result<()> {
        self.inner.set_last_notified_timestamp(at).await
    }

    async fn get_preferences_for_user(&self, user_id: &str) -> Result<UserPreferences> {
        self.inner.get_preferences_for_user(user_id).await
    }

    async fn modify_preferences_for_user(
        &self,
        user_id: &str,
        change: PreferenceChange,
    ) -> Result<UserPreferences> {
        let result = self.inner.modify_preferences_for_user(user_id, change).await;
        self.invalidate_users();
        result
    }

    async fn reset_preferences_for_user(&self, user_id: &str) -> Result<UserPreferences> {
        let result = self.inner.reset_preferences_for_user(user_id).await;
        self.invalidate_users();
        result
    }

    async fn reset_all_preferences(&self) -> Result<()> {
        let result = self.inner.reset_all_preferences().await;
        self.invalidate_users();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_cache_expiry() {
        let cache = TtlCache::new("test", Duration::from_millis(20));
        cache.insert("k".into(), 1u32);
        assert_eq!(cache.get("k"), Some(1));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("k"), None);
        assert!(cache.store.is_empty());
    }

    #[test]
    fn test_zero_ttl_disables_caching() {
        let cache = TtlCache::new("test", Duration::ZERO);
        cache.insert("k".into(), 1u32);
        assert_eq!(cache.get("k"), None);
    }
}
