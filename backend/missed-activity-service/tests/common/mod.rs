//! In-memory backend and fixtures shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use missed_activity_service::models::{
    Channel, ChannelKind, ChannelMembership, Post, Team, User, UserPreferences,
};
use missed_activity_service::{AppError, Backend, PreferenceChange, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// 2024-03-01 10:00 UTC plus `minutes`.
pub fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::minutes(minutes)
}

pub fn user(id: &str, username: &str) -> User {
    User {
        id: id.into(),
        username: username.into(),
        first_name: String::new(),
        last_name: String::new(),
        email: format!("{}@example.com", username),
        email_verified: true,
        active: true,
        roles: vec!["system_user".into()],
        is_bot: false,
        emails_enabled: true,
        preferences: UserPreferences::default(),
    }
}

pub fn team(id: &str, name: &str) -> Team {
    Team {
        id: id.into(),
        name: name.into(),
        slug: name.to_lowercase(),
    }
}

pub fn channel(id: &str, kind: ChannelKind, team_id: &str) -> Channel {
    Channel {
        id: id.into(),
        display_name: id.to_uppercase(),
        members: Vec::new(),
        kind,
        team_id: team_id.into(),
    }
}

pub fn membership(channel: Channel, user: &User, last_read: DateTime<Utc>) -> ChannelMembership {
    ChannelMembership {
        channel,
        user: user.clone(),
        last_read_at: last_read,
        notify_props: HashMap::new(),
    }
}

pub fn root(id: &str, author: &str, at: DateTime<Utc>, message: &str) -> Post {
    Post {
        id: id.into(),
        message: message.into(),
        author_id: author.into(),
        created_at: at,
        root_id: String::new(),
        kind: String::new(),
        from_bot: false,
        is_system_message: false,
        is_deleted: false,
    }
}

pub fn reply(id: &str, root_id: &str, author: &str, at: DateTime<Utc>, message: &str) -> Post {
    Post {
        root_id: root_id.into(),
        ..root(id, author, at, message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub user_id: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
struct FakeState {
    post_fetches: HashMap<String, usize>,
    membership_calls: Vec<(String, String, bool)>,
    emails: Vec<SentEmail>,
    watermark: DateTime<Utc>,
    preferences: HashMap<String, UserPreferences>,
}

/// [`Backend`] over fixed in-memory data that records how it was called.
#[derive(Default)]
pub struct FakeBackend {
    pub users: Vec<User>,
    pub teams: HashMap<String, Vec<Team>>,
    pub memberships: Vec<ChannelMembership>,
    pub posts: HashMap<String, Vec<Post>>,
    /// (post id, user id)
    pub following: HashSet<(String, String)>,
    pub statuses: HashMap<String, String>,
    /// Return replies without their roots
    pub drop_roots: bool,
    pub fail_teams_for: Option<String>,
    pub fail_email: bool,
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.push(user);
        self
    }

    pub fn with_team(mut self, user_id: &str, team: Team) -> Self {
        self.teams.entry(user_id.to_string()).or_default().push(team);
        self
    }

    pub fn with_membership(mut self, membership: ChannelMembership) -> Self {
        self.memberships.push(membership);
        self
    }

    pub fn with_posts(mut self, channel_id: &str, posts: Vec<Post>) -> Self {
        self.posts.entry(channel_id.to_string()).or_default().extend(posts);
        self
    }

    pub fn with_following(mut self, post_id: &str, user_id: &str) -> Self {
        self.following
            .insert((post_id.to_string(), user_id.to_string()));
        self
    }

    pub fn post_fetches(&self, channel_id: &str) -> usize {
        self.state
            .lock()
            .post_fetches
            .get(channel_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_post_fetches(&self) -> usize {
        self.state.lock().post_fetches.values().sum()
    }

    pub fn membership_calls(&self) -> Vec<(String, String, bool)> {
        self.state.lock().membership_calls.clone()
    }

    pub fn sent_emails(&self) -> Vec<SentEmail> {
        self.state.lock().emails.clone()
    }

    pub fn watermark(&self) -> DateTime<Utc> {
        self.state.lock().watermark
    }

    pub fn set_watermark(&self, at: DateTime<Utc>) {
        self.state.lock().watermark = at;
    }

    fn resolve_preferences(&self, mut user: User) -> User {
        if let Some(prefs) = self.state.lock().preferences.get(&user.id) {
            user.preferences = *prefs;
        }
        user
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn get_notifiable_users(&self) -> Result<Vec<User>> {
        Ok(self
            .users
            .iter()
            .cloned()
            .map(|u| self.resolve_preferences(u))
            .filter(|u| u.is_notifiable(false))
            .collect())
    }

    async fn get_user(&self, user_id: &str) -> Result<User> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .map(|u| self.resolve_preferences(u))
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))
    }

    async fn get_teams_for_user(&self, user_id: &str) -> Result<Vec<Team>> {
        if self.fail_teams_for.as_deref() == Some(user_id) {
            return Err(AppError::Backend("teams endpoint unavailable".into()));
        }
        Ok(self.teams.get(user_id).cloned().unwrap_or_default())
    }

    async fn get_channel_memberships_for_user(
        &self,
        team_id: &str,
        user_id: &str,
        include_direct: bool,
    ) -> Result<Vec<ChannelMembership>> {
        self.state.lock().membership_calls.push((
            team_id.to_string(),
            user_id.to_string(),
            include_direct,
        ));

        Ok(self
            .memberships
            .iter()
            .filter(|m| m.user.id == user_id)
            .filter(|m| {
                if m.channel.is_direct_or_group() {
                    team_id.is_empty() || include_direct
                } else {
                    !team_id.is_empty() && m.channel.team_id == team_id
                }
            })
            .cloned()
            .collect())
    }

    async fn get_channel_posts(&self, channel_id: &str, from: i64, to: i64) -> Result<Vec<Post>> {
        *self
            .state
            .lock()
            .post_fetches
            .entry(channel_id.to_string())
            .or_default() += 1;

        let all = self.posts.get(channel_id).cloned().unwrap_or_default();
        let in_range = |p: &Post| {
            let ms = p.created_at.timestamp_millis();
            ms >= from && ms <= to
        };

        let mut selected: Vec<Post> = all.iter().filter(|p| in_range(p)).cloned().collect();
        if !self.drop_roots {
            for post in all.iter().filter(|p| p.is_root() && !in_range(p)) {
                if selected.iter().any(|r| r.root_id == post.id) {
                    selected.push(post.clone());
                }
            }
        }
        selected.sort_by_key(|p| p.created_at);
        Ok(selected)
    }

    async fn is_user_following_post(&self, post_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .following
            .contains(&(post_id.to_string(), user_id.to_string())))
    }

    async fn get_user_statuses(&self) -> Result<HashMap<String, String>> {
        Ok(self.statuses.clone())
    }

    async fn send_email(&self, user: &User, subject: &str, body: &str) -> Result<()> {
        if self.fail_email {
            return Err(AppError::Email("smtp down".into()));
        }
        self.state.lock().emails.push(SentEmail {
            user_id: user.id.clone(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn get_last_notified_timestamp(&self) -> Result<DateTime<Utc>> {
        Ok(self.state.lock().watermark)
    }

    async fn set_last_notified_timestamp(&self, at: DateTime<Utc>) -> Result<()> {
        self.state.lock().watermark = at;
        Ok(())
    }

    async fn get_preferences_for_user(&self, user_id: &str) -> Result<UserPreferences> {
        Ok(self
            .state
            .lock()
            .preferences
            .get(user_id)
            .copied()
            .unwrap_or_default())
    }

    async fn modify_preferences_for_user(
        &self,
        user_id: &str,
        change: PreferenceChange,
    ) -> Result<UserPreferences> {
        let mut state = self.state.lock();
        let prefs = state.preferences.entry(user_id.to_string()).or_default();
        change(prefs);
        Ok(*prefs)
    }

    async fn reset_preferences_for_user(&self, user_id: &str) -> Result<UserPreferences> {
        self.state.lock().preferences.remove(user_id);
        Ok(UserPreferences::default())
    }

    async fn reset_all_preferences(&self) -> Result<()> {
        self.state.lock().preferences.clear();
        Ok(())
    }
}
