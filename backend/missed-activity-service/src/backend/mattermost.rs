use super::{Backend, PreferenceChange};
use crate::config::PlatformConfig;
use crate::error::{AppError, Result, ResultExt};
use crate::models::{Channel, ChannelKind, ChannelMembership, Post, Team, User, UserPreferences};
use crate::services::EmailService;
use crate::store::PreferenceStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const PAGE_SIZE: usize = 200;

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    username: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    delete_at: i64,
    #[serde(default)]
    roles: String,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    notify_props: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ApiTeam {
    id: String,
    name: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiChannelMember {
    channel_id: String,
    last_viewed_at: i64,
    #[serde(default)]
    notify_props: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ApiChannel {
    id: String,
    #[serde(default)]
    team_id: String,
    #[serde(default)]
    display_name: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ApiPostList {
    #[serde(default)]
    posts: HashMap<String, ApiPost>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiPost {
    id: String,
    create_at: i64,
    #[serde(default)]
    delete_at: i64,
    user_id: String,
    #[serde(default)]
    root_id: String,
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    props: Value,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    user_id: String,
    status: String,
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn prop_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

/// Stands in for the text of a deleted thread root.
const DELETED_MESSAGE: &str = "(message deleted)";

impl ApiPost {
    fn into_post(self) -> Post {
        let is_deleted = self.delete_at > 0;
        let mut message = self.message;
        if is_deleted {
            message = DELETED_MESSAGE.to_string();
        } else if message.is_empty() {
            // Integrations often post attachments only
            if let Some(fallback) = self
                .props
                .get("attachments")
                .and_then(|a| a.get(0))
                .and_then(|a| a.get("fallback"))
                .and_then(Value::as_str)
            {
                message = fallback.to_string();
            }
        }

        Post {
            from_bot: is_truthy(self.props.get("from_bot")),
            is_system_message: self.kind.starts_with("system_"),
            id: self.id,
            message,
            author_id: self.user_id,
            created_at: millis_to_datetime(self.create_at),
            root_id: self.root_id,
            kind: self.kind,
            is_deleted,
        }
    }
}

/// [`Backend`] for a Mattermost server: REST API v4 plus read access to its database.
pub struct MattermostBackend {
    client: Client,
    base_url: String,
    token: String,
    db: PgPool,
    store: Arc<PreferenceStore>,
    email: EmailService,
    require_email_verification: bool,
}

impl MattermostBackend {
    pub async fn connect(
        config: &PlatformConfig,
        store: Arc<PreferenceStore>,
        email: EmailService,
    ) -> Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url)
            .await?;
        info!("Connected to platform database");

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.clone(),
            token: config.token.clone(),
            db,
            store,
            email,
            require_email_verification: config.require_email_verification,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/api/v4{}", self.base_url, path);
        debug!(%url, "GET");

        let response = self.client.get(&url).bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Backend(format!(
                "GET {} returned {}: {}",
                path, status, body
            )));
        }
        Ok(response.json::<T>().await?)
    }

    async fn all_user_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE deleteat = 0")
            .fetch_all(&self.db)
            .await?;
        Ok(ids)
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Channel> {
        let api: ApiChannel = self.get_json(&format!("/channels/{}", channel_id)).await?;
        let kind = ChannelKind::from_code(&api.kind).ok_or_else(|| {
            AppError::Backend(format!("channel {} has unknown type '{}'", api.id, api.kind))
        })?;

        let members = match kind {
            ChannelKind::Direct | ChannelKind::Group => {
                let users: Vec<ApiUser> = self
                    .get_json(&format!("/users?in_channel={}&per_page={}", channel_id, PAGE_SIZE))
                    .await?;
                users
                    .into_iter()
                    .map(|u| self.to_user(u, UserPreferences::default()).display_name())
                    .collect()
            }
            _ => Vec::new(),
        };

        Ok(Channel {
            id: api.id,
            display_name: api.display_name,
            members,
            kind,
            team_id: api.team_id,
        })
    }

    fn to_user(&self, api: ApiUser, preferences: UserPreferences) -> User {
        let emails_enabled = api
            .notify_props
            .get("email")
            .map(|v| prop_string(v) != "false")
            .unwrap_or(true);

        User {
            id: api.id,
            username: api.username,
            first_name: api.first_name,
            last_name: api.last_name,
            email: api.email,
            email_verified: api.email_verified,
            active: api.delete_at == 0,
            roles: api.roles.split_whitespace().map(str::to_string).collect(),
            is_bot: api.is_bot,
            emails_enabled,
            preferences,
        }
    }
}

#[async_trait]
impl Backend for MattermostBackend {
    async fn get_notifiable_users(&self) -> Result<Vec<User>> {
        let ids = self.all_user_ids().await.context("listing users")?;
        let mut users = Vec::new();
        for id in ids {
            let user = self.get_user(&id).await?;
            if user.active && user.is_notifiable(self.require_email_verification) {
                users.push(user);
            }
        }
        Ok(users)
    }

    async fn get_user(&self, user_id: &str) -> Result<User> {
        let api: ApiUser = self
            .get_json(&format!("/users/{}", user_id))
            .await
            .with_context(|| format!("getting user {}", user_id))?;
        let preferences = self.store.preferences_for_user(user_id).await?;
        Ok(self.to_user(api, preferences))
    }

    async fn get_teams_for_user(&self, user_id: &str) -> Result<Vec<Team>> {
        let teams: Vec<ApiTeam> = self.get_json(&format!("/users/{}/teams", user_id)).await?;
        Ok(teams
            .into_iter()
            .map(|t| Team {
                id: t.id,
                name: t.display_name,
                slug: t.name,
            })
            .collect())
    }

    async fn get_channel_memberships_for_user(
        &self,
        team_id: &str,
        user_id: &str,
        include_direct: bool,
    ) -> Result<Vec<ChannelMembership>> {
        let user = self.get_user(user_id).await?;

        let mut members = Vec::new();
        for page in 0.. {
            let batch: Vec<ApiChannelMember> = self
                .get_json(&format!(
                    "/users/{}/channel_members?page={}&per_page={}",
                    user_id, page, PAGE_SIZE
                ))
                .await?;
            let done = batch.len() < PAGE_SIZE;
            members.extend(batch);
            if done {
                break;
            }
        }

        let mut memberships = Vec::new();
        for member in members {
            let channel = self
                .get_channel(&member.channel_id)
                .await
                .with_context(|| format!("getting channel {}", member.channel_id))?;

            let wanted = if channel.is_direct_or_group() {
                team_id.is_empty() || include_direct
            } else {
                !team_id.is_empty() && channel.team_id == team_id
            };
            if !wanted {
                continue;
            }

            memberships.push(ChannelMembership {
                channel,
                user: user.clone(),
                last_read_at: millis_to_datetime(member.last_viewed_at),
                notify_props: member
                    .notify_props
                    .iter()
                    .map(|(k, v)| (k.clone(), prop_string(v)))
                    .collect(),
            });
        }
        Ok(memberships)
    }

    async fn get_channel_posts(&self, channel_id: &str, from: i64, to: i64) -> Result<Vec<Post>> {
        let list: ApiPostList = self
            .get_json(&format!("/channels/{}/posts?since={}", channel_id, from))
            .await?;

        let mut selected: Vec<ApiPost> = list
            .posts
            .values()
            .filter(|p| p.delete_at == 0 && p.create_at >= from && p.create_at <= to)
            .cloned()
            .collect();

        let mut missing_roots: Vec<String> = selected
            .iter()
            .filter(|p| !p.root_id.is_empty())
            .map(|p| p.root_id.clone())
            .filter(|root_id| !selected.iter().any(|p| &p.id == root_id))
            .collect();
        missing_roots.sort();
        missing_roots.dedup();

        for root_id in missing_roots {
            let root = match list.posts.get(&root_id) {
                Some(p) => p.clone(),
                None => self
                    .get_json::<ApiPost>(&format!("/posts/{}", root_id))
                    .await
                    .with_context(|| format!("loading root post {}", root_id))?,
            };
            selected.push(root);
        }

        selected.sort_by_key(|p| p.create_at);
        Ok(selected.into_iter().map(ApiPost::into_post).collect())
    }

    async fn is_user_following_post(&self, post_id: &str, user_id: &str) -> Result<bool> {
        let following = sqlx::query_scalar::<_, bool>(
            "SELECT following FROM threadmemberships WHERE postid = $1 AND userid = $2",
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(following.unwrap_or(false))
    }

    async fn get_user_statuses(&self) -> Result<HashMap<String, String>> {
        let ids = self.all_user_ids().await?;
        let mut statuses = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(PAGE_SIZE) {
            let url = format!("{}/api/v4/users/status/ids", self.base_url);
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.token)
                .json(chunk)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(AppError::Backend(format!(
                    "POST /users/status/ids returned {}",
                    status
                )));
            }
            let batch: Vec<ApiStatus> = response.json().await?;
            statuses.extend(batch.into_iter().map(|s| (s.user_id, s.status)));
        }
        Ok(statuses)
    }

    async fn send_email(&self, user: &User, subject: &str, body: &str) -> Result<()> {
        self.email.send_mail(&user.email, subject, body).await
    }

    async fn get_last_notified_timestamp(&self) -> Result<DateTime<Utc>> {
        self.store.last_notified_timestamp().await
    }

    async fn set_last_notified_timestamp(&self, at: DateTime<Utc>) -> Result<()> {
        self.store.set_last_notified_timestamp(at).await
    }

    async fn get_preferences_for_user(&self, user_id: &str) -> Result<UserPreferences> {
        self.store.preferences_for_user(user_id).await
    }

    async fn modify_preferences_for_user(
        &self,
        user_id: &str,
        change: PreferenceChange,
    ) -> Result<UserPreferences> {
        self.store.modify_preferences_for_user(user_id, change).await
    }

    async fn reset_preferences_for_user(&self, user_id: &str) -> Result<UserPreferences> {
        self.store.reset_preferences_for_user(user_id).await
    }

    async fn reset_all_preferences(&self) -> Result<()> {
        self.store.reset_all_preferences().await
    }
}
