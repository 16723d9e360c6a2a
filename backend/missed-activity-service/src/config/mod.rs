use crate::error::{AppError, Result};
use crate::models::UserPreferences;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub platform: PlatformConfig,
    pub redis: RedisConfig,
    pub smtp: SmtpConfig,
    pub job: JobConfig,
    pub email: EmailTemplateConfig,
    pub default_preferences: UserPreferences,
    pub triggers: PlatformTriggers,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub url: String,
    pub token: String,
    /// Platform Postgres, used for thread memberships
    pub database_url: String,
    pub database_max_connections: u32,
    pub site_name: String,
    pub site_url: String,
    pub require_email_verification: bool,
    pub cache_ttl_secs: u64,
    pub status_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// None keeps state in memory only
    pub url: Option<String>,
    pub state_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Empty host disables sending
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub from: String,
    pub starttls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub run_interval_minutes: u64,
    pub ignore_messages_newer_than_minutes: i64,
    pub keep_status_history_hours: i64,
    pub run_stats_to_keep: usize,
    pub status_sample_interval_secs: u64,
    pub dry_run: bool,
    pub reset_last_notification_timestamp: bool,
    pub notify_only_new_messages_from_startup: bool,
}

impl JobConfig {
    pub fn run_interval(&self) -> Duration {
        Duration::from_secs(self.run_interval_minutes * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplateConfig {
    pub subtitle: String,
    pub button_text: String,
    pub footer_lines: Vec<String>,
}

/// Conditions under which the platform's own notifier is assumed to have reached
/// an online user in real time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformTriggers {
    pub mention: bool,
    pub direct_or_group: bool,
    pub followed_thread: bool,
}

impl Default for PlatformTriggers {
    fn default() -> Self {
        Self {
            mention: true,
            direct_or_group: true,
            followed_thread: true,
        }
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| AppError::Config(format!("{} must be set", name)))
}

fn string_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("invalid value for {}: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let run_interval_minutes: u64 = parse_or("RUN_INTERVAL_MINUTES", 60)?;
        if run_interval_minutes == 0 {
            return Err(AppError::Config(
                "RUN_INTERVAL_MINUTES must be greater than zero".to_string(),
            ));
        }

        let url = required("MATTERMOST_URL")?.trim_end_matches('/').to_string();
        let site_url = string_or("SITE_URL", &url).trim_end_matches('/').to_string();

        let defaults = UserPreferences::default();

        Ok(Config {
            app: AppConfig {
                env: string_or("APP_ENV", "development"),
                port: parse_or("PORT", 8080)?,
            },
            platform: PlatformConfig {
                token: required("MATTERMOST_TOKEN")?,
                database_url: required("DATABASE_URL")?,
                database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5)?,
                site_name: string_or("SITE_NAME", "Mattermost"),
                site_url,
                url,
                require_email_verification: parse_or("REQUIRE_EMAIL_VERIFICATION", false)?,
                cache_ttl_secs: parse_or("CACHE_TTL_SECS", run_interval_minutes * 30)?,
                status_cache_ttl_secs: parse_or("STATUS_CACHE_TTL_SECS", 30)?,
            },
            redis: RedisConfig {
                url: std::env::var("REDIS_URL").ok().filter(|u| !u.is_empty()),
                state_key: string_or("REDIS_STATE_KEY", "missed_activity:state"),
            },
            smtp: SmtpConfig {
                host: string_or("SMTP_HOST", ""),
                port: parse_or("SMTP_PORT", 587)?,
                username: string_or("SMTP_USERNAME", ""),
                password: string_or("SMTP_PASSWORD", ""),
                from: string_or("SMTP_FROM", "noreply@localhost"),
                starttls: parse_or("SMTP_STARTTLS", true)?,
            },
            job: JobConfig {
                run_interval_minutes,
                ignore_messages_newer_than_minutes: parse_or(
                    "IGNORE_MESSAGES_NEWER_THAN_MINUTES",
                    5,
                )?,
                keep_status_history_hours: parse_or("KEEP_STATUS_HISTORY_HOURS", 48)?,
                run_stats_to_keep: parse_or("RUN_STATS_TO_KEEP", 10)?,
                status_sample_interval_secs: parse_or("STATUS_SAMPLE_INTERVAL_SECS", 60)?,
                dry_run: parse_or("DRY_RUN", false)?,
                reset_last_notification_timestamp: parse_or(
                    "RESET_LAST_NOTIFICATION_TIMESTAMP",
                    false,
                )?,
                notify_only_new_messages_from_startup: parse_or(
                    "NOTIFY_ONLY_NEW_MESSAGES_FROM_STARTUP",
                    false,
                )?,
            },
            email: EmailTemplateConfig {
                subtitle: string_or(
                    "EMAIL_SUBTITLE",
                    "Here are the conversations you missed since your last visit.",
                ),
                button_text: string_or("EMAIL_BUTTON_TEXT", "Open"),
                footer_lines: ["EMAIL_FOOTER_LINE1", "EMAIL_FOOTER_LINE2", "EMAIL_FOOTER_LINE3"]
                    .iter()
                    .filter_map(|name| std::env::var(name).ok())
                    .filter(|line| !line.is_empty())
                    .collect(),
            },
            default_preferences: UserPreferences {
                enabled: parse_or("DEFAULT_PREF_ENABLED", defaults.enabled)?,
                notify_replies_in_not_followed_threads: parse_or(
                    "DEFAULT_PREF_NOTIFY_NOT_FOLLOWED",
                    defaults.notify_replies_in_not_followed_threads,
                )?,
                count_replies_in_not_followed_threads: parse_or(
                    "DEFAULT_PREF_COUNT_NOT_FOLLOWED",
                    defaults.count_replies_in_not_followed_threads,
                )?,
                count_notified_by_platform: parse_or(
                    "DEFAULT_PREF_COUNT_NOTIFIED_BY_PLATFORM",
                    defaults.count_notified_by_platform,
                )?,
                count_previously_notified: parse_or(
                    "DEFAULT_PREF_COUNT_PREVIOUSLY_NOTIFIED",
                    defaults.count_previously_notified,
                )?,
                include_system_messages: parse_or(
                    "DEFAULT_PREF_INCLUDE_SYSTEM_MESSAGES",
                    defaults.include_system_messages,
                )?,
                include_bot_messages: parse_or(
                    "DEFAULT_PREF_INCLUDE_BOT_MESSAGES",
                    defaults.include_bot_messages,
                )?,
            },
            triggers: PlatformTriggers {
                mention: parse_or("PLATFORM_NOTIFY_ON_MENTION", true)?,
                direct_or_group: parse_or("PLATFORM_NOTIFY_ON_DIRECT", true)?,
                followed_thread: parse_or("PLATFORM_NOTIFY_ON_FOLLOWED", true)?,
            },
        })
    }
}
