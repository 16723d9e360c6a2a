//! Missed-activity computation.
//!
//! For every notifiable user, each team (plus the Direct Messages pseudo-team) and
//! each non-muted channel membership, the engine loads the unread post window,
//! rebuilds threads and runs every post through an ordered exclusion chain:
//!
//! 1. authored by the user
//! 2. system or bot message the user opted out of
//! 3. reply in a thread the user does not follow
//! 4. already delivered by the platform's real-time notifier
//! 5. already covered by a previous report (at or before the watermark)
//!
//! The order matters: each excluded post bumps at most one counter.

use crate::backend::Backend;
use crate::config::PlatformTriggers;
use crate::error::{AppError, Result, ResultExt};
use crate::metrics;
use crate::models::{
    message_mentions, ChannelMembership, ChannelMissedActivity, Post, Suppression, Team,
    TeamMissedActivity, UnreadConversation, User,
};
use crate::presence::{PresenceTracker, UserStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Time window of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Posts before this are never loaded
    pub lower_bound: DateTime<Utc>,
    /// Posts at or before this were covered by an earlier report
    pub last_notified: DateTime<Utc>,
    pub upper_bound: DateTime<Utc>,
}

pub struct MissedActivityEngine {
    backend: Arc<dyn Backend>,
    presence: Arc<PresenceTracker>,
    triggers: PlatformTriggers,
}

impl MissedActivityEngine {
    pub fn new(
        backend: Arc<dyn Backend>,
        presence: Arc<PresenceTracker>,
        triggers: PlatformTriggers,
    ) -> Self {
        Self {
            backend,
            presence,
            triggers,
        }
    }

    pub async fn run(&self, options: RunOptions) -> Result<Vec<TeamMissedActivity>> {
        let users = self
            .backend
            .get_notifiable_users()
            .await
            .context("getting notifiable users")?;

        info!(
            users = users.len(),
            from = %options.last_notified,
            to = %options.upper_bound,
            "Computing missed activity"
        );

        let mut reports = Vec::new();
        for user in &users {
            let user_reports = self
                .process_user(user, &options)
                .await
                .with_context(|| format!("processing user {}", user.id))?;
            reports.extend(user_reports);
        }
        Ok(reports)
    }

    async fn process_user(
        &self,
        user: &User,
        options: &RunOptions,
    ) -> Result<Vec<TeamMissedActivity>> {
        let mut teams = self
            .backend
            .get_teams_for_user(&user.id)
            .await
            .context("getting teams")?;
        teams.retain(|t| !t.is_direct_messages());
        teams.push(Team::direct_messages());

        let mut reports = Vec::new();
        for team in teams {
            let team_id = team.id.clone();
            if let Some(report) = self
                .process_team(user, team, options)
                .await
                .with_context(|| format!("processing team '{}'", team_id))?
            {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    async fn process_team(
        &self,
        user: &User,
        team: Team,
        options: &RunOptions,
    ) -> Result<Option<TeamMissedActivity>> {
        let include_direct = team.is_direct_messages();
        let memberships = self
            .backend
            .get_channel_memberships_for_user(&team.id, &user.id, include_direct)
            .await
            .context("getting channel memberships")?;

        let mut report = TeamMissedActivity::new(team, user.clone());
        for membership in &memberships {
            if membership.is_muted() {
                debug!(
                    user_id = %user.id,
                    channel_id = %membership.channel.id,
                    "Skipping muted channel"
                );
                continue;
            }

            if let Some(channel) = self
                .process_channel(user, membership, options)
                .await
                .with_context(|| format!("processing channel {}", membership.channel.id))?
            {
                report.log(format!(
                    "{}: {} conversation(s)",
                    channel.name(),
                    channel.conversations.len()
                ));
                report.channels.push(channel);
            }
        }

        if report.channels.is_empty() {
            return Ok(None);
        }
        Ok(Some(report))
    }

    /// Builds the report of one channel, or `None` when nothing is left to show.
    pub async fn process_channel(
        &self,
        user: &User,
        membership: &ChannelMembership,
        options: &RunOptions,
    ) -> Result<Option<ChannelMissedActivity>> {
        let from = membership.last_read_at.max(options.lower_bound);
        let posts = self
            .backend
            .get_channel_posts(
                &membership.channel.id,
                from.timestamp_millis(),
                options.upper_bound.timestamp_millis(),
            )
            .await
            .context("getting channel posts")?;

        let mut activity = ChannelMissedActivity::new(membership.channel.clone(), user.clone());
        let mut conversations: Vec<UnreadConversation> = Vec::new();
        let mut by_root: HashMap<String, usize> = HashMap::new();

        for root in posts.iter().filter(|p| p.is_root()) {
            if by_root.contains_key(&root.id) {
                continue;
            }
            let following = self
                .backend
                .is_user_following_post(&root.id, &user.id)
                .await
                .with_context(|| format!("checking whether thread {} is followed", root.id))?;
            // Deleted roots only give context to their replies
            let unread = !root.is_deleted && root.created_at > membership.last_read_at;

            by_root.insert(root.id.clone(), conversations.len());
            conversations.push(UnreadConversation::new(root.clone(), following, unread));
        }

        for reply in posts.iter().filter(|p| p.is_reply()) {
            let idx = *by_root
                .get(&reply.root_id)
                .ok_or_else(|| AppError::MissingRootPost {
                    post_id: reply.id.clone(),
                    root_id: reply.root_id.clone(),
                })?;

            let conversation = &mut conversations[idx];
            if self.is_eligible(reply, conversation.following, user, options, &mut activity) {
                conversation.add_reply(reply.clone());
            }
        }

        for conversation in conversations {
            let root_eligible = !conversation.root.is_deleted
                && self.is_eligible(
                    &conversation.root,
                    conversation.following,
                    user,
                    options,
                    &mut activity,
                );
            if (root_eligible && conversation.is_root_unread) || conversation.has_replies() {
                activity.conversations.push(conversation);
            }
        }

        // Stable: equal timestamps keep the order the roots were returned in
        activity
            .conversations
            .sort_by_key(|c| c.most_recent_message);

        if activity.conversations.is_empty() {
            return Ok(None);
        }
        Ok(Some(activity))
    }

    fn is_eligible(
        &self,
        post: &Post,
        following: bool,
        user: &User,
        options: &RunOptions,
        activity: &mut ChannelMissedActivity,
    ) -> bool {
        match self.suppression(post, following, user, options, activity) {
            None => true,
            Some(reason) => {
                metrics::record_suppressed(reason.as_str());
                false
            }
        }
    }

    fn suppression(
        &self,
        post: &Post,
        following: bool,
        user: &User,
        options: &RunOptions,
        activity: &mut ChannelMissedActivity,
    ) -> Option<Suppression> {
        let prefs = &user.preferences;

        if post.author_id == user.id {
            activity.log(format!("{}: skipped, written by the user", post.id));
            return Some(Suppression::SelfAuthored);
        }

        if (post.is_system_message && !prefs.include_system_messages)
            || (post.from_bot && !prefs.include_bot_messages)
        {
            activity.log(format!("{}: skipped, system or bot message", post.id));
            return Some(Suppression::ExcludedKind);
        }

        if post.is_reply() && !following && !prefs.notify_replies_in_not_followed_threads {
            if prefs.count_replies_in_not_followed_threads {
                activity.replies_in_not_followed_threads += 1;
            }
            activity.log(format!("{}: skipped, reply in a thread not followed", post.id));
            return Some(Suppression::ReplyInNotFollowedThread);
        }

        let platform_notifies = (self.triggers.mention
            && message_mentions(&post.message, &user.username))
            || (self.triggers.direct_or_group && activity.channel.is_direct_or_group())
            || (self.triggers.followed_thread && following);
        if platform_notifies {
            let status = self
                .presence
                .status_at(&user.id, post.created_at.timestamp_millis());
            if status == UserStatus::Online {
                if prefs.count_notified_by_platform {
                    activity.notified_by_platform += 1;
                }
                activity.log(format!(
                    "{}: skipped, user was online and notified by the platform",
                    post.id
                ));
                return Some(Suppression::NotifiedByPlatform);
            }
        }

        if post.created_at <= options.last_notified {
            if prefs.count_previously_notified {
                activity.previously_notified += 1;
            }
            activity.log(format!("{}: skipped, covered by an earlier report", post.id));
            return Some(Suppression::PreviouslyNotified);
        }

        None
    }
}
