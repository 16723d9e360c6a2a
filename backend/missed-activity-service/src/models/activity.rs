use super::{Channel, Post, Team, User};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One thread as reconstructed for a user: a root post plus the replies accepted so far.
#[derive(Debug, Clone, Serialize)]
pub struct UnreadConversation {
    pub root: Post,
    pub replies: Vec<Post>,
    pub following: bool,
    pub is_root_unread: bool,
    pub most_recent_message: DateTime<Utc>,
}

impl UnreadConversation {
    pub fn new(root: Post, following: bool, is_root_unread: bool) -> Self {
        let most_recent_message = root.created_at;
        Self {
            root,
            replies: Vec::new(),
            following,
            is_root_unread,
            most_recent_message,
        }
    }

    pub fn add_reply(&mut self, reply: Post) {
        if reply.created_at > self.most_recent_message {
            self.most_recent_message = reply.created_at;
        }
        self.replies.push(reply);
    }

    pub fn has_replies(&self) -> bool {
        !self.replies.is_empty()
    }

    /// Number of messages a reader would see for this thread.
    pub fn message_count(&self) -> usize {
        self.replies.len() + usize::from(self.is_root_unread)
    }
}

/// Why a message was left out of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Suppression {
    SelfAuthored,
    ExcludedKind,
    ReplyInNotFollowedThread,
    NotifiedByPlatform,
    PreviouslyNotified,
}

impl Suppression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Suppression::SelfAuthored => "self_authored",
            Suppression::ExcludedKind => "excluded_kind",
            Suppression::ReplyInNotFollowedThread => "reply_in_not_followed_thread",
            Suppression::NotifiedByPlatform => "notified_by_platform",
            Suppression::PreviouslyNotified => "previously_notified",
        }
    }
}

/// One channel's report for one user.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelMissedActivity {
    pub channel: Channel,
    pub user: User,
    pub conversations: Vec<UnreadConversation>,
    pub replies_in_not_followed_threads: u32,
    pub notified_by_platform: u32,
    pub previously_notified: u32,
    pub logs: Vec<String>,
}

impl ChannelMissedActivity {
    pub fn new(channel: Channel, user: User) -> Self {
        Self {
            channel,
            user,
            conversations: Vec::new(),
            replies_in_not_followed_threads: 0,
            notified_by_platform: 0,
            previously_notified: 0,
            logs: Vec::new(),
        }
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    pub fn name(&self) -> String {
        self.channel.name_for(&self.user)
    }

    pub fn message_count(&self) -> usize {
        self.conversations.iter().map(|c| c.message_count()).sum()
    }
}

/// All channel reports of one (user, team) pair.
#[derive(Debug, Clone, Serialize)]
pub struct TeamMissedActivity {
    pub team: Team,
    pub user: User,
    pub channels: Vec<ChannelMissedActivity>,
    pub logs: Vec<String>,
}

impl TeamMissedActivity {
    pub fn new(team: Team, user: User) -> Self {
        Self {
            team,
            user,
            channels: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    pub fn conversation_count(&self) -> usize {
        self.channels.iter().map(|c| c.conversations.len()).sum()
    }

    pub fn message_count(&self) -> usize {
        self.channels.iter().map(|c| c.message_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(id: &str, root_id: &str, minute: u32) -> Post {
        Post {
            id: id.into(),
            message: String::new(),
            author_id: "author".into(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap(),
            root_id: root_id.into(),
            kind: String::new(),
            from_bot: false,
            is_system_message: false,
            is_deleted: false,
        }
    }

    #[test]
    fn test_most_recent_never_decreases() {
        let mut conv = UnreadConversation::new(post("r", "", 10), false, true);
        assert_eq!(conv.most_recent_message, conv.root.created_at);

        conv.add_reply(post("a", "r", 30));
        let after_late = conv.most_recent_message;
        conv.add_reply(post("b", "r", 20));

        assert_eq!(conv.most_recent_message, after_late);
        assert_eq!(conv.replies.len(), 2);
        assert!(conv.most_recent_message >= conv.root.created_at);
    }

    #[test]
    fn test_message_count_includes_unread_root() {
        let mut conv = UnreadConversation::new(post("r", "", 10), false, false);
        conv.add_reply(post("a", "r", 11));
        assert_eq!(conv.message_count(), 1);

        conv.is_root_unread = true;
        assert_eq!(conv.message_count(), 2);
    }
}
