use super::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Channel type as reported by the platform ("O", "P", "D", "G").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    Open,
    Private,
    Direct,
    Group,
}

impl ChannelKind {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "O" => Some(ChannelKind::Open),
            "P" => Some(ChannelKind::Private),
            "D" => Some(ChannelKind::Direct),
            "G" => Some(ChannelKind::Group),
            _ => None,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            ChannelKind::Open => "O",
            ChannelKind::Private => "P",
            ChannelKind::Direct => "D",
            ChannelKind::Group => "G",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub display_name: String,
    /// Display names of the members; only populated for direct and group channels.
    pub members: Vec<String>,
    pub kind: ChannelKind,
    /// Empty for direct and group channels.
    pub team_id: String,
}

impl Channel {
    pub fn is_direct(&self) -> bool {
        self.kind == ChannelKind::Direct
    }

    pub fn is_group(&self) -> bool {
        self.kind == ChannelKind::Group
    }

    pub fn is_direct_or_group(&self) -> bool {
        self.is_direct() || self.is_group()
    }

    /// Name of the channel as seen by `user`.
    pub fn name_for(&self, user: &User) -> String {
        if self.is_direct_or_group() {
            let me = user.display_name();
            let others: Vec<&str> = self
                .members
                .iter()
                .filter(|m| **m != me)
                .map(String::as_str)
                .collect();
            return format!("Chat with {}", others.join(", "));
        }

        if !self.display_name.is_empty() {
            return self.display_name.clone();
        }

        "INVALID NAME".to_string()
    }
}

/// A user's membership in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMembership {
    pub channel: Channel,
    pub user: User,
    pub last_read_at: DateTime<Utc>,
    pub notify_props: HashMap<String, String>,
}

impl ChannelMembership {
    pub fn is_muted(&self) -> bool {
        self.notify_props
            .get("mark_unread")
            .map(|v| v == "mention")
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserPreferences;

    fn user(first: &str, last: &str) -> User {
        User {
            id: "u1".into(),
            username: "alice".into(),
            first_name: first.into(),
            last_name: last.into(),
            email: String::new(),
            email_verified: true,
            active: true,
            roles: vec![],
            is_bot: false,
            emails_enabled: true,
            preferences: UserPreferences::default(),
        }
    }

    fn channel(kind: ChannelKind, display_name: &str, members: &[&str]) -> Channel {
        Channel {
            id: "c1".into(),
            display_name: display_name.into(),
            members: members.iter().map(|m| m.to_string()).collect(),
            kind,
            team_id: String::new(),
        }
    }

    #[test]
    fn test_kind_codes() {
        for code in ["O", "P", "D", "G"] {
            assert_eq!(ChannelKind::from_code(code).unwrap().as_code(), code);
        }
        assert!(ChannelKind::from_code("X").is_none());
    }

    #[test]
    fn test_direct_channel_name_excludes_viewer() {
        let ch = channel(ChannelKind::Group, "", &["Alice Liddell", "Bob", "Carol"]);
        assert_eq!(ch.name_for(&user("Alice", "Liddell")), "Chat with Bob, Carol");
    }

    #[test]
    fn test_open_channel_name() {
        let ch = channel(ChannelKind::Open, "Town Square", &[]);
        assert_eq!(ch.name_for(&user("", "")), "Town Square");

        let unnamed = channel(ChannelKind::Private, "", &[]);
        assert_eq!(unnamed.name_for(&user("", "")), "INVALID NAME");
    }

    #[test]
    fn test_muted() {
        let mut membership = ChannelMembership {
            channel: channel(ChannelKind::Open, "general", &[]),
            user: user("", ""),
            last_read_at: Utc::now(),
            notify_props: HashMap::new(),
        };
        assert!(!membership.is_muted());

        membership
            .notify_props
            .insert("mark_unread".into(), "all".into());
        assert!(!membership.is_muted());

        membership
            .notify_props
            .insert("mark_unread".into(), "mention".into());
        assert!(membership.is_muted());
    }
}
