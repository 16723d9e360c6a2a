use super::UserPreferences;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub email_verified: bool,
    pub active: bool,
    pub roles: Vec<String>,
    pub is_bot: bool,
    /// Platform-level email notification switch
    pub emails_enabled: bool,
    pub preferences: UserPreferences,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == "system_admin")
    }

    pub fn display_name(&self) -> String {
        if !self.first_name.is_empty() || !self.last_name.is_empty() {
            return format!("{} {}", self.first_name, self.last_name);
        }
        self.username.clone()
    }

    /// Whether a missed-activity report may be sent to this user at all.
    pub fn is_notifiable(&self, require_email_verification: bool) -> bool {
        !self.is_bot
            && self.preferences.enabled
            && (self.email_verified || !require_email_verification)
            && self.emails_enabled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    /// Display name
    pub name: String,
    /// URL name, used in permalinks
    pub slug: String,
}

impl Team {
    pub const DIRECT_MESSAGES_NAME: &'static str = "Direct Messages";

    /// Pseudo-team grouping a user's direct and group channels, which belong to no team.
    pub fn direct_messages() -> Self {
        Self {
            id: String::new(),
            name: Self::DIRECT_MESSAGES_NAME.to_string(),
            slug: String::new(),
        }
    }

    pub fn is_direct_messages(&self) -> bool {
        self.id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "u1".into(),
            username: "alice".into(),
            first_name: String::new(),
            last_name: String::new(),
            email: "alice@example.com".into(),
            email_verified: true,
            active: true,
            roles: vec!["system_user".into()],
            is_bot: false,
            emails_enabled: true,
            preferences: UserPreferences::default(),
        }
    }

    #[test]
    fn test_display_name() {
        let mut u = user();
        assert_eq!(u.display_name(), "alice");
        u.first_name = "Alice".into();
        u.last_name = "Liddell".into();
        assert_eq!(u.display_name(), "Alice Liddell");
    }

    #[test]
    fn test_is_admin() {
        let mut u = user();
        assert!(!u.is_admin());
        u.roles.push("system_admin".into());
        assert!(u.is_admin());
    }

    #[test]
    fn test_notifiable() {
        let u = user();
        assert!(u.is_notifiable(true));

        let mut bot = user();
        bot.is_bot = true;
        assert!(!bot.is_notifiable(false));

        let mut disabled = user();
        disabled.preferences.enabled = false;
        assert!(!disabled.is_notifiable(false));

        let mut unverified = user();
        unverified.email_verified = false;
        assert!(unverified.is_notifiable(false));
        assert!(!unverified.is_notifiable(true));

        let mut no_email = user();
        no_email.emails_enabled = false;
        assert!(!no_email.is_notifiable(false));
    }

    #[test]
    fn test_direct_messages_team() {
        let team = Team::direct_messages();
        assert!(team.is_direct_messages());
        assert_eq!(team.name, "Direct Messages");
    }
}
