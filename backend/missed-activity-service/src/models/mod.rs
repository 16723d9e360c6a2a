mod activity;
mod channel;
mod post;
mod preferences;
mod user;

pub use activity::{
    ChannelMissedActivity, Suppression, TeamMissedActivity, UnreadConversation,
};
pub use channel::{Channel, ChannelKind, ChannelMembership};
pub use post::{message_mentions, Post};
pub use preferences::{PreferenceKey, UserPreferences};
pub use user::{Team, User};
