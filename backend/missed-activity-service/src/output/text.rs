use super::{author_name, relative_time, AuthorNames};
use crate::models::{
    message_mentions, ChannelMissedActivity, Post, TeamMissedActivity, UnreadConversation, User,
};
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Audit-style plaintext dump of one report, including counters and logs.
pub fn render_text(report: &TeamMissedActivity, authors: &AuthorNames, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Team: {} | User: {} (@{})",
        report.team.name,
        report.user.display_name(),
        report.user.username
    );

    for channel in &report.channels {
        render_channel(&mut out, channel, authors, now);
    }

    if !report.logs.is_empty() {
        let _ = writeln!(out, "Team log:");
        for line in &report.logs {
            let _ = writeln!(out, "  - {}", line);
        }
    }
    out
}

fn render_channel(
    out: &mut String,
    channel: &ChannelMissedActivity,
    authors: &AuthorNames,
    now: DateTime<Utc>,
) {
    let _ = writeln!(out, "  Channel: {}", channel.name());

    for conversation in &channel.conversations {
        render_conversation(out, conversation, &channel.user, authors, now);
    }

    let _ = writeln!(
        out,
        "    Replies in threads not followed: {}",
        channel.replies_in_not_followed_threads
    );
    let _ = writeln!(
        out,
        "    Already notified by the platform: {}",
        channel.notified_by_platform
    );
    let _ = writeln!(out, "    Previously notified: {}", channel.previously_notified);

    if !channel.logs.is_empty() {
        let _ = writeln!(out, "    Log:");
        for line in &channel.logs {
            let _ = writeln!(out, "      - {}", line);
        }
    }
}

fn render_conversation(
    out: &mut String,
    conversation: &UnreadConversation,
    user: &User,
    authors: &AuthorNames,
    now: DateTime<Utc>,
) {
    let mut markers = Vec::new();
    if conversation.following {
        markers.push("following".to_string());
    }
    if conversation.is_root_unread {
        markers.push("unread".to_string());
    }
    let _ = writeln!(
        out,
        "    Thread {} (last activity {}){}",
        conversation.root.id,
        relative_time(conversation.most_recent_message, now),
        format_markers(&markers)
    );

    render_post(out, "      ", &conversation.root, user, authors, now);
    for reply in &conversation.replies {
        render_post(out, "        > ", reply, user, authors, now);
    }
}

fn render_post(
    out: &mut String,
    indent: &str,
    post: &Post,
    user: &User,
    authors: &AuthorNames,
    now: DateTime<Utc>,
) {
    let mut markers = Vec::new();
    if message_mentions(&post.message, &user.username) {
        markers.push("mention".to_string());
    }
    if !post.kind.is_empty() {
        markers.push(format!("type {}", post.kind));
    }

    let _ = writeln!(
        out,
        "{}[{}, {}] {}: {}{}",
        indent,
        post.created_at.format("%Y-%m-%d %H:%M"),
        relative_time(post.created_at, now),
        author_name(authors, &post.author_id),
        post.message,
        format_markers(&markers)
    );
}

fn format_markers(markers: &[String]) -> String {
    if markers.is_empty() {
        return String::new();
    }
    format!(" [{}]", markers.join(", "))
}
