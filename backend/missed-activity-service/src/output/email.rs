use super::{author_name, AuthorNames};
use crate::config::EmailTemplateConfig;
use crate::models::{ChannelMissedActivity, Post, TeamMissedActivity};
use serde::Serialize;
use std::fmt::Write;

/// Site-wide values shared by all report emails.
#[derive(Debug, Clone)]
pub struct EmailContext {
    pub site_name: String,
    pub site_url: String,
    pub template: EmailTemplateConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

impl EmailContext {
    fn permalink(&self, team_slug: Option<&str>, post_id: &str) -> String {
        match team_slug {
            Some(slug) if !slug.is_empty() => format!("{}/{}/pl/{}", self.site_url, slug, post_id),
            _ => format!("{}/_redirect/pl/{}", self.site_url, post_id),
        }
    }
}

/// Email for one report, or `None` when it holds no conversation.
///
/// `link_team` is the URL name used in permalinks of the Direct Messages
/// pseudo-team, normally the user's first real team.
pub fn render_email(
    report: &TeamMissedActivity,
    ctx: &EmailContext,
    authors: &AuthorNames,
    link_team: Option<&str>,
) -> Option<RenderedEmail> {
    if report.conversation_count() == 0 {
        return None;
    }

    let direct = report.team.is_direct_messages();
    let (subject, title) = if direct {
        (
            format!("[{}] Unread direct messages", ctx.site_name),
            format!("Missed Direct Messages in {}", ctx.site_name),
        )
    } else {
        (
            format!("[{}] Recent activity in {}", ctx.site_name, report.team.name),
            format!("Missed Activity in the {} team", report.team.name),
        )
    };
    let team_slug = if direct {
        link_team
    } else {
        Some(report.team.slug.as_str())
    };

    let mut body = String::new();
    let _ = writeln!(body, "{}", title);
    let _ = writeln!(body, "{}", ctx.template.subtitle);
    let _ = writeln!(body);

    let mut channels: Vec<&ChannelMissedActivity> = report.channels.iter().collect();
    channels.sort_by(|a, b| {
        b.conversations
            .len()
            .cmp(&a.conversations.len())
            .then_with(|| a.name().cmp(&b.name()))
    });

    for channel in channels {
        let _ = writeln!(body, "{} ({} new)", channel.name(), channel.message_count());
        for conversation in &channel.conversations {
            if conversation.is_root_unread {
                write_message(&mut body, "  ", &conversation.root, ctx, authors, team_slug);
            } else {
                let _ = writeln!(
                    body,
                    "  In reply to {}: {}",
                    author_name(authors, &conversation.root.author_id),
                    conversation.root.message
                );
            }
            for reply in &conversation.replies {
                write_message(&mut body, "    ", reply, ctx, authors, team_slug);
            }
        }
        let _ = writeln!(body);
    }

    let _ = writeln!(
        body,
        "{}: {}",
        ctx.template.button_text, ctx.site_url
    );
    for line in &ctx.template.footer_lines {
        let _ = writeln!(body, "{}", line);
    }

    Some(RenderedEmail { subject, body })
}

fn write_message(
    body: &mut String,
    indent: &str,
    post: &Post,
    ctx: &EmailContext,
    authors: &AuthorNames,
    team_slug: Option<&str>,
) {
    let _ = writeln!(
        body,
        "{}{} {}: {}",
        indent,
        post.created_at.format("%H:%M"),
        author_name(authors, &post.author_id),
        post.message
    );
    let _ = writeln!(body, "{}  {}", indent, ctx.permalink(team_slug, &post.id));
}
