//! Plaintext rendering of reports and report emails.

mod email;
mod text;

pub use email::{render_email, EmailContext, RenderedEmail};
pub use text::render_text;

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Author display names by user id; unknown ids render as the raw id.
pub type AuthorNames = HashMap<String, String>;

pub(crate) fn author_name<'a>(authors: &'a AuthorNames, author_id: &'a str) -> &'a str {
    authors
        .get(author_id)
        .map(String::as_str)
        .unwrap_or(author_id)
}

/// "3 minutes ago" style age of `at` relative to `now`.
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds();
    if secs < 60 {
        return "just now".to_string();
    }

    let (value, unit) = match secs {
        s if s < 3_600 => (s / 60, "minute"),
        s if s < 86_400 => (s / 3_600, "hour"),
        s => (s / 86_400, "day"),
    };
    if value == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", value, unit)
    }
}
