use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Serialize)]
pub struct EmailSummary {
    pub user_id: String,
    pub username: String,
    pub team: String,
    pub subject: String,
    pub conversations: usize,
    pub messages: usize,
    pub sent: bool,
}

/// What one scheduled run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunLog {
    pub run: u64,
    pub executed_at: DateTime<Utc>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub dry_run: bool,
    pub reports: Vec<String>,
    pub emails: Vec<EmailSummary>,
}

#[derive(Debug, Default)]
struct Inner {
    last_run: u64,
    runs: VecDeque<RunLog>,
    emails_sent: HashMap<String, VecDeque<DateTime<Utc>>>,
}

/// Bounded in-memory history of runs and of emails sent per user.
#[derive(Debug)]
pub struct RunStats {
    keep: usize,
    inner: RwLock<Inner>,
}

impl RunStats {
    pub fn new(keep: usize) -> Self {
        Self {
            keep: keep.max(1),
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn next_run_number(&self) -> u64 {
        let mut inner = self.inner.write();
        inner.last_run += 1;
        inner.last_run
    }

    pub fn record_run(&self, log: RunLog) {
        let mut inner = self.inner.write();
        inner.runs.push_back(log);
        while inner.runs.len() > self.keep {
            inner.runs.pop_front();
        }
    }

    pub fn record_email_sent(&self, user_id: &str, at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        let sent = inner.emails_sent.entry(user_id.to_string()).or_default();
        sent.push_back(at);
        while sent.len() > self.keep {
            sent.pop_front();
        }
    }

    /// Newest first.
    pub fn runs(&self) -> Vec<RunLog> {
        self.inner.read().runs.iter().rev().cloned().collect()
    }

    pub fn emails_sent_to(&self, user_id: &str) -> Vec<DateTime<Utc>> {
        self.inner
            .read()
            .emails_sent
            .get(user_id)
            .map(|sent| sent.iter().copied().collect())
            .unwrap_or_default()
    }
}
