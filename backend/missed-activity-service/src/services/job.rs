//! Scheduled missed-activity runs and presence sampling.

use super::missed_activity::{MissedActivityEngine, RunOptions};
use super::run_stats::{EmailSummary, RunLog, RunStats};
use crate::backend::Backend;
use crate::config::JobConfig;
use crate::error::{Result, ResultExt};
use crate::metrics;
use crate::models::TeamMissedActivity;
use crate::output::{render_email, render_text, AuthorNames, EmailContext, RenderedEmail};
use crate::presence::{PresenceError, PresenceTracker, StatusSample};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval_at, Instant};
use tracing::{error, info, warn};

/// A report rendered for inspection, without sending anything.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedReport {
    pub user_id: String,
    pub username: String,
    pub team: String,
    pub text: String,
    pub email: Option<RenderedEmail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPresenceReport {
    pub user_id: String,
    pub username: String,
    pub history: Vec<StatusSample>,
    pub emails_sent: Vec<DateTime<Utc>>,
}

pub struct MissedActivityJob {
    backend: Arc<dyn Backend>,
    engine: MissedActivityEngine,
    presence: Arc<PresenceTracker>,
    stats: Arc<RunStats>,
    config: JobConfig,
    email: EmailContext,
    started_at: DateTime<Utc>,
    run_lock: Mutex<()>,
}

impl MissedActivityJob {
    pub fn new(
        backend: Arc<dyn Backend>,
        engine: MissedActivityEngine,
        presence: Arc<PresenceTracker>,
        config: JobConfig,
        email: EmailContext,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stats: Arc::new(RunStats::new(config.run_stats_to_keep)),
            backend,
            engine,
            presence,
            config,
            email,
            started_at,
            run_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn stats(&self) -> &Arc<RunStats> {
        &self.stats
    }

    pub fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    /// Applies the startup watermark options. Returns true when a run is overdue.
    pub async fn prepare(&self, now: DateTime<Utc>) -> Result<bool> {
        if self.config.reset_last_notification_timestamp {
            info!("Resetting last notification timestamp");
            self.backend
                .set_last_notified_timestamp(DateTime::<Utc>::UNIX_EPOCH)
                .await?;
        }
        if self.config.notify_only_new_messages_from_startup {
            info!(%now, "Only messages from startup on will be reported");
            self.backend.set_last_notified_timestamp(now).await?;
        }

        let watermark = self.backend.get_last_notified_timestamp().await?;
        let interval = ChronoDuration::minutes(self.config.run_interval_minutes as i64);
        Ok(watermark + interval < now)
    }

    /// One scheduled run: compute, render, send, then move the watermark.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RunLog> {
        let _guard = self.run_lock.lock().await;
        let started = Instant::now();

        let result = self.execute(now, started).await;
        let outcome = if result.is_ok() { "success" } else { "error" };
        metrics::record_run(outcome, started.elapsed());
        result
    }

    async fn execute(&self, now: DateTime<Utc>, started: Instant) -> Result<RunLog> {
        let last_notified = self
            .backend
            .get_last_notified_timestamp()
            .await
            .context("reading last notification timestamp")?;
        let upper =
            now - ChronoDuration::minutes(self.config.ignore_messages_newer_than_minutes);
        let lower = if self.config.notify_only_new_messages_from_startup {
            self.started_at
        } else {
            DateTime::<Utc>::UNIX_EPOCH
        };

        let run = self.stats.next_run_number();
        info!(run, from = %last_notified, to = %upper, "Starting missed-activity run");

        let reports = self
            .engine
            .run(RunOptions {
                lower_bound: lower,
                last_notified,
                upper_bound: upper,
            })
            .await?;

        let mut texts = Vec::with_capacity(reports.len());
        let mut emails = Vec::new();
        for report in &reports {
            let authors = self.author_names(report).await?;
            texts.push(render_text(report, &authors, now));

            let link_team = self.link_team(report).await?;
            let Some(email) = render_email(report, &self.email, &authors, link_team.as_deref())
            else {
                continue;
            };

            let sent = if self.config.dry_run {
                metrics::record_email("dry_run");
                false
            } else {
                match self
                    .backend
                    .send_email(&report.user, &email.subject, &email.body)
                    .await
                {
                    Ok(()) => {
                        metrics::record_email("sent");
                        self.stats.record_email_sent(&report.user.id, now);
                        true
                    }
                    Err(e) => {
                        metrics::record_email("failed");
                        warn!(run, user_id = %report.user.id, error = %e, "Failed to send report email");
                        false
                    }
                }
            };

            emails.push(EmailSummary {
                user_id: report.user.id.clone(),
                username: report.user.username.clone(),
                team: report.team.name.clone(),
                subject: email.subject,
                conversations: report.conversation_count(),
                messages: report.message_count(),
                sent,
            });
        }

        self.backend
            .set_last_notified_timestamp(upper)
            .await
            .context("saving last notification timestamp")?;

        let horizon = now - ChronoDuration::hours(self.config.keep_status_history_hours);
        self.presence.evict_older_than(horizon.timestamp_millis());

        let log = RunLog {
            run,
            executed_at: now,
            from: last_notified,
            to: upper,
            elapsed_ms: started.elapsed().as_millis() as u64,
            dry_run: self.config.dry_run,
            reports: texts,
            emails,
        };
        info!(
            run,
            reports = log.reports.len(),
            emails = log.emails.len(),
            elapsed_ms = log.elapsed_ms,
            "Missed-activity run completed"
        );
        self.stats.record_run(log.clone());
        Ok(log)
    }

    /// Runs the engine over `[from, to]` and returns the rendered reports.
    /// Sends nothing and leaves the watermark untouched.
    pub async fn manual_run(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RenderedReport>> {
        let _guard = self.run_lock.lock().await;
        let now = Utc::now();

        let reports = self
            .engine
            .run(RunOptions {
                lower_bound: DateTime::<Utc>::UNIX_EPOCH,
                last_notified: from,
                upper_bound: to,
            })
            .await?;

        let mut rendered = Vec::with_capacity(reports.len());
        for report in &reports {
            let authors = self.author_names(report).await?;
            let link_team = self.link_team(report).await?;
            rendered.push(RenderedReport {
                user_id: report.user.id.clone(),
                username: report.user.username.clone(),
                team: report.team.name.clone(),
                text: render_text(report, &authors, now),
                email: render_email(report, &self.email, &authors, link_team.as_deref()),
            });
        }
        Ok(rendered)
    }

    async fn author_names(&self, report: &TeamMissedActivity) -> Result<AuthorNames> {
        let mut names = AuthorNames::new();
        let posts = report
            .channels
            .iter()
            .flat_map(|c| &c.conversations)
            .flat_map(|c| std::iter::once(&c.root).chain(c.replies.iter()))
            .collect::<Vec<_>>();

        for post in posts {
            if names.contains_key(&post.author_id) {
                continue;
            }
            let author = self
                .backend
                .get_user(&post.author_id)
                .await
                .with_context(|| format!("resolving author {}", post.author_id))?;
            names.insert(post.author_id.clone(), author.display_name());
        }
        Ok(names)
    }

    async fn link_team(&self, report: &TeamMissedActivity) -> Result<Option<String>> {
        if !report.team.is_direct_messages() {
            return Ok(None);
        }
        let teams = self.backend.get_teams_for_user(&report.user.id).await?;
        Ok(teams
            .into_iter()
            .find(|t| !t.is_direct_messages())
            .map(|t| t.slug))
    }

    /// Records the current status of every user as seen at `at`.
    ///
    /// Ordering violations are logged and skipped. Returns how many samples were accepted.
    pub async fn sample_presence(&self, at: DateTime<Utc>) -> Result<usize> {
        let statuses = self.backend.get_user_statuses().await?;
        let at = at.timestamp_millis();

        let mut recorded = 0;
        for (user_id, status) in &statuses {
            match self.presence.record_sample(user_id, status, at) {
                Ok(()) => recorded += 1,
                Err(e @ PresenceError::OrderingViolation { .. }) => {
                    metrics::record_presence_ordering_violation();
                    warn!(user_id = %user_id, error = %e, "Ignoring status sample");
                }
            }
        }
        Ok(recorded)
    }

    /// Status history and email stats of every tracked non-bot user.
    pub async fn presence_report(&self) -> Result<Vec<UserPresenceReport>> {
        let mut ids = self.presence.tracked_user_ids();
        ids.sort();

        let mut report = Vec::with_capacity(ids.len());
        for user_id in ids {
            let user = self.backend.get_user(&user_id).await?;
            if user.is_bot {
                continue;
            }
            report.push(UserPresenceReport {
                history: self.presence.history_of(&user_id),
                emails_sent: self.stats.emails_sent_to(&user_id),
                username: user.username,
                user_id,
            });
        }
        Ok(report)
    }
}

/// Runs the job on a fixed interval until shutdown. A failed run is retried at the next tick.
pub async fn run_job_loop(
    job: Arc<MissedActivityJob>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    match job.prepare(Utc::now()).await {
        Ok(true) => {
            info!("Last run is overdue, running now");
            if let Err(e) = job.run_once(Utc::now()).await {
                error!(error = %e, "Missed-activity run failed");
            }
        }
        Ok(false) => {}
        Err(e) => error!(error = %e, "Failed to prepare missed-activity job"),
    }

    let mut timer = interval_at(Instant::now() + period, period);
    info!(interval_sec = period.as_secs(), "Starting missed-activity job loop");

    loop {
        tokio::select! {
            _ = timer.tick() => {
                if let Err(e) = job.run_once(Utc::now()).await {
                    error!(error = %e, "Missed-activity run failed, will retry on next interval");
                }
            }
            _ = shutdown.recv() => {
                info!("Missed-activity job loop shutting down");
                break;
            }
        }
    }
}

/// Samples user statuses on a fixed interval until shutdown.
pub async fn run_sampling_loop(
    job: Arc<MissedActivityJob>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut timer = tokio::time::interval(period);
    info!(interval_sec = period.as_secs(), "Starting presence sampling loop");

    loop {
        tokio::select! {
            _ = timer.tick() => {
                if let Err(e) = job.sample_presence(Utc::now()).await {
                    warn!(error = %e, "Presence sampling failed");
                }
            }
            _ = shutdown.recv() => {
                info!("Presence sampling loop shutting down");
                break;
            }
        }
    }
}
