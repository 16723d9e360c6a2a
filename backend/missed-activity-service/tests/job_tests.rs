/// Integration tests for scheduled runs, manual runs and presence sampling
mod common;

use common::*;
use missed_activity_service::config::{EmailTemplateConfig, JobConfig, PlatformTriggers};
use missed_activity_service::models::{ChannelKind, UserPreferences};
use missed_activity_service::output::EmailContext;
use missed_activity_service::{
    Backend, CachedBackend, MissedActivityEngine, MissedActivityJob, PresenceTracker, RunOptions,
    UserStatus,
};
use std::sync::Arc;
use std::time::Duration;

fn job_config() -> JobConfig {
    JobConfig {
        run_interval_minutes: 60,
        ignore_messages_newer_than_minutes: 5,
        keep_status_history_hours: 24,
        run_stats_to_keep: 10,
        status_sample_interval_secs: 60,
        dry_run: false,
        reset_last_notification_timestamp: false,
        notify_only_new_messages_from_startup: false,
    }
}

fn email_context() -> EmailContext {
    EmailContext {
        site_name: "Acme Chat".into(),
        site_url: "https://chat.acme.test".into(),
        template: EmailTemplateConfig {
            subtitle: "Here is what you missed".into(),
            button_text: "Open Acme Chat".into(),
            footer_lines: vec!["You can change these emails in your settings.".into()],
        },
    }
}

fn build_job(backend: Arc<FakeBackend>, config: JobConfig) -> MissedActivityJob {
    let backend: Arc<dyn Backend> = backend;
    let presence = Arc::new(PresenceTracker::new());
    let engine =
        MissedActivityEngine::new(backend.clone(), presence.clone(), PlatformTriggers::default());
    MissedActivityJob::new(backend, engine, presence, config, email_context(), t(0))
}

/// alice is a member of #c1 in Engineering, bob posts there.
fn engineering() -> FakeBackend {
    let alice = user("u1", "alice");
    let mut bob = user("u2", "bob");
    bob.first_name = "Bob".into();
    bob.last_name = "Builder".into();
    // bob reads everything; keeps him out of the reports
    bob.preferences = UserPreferences {
        enabled: false,
        ..UserPreferences::default()
    };

    FakeBackend::new()
        .with_user(alice.clone())
        .with_user(bob)
        .with_team("u1", team("t1", "Engineering"))
        .with_membership(membership(channel("c1", ChannelKind::Open, "t1"), &alice, t(0)))
}

#[tokio::test]
async fn test_run_sends_report_and_moves_watermark() {
    let backend = Arc::new(engineering().with_posts(
        "c1",
        vec![
            root("r1", "u2", t(5), "release notes are up"),
            root("r2", "u2", t(58), "too fresh to report"),
        ],
    ));
    let job = build_job(backend.clone(), job_config());

    let log = job.run_once(t(60)).await.unwrap();

    assert_eq!(log.run, 1);
    assert_eq!(log.to, t(55));
    assert_eq!(log.reports.len(), 1);
    assert_eq!(log.emails.len(), 1);
    assert!(log.emails[0].sent);
    assert_eq!(log.emails[0].conversations, 1);

    let sent = backend.sent_emails();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, "u1");
    assert_eq!(sent[0].subject, "[Acme Chat] Recent activity in Engineering");
    assert!(sent[0].body.contains("Bob Builder: release notes are up"));
    assert!(sent[0].body.contains("https://chat.acme.test/engineering/pl/r1"));
    assert!(!sent[0].body.contains("too fresh"));

    assert_eq!(backend.watermark(), t(55));
    assert_eq!(job.stats().emails_sent_to("u1"), vec![t(60)]);
}

#[tokio::test]
async fn test_next_run_reports_only_newer_messages() {
    let backend = Arc::new(engineering().with_posts(
        "c1",
        vec![
            root("r1", "u2", t(5), "release notes are up"),
            root("r2", "u2", t(58), "hotfix deployed"),
        ],
    ));
    let job = build_job(backend.clone(), job_config());

    job.run_once(t(60)).await.unwrap();
    let second = job.run_once(t(120)).await.unwrap();

    assert_eq!(second.run, 2);
    assert_eq!(second.from, t(55));
    let sent = backend.sent_emails();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].body.contains("hotfix deployed"));
    assert!(!sent[1].body.contains("release notes"));

    let runs: Vec<u64> = job.stats().runs().iter().map(|r| r.run).collect();
    assert_eq!(runs, vec![2, 1]);
}

#[tokio::test]
async fn test_dry_run_sends_nothing() {
    let backend = Arc::new(
        engineering().with_posts("c1", vec![root("r1", "u2", t(5), "release notes are up")]),
    );
    let job = build_job(
        backend.clone(),
        JobConfig {
            dry_run: true,
            ..job_config()
        },
    );

    let log = job.run_once(t(60)).await.unwrap();

    assert!(log.dry_run);
    assert_eq!(log.emails.len(), 1);
    assert!(!log.emails[0].sent);
    assert!(backend.sent_emails().is_empty());
    assert!(job.stats().emails_sent_to("u1").is_empty());
}

#[tokio::test]
async fn test_email_failure_does_not_fail_run() {
    let mut fake =
        engineering().with_posts("c1", vec![root("r1", "u2", t(5), "release notes are up")]);
    fake.fail_email = true;
    let backend = Arc::new(fake);
    let job = build_job(backend.clone(), job_config());

    let log = job.run_once(t(60)).await.unwrap();

    assert!(!log.emails[0].sent);
    assert_eq!(backend.watermark(), t(55));
}

#[tokio::test]
async fn test_failed_run_keeps_watermark() {
    let mut fake =
        engineering().with_posts("c1", vec![root("r1", "u2", t(5), "release notes are up")]);
    fake.fail_teams_for = Some("u1".into());
    let backend = Arc::new(fake);
    let job = build_job(backend.clone(), job_config());

    assert!(job.run_once(t(60)).await.is_err());
    assert_eq!(backend.watermark(), chrono::DateTime::<chrono::Utc>::UNIX_EPOCH);
    assert!(backend.sent_emails().is_empty());
    assert!(job.stats().runs().is_empty());
}

#[tokio::test]
async fn test_manual_run_leaves_watermark_alone() {
    let backend = Arc::new(engineering().with_posts(
        "c1",
        vec![
            root("r1", "u2", t(5), "release notes are up"),
            root("r2", "u2", t(40), "retro at 4pm"),
        ],
    ));
    backend.set_watermark(t(30));
    let job = build_job(backend.clone(), job_config());

    let reports = job.manual_run(t(0), t(120)).await.unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].username, "alice");
    assert!(reports[0].text.contains("release notes are up"));
    assert!(reports[0].text.contains("retro at 4pm"));
    assert!(reports[0].email.is_some());

    assert_eq!(backend.watermark(), t(30));
    assert!(backend.sent_emails().is_empty());
    assert!(job.stats().runs().is_empty());
}

#[tokio::test]
async fn test_prepare_detects_overdue_run() {
    let backend = Arc::new(engineering());
    backend.set_watermark(t(0));
    let job = build_job(backend.clone(), job_config());

    assert!(!job.prepare(t(30)).await.unwrap());
    assert!(job.prepare(t(90)).await.unwrap());
}

#[tokio::test]
async fn test_prepare_applies_startup_options() {
    let backend = Arc::new(engineering());
    backend.set_watermark(t(0));
    let job = build_job(
        backend.clone(),
        JobConfig {
            notify_only_new_messages_from_startup: true,
            ..job_config()
        },
    );

    assert!(!job.prepare(t(90)).await.unwrap());
    assert_eq!(backend.watermark(), t(90));

    let backend = Arc::new(engineering());
    backend.set_watermark(t(90));
    let job = build_job(
        backend.clone(),
        JobConfig {
            reset_last_notification_timestamp: true,
            ..job_config()
        },
    );
    assert!(job.prepare(t(100)).await.unwrap());
    assert_eq!(backend.watermark(), chrono::DateTime::<chrono::Utc>::UNIX_EPOCH);
}

#[tokio::test]
async fn test_sampling_records_presence_and_skips_stale_samples() {
    let mut fake = engineering();
    fake.statuses.insert("u1".into(), "online".into());
    fake.statuses.insert("u2".into(), "away".into());
    let backend = Arc::new(fake);
    let job = build_job(backend, job_config());

    assert_eq!(job.sample_presence(t(10)).await.unwrap(), 2);
    // Same instant again violates the ordering and is skipped
    assert_eq!(job.sample_presence(t(10)).await.unwrap(), 0);
    assert_eq!(job.sample_presence(t(20)).await.unwrap(), 2);

    let presence = job.presence();
    assert_eq!(presence.status_at("u1", t(15).timestamp_millis()), UserStatus::Online);
    assert_eq!(presence.status_at("u2", t(15).timestamp_millis()), UserStatus::Away);
    assert_eq!(presence.status_at("u1", t(5).timestamp_millis()), UserStatus::Unknown);
    // Unchanged status adds no sample
    assert_eq!(presence.history_of("u1").len(), 1);

    let report = job.presence_report().await.unwrap();
    let ids: Vec<&str> = report.iter().map(|r| r.user_id.as_str()).collect();
    assert_eq!(ids, vec!["u1", "u2"]);
}

#[tokio::test]
async fn test_online_when_mentioned_suppresses_report() {
    let mut fake = engineering().with_posts("c1", vec![root("r1", "u2", t(15), "@alice ping")]);
    fake.statuses.insert("u1".into(), "online".into());
    let backend = Arc::new(fake);
    let job = build_job(backend.clone(), job_config());

    job.sample_presence(t(10)).await.unwrap();
    let log = job.run_once(t(60)).await.unwrap();

    assert!(log.reports.is_empty());
    assert!(backend.sent_emails().is_empty());
}

#[tokio::test]
async fn test_cached_backend_matches_direct_results() {
    let alice = user("u1", "alice");
    let fake = FakeBackend::new()
        .with_user(alice.clone())
        .with_team("u1", team("t1", "Engineering"))
        .with_membership(membership(channel("c1", ChannelKind::Open, "t1"), &alice, t(0)))
        .with_membership(membership(channel("d1", ChannelKind::Direct, ""), &alice, t(0)))
        .with_posts("c1", vec![root("r1", "u2", t(5), "team news")])
        .with_posts("d1", vec![root("r2", "u2", t(6), "dm")]);

    let cached = Arc::new(CachedBackend::new(
        fake,
        Duration::from_secs(60),
        Duration::from_secs(5),
    ));
    let backend: Arc<dyn Backend> = cached.clone();
    let engine = MissedActivityEngine::new(
        backend,
        Arc::new(PresenceTracker::new()),
        PlatformTriggers::default(),
    );
    let options = RunOptions {
        lower_bound: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
        last_notified: t(0),
        upper_bound: t(60),
    };

    let first = engine.run(options).await.unwrap();
    let second = engine.run(options).await.unwrap();

    let summary = |reports: &[missed_activity_service::models::TeamMissedActivity]| {
        reports
            .iter()
            .map(|r| (r.team.id.clone(), r.conversation_count()))
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&first), summary(&second));
    assert_eq!(summary(&first), vec![("t1".to_string(), 1), (String::new(), 1)]);
    assert_eq!(cached.inner().total_post_fetches(), 2);
}
