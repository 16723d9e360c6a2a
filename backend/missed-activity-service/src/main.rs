use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use chrono::Utc;
use missed_activity_service::{
    handlers::{register_health, register_preferences, register_presence, register_runs},
    logging, metrics,
    output::EmailContext,
    services::{run_job_loop, run_sampling_loop, EmailService},
    store::{KvStore, MemoryKvStore, PreferenceStore, RedisKvStore},
    Backend, CachedBackend, Config, MattermostBackend, MissedActivityEngine, MissedActivityJob,
    PresenceTracker,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    tracing::info!("Starting missed-activity service");

    let config = Config::from_env().context("loading configuration")?;
    let started_at = Utc::now();

    let kv: Arc<dyn KvStore> = match &config.redis.url {
        Some(url) => Arc::new(RedisKvStore::connect(url).await.context("connecting to Redis")?),
        None => {
            tracing::warn!("REDIS_URL not set; preferences and watermark are kept in memory only");
            Arc::new(MemoryKvStore::new())
        }
    };
    let store = Arc::new(PreferenceStore::new(
        kv,
        config.redis.state_key.clone(),
        config.default_preferences,
    ));

    let email = EmailService::new(&config.smtp).context("configuring SMTP")?;
    let platform = MattermostBackend::connect(&config.platform, store, email)
        .await
        .context("connecting to the platform")?;
    let backend: Arc<dyn Backend> = Arc::new(CachedBackend::new(
        platform,
        Duration::from_secs(config.platform.cache_ttl_secs),
        Duration::from_secs(config.platform.status_cache_ttl_secs),
    ));

    let presence = Arc::new(PresenceTracker::new());
    let engine = MissedActivityEngine::new(backend.clone(), presence.clone(), config.triggers);
    let job = Arc::new(MissedActivityJob::new(
        backend,
        engine,
        presence,
        config.job.clone(),
        EmailContext {
            site_name: config.platform.site_name.clone(),
            site_url: config.platform.site_url.clone(),
            template: config.email.clone(),
        },
        started_at,
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let job_handle = tokio::spawn(run_job_loop(
        job.clone(),
        config.job.run_interval(),
        shutdown_tx.subscribe(),
    ));
    let sampling_handle = tokio::spawn(run_sampling_loop(
        job.clone(),
        Duration::from_secs(config.job.status_sample_interval_secs.max(1)),
        shutdown_tx.subscribe(),
    ));

    let addr = format!("0.0.0.0:{}", config.app.port);
    tracing::info!("Starting HTTP server on {}", addr);

    let server_job = job.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(server_job.clone()))
            .wrap(middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(|cfg| {
                register_health(cfg);
                register_preferences(cfg);
                register_runs(cfg);
                register_presence(cfg);
            })
    })
    .bind(&addr)?
    .run()
    .await?;

    tracing::info!("HTTP server stopped, shutting down background jobs");
    let _ = shutdown_tx.send(());
    let _ = tokio::join!(job_handle, sampling_handle);

    Ok(())
}
