use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, TextEncoder,
};

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "missed_activity_http_requests_total",
            "Total HTTP requests handled by missed-activity-service",
        ),
        &["method", "path", "status"],
    )
    .expect("failed to create missed_activity_http_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register missed_activity_http_requests_total");
    counter
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "missed_activity_http_request_duration_seconds",
            "HTTP request latency for missed-activity-service",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["method", "path", "status"],
    )
    .expect("failed to create missed_activity_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register missed_activity_http_request_duration_seconds");
    histogram
});

static RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "missed_activity_runs_total",
            "Missed-activity runs by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create missed_activity_runs_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register missed_activity_runs_total");
    counter
});

static RUN_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            "missed_activity_run_duration_seconds",
            "Wall time of one missed-activity run",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .expect("failed to create missed_activity_run_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register missed_activity_run_duration_seconds");
    histogram
});

static SUPPRESSED_MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "missed_activity_suppressed_messages_total",
            "Messages left out of reports, by reason",
        ),
        &["reason"],
    )
    .expect("failed to create missed_activity_suppressed_messages_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register missed_activity_suppressed_messages_total");
    counter
});

static EMAILS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("missed_activity_emails_total", "Report emails by outcome"),
        &["outcome"],
    )
    .expect("failed to create missed_activity_emails_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register missed_activity_emails_total");
    counter
});

static BACKEND_CACHE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "missed_activity_backend_cache_total",
            "Backend cache lookups by kind and result",
        ),
        &["kind", "result"],
    )
    .expect("failed to create missed_activity_backend_cache_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register missed_activity_backend_cache_total");
    counter
});

static PRESENCE_ORDERING_VIOLATIONS: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "missed_activity_presence_ordering_violations_total",
        "Status samples rejected because they were not after the last one",
    )
    .expect("failed to create missed_activity_presence_ordering_violations_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register missed_activity_presence_ordering_violations_total");
    counter
});

pub fn record_run(outcome: &str, elapsed: Duration) {
    RUNS_TOTAL.with_label_values(&[outcome]).inc();
    RUN_DURATION_SECONDS.observe(elapsed.as_secs_f64());
}

pub fn record_suppressed(reason: &str) {
    SUPPRESSED_MESSAGES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_email(outcome: &str) {
    EMAILS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_cache(kind: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    BACKEND_CACHE_TOTAL.with_label_values(&[kind, result]).inc();
}

pub fn record_presence_ordering_violation() {
    PRESENCE_ORDERING_VIOLATIONS.inc();
}

pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status_label])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status_label])
        .observe(elapsed.as_secs_f64());
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::time::Instant;

pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let path = req.path().to_string();
        let method = req.method().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let result = service.call(req).await;
            let elapsed = start.elapsed();
            match &result {
                Ok(response) => {
                    observe_http_request(&method, &path, response.status().as_u16(), elapsed);
                }
                Err(_) => {
                    observe_http_request(&method, &path, 500, elapsed);
                }
            }
            result
        })
    }
}
