/// Run history and manual run handlers
use super::{require_admin, ApiResponse};
use crate::error::AppError;
use crate::services::MissedActivityJob;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Manual run window, in milliseconds since the Unix epoch
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ManualRunPayload {
    pub from: i64,
    pub to: i64,
}

impl ManualRunPayload {
    fn window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
        let from = DateTime::from_timestamp_millis(self.from)
            .ok_or_else(|| AppError::BadRequest(format!("invalid 'from': {}", self.from)))?;
        let to = DateTime::from_timestamp_millis(self.to)
            .ok_or_else(|| AppError::BadRequest(format!("invalid 'to': {}", self.to)))?;
        if from >= to {
            return Err(AppError::BadRequest(
                "'from' must be before 'to'".to_string(),
            ));
        }
        Ok((from, to))
    }
}

/// GET /api/v1/runs
pub async fn list_runs(
    job: web::Data<Arc<MissedActivityJob>>,
    http: HttpRequest,
) -> ActixResult<HttpResponse> {
    require_admin(&job, &http).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(job.stats().runs())))
}

/// POST /api/v1/runs
pub async fn manual_run(
    job: web::Data<Arc<MissedActivityJob>>,
    http: HttpRequest,
    req: web::Json<ManualRunPayload>,
) -> ActixResult<HttpResponse> {
    let admin = require_admin(&job, &http).await?;
    let (from, to) = req.window()?;
    tracing::info!(%from, %to, requested_by = %admin.id, "Manual missed-activity run requested");

    let reports = job.manual_run(from, to).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(reports)))
}

/// Register routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/runs")
            .route("", web::get().to(list_runs))
            .route("", web::post().to(manual_run)),
    );
}
