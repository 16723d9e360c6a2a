/// Presence history and message-posted hook handlers
use super::{require_admin, ApiResponse};
use crate::error::AppError;
use crate::services::MissedActivityJob;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sent by the platform whenever a message is posted
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessagePostedPayload {
    /// Creation time of the post, milliseconds since the Unix epoch
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
struct SampleResult {
    recorded: usize,
}

/// GET /api/v1/presence
pub async fn get_presence(
    job: web::Data<Arc<MissedActivityJob>>,
    http: HttpRequest,
) -> ActixResult<HttpResponse> {
    require_admin(&job, &http).await?;
    let report = job.presence_report().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(report)))
}

/// POST /api/v1/hooks/message-posted
pub async fn message_posted(
    job: web::Data<Arc<MissedActivityJob>>,
    req: web::Json<MessagePostedPayload>,
) -> ActixResult<HttpResponse> {
    let at = DateTime::from_timestamp_millis(req.created_at).ok_or_else(|| {
        AppError::BadRequest(format!("invalid 'created_at': {}", req.created_at))
    })?;

    let recorded = job.sample_presence(at).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(SampleResult { recorded })))
}

/// Register routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/presence", web::get().to(get_presence))
        .route("/api/v1/hooks/message-posted", web::post().to(message_posted));
}
