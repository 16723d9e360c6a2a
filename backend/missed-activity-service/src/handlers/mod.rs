/// HTTP handlers for the missed-activity service API
pub mod preferences;
pub mod presence;
pub mod runs;

use crate::error::AppError;
use crate::models::User;
use crate::services::MissedActivityJob;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;

pub use preferences::register_routes as register_preferences;
pub use presence::register_routes as register_presence;
pub use runs::register_routes as register_runs;

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

const USER_ID_HEADER: &str = "x-user-id";

fn caller_id(req: &HttpRequest) -> Result<String, AppError> {
    let header_value = req
        .headers()
        .get(USER_ID_HEADER)
        .ok_or_else(|| AppError::Unauthorized("Missing x-user-id header".into()))?;

    let value = header_value
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid x-user-id header".into()))?;
    if value.is_empty() {
        return Err(AppError::Unauthorized("Empty x-user-id header".into()));
    }
    Ok(value.to_string())
}

/// Resolves the calling user and rejects anyone who is not a system administrator.
pub(crate) async fn require_admin(
    job: &MissedActivityJob,
    req: &HttpRequest,
) -> Result<User, AppError> {
    let caller = caller_id(req)?;
    let user = match job.backend().get_user(&caller).await {
        Ok(user) => user,
        Err(e) if matches!(e.root(), AppError::NotFound(_)) => {
            return Err(AppError::Unauthorized(format!("unknown user {}", caller)));
        }
        Err(e) => return Err(e),
    };

    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "only administrators can use this endpoint".to_string(),
        ));
    }
    Ok(user)
}

/// GET /health
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok("ok"))
}

pub fn register_health(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}
