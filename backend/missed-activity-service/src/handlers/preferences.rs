/// Missed-activity preference handlers
use super::{require_admin, ApiResponse};
use crate::models::{PreferenceKey, UserPreferences};
use crate::services::MissedActivityJob;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Update preferences request; absent fields keep their current value
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct UpdatePreferencesPayload {
    pub enabled: Option<bool>,
    pub notify_replies_in_not_followed_threads: Option<bool>,
    pub count_replies_in_not_followed_threads: Option<bool>,
    pub count_notified_by_platform: Option<bool>,
    pub count_previously_notified: Option<bool>,
    pub include_system_messages: Option<bool>,
    pub include_bot_messages: Option<bool>,
}

impl UpdatePreferencesPayload {
    fn get(&self, key: PreferenceKey) -> Option<bool> {
        match key {
            PreferenceKey::Enabled => self.enabled,
            PreferenceKey::NotifyRepliesInNotFollowedThreads => {
                self.notify_replies_in_not_followed_threads
            }
            PreferenceKey::CountRepliesInNotFollowedThreads => {
                self.count_replies_in_not_followed_threads
            }
            PreferenceKey::CountNotifiedByPlatform => self.count_notified_by_platform,
            PreferenceKey::CountPreviouslyNotified => self.count_previously_notified,
            PreferenceKey::IncludeSystemMessages => self.include_system_messages,
            PreferenceKey::IncludeBotMessages => self.include_bot_messages,
        }
    }

    pub fn apply(&self, prefs: &mut UserPreferences) {
        for key in PreferenceKey::ALL {
            if let Some(value) = self.get(key) {
                prefs.set(key, value);
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SetPreferencePayload {
    pub value: bool,
}

/// GET /api/v1/preferences/{user_id}
pub async fn get_preferences(
    job: web::Data<Arc<MissedActivityJob>>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let user_id = path.into_inner();
    let preferences = job.backend().get_preferences_for_user(&user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(preferences)))
}

/// PUT /api/v1/preferences/{user_id}
pub async fn update_preferences(
    job: web::Data<Arc<MissedActivityJob>>,
    path: web::Path<String>,
    req: web::Json<UpdatePreferencesPayload>,
) -> ActixResult<HttpResponse> {
    let user_id = path.into_inner();
    let payload = req.into_inner();

    let change = move |prefs: &mut UserPreferences| payload.apply(prefs);
    let prefs = job
        .backend()
        .modify_preferences_for_user(&user_id, Box::new(change))
        .await?;

    tracing::info!(user_id = %user_id, "Preferences updated");
    Ok(HttpResponse::Ok().json(ApiResponse::ok(prefs)))
}

/// PUT /api/v1/preferences/{user_id}/{name}
pub async fn set_preference(
    job: web::Data<Arc<MissedActivityJob>>,
    path: web::Path<(String, String)>,
    req: web::Json<SetPreferencePayload>,
) -> ActixResult<HttpResponse> {
    let (user_id, name) = path.into_inner();
    let key: PreferenceKey = name.parse()?;
    let value = req.value;

    let change = move |prefs: &mut UserPreferences| prefs.set(key, value);
    let prefs = job
        .backend()
        .modify_preferences_for_user(&user_id, Box::new(change))
        .await?;

    tracing::info!(user_id = %user_id, preference = %key, value, "Preference set");
    Ok(HttpResponse::Ok().json(ApiResponse::ok(prefs)))
}

/// DELETE /api/v1/preferences/{user_id}
pub async fn reset_preferences(
    job: web::Data<Arc<MissedActivityJob>>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let user_id = path.into_inner();
    let prefs = job.backend().reset_preferences_for_user(&user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(prefs)))
}

/// DELETE /api/v1/preferences
pub async fn reset_all_preferences(
    job: web::Data<Arc<MissedActivityJob>>,
    http: HttpRequest,
) -> ActixResult<HttpResponse> {
    let admin = require_admin(&job, &http).await?;
    job.backend().reset_all_preferences().await?;
    tracing::info!(requested_by = %admin.id, "All user preferences reset");
    Ok(HttpResponse::Ok().json(ApiResponse::ok("reset")))
}

/// Register routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/preferences")
            .route("", web::delete().to(reset_all_preferences))
            .route("/{user_id}", web::get().to(get_preferences))
            .route("/{user_id}", web::put().to(update_preferences))
            .route("/{user_id}", web::delete().to(reset_preferences))
            .route("/{user_id}/{name}", web::put().to(set_preference)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_payload_only_touches_given_fields() {
        let payload: UpdatePreferencesPayload =
            serde_json::from_str(r#"{"count_previously_notified": true, "enabled": false}"#)
                .unwrap();
        let mut prefs = UserPreferences::default();
        payload.apply(&mut prefs);

        assert!(!prefs.enabled);
        assert!(prefs.count_previously_notified);
        assert_eq!(
            prefs.notify_replies_in_not_followed_threads,
            UserPreferences::default().notify_replies_in_not_followed_threads
        );
    }
}
