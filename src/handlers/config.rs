//! # Configuration REST API
//!
//! - `GET /api/v1/config`: current configuration
//! - `PUT /api/v1/config`: partial update, see [`AppConfig::update_from_json`](crate::config::AppConfig::update_from_json)
//!
//! Updates only affect sessions opened afterwards; a live session keeps the
//! thresholds it started with.

use crate::{error::{AppError, AppResult}, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;

pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> AppResult<HttpResponse> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut updated = state.get_config();
    updated
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state
        .update_config(updated.clone())
        .map_err(AppError::ValidationError)?;

    info!(
        max_concurrent_sessions = updated.performance.max_concurrent_sessions,
        "Configuration updated"
    );

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": updated
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use actix_web::{http::StatusCode, App};

    fn app_state() -> web::Data<AppState> {
        web::Data::new(AppState::new(AppConfig::default()))
    }

    #[actix_web::test]
    async fn test_get_config() {
        let app = actix_web::test::init_service(
            App::new()
                .app_data(app_state())
                .route("/api/v1/config", web::get().to(get_config)),
        )
        .await;

        let req = actix_web::test::TestRequest::get().uri("/api/v1/config").to_request();
        let body: serde_json::Value = actix_web::test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["config"]["performance"]["max_concurrent_sessions"], 16);
        assert_eq!(body["config"]["models"]["face_landmarker"], "face_landmarker.safetensors");
    }

    #[actix_web::test]
    async fn test_update_config_applies_thresholds() {
        let state = app_state();
        let app = actix_web::test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/api/v1/config", web::put().to(update_config)),
        )
        .await;

        let req = actix_web::test::TestRequest::put()
            .uri("/api/v1/config")
            .set_json(json!({"emotion": {"sad_threshold": 0.02}}))
            .to_request();
        let resp = actix_web::test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.get_config().emotion.sad_threshold, 0.02);
    }

    #[actix_web::test]
    async fn test_update_config_rejects_invalid_values() {
        let state = app_state();
        let app = actix_web::test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/api/v1/config", web::put().to(update_config)),
        )
        .await;

        let req = actix_web::test::TestRequest::put()
            .uri("/api/v1/config")
            .set_json(json!({"performance": {"max_concurrent_sessions": 0}}))
            .to_request();
        let resp = actix_web::test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.get_config().performance.max_concurrent_sessions, 16);
    }
}
