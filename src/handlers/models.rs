//! # Model Asset REST API Handlers
//!
//! Visibility into the weights files perception sessions depend on.
//!
//! ## Available Endpoints:
//! - `GET /api/v1/models`: every model kind with its file name and resolution state
//! - `POST /api/v1/models/{kind}/prefetch`: resolve (download if needed) ahead of the first session

use crate::error::{AppError, AppResult};
use crate::inference::{AssetRegistry, AssetStatus};
use crate::vision::ModelKind;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::time::Instant;
use tracing::info;

/// List every model kind with its asset status.
///
/// ## Endpoint: `GET /api/v1/models`
///
/// ## Response:
/// ```json
/// {
///   "models": [
///     {
///       "model": "gesture_recognizer",
///       "file": "gesture_recognizer.safetensors",
///       "status": { "state": "ready", "path": "models/gesture_recognizer.safetensors" }
///     }
///   ]
/// }
/// ```
pub async fn list_models(registry: web::Data<AssetRegistry>) -> AppResult<HttpResponse> {
    let models = registry.list().await;

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "models": models
    })))
}

/// Resolve one model asset now.
///
/// ## Endpoint: `POST /api/v1/models/{kind}/prefetch`
///
/// Unknown kinds are 404. A kind that cannot be resolved is 503 with the
/// registry's error message; a later prefetch or session retries.
pub async fn prefetch_model(
    registry: web::Data<AssetRegistry>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let kind: ModelKind = path
        .into_inner()
        .parse()
        .map_err(AppError::NotFound)?;

    let start_time = Instant::now();
    let resolved = registry
        .resolve(kind)
        .await
        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;

    info!("Prefetched {} in {:?}", kind, start_time.elapsed());

    Ok(HttpResponse::Ok().json(json!({
        "model": kind,
        "status": AssetStatus::Ready { path: resolved },
        "resolve_time_seconds": start_time.elapsed().as_secs_f64(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
