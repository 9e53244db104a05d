//! # Health and Metrics Endpoints
//!
//! - `GET /health`, `GET /api/v1/health`: liveness plus a snapshot of sessions,
//!   compute device and model assets
//! - `GET /api/v1/metrics`: per-endpoint HTTP statistics and session totals

use crate::config::AppConfig;
use crate::device::DeviceManager;
use crate::inference::AssetRegistry;
use crate::state::{AppMetrics, AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(
    state: web::Data<AppState>,
    registry: web::Data<AssetRegistry>,
) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let device = DeviceManager::summary(config.performance.gpu_capability());
    let assets = registry.list().await;

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "sessions": {
            "active": metrics.active_sessions,
            "max": config.performance.max_concurrent_sessions,
            "frames_processed": metrics.sessions.frames_processed,
            "frame_failures": metrics.sessions.frame_failures
        },
        "device": device,
        "models": assets,
        "memory": memory_info(),
        "system": load_status(&config, &metrics)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoints: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoints.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": ratio(metrics.error_count, metrics.request_count),
            "requests_per_second": ratio(metrics.request_count, uptime_seconds)
        },
        "sessions": {
            "active": metrics.active_sessions,
            "totals": metrics.sessions
        },
        "endpoints": endpoints
    }))
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

/// Resident and virtual memory from `/proc/self/status` (Linux only).
fn memory_info() -> serde_json::Value {
    let status = std::fs::read_to_string("/proc/self/status").ok();
    let field = |name: &str| -> Option<u64> {
        status
            .as_deref()?
            .lines()
            .find(|line| line.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse::<u64>()
            .ok()
            .map(|kb| kb * 1024)
    };

    match (field("VmRSS:"), field("VmSize:")) {
        (Some(rss), Some(size)) => json!({
            "resident_memory_bytes": rss,
            "virtual_memory_bytes": size,
            "available": true
        }),
        _ => json!({ "available": false }),
    }
}

fn load_status(config: &AppConfig, metrics: &AppMetrics) -> serde_json::Value {
    let usage = ratio(
        metrics.active_sessions as u64,
        config.performance.max_concurrent_sessions as u64,
    );

    let status = if usage >= 1.0 {
        "saturated"
    } else if usage > 0.7 {
        "high_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "session_usage_percent": (usage * 100.0).round()
    })
}
