//! # Application State Management
//!
//! Shared state that HTTP handlers and websocket sessions access concurrently.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc<RwLock<T>>
//! - **Arc**: every worker thread and session holds a cheap clone of the same state
//! - **RwLock**: many concurrent readers (health checks, metrics) or one writer
//! - Locks are only held for the duration of a counter update or a clone, never
//!   across an `.await` or an inference call
//!
//! ### Trait Objects for Collaborators
//! [`PerceptionServices`] carries the backend factory and the model resolver as
//! `Arc<dyn Trait>`, so the server runs with the candle backend while tests swap
//! in fakes without touching the session code.
//!
//! ## What Is Shared Between Sessions:
//! Only configuration (read at session start), counters, and the model asset
//! registry. Each session's backend, clock and configuration stay private to it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use crate::config::AppConfig;
use crate::inference::{BackendFactory, ModelResolver};
use crate::vision::SessionStats;

#[derive(Debug, Clone)]
pub struct AppState {
    /// Runtime-updatable configuration
    pub config: Arc<RwLock<AppConfig>>,

    pub metrics: Arc<RwLock<AppMetrics>>,

    pub start_time: Instant,
}

/// Process-wide counters.
///
/// ## Fields:
/// - **request_count / error_count**: HTTP traffic, recorded by the metrics middleware
/// - **active_sessions**: websocket sessions currently open
/// - **sessions**: lifetime session and frame totals
/// - **endpoint_metrics**: per-route request statistics keyed by `"METHOD /path"`
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub active_sessions: u32,
    pub sessions: SessionTotals,
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Totals folded in from every closed session.
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct SessionTotals {
    pub opened: u64,
    pub rejected: u64,
    pub startup_failures: u64,
    pub backend_constructions: u64,
    pub frames_processed: u64,
    pub frame_failures: u64,
    pub reconfigurations: u64,
    pub reconfigure_failures: u64,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    // A poisoned lock only means a panic happened mid-update of plain counters;
    // the data is still usable.
    fn read_metrics(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_metrics(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        new_config.validate().map_err(|e| e.to_string())?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = new_config;
        Ok(())
    }

    pub fn increment_request_count(&self) {
        self.write_metrics().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.write_metrics().error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.write_metrics();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Reserve a session slot if fewer than `limit` sessions are active.
    ///
    /// Check and increment happen under one write lock, so two upgrades racing
    /// for the last slot cannot both succeed.
    pub fn try_open_session(&self, limit: usize) -> bool {
        let mut metrics = self.write_metrics();
        if metrics.active_sessions as usize >= limit {
            metrics.sessions.rejected += 1;
            return false;
        }
        metrics.active_sessions += 1;
        metrics.sessions.opened += 1;
        true
    }

    /// Reserve a session slot, returning a lease that gives it back on drop.
    pub fn lease_session(&self, limit: usize) -> Option<SessionLease> {
        self.try_open_session(limit).then(|| SessionLease {
            state: self.clone(),
            outcome: None,
        })
    }

    /// Release a slot taken by [`try_open_session`](Self::try_open_session) and fold in its counters.
    pub fn close_session(&self, stats: &SessionStats, started: bool) {
        let mut metrics = self.write_metrics();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }

        let totals = &mut metrics.sessions;
        if !started {
            totals.startup_failures += 1;
        }
        totals.backend_constructions += stats.backend_constructions;
        totals.frames_processed += stats.frames;
        totals.frame_failures += stats.frame_failures;
        totals.reconfigurations += stats.reconfigurations;
        totals.reconfigure_failures += stats.reconfigure_failures;
    }

    /// Give back a slot whose websocket handshake never completed.
    pub fn abandon_session(&self) {
        let mut metrics = self.write_metrics();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
        metrics.sessions.opened = metrics.sessions.opened.saturating_sub(1);
    }

    pub fn active_sessions(&self) -> u32 {
        self.read_metrics().active_sessions
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.read_metrics().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

/// One reserved session slot.
///
/// Whoever holds the lease when it drops releases the slot: the websocket actor
/// if the connection never started, otherwise the session worker, which records
/// the session's outcome with [`finish`](Self::finish) first.
pub struct SessionLease {
    state: AppState,
    outcome: Option<(SessionStats, bool)>,
}

impl SessionLease {
    pub fn finish(&mut self, stats: SessionStats, started: bool) {
        self.outcome = Some((stats, started));
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        match self.outcome.take() {
            Some((stats, started)) => self.state.close_session(&stats, started),
            None => self.state.abandon_session(),
        }
    }
}

/// External collaborators every perception session needs.
#[derive(Clone)]
pub struct PerceptionServices {
    pub factory: Arc<dyn BackendFactory>,
    pub resolver: Arc<dyn ModelResolver>,
}

impl PerceptionServices {
    pub fn new(factory: Arc<dyn BackendFactory>, resolver: Arc<dyn ModelResolver>) -> Self {
        Self { factory, resolver }
    }
}
