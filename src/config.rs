//! # Configuration Management
//!
//! Loads the service configuration from layered sources:
//! - Default values (built into the code)
//! - TOML configuration file (`config.toml`, optional)
//! - Environment variables with the `APP_` prefix
//!
//! ## Key Rust Concepts Used:
//! - **Serde derive**: the same structs are read from TOML/env and written back as JSON
//!   by `GET /api/v1/config`
//! - **Builder pattern**: `config::Config::builder()` stacks sources, later ones win
//! - **Result<T, E>**: loading and validation fail early with a readable message
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_PERFORMANCE__MAX_CONCURRENT_SESSIONS`, ...)
//! 3. Configuration file (`config.toml`)
//! 4. Default values
//!
//! Nested keys are separated by a double underscore so that field names which
//! contain single underscores (`max_concurrent_sessions`) survive intact.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;

use crate::device::GpuCapability;
use crate::vision::{EmotionThresholds, ModelKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub performance: PerformanceConfig,
    pub emotion: EmotionThresholds,
}

/// Where the HTTP/websocket server listens.
///
/// - `host = "127.0.0.1"`: localhost only (development)
/// - `host = "0.0.0.0"`: every interface (containers, production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Model asset locations.
///
/// ## Fields:
/// - `assets_dir`: directory searched first for each weights file
/// - `hub_repo`: HuggingFace repository to download missing files from (empty disables downloads)
/// - `gesture_recognizer` / `hand_landmarker` / `face_landmarker`: safetensors file name per model
/// - `input_size`: square side length, in pixels, frames are resized to before inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub assets_dir: String,
    pub hub_repo: String,
    pub gesture_recognizer: String,
    pub hand_landmarker: String,
    pub face_landmarker: String,
    pub input_size: usize,
}

impl ModelsConfig {
    pub fn file_for(&self, kind: ModelKind) -> &str {
        match kind {
            ModelKind::GestureRecognizer => &self.gesture_recognizer,
            ModelKind::HandLandmarker => &self.hand_landmarker,
            ModelKind::FaceLandmarker => &self.face_landmarker,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            assets_dir: "models".to_string(),
            hub_repo: String::new(),
            gesture_recognizer: "gesture_recognizer.safetensors".to_string(),
            hand_landmarker: "hand_landmarker.safetensors".to_string(),
            face_landmarker: "face_landmarker.safetensors".to_string(),
            input_size: 64,
        }
    }
}

/// Session capacity and liveness tuning.
///
/// ## Fields:
/// - `max_concurrent_sessions`: websocket upgrades beyond this many live sessions get HTTP 503
/// - `gpu_capability`: `auto` (probe), `available` or `unavailable`
/// - `heartbeat_interval_secs`: how often the server pings each client
/// - `client_timeout_secs`: silence after which a connection is dropped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
    pub gpu_capability: String,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl PerformanceConfig {
    /// Parsed capability; `validate` has already rejected unknown values.
    pub fn gpu_capability(&self) -> GpuCapability {
        self.gpu_capability.parse().unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            models: ModelsConfig::default(),
            performance: PerformanceConfig {
                max_concurrent_sessions: 16,
                gpu_capability: "auto".to_string(),
                heartbeat_interval_secs: 30,
                client_timeout_secs: 60,
            },
            emotion: EmotionThresholds::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`
    /// - `APP_MODELS__HUB_REPO=my-org/perception-models`
    /// - `APP_PERFORMANCE__GPU_CAPABILITY=unavailable`
    /// - `HOST=0.0.0.0`, `PORT=3000`
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port cannot be 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.performance.heartbeat_interval_secs == 0 {
            return Err(anyhow!("Heartbeat interval must be greater than 0"));
        }

        if self.performance.client_timeout_secs <= self.performance.heartbeat_interval_secs {
            return Err(anyhow!("Client timeout must be longer than the heartbeat interval"));
        }

        self.performance
            .gpu_capability
            .parse::<GpuCapability>()
            .map_err(|e| anyhow!(e))?;

        // The network needs at least one pixel left after three stride-2 convolutions
        if self.models.input_size < 8 {
            return Err(anyhow!("Model input size must be at least 8 pixels"));
        }

        for kind in ModelKind::ALL {
            if self.models.file_for(kind).trim().is_empty() {
                return Err(anyhow!("No asset file configured for {}", kind));
            }
        }

        let thresholds = [
            self.emotion.open_threshold,
            self.emotion.smile_corner_threshold,
            self.emotion.smile_width_threshold,
            self.emotion.sad_threshold,
        ];
        if thresholds.iter().any(|t| !t.is_finite()) {
            return Err(anyhow!("Emotion thresholds must be finite numbers"));
        }

        Ok(())
    }

    /// Apply a partial JSON update (used by `PUT /api/v1/config`).
    ///
    /// Only the settings that are safe to change while running are accepted:
    /// `performance.max_concurrent_sessions` and the `emotion` thresholds. New
    /// values apply to sessions opened afterwards.
    ///
    /// ## Example:
    /// `{"performance": {"max_concurrent_sessions": 4}, "emotion": {"open_threshold": 0.2}}`
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(performance) = partial.get("performance") {
            if let Some(sessions) = performance.get("max_concurrent_sessions").and_then(|v| v.as_u64()) {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
        }

        if let Some(emotion) = partial.get("emotion") {
            let fields: [(&str, &mut f32); 4] = [
                ("open_threshold", &mut self.emotion.open_threshold),
                ("smile_corner_threshold", &mut self.emotion.smile_corner_threshold),
                ("smile_width_threshold", &mut self.emotion.smile_width_threshold),
                ("sad_threshold", &mut self.emotion.sad_threshold),
            ];
            for (name, slot) in fields {
                if let Some(value) = emotion.get(name).and_then(|v| v.as_f64()) {
                    *slot = value as f32;
                }
            }
        }

        self.validate()
    }
}
