//! # Session Wire Protocol
//!
//! Classifies inbound text and defines every JSON message a session sends.
//!
//! ## Inbound:
//! - Text whose first non-whitespace character is `{` is a **control** message
//! - Anything else is a **data frame** (`"<mime-prefix>,<base64>"`)
//!
//! ## Outbound (`type` tag):
//! - `config`: applied configuration, optional warning, optional reconfiguration error
//! - `result`: per-frame hand landmarks and gesture (gesture sessions)
//! - `emotion`: per-frame face analysis (emotion sessions)
//! - `error`: fatal startup error, sent right before the channel closes

use serde::Serialize;
use serde_json::{Map, Value};

use super::config::AppliedConfig;
use super::error::SessionError;
use super::features::{EmotionLabel, FaceAnalysis, FaceMetrics, Guides};
use crate::inference::{gesture, InferenceOutput, Landmark};

pub const NO_HAND_LABEL: &str = "no hand detected";
pub const UNRECOGNIZED_LABEL: &str = "gesture unrecognized";

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `{"type":"config","config":{...}}`; a missing or non-object `config` is an empty patch
    Configure(Map<String, Value>),
    /// Well-formed control message of a type sessions do not handle
    Unhandled(String),
    Frame(String),
}

pub fn classify_message(text: &str) -> Result<ClientMessage, SessionError> {
    if !text.trim_start().starts_with('{') {
        return Ok(ClientMessage::Frame(text.to_string()));
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| SessionError::MalformedMessage(e.to_string()))?;

    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    if kind != "config" {
        return Ok(ClientMessage::Unhandled(kind.to_string()));
    }

    let patch = value
        .get("config")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Ok(ClientMessage::Configure(patch))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GestureResult {
    pub label: String,
    pub score: f32,
    /// Raw category name, e.g. `Thumb_Up`
    pub raw: Option<String>,
}

impl GestureResult {
    pub fn no_hand() -> Self {
        Self {
            label: NO_HAND_LABEL.to_string(),
            score: 0.0,
            raw: None,
        }
    }

    pub fn from_output(output: &InferenceOutput) -> Self {
        if output.landmarks.is_empty() {
            return Self::no_hand();
        }

        match output.categories.first() {
            Some(top) => Self {
                label: gesture::display_label(&top.name),
                score: top.score,
                raw: Some(top.name.clone()),
            },
            None => Self {
                label: UNRECOGNIZED_LABEL.to_string(),
                score: 0.0,
                raw: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameMetrics {
    pub inference_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmotionSummary {
    pub label: EmotionLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmotionMetrics {
    #[serde(flatten)]
    pub face: FaceMetrics,
    pub inference_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Config {
        /// `null` while no backend is running
        applied: Option<AppliedConfig>,
        warning: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Result {
        landmarks: Option<Vec<Vec<Landmark>>>,
        gesture: GestureResult,
        metrics: FrameMetrics,
    },
    Emotion {
        face: bool,
        emotion: EmotionSummary,
        #[serde(skip_serializing_if = "Option::is_none")]
        metrics: Option<EmotionMetrics>,
        #[serde(skip_serializing_if = "Option::is_none")]
        guides: Option<Guides>,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    /// Gesture-session reply for a frame that produced nothing usable.
    pub fn null_result() -> Self {
        ServerMessage::Result {
            landmarks: None,
            gesture: GestureResult::no_hand(),
            metrics: FrameMetrics { inference_ms: 0.0 },
        }
    }

    pub fn gesture_result(output: InferenceOutput, inference_ms: f64) -> Self {
        let gesture = GestureResult::from_output(&output);
        let landmarks = if output.landmarks.is_empty() {
            None
        } else {
            Some(output.landmarks)
        };

        ServerMessage::Result {
            landmarks,
            gesture,
            metrics: FrameMetrics { inference_ms },
        }
    }

    pub fn no_face() -> Self {
        ServerMessage::Emotion {
            face: false,
            emotion: EmotionSummary {
                label: EmotionLabel::NoFace,
            },
            metrics: None,
            guides: None,
        }
    }

    pub fn emotion_result(analysis: FaceAnalysis, inference_ms: f64) -> Self {
        ServerMessage::Emotion {
            face: true,
            emotion: EmotionSummary {
                label: analysis.label,
            },
            metrics: Some(EmotionMetrics {
                face: analysis.metrics,
                inference_ms,
            }),
            guides: Some(analysis.guides),
        }
    }

    pub fn to_json(&self) -> String {
        // Every variant is plain data; serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"serialization failed: {}"}}"#, e)
        })
    }
}
