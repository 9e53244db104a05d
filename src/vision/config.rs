//! # Session Configuration
//!
//! Validates and merges partial configuration updates sent by the browser
//! (`{"type":"config","config":{...}}`) against the session's current settings.
//!
//! ## Validation Policy:
//! - **Absent field**: keep the previous value
//! - **Unknown enum value** (delegate, model): discard that field's update, keep the previous value
//! - **Unparseable number** (not a number, NaN, infinite): discard that field's update
//! - **Out-of-range number**: clamp into the declared range
//!
//! A patch is never rejected wholesale. Every field is validated on its own,
//! so `normalize` always produces a fully valid [`SessionConfig`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Compute delegate requested for the inference backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delegate {
    Cpu,
    Gpu,
}

impl Delegate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delegate::Cpu => "cpu",
            Delegate::Gpu => "gpu",
        }
    }

    /// Parse a wire value. Unknown values yield `None` so the caller keeps its previous delegate.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "cpu" => Some(Delegate::Cpu),
            "gpu" => Some(Delegate::Gpu),
            _ => None,
        }
    }
}

impl fmt::Display for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which model asset (and which capability) a backend is built from.
///
/// ## Capabilities:
/// - **GestureRecognizer**: hand landmarks plus a gesture classification
/// - **HandLandmarker**: hand landmarks only (classification always empty)
/// - **FaceLandmarker**: face mesh landmarks, used by emotion sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    GestureRecognizer,
    HandLandmarker,
    FaceLandmarker,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::GestureRecognizer,
        ModelKind::HandLandmarker,
        ModelKind::FaceLandmarker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::GestureRecognizer => "gesture_recognizer",
            ModelKind::HandLandmarker => "hand_landmarker",
            ModelKind::FaceLandmarker => "face_landmarker",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "gesture_recognizer" => Some(ModelKind::GestureRecognizer),
            "hand_landmarker" => Some(ModelKind::HandLandmarker),
            "face_landmarker" => Some(ModelKind::FaceLandmarker),
            _ => None,
        }
    }

    /// Whether this model produces hand landmarks (as opposed to a face mesh).
    pub fn is_hand_model(&self) -> bool {
        matches!(self, ModelKind::GestureRecognizer | ModelKind::HandLandmarker)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::parse(s).ok_or_else(|| format!("Unknown model kind: {}", s))
    }
}

/// The two kinds of perception session the server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// `/ws`: hand landmarks and gesture classification
    Gesture,
    /// `/ws/emotion`: face mesh and emotion classification
    Emotion,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Gesture => "gesture",
            SessionKind::Emotion => "emotion",
        }
    }

    pub fn default_model(&self) -> ModelKind {
        match self {
            SessionKind::Gesture => ModelKind::GestureRecognizer,
            SessionKind::Emotion => ModelKind::FaceLandmarker,
        }
    }

    /// Models a client may switch to within this kind of session.
    pub fn accepts_model(&self, model: ModelKind) -> bool {
        match self {
            SessionKind::Gesture => model.is_hand_model(),
            SessionKind::Emotion => model == ModelKind::FaceLandmarker,
        }
    }
}

pub const MIN_NUM_HANDS: u8 = 1;
pub const MAX_NUM_HANDS: u8 = 2;

/// Requested inference settings for one session.
///
/// ## Invariant:
/// Every field always holds a valid, clamped value. Construct through
/// [`SessionConfig::default_for`] and evolve through [`normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub delegate: Delegate,
    /// Serialized as `model`, the name the browser uses
    #[serde(rename = "model")]
    pub model_kind: ModelKind,
    pub num_hands: u8,
    pub min_hand_detection_confidence: f32,
    pub min_hand_presence_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl SessionConfig {
    pub fn default_for(kind: SessionKind) -> Self {
        Self {
            delegate: Delegate::Cpu,
            model_kind: kind.default_model(),
            num_hands: 1,
            min_hand_detection_confidence: 0.5,
            min_hand_presence_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

/// The configuration actually in effect after backend construction.
///
/// Kept as its own type so the client can observe requested-vs-applied drift
/// (for example a `gpu` request served by the CPU).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppliedConfig(pub SessionConfig);

impl AppliedConfig {
    pub fn settings(&self) -> &SessionConfig {
        &self.0
    }
}

/// Merge a partial update into `previous`, field by field.
///
/// ## Parameters:
/// - **kind**: session kind, which restricts the models a patch may select
/// - **previous**: the current requested configuration
/// - **patch**: the raw `config` object from the control message
///
/// Never fails. Applying the same patch twice yields the same result as once.
pub fn normalize(kind: SessionKind, previous: &SessionConfig, patch: &Map<String, Value>) -> SessionConfig {
    let mut next = *previous;

    if let Some(delegate) = patch.get("delegate").and_then(Value::as_str).and_then(Delegate::parse) {
        next.delegate = delegate;
    }

    let model = patch.get("model").or_else(|| patch.get("model_kind"));
    if let Some(model) = model.and_then(Value::as_str).and_then(ModelKind::parse) {
        if kind.accepts_model(model) {
            next.model_kind = model;
        }
    }

    if let Some(hands) = patch.get("num_hands").and_then(parse_number) {
        next.num_hands = hands.round().clamp(MIN_NUM_HANDS as f64, MAX_NUM_HANDS as f64) as u8;
    }

    if let Some(value) = patch.get("min_hand_detection_confidence").and_then(parse_number) {
        next.min_hand_detection_confidence = clamp_unit(value);
    }
    if let Some(value) = patch.get("min_hand_presence_confidence").and_then(parse_number) {
        next.min_hand_presence_confidence = clamp_unit(value);
    }
    if let Some(value) = patch.get("min_tracking_confidence").and_then(parse_number) {
        next.min_tracking_confidence = clamp_unit(value);
    }

    next
}

/// Accept JSON numbers and numeric strings; anything else (or a non-finite value) is unparseable.
fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn clamp_unit(value: f64) -> f32 {
    value.clamp(0.0, 1.0) as f32
}
