//! # Inference Backend Seam
//!
//! The session drives inference only through these two traits, so the concrete
//! model (candle network, a remote service, a test fake) can be swapped freely.
//!
//! ## Contract:
//! - [`BackendFactory::create`] builds one backend bound to one applied config and
//!   one model asset path. It may adjust the request (GPU → CPU) and report a warning.
//! - [`InferenceBackend::infer`] expects a timestamp strictly greater than every
//!   timestamp previously given to *that instance*. Callers enforce this.
//! - [`InferenceBackend::close`] releases native resources. The owning
//!   [`BackendSlot`](super::BackendSlot) guarantees it runs exactly once.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::vision::{AppliedConfig, RawImage, SessionConfig};

/// A normalized keypoint. `x`/`y` are roughly in `[0, 1]` image space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One classification candidate, e.g. `Thumb_Up` with score `0.875`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceOutput {
    /// One landmark set per detected instance (hand or face)
    pub landmarks: Vec<Vec<Landmark>>,
    /// Best first; empty when nothing was recognized or the model does not classify
    pub categories: Vec<Category>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("backend construction failed: {0}")]
    Construction(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("timestamp {given} does not exceed previous timestamp {last}")]
    TimestampRegression { given: i64, last: i64 },

    #[error("backend already closed")]
    Closed,
}

impl From<candle_core::Error> for BackendError {
    fn from(err: candle_core::Error) -> Self {
        BackendError::Inference(err.to_string())
    }
}

pub trait InferenceBackend: Send {
    fn infer(&mut self, image: &RawImage, timestamp_ms: i64) -> Result<InferenceOutput, BackendError>;

    fn close(&mut self);
}

/// What a successful construction yields: the backend, the config it actually
/// runs with, and an optional non-fatal warning.
pub type CreatedBackend = (Box<dyn InferenceBackend>, AppliedConfig, Option<String>);

pub trait BackendFactory: Send + Sync {
    fn create(&self, model_path: &Path, config: &SessionConfig) -> Result<CreatedBackend, BackendError>;
}
