//! # Candle Inference Backend
//!
//! Concrete [`InferenceBackend`] built on [`LandmarkNet`].
//!
//! ## Confidence Semantics:
//! - Only the first `num_hands` instance slots are considered (face mesh: one)
//! - A slot tracked on the previous frame survives while its presence is at least
//!   `min_tracking_confidence`
//! - An untracked slot must reach `min_hand_detection_confidence` to be picked up
//! - Every kept slot must also reach `min_hand_presence_confidence`
//!
//! `gesture_recognizer` classifies the first kept hand; the other models return
//! an empty classification.

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use std::path::Path;
use tracing::debug;

use super::backend::{
    BackendError, BackendFactory, CreatedBackend, InferenceBackend, InferenceOutput,
};
use super::gesture;
use super::landmark_net::{LandmarkNet, LandmarkNetConfig};
use crate::device::{DeviceManager, GpuCapability};
use crate::vision::{AppliedConfig, ModelKind, RawImage, SessionConfig};

pub struct CandleBackend {
    net: Option<LandmarkNet>,
    device: Device,
    config: SessionConfig,
    /// Which slots held an instance on the previous frame
    tracked: Vec<bool>,
    last_timestamp_ms: Option<i64>,
}

impl CandleBackend {
    pub fn new(net: LandmarkNet, device: Device, config: SessionConfig) -> Self {
        let slots = net.config().max_instances;
        Self {
            net: Some(net),
            device,
            config,
            tracked: vec![false; slots],
            last_timestamp_ms: None,
        }
    }

    fn active_slots(&self) -> usize {
        let slots = self.tracked.len();
        if self.config.model_kind.is_hand_model() {
            slots.min(self.config.num_hands as usize)
        } else {
            slots
        }
    }
}

impl InferenceBackend for CandleBackend {
    fn infer(&mut self, image: &RawImage, timestamp_ms: i64) -> Result<InferenceOutput, BackendError> {
        if let Some(last) = self.last_timestamp_ms {
            if timestamp_ms <= last {
                return Err(BackendError::TimestampRegression {
                    given: timestamp_ms,
                    last,
                });
            }
        }

        let net = self.net.as_ref().ok_or(BackendError::Closed)?;
        let predictions = net.predict(image, &self.device)?;
        self.last_timestamp_ms = Some(timestamp_ms);

        let active = self.active_slots();
        let mut landmarks = Vec::new();

        for (slot, prediction) in predictions.into_iter().enumerate() {
            if slot >= active {
                self.tracked[slot] = false;
                continue;
            }

            let gate = if self.tracked[slot] {
                self.config.min_tracking_confidence
            } else {
                self.config.min_hand_detection_confidence
            };
            let keep = prediction.presence >= gate
                && prediction.presence >= self.config.min_hand_presence_confidence;

            self.tracked[slot] = keep;
            if keep {
                landmarks.push(prediction.landmarks);
            }
        }

        let categories = match (self.config.model_kind, landmarks.first()) {
            (ModelKind::GestureRecognizer, Some(hand)) => gesture::classify_hand(hand),
            _ => Vec::new(),
        };

        Ok(InferenceOutput { landmarks, categories })
    }

    fn close(&mut self) {
        if self.net.take().is_some() {
            debug!("Released {} landmark network", self.config.model_kind);
        }
        self.tracked.iter_mut().for_each(|t| *t = false);
    }
}

/// Builds [`CandleBackend`]s from safetensors assets.
#[derive(Debug, Clone)]
pub struct CandleBackendFactory {
    input_size: usize,
    gpu_capability: GpuCapability,
}

impl CandleBackendFactory {
    pub fn new(input_size: usize, gpu_capability: GpuCapability) -> Self {
        Self {
            input_size,
            gpu_capability,
        }
    }
}

impl BackendFactory for CandleBackendFactory {
    fn create(&self, model_path: &Path, config: &SessionConfig) -> Result<CreatedBackend, BackendError> {
        let selection = DeviceManager::resolve_delegate(config.delegate, self.gpu_capability);

        let net_config = LandmarkNetConfig::for_model(config.model_kind, self.input_size);
        // SAFETY: the asset file is not modified while mapped
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[model_path], DType::F32, &selection.device)
        }
        .map_err(|e| BackendError::Construction(format!("{}: {}", model_path.display(), e)))?;

        let net = LandmarkNet::load(vb, net_config)
            .map_err(|e| BackendError::Construction(e.to_string()))?;

        let applied = SessionConfig {
            delegate: selection.delegate,
            ..*config
        };
        debug!(
            "Constructed {} backend on {} (requested {})",
            config.model_kind,
            DeviceManager::device_name(&selection.device),
            config.delegate
        );

        let backend = CandleBackend::new(net, selection.device, applied);
        Ok((Box::new(backend), AppliedConfig(applied), selection.warning))
    }
}
