//! Owned slot holding at most one live backend.

use super::backend::{BackendError, InferenceBackend, InferenceOutput};
use crate::vision::{AppliedConfig, RawImage};

/// Exclusive owner of a session's backend.
///
/// `replace` releases the displaced backend before installing the new one, and
/// `close` (also run on drop) releases whatever is installed exactly once. An
/// empty slot refuses inference with [`BackendError::Closed`].
#[derive(Default)]
pub struct BackendSlot {
    current: Option<(Box<dyn InferenceBackend>, AppliedConfig)>,
}

impl BackendSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self) -> bool {
        self.current.is_some()
    }

    pub fn applied(&self) -> Option<&AppliedConfig> {
        self.current.as_ref().map(|(_, applied)| applied)
    }

    /// Install `backend`, closing any previous one first.
    pub fn replace(&mut self, backend: Box<dyn InferenceBackend>, applied: AppliedConfig) {
        self.close();
        self.current = Some((backend, applied));
    }

    pub fn infer(&mut self, image: &RawImage, timestamp_ms: i64) -> Result<InferenceOutput, BackendError> {
        match self.current.as_mut() {
            Some((backend, _)) => backend.infer(image, timestamp_ms),
            None => Err(BackendError::Closed),
        }
    }

    /// Release the current backend. Idempotent.
    pub fn close(&mut self) {
        if let Some((mut backend, _)) = self.current.take() {
            backend.close();
        }
    }
}

impl Drop for BackendSlot {
    fn drop(&mut self) {
        self.close();
    }
}
