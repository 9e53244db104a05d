//! # Inference Capability
//!
//! Everything behind the session's `create` / `infer` / `close` calls:
//! - [`backend`]: the trait seam and shared result types
//! - [`slot`]: single-owner holder that guarantees one live backend per session
//! - [`landmark_net`] and [`candle_backend`]: the shipped candle implementation
//! - [`gesture`]: landmark-geometry gesture classification
//! - [`assets`]: model file resolution and download

pub mod assets;
pub mod backend;
pub mod candle_backend;
pub mod gesture;
pub mod landmark_net;
pub mod slot;

pub use assets::{AssetRegistry, AssetStatus, ModelResolver};
pub use backend::{
    BackendError, BackendFactory, CreatedBackend, InferenceBackend, InferenceOutput, Landmark,
};
pub use candle_backend::CandleBackendFactory;
pub use slot::BackendSlot;
