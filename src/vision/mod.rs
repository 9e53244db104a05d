//! # Real-Time Perception Sessions
//!
//! The core of the service: everything a single webcam connection needs,
//! independent of the websocket transport that carries it.
//!
//! ## Flow:
//! ```text
//! text message ─▶ protocol::classify_message
//!                   ├─ config ─▶ config::normalize ─▶ backend swap (inference::BackendSlot)
//!                   └─ frame  ─▶ codec::decode_frame ─▶ clock ─▶ infer ─▶ features ─▶ ServerMessage
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod features;
pub mod protocol;
pub mod session;

pub use codec::RawImage;
pub use config::{AppliedConfig, Delegate, ModelKind, SessionConfig, SessionKind};
pub use error::SessionError;
pub use features::EmotionThresholds;
pub use protocol::ServerMessage;
pub use session::{AssetLocator, PerceptionSession, SessionStats};
