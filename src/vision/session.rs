//! # Perception Session State Machine
//!
//! One `PerceptionSession` exists per websocket connection. It owns every piece
//! of per-connection state: requested configuration, the live backend, the
//! monotonic clock and counters. Nothing here is shared between sessions.
//!
//! ## States:
//! ```text
//! Connecting ─ asset + initial backend ─▶ BackendReady ─▶ Streaming ⇄ Reconfiguring
//!      │                                                      │
//!      └──────────── startup failure ─────────▶ Closed ◀──────┘ disconnect / close
//! ```
//!
//! ## Message Handling (Streaming):
//! - **Malformed control JSON**: dropped, no reply
//! - **`type: "config"`**: normalize; rebuild the backend only when the result differs
//! - **Data frame**: decode → timestamp → infer → result; any failure yields a null result
//!
//! ## Key Guarantees:
//! - At most one backend is live; the old one is released before a new one is built
//! - Timestamps given to one backend instance strictly increase
//! - `close` releases the backend exactly once, whichever path ends the session

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::clock::MonotonicClock;
use super::codec::decode_frame;
use super::config::{normalize, AppliedConfig, ModelKind, SessionConfig, SessionKind};
use super::error::SessionError;
use super::features::{self, EmotionThresholds};
use super::protocol::{classify_message, ClientMessage, ServerMessage};
use crate::inference::{BackendError, BackendFactory, BackendSlot};

/// Minimum spacing between backend restore attempts made from the frame path.
const RESTORE_RETRY_MS: i64 = 1_000;

/// Resolves the model file for a kind, `None` when it cannot be obtained.
pub type AssetLocator = Box<dyn Fn(ModelKind) -> Option<PathBuf> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    BackendReady,
    Streaming,
    Reconfiguring,
    Closed,
}

/// Per-session counters, folded into application metrics on close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub frame_failures: u64,
    pub reconfigurations: u64,
    pub reconfigure_failures: u64,
    pub backend_constructions: u64,
    pub dropped_messages: u64,
}

pub struct PerceptionSession {
    id: Uuid,
    kind: SessionKind,
    state: SessionState,
    requested: SessionConfig,
    warning: Option<String>,
    slot: BackendSlot,
    clock: MonotonicClock,
    factory: Arc<dyn BackendFactory>,
    locate: AssetLocator,
    assets: HashMap<ModelKind, PathBuf>,
    thresholds: EmotionThresholds,
    started: Instant,
    /// Set when a failed reconfiguration could not restore the previous backend:
    /// the wall time from which the next frame may retry building it
    restore_at_ms: Option<i64>,
    stats: SessionStats,
}

impl PerceptionSession {
    pub fn new(
        kind: SessionKind,
        factory: Arc<dyn BackendFactory>,
        locate: AssetLocator,
        thresholds: EmotionThresholds,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            state: SessionState::Connecting,
            requested: SessionConfig::default_for(kind),
            warning: None,
            slot: BackendSlot::new(),
            clock: MonotonicClock::new(),
            factory,
            locate,
            assets: HashMap::new(),
            thresholds,
            started: Instant::now(),
            restore_at_ms: None,
            stats: SessionStats::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn requested(&self) -> &SessionConfig {
        &self.requested
    }

    pub fn applied(&self) -> Option<&AppliedConfig> {
        self.slot.applied()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Resolve the model asset and build the initial backend.
    ///
    /// ## Returns:
    /// The initial `config` message, or [`SessionError::StartupFatal`] after
    /// which the caller reports the error and closes the channel.
    pub fn start(&mut self) -> Result<ServerMessage, SessionError> {
        info!(session_id = %self.id, "Starting {} session", self.kind.as_str());

        let result = self.build_initial();
        if let Err(e) = &result {
            warn!(session_id = %self.id, "Session startup failed: {}", e);
            self.close();
        }
        result
    }

    fn build_initial(&mut self) -> Result<ServerMessage, SessionError> {
        let config = self.requested;
        let path = self.asset_for(config.model_kind).ok_or_else(|| {
            SessionError::StartupFatal(format!("model asset {} is unavailable", config.model_kind))
        })?;

        let applied = self
            .install(&path, &config)
            .map_err(|e| SessionError::StartupFatal(e.to_string()))?;

        self.state = SessionState::BackendReady;
        let message = ServerMessage::Config {
            applied: Some(applied),
            warning: self.warning.clone(),
            error: None,
        };
        self.state = SessionState::Streaming;
        Ok(message)
    }

    /// Handle one inbound text message using the session's own elapsed time.
    pub fn handle_text(&mut self, text: &str) -> Option<ServerMessage> {
        let wall_ms = self.started.elapsed().as_millis() as i64;
        self.handle_text_at(text, wall_ms)
    }

    /// Handle one inbound text message at an explicit wall-clock time.
    ///
    /// Returns `None` when the message gets no reply (malformed or unhandled control).
    pub fn handle_text_at(&mut self, text: &str, wall_ms: i64) -> Option<ServerMessage> {
        if self.state != SessionState::Streaming {
            return None;
        }

        match classify_message(text) {
            Ok(ClientMessage::Frame(frame)) => Some(self.process_frame(&frame, wall_ms)),
            Ok(ClientMessage::Configure(patch)) => Some(self.reconfigure(&patch)),
            Ok(ClientMessage::Unhandled(kind)) => {
                debug!(session_id = %self.id, "Ignoring control message of type '{}'", kind);
                self.stats.dropped_messages += 1;
                None
            }
            Err(e) => {
                debug!(session_id = %self.id, "Dropping message: {}", e);
                self.stats.dropped_messages += 1;
                None
            }
        }
    }

    fn process_frame(&mut self, frame: &str, wall_ms: i64) -> ServerMessage {
        self.stats.frames += 1;

        match self.run_pipeline(frame, wall_ms) {
            Ok(message) => message,
            Err(e) => {
                self.stats.frame_failures += 1;
                debug!(session_id = %self.id, "{}", e);
                self.empty_result()
            }
        }
    }

    fn run_pipeline(&mut self, frame: &str, wall_ms: i64) -> Result<ServerMessage, SessionError> {
        let image = decode_frame(frame)?;
        self.restore_if_due(wall_ms)?;
        let timestamp = self.clock.next(wall_ms);

        let started = Instant::now();
        let output = self
            .slot
            .infer(&image, timestamp)
            .map_err(|e| SessionError::FrameFailure(e.to_string()))?;
        let inference_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(match self.kind {
            SessionKind::Gesture => ServerMessage::gesture_result(output, inference_ms),
            SessionKind::Emotion => output
                .landmarks
                .first()
                .and_then(|face| features::analyze(face, &self.thresholds))
                .map(|analysis| ServerMessage::emotion_result(analysis, inference_ms))
                .unwrap_or_else(ServerMessage::no_face),
        })
    }

    fn empty_result(&self) -> ServerMessage {
        match self.kind {
            SessionKind::Gesture => ServerMessage::null_result(),
            SessionKind::Emotion => ServerMessage::no_face(),
        }
    }

    fn reconfigure(&mut self, patch: &Map<String, Value>) -> ServerMessage {
        let previous = self.requested;
        let next = normalize(self.kind, &previous, patch);

        if next == previous && self.slot.is_live() {
            return self.config_message();
        }

        self.state = SessionState::Reconfiguring;
        self.stats.reconfigurations += 1;

        let reply = match self.rebuild(&previous, &next) {
            Ok(()) => {
                info!(session_id = %self.id, "Reconfigured: {:?}", self.slot.applied());
                self.config_message()
            }
            Err(e) => {
                self.stats.reconfigure_failures += 1;
                warn!(session_id = %self.id, "{}", e);
                let mut error = e.to_string();
                if !self.slot.is_live() {
                    self.restore_at_ms = Some(0);
                    error.push_str("; no backend is running");
                }
                ServerMessage::Config {
                    applied: self.applied().copied(),
                    warning: self.warning.clone(),
                    error: Some(error),
                }
            }
        };

        self.state = SessionState::Streaming;
        reply
    }

    /// Swap to `next`; on failure rebuild `previous` so the session keeps serving frames.
    fn rebuild(&mut self, previous: &SessionConfig, next: &SessionConfig) -> Result<(), SessionError> {
        let path = self.asset_for(next.model_kind).ok_or_else(|| {
            SessionError::ReconfigureFailure(format!("model asset {} is unavailable", next.model_kind))
        })?;

        // Release before constructing so two backends never coexist
        self.slot.close();
        self.clock.reset();
        self.warning = None;

        match self.install(&path, next) {
            Ok(_) => {
                self.requested = *next;
                Ok(())
            }
            Err(e) => {
                let restored = self
                    .asset_for(previous.model_kind)
                    .and_then(|prev_path| self.install(&prev_path, previous).ok());
                if restored.is_none() {
                    warn!(session_id = %self.id, "Could not restore previous backend; frames will return empty results");
                }
                Err(SessionError::ReconfigureFailure(e.to_string()))
            }
        }
    }

    fn install(&mut self, path: &Path, config: &SessionConfig) -> Result<AppliedConfig, BackendError> {
        let (backend, applied, warning) = self.factory.create(path, config)?;
        self.stats.backend_constructions += 1;

        if applied.settings().delegate != config.delegate {
            info!(
                session_id = %self.id,
                "Requested {} delegate, running on {}",
                config.delegate,
                applied.settings().delegate
            );
        }

        self.slot.replace(backend, applied);
        self.warning = warning;
        self.restore_at_ms = None;
        Ok(applied)
    }

    /// Retry the requested configuration while the slot is empty, at most once
    /// per [`RESTORE_RETRY_MS`]. Frames in between fail without touching the factory.
    fn restore_if_due(&mut self, wall_ms: i64) -> Result<(), SessionError> {
        let Some(due) = self.restore_at_ms else {
            return Ok(());
        };
        if wall_ms < due {
            return Err(SessionError::FrameFailure("no backend is running".to_string()));
        }

        let config = self.requested;
        self.clock.reset();
        let restored = match self.asset_for(config.model_kind) {
            Some(path) => self.install(&path, &config).map_err(|e| e.to_string()),
            None => Err(format!("model asset {} is unavailable", config.model_kind)),
        };

        match restored {
            Ok(_) => {
                info!(session_id = %self.id, "Backend restored");
                Ok(())
            }
            Err(e) => {
                self.restore_at_ms = Some(wall_ms + RESTORE_RETRY_MS);
                Err(SessionError::FrameFailure(format!("backend restore failed: {}", e)))
            }
        }
    }

    fn asset_for(&mut self, kind: ModelKind) -> Option<PathBuf> {
        if let Some(path) = self.assets.get(&kind) {
            return Some(path.clone());
        }
        let path = (self.locate)(kind)?;
        self.assets.insert(kind, path.clone());
        Some(path)
    }

    fn config_message(&self) -> ServerMessage {
        ServerMessage::Config {
            applied: self.applied().copied(),
            warning: self.warning.clone(),
            error: None,
        }
    }

    /// Release the backend and enter `Closed`. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.slot.close();
        self.state = SessionState::Closed;
        info!(
            session_id = %self.id,
            frames = self.stats.frames,
            frame_failures = self.stats.frame_failures,
            reconfigurations = self.stats.reconfigurations,
            "Session closed"
        );
    }
}

impl Drop for PerceptionSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{CreatedBackend, InferenceBackend, InferenceOutput, Landmark};
    use crate::vision::config::Delegate;
    use crate::vision::RawImage;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Tally {
        constructions: AtomicUsize,
        closes: AtomicUsize,
        live: AtomicUsize,
        max_live: AtomicUsize,
        timestamps: Mutex<Vec<i64>>,
        /// Refuse every construction while set
        outage: AtomicBool,
    }

    struct FakeBackend {
        tally: Arc<Tally>,
        output: InferenceOutput,
    }

    impl InferenceBackend for FakeBackend {
        fn infer(&mut self, _image: &RawImage, ts: i64) -> Result<InferenceOutput, BackendError> {
            self.tally.timestamps.lock().unwrap().push(ts);
            Ok(self.output.clone())
        }

        fn close(&mut self) {
            self.tally.closes.fetch_add(1, Ordering::SeqCst);
            self.tally.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Counts constructions, simulates a CPU-only host and can refuse configs.
    struct FakeFactory {
        tally: Arc<Tally>,
        output: InferenceOutput,
        refuse: fn(&SessionConfig) -> bool,
    }

    impl BackendFactory for FakeFactory {
        fn create(&self, _path: &Path, config: &SessionConfig) -> Result<CreatedBackend, BackendError> {
            if (self.refuse)(config) || self.tally.outage.load(Ordering::SeqCst) {
                return Err(BackendError::Construction("refused".into()));
            }
            self.tally.constructions.fetch_add(1, Ordering::SeqCst);
            let live = self.tally.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.tally.max_live.fetch_max(live, Ordering::SeqCst);

            let mut applied = *config;
            let warning = if config.delegate == Delegate::Gpu {
                applied.delegate = Delegate::Cpu;
                Some("GPU unavailable".to_string())
            } else {
                None
            };
            let backend = FakeBackend {
                tally: self.tally.clone(),
                output: self.output.clone(),
            };
            Ok((Box::new(backend), AppliedConfig(applied), warning))
        }
    }

    fn session_with(
        kind: SessionKind,
        output: InferenceOutput,
        refuse: fn(&SessionConfig) -> bool,
        locate: AssetLocator,
    ) -> (PerceptionSession, Arc<Tally>) {
        let tally = Arc::new(Tally::default());
        let factory = Arc::new(FakeFactory {
            tally: tally.clone(),
            output,
            refuse,
        });
        let session = PerceptionSession::new(kind, factory, locate, EmotionThresholds::default());
        (session, tally)
    }

    fn any_asset() -> AssetLocator {
        Box::new(|kind| Some(PathBuf::from(format!("/models/{}.safetensors", kind))))
    }

    fn gesture_session() -> (PerceptionSession, Arc<Tally>) {
        session_with(SessionKind::Gesture, InferenceOutput::default(), |_| false, any_asset())
    }

    fn started(kind: SessionKind, output: InferenceOutput) -> (PerceptionSession, Arc<Tally>) {
        let (mut session, tally) = session_with(kind, output, |_| false, any_asset());
        session.start().unwrap();
        (session, tally)
    }

    fn frame() -> String {
        let mut buf = Vec::new();
        RgbImage::new(4, 4)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(buf))
    }

    fn json(message: Option<ServerMessage>) -> Value {
        serde_json::from_str(&message.unwrap().to_json()).unwrap()
    }

    #[test]
    fn test_start_reports_applied_config() {
        let (mut session, tally) = gesture_session();
        let msg = session.start().unwrap();
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();

        assert_eq!(value["type"], "config");
        assert_eq!(value["applied"]["model"], "gesture_recognizer");
        assert!(value["warning"].is_null());
        assert_eq!(session.state(), SessionState::Streaming);
        assert_eq!(tally.constructions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_asset_is_startup_fatal() {
        let (mut session, tally) =
            session_with(SessionKind::Gesture, InferenceOutput::default(), |_| false, Box::new(|_| None));

        let err = session.start().unwrap_err();
        assert!(matches!(err, SessionError::StartupFatal(_)));
        assert!(err.is_terminal());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(tally.constructions.load(Ordering::SeqCst), 0);
        assert!(session.handle_text_at(&frame(), 1).is_none());
    }

    #[test]
    fn test_backend_failure_at_startup_is_fatal() {
        let (mut session, _) = session_with(SessionKind::Gesture, InferenceOutput::default(), |_| true, any_asset());
        assert!(matches!(session.start(), Err(SessionError::StartupFatal(_))));
    }

    #[test]
    fn test_gpu_request_falls_back_with_warning() {
        let (mut session, _) = started(SessionKind::Gesture, InferenceOutput::default());
        let value = json(session.handle_text_at(r#"{"type":"config","config":{"delegate":"gpu"}}"#, 1));

        assert_eq!(value["type"], "config");
        assert_eq!(value["applied"]["delegate"], "cpu");
        assert!(value["warning"].is_string());
        assert_eq!(session.requested().delegate, Delegate::Gpu);
    }

    #[test]
    fn test_num_hands_patch_is_clamped() {
        let (mut session, tally) = started(SessionKind::Gesture, InferenceOutput::default());
        let value = json(session.handle_text_at(r#"{"type":"config","config":{"num_hands":5}}"#, 1));

        assert_eq!(value["applied"]["num_hands"], 2);
        assert_eq!(tally.constructions.load(Ordering::SeqCst), 2);
        assert_eq!(tally.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_identical_patch_does_not_rebuild() {
        let (mut session, tally) = started(SessionKind::Gesture, InferenceOutput::default());
        let patch = r#"{"type":"config","config":{"num_hands":"1","delegate":"CPU","model":"nope"}}"#;
        let value = json(session.handle_text_at(patch, 1));

        assert_eq!(value["type"], "config");
        assert_eq!(value["applied"]["num_hands"], 1);
        assert_eq!(tally.constructions.load(Ordering::SeqCst), 1);
        assert_eq!(tally.closes.load(Ordering::SeqCst), 0);
        assert_eq!(session.stats().reconfigurations, 0);
    }

    #[test]
    fn test_malformed_frame_then_valid_frame() {
        let hand = vec![Landmark { x: 0.4, y: 0.4, z: 0.0 }; 21];
        let output = InferenceOutput {
            landmarks: vec![hand],
            categories: vec![],
        };
        let (mut session, _) = started(SessionKind::Gesture, output);

        let value = json(session.handle_text_at("nocomma", 1));
        assert_eq!(value["type"], "result");
        assert!(value["landmarks"].is_null());

        let value = json(session.handle_text_at(&frame(), 2));
        assert_eq!(value["landmarks"].as_array().unwrap().len(), 1);
        assert_eq!(value["gesture"]["label"], "gesture unrecognized");
        assert_eq!(session.stats().frames, 2);
        assert_eq!(session.stats().frame_failures, 1);
    }

    #[test]
    fn test_repeated_wall_time_gives_increasing_timestamps() {
        let (mut session, tally) = started(SessionKind::Gesture, InferenceOutput::default());
        let frame = frame();
        for wall in [100, 100, 100, 50, 101] {
            session.handle_text_at(&frame, wall);
        }

        let timestamps = tally.timestamps.lock().unwrap().clone();
        assert_eq!(timestamps, vec![100, 101, 102, 103, 104]);
    }

    #[test]
    fn test_clock_resets_on_backend_swap() {
        let (mut session, tally) = started(SessionKind::Gesture, InferenceOutput::default());
        let frame = frame();
        session.handle_text_at(&frame, 500);
        session.handle_text_at(r#"{"type":"config","config":{"num_hands":2}}"#, 501);
        session.handle_text_at(&frame, 20);

        assert_eq!(*tally.timestamps.lock().unwrap(), vec![500, 20]);
    }

    #[test]
    fn test_malformed_json_is_dropped_silently() {
        let (mut session, tally) = started(SessionKind::Gesture, InferenceOutput::default());
        assert!(session.handle_text_at(r#"{"type":"config","config":"#, 1).is_none());
        assert!(session.handle_text_at(r#"{"type":"hello"}"#, 1).is_none());
        assert_eq!(session.stats().dropped_messages, 2);
        assert_eq!(tally.constructions.load(Ordering::SeqCst), 1);

        // Still streaming afterwards
        assert!(session.handle_text_at(&frame(), 2).is_some());
    }

    #[test]
    fn test_reconfigure_failure_keeps_previous_config() {
        let (mut session, tally) = session_with(
            SessionKind::Gesture,
            InferenceOutput::default(),
            |c| c.model_kind == ModelKind::HandLandmarker,
            any_asset(),
        );
        session.start().unwrap();

        let value = json(session.handle_text_at(r#"{"type":"config","config":{"model":"hand_landmarker"}}"#, 1));
        assert_eq!(value["type"], "config");
        assert_eq!(value["applied"]["model"], "gesture_recognizer");
        assert!(value["error"].is_string());
        assert_eq!(session.requested().model_kind, ModelKind::GestureRecognizer);
        assert_eq!(session.stats().reconfigure_failures, 1);

        // Restored backend still serves frames
        let value = json(session.handle_text_at(&frame(), 2));
        assert_eq!(value["type"], "result");
        assert_eq!(tally.timestamps.lock().unwrap().len(), 1);
        assert_eq!(tally.max_live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_restore_reports_no_backend_then_recovers() {
        let (mut session, tally) = started(SessionKind::Gesture, InferenceOutput::default());
        tally.outage.store(true, Ordering::SeqCst);

        let value = json(session.handle_text_at(r#"{"type":"config","config":{"num_hands":2}}"#, 1));
        assert_eq!(value["type"], "config");
        assert!(value["applied"].is_null());
        assert!(value["warning"].is_null());
        assert!(value["error"].as_str().unwrap().contains("no backend is running"));
        assert!(session.applied().is_none());
        assert_eq!(session.requested().num_hands, 1);

        // First frame retries immediately and fails; the next attempt waits for the retry interval
        let frame = frame();
        let value = json(session.handle_text_at(&frame, 2));
        assert!(value["landmarks"].is_null());
        tally.outage.store(false, Ordering::SeqCst);
        let value = json(session.handle_text_at(&frame, 500));
        assert!(value["landmarks"].is_null());
        assert_eq!(tally.constructions.load(Ordering::SeqCst), 1);

        let value = json(session.handle_text_at(&frame, 1_002));
        assert_eq!(value["type"], "result");
        assert_eq!(tally.constructions.load(Ordering::SeqCst), 2);
        assert_eq!(*tally.timestamps.lock().unwrap(), vec![1_002]);
        assert_eq!(session.stats().frame_failures, 2);

        let value = json(session.handle_text_at(r#"{"type":"config","config":{}}"#, 1_003));
        assert_eq!(value["applied"]["num_hands"], 1);
        assert!(value.get("error").is_none());
        assert_eq!(tally.max_live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_config_message_retries_restore() {
        let (mut session, tally) = started(SessionKind::Gesture, InferenceOutput::default());
        tally.outage.store(true, Ordering::SeqCst);
        session.handle_text_at(r#"{"type":"config","config":{"num_hands":2}}"#, 1);
        tally.outage.store(false, Ordering::SeqCst);

        // Same normalized config, but the slot is empty so it is rebuilt
        let value = json(session.handle_text_at(r#"{"type":"config","config":{"num_hands":1}}"#, 2));
        assert_eq!(value["applied"]["num_hands"], 1);
        assert!(value.get("error").is_none());
        assert!(session.applied().is_some());
    }

    #[test]
    fn test_reconfigure_failure_keeps_restored_warning() {
        let (mut session, _) = session_with(
            SessionKind::Gesture,
            InferenceOutput::default(),
            |c| c.model_kind == ModelKind::HandLandmarker,
            any_asset(),
        );
        session.start().unwrap();
        let echo = json(session.handle_text_at(r#"{"type":"config","config":{"delegate":"gpu"}}"#, 1));
        assert!(echo["warning"].is_string());

        let value = json(session.handle_text_at(r#"{"type":"config","config":{"model":"hand_landmarker"}}"#, 2));
        assert!(value["error"].is_string());
        assert_eq!(value["applied"]["delegate"], "cpu");
        assert_eq!(value["warning"], echo["warning"]);
    }

    #[test]
    fn test_backend_released_exactly_once() {
        let (mut session, tally) = started(SessionKind::Gesture, InferenceOutput::default());
        session.handle_text_at(r#"{"type":"config","config":{"num_hands":2}}"#, 1);
        session.close();
        session.close();
        drop(session);

        assert_eq!(tally.constructions.load(Ordering::SeqCst), 2);
        assert_eq!(tally.closes.load(Ordering::SeqCst), 2);
        assert_eq!(tally.live.load(Ordering::SeqCst), 0);
        assert_eq!(tally.max_live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_without_close_releases_backend() {
        let (session, tally) = started(SessionKind::Gesture, InferenceOutput::default());
        drop(session);
        assert_eq!(tally.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emotion_session_reports_no_face_and_face() {
        let (mut empty, _) = started(SessionKind::Emotion, InferenceOutput::default());
        let value = json(empty.handle_text_at(&frame(), 1));
        assert_eq!(value["type"], "emotion");
        assert_eq!(value["face"], false);
        assert_eq!(value["emotion"]["label"], "NoFace");
        assert!(value.get("guides").is_none());

        let mesh = vec![Landmark { x: 0.5, y: 0.5, z: 0.0 }; 468];
        let output = InferenceOutput {
            landmarks: vec![mesh],
            categories: vec![],
        };
        let (mut session, _) = started(SessionKind::Emotion, output);
        let value = json(session.handle_text_at(&frame(), 1));
        assert_eq!(value["face"], true);
        assert_eq!(value["emotion"]["label"], "Neutral");
        assert!(value["metrics"]["mouth_open_ratio"].is_number());
        assert!(value["metrics"]["inference_ms"].is_number());
        assert!(value["guides"]["mouth_width"].is_array());

        let value = json(session.handle_text_at("nocomma", 2));
        assert_eq!(value["emotion"]["label"], "NoFace");
    }

    #[test]
    fn test_emotion_session_model_is_fixed() {
        let (mut session, tally) = started(SessionKind::Emotion, InferenceOutput::default());
        let value = json(session.handle_text_at(r#"{"type":"config","config":{"model":"gesture_recognizer"}}"#, 1));
        assert_eq!(value["applied"]["model"], "face_landmarker");
        assert_eq!(tally.constructions.load(Ordering::SeqCst), 1);
    }
}
