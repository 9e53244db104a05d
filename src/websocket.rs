//! # WebSocket Perception Transport
//!
//! Carries perception sessions over websockets:
//! - `GET /ws`: gesture session (hand landmarks + gesture)
//! - `GET /ws/emotion`: emotion session (face mesh + emotion)
//!
//! ## Architecture:
//! ```text
//! browser ⇄ PerceptionWebSocket (actix actor, transport only)
//!                │ mpsc::Sender<String> (bounded)       ▲ SendText / CloseSession
//!                ▼                                      │
//!           session worker (spawn_blocking) ── PerceptionSession
//! ```
//!
//! The actor never runs inference. Every text frame is forwarded, in order, to a
//! dedicated blocking worker that owns the [`PerceptionSession`]. The inbox holds
//! at most [`INBOX_CAPACITY`] frames; when it is full the actor stops reading the
//! socket until the worker catches up, so a slow model pushes back on its own
//! client through TCP flow control while other actors keep serving.
//!
//! ## Lifecycle:
//! 1. **Upgrade**: refused with 503 when `max_concurrent_sessions` are already active
//! 2. **Start**: worker resolves the model asset and builds the backend, replies `config`
//!    (or `error` followed by a close frame)
//! 3. **Stream**: replies flow back to the actor as [`SendText`] messages
//! 4. **Stop**: dropping the actor drops the channel sender; the worker loop ends,
//!    closes the session and folds its counters into [`AppState`]
//!
//! The session slot is held by a [`SessionLease`] that moves from the actor to the
//! worker. A connection that never starts releases its slot when the actor drops.

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::state::{AppState, PerceptionServices, SessionLease};
use crate::vision::{
    AssetLocator, EmotionThresholds, PerceptionSession, ServerMessage, SessionError, SessionKind,
    SessionStats,
};

/// Base64 webcam frames easily exceed the default 64 KiB websocket frame limit
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Frames queued ahead of the one being inferred
const INBOX_CAPACITY: usize = 2;

pub struct PerceptionWebSocket {
    kind: SessionKind,
    lease: Option<SessionLease>,
    services: PerceptionServices,
    thresholds: EmotionThresholds,
    heartbeat_interval: Duration,
    client_timeout: Duration,
    last_heartbeat: Instant,
    /// Sender side of the worker's inbox; `None` once the worker is gone
    inbox: Option<mpsc::Sender<String>>,
}

impl PerceptionWebSocket {
    pub fn new(
        kind: SessionKind,
        lease: SessionLease,
        app_state: &AppState,
        services: PerceptionServices,
    ) -> Self {
        let config = app_state.get_config();
        Self {
            kind,
            lease: Some(lease),
            services,
            thresholds: config.emotion,
            heartbeat_interval: Duration::from_secs(config.performance.heartbeat_interval_secs),
            client_timeout: Duration::from_secs(config.performance.client_timeout_secs),
            last_heartbeat: Instant::now(),
            inbox: None,
        }
    }

    fn forward(&mut self, text: String, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(inbox) = &self.inbox else {
            ctx.stop();
            return;
        };

        match inbox.try_send(text) {
            Ok(()) => {}
            Err(TrySendError::Full(text)) => {
                debug!("Session worker busy, pausing reads");
                let inbox = inbox.clone();
                // Nothing else is read from the socket until this resolves
                ctx.wait(async move { inbox.send(text).await.is_ok() }.into_actor(self).map(
                    |delivered, act, ctx| {
                        if delivered {
                            act.last_heartbeat = Instant::now();
                        } else {
                            debug!("Session worker has finished, closing connection");
                            ctx.stop();
                        }
                    },
                ));
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Session worker has finished, closing connection");
                ctx.stop();
            }
        }
    }
}

/// Text to write to the client.
#[derive(Message)]
#[rtype(result = "()")]
struct SendText(String);

/// Close the connection with an error close code.
#[derive(Message)]
#[rtype(result = "()")]
struct CloseSession {
    reason: String,
}

impl Actor for PerceptionWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("{} websocket connection started", self.kind.as_str());

        let Some(lease) = self.lease.take() else {
            ctx.stop();
            return;
        };
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        self.inbox = Some(tx);

        let worker = SessionWorker {
            kind: self.kind,
            services: self.services.clone(),
            thresholds: self.thresholds,
            lease,
            addr: ctx.address(),
            runtime: Handle::current(),
        };
        tokio::task::spawn_blocking(move || worker.run(rx));

        let timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > timeout {
                warn!("Websocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Dropping the sender ends the worker loop, which runs session cleanup
        self.inbox.take();
        info!("{} websocket connection stopped", self.kind.as_str());
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for PerceptionWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.forward(text.to_string(), ctx);
            }
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                debug!("Ignoring {} byte binary message; frames are sent as text", data.len());
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Websocket closed by client: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("Websocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<SendText> for PerceptionWebSocket {
    type Result = ();

    fn handle(&mut self, msg: SendText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<CloseSession> for PerceptionWebSocket {
    type Result = ();

    fn handle(&mut self, msg: CloseSession, ctx: &mut Self::Context) {
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Error,
            description: Some(msg.reason),
        }));
        ctx.stop();
    }
}

/// Everything the blocking worker needs, moved onto its thread.
struct SessionWorker {
    kind: SessionKind,
    services: PerceptionServices,
    thresholds: EmotionThresholds,
    lease: SessionLease,
    addr: Addr<PerceptionWebSocket>,
    runtime: Handle,
}

impl SessionWorker {
    /// Run one session to completion. Every exit path goes through the same cleanup.
    fn run(mut self, mut inbox: mpsc::Receiver<String>) {
        let resolver = Arc::clone(&self.services.resolver);
        let runtime = self.runtime.clone();
        let locate: AssetLocator = Box::new(move |model| runtime.block_on(resolver.ensure_model(model)));

        let mut session =
            PerceptionSession::new(self.kind, self.services.factory.clone(), locate, self.thresholds);

        let started = match session.start() {
            Ok(config) => {
                self.addr.do_send(SendText(config.to_json()));
                true
            }
            Err(e) => {
                let message = e.to_string();
                self.addr.do_send(SendText(ServerMessage::Error { message: message.clone() }.to_json()));
                self.addr.do_send(CloseSession { reason: message });
                false
            }
        };

        if started {
            while let Some(text) = inbox.blocking_recv() {
                let Some(reply) = session.handle_text(&text) else {
                    continue;
                };
                if !self.addr.connected() {
                    let failure = SessionError::TransportFailure("client went away mid-stream".to_string());
                    debug!(session_id = %session.id(), terminal = failure.is_terminal(), "{}", failure);
                    break;
                }
                self.addr.do_send(SendText(reply.to_json()));
            }
        }

        session.close();
        let stats: SessionStats = session.stats();
        self.lease.finish(stats, started);
    }
}

pub async fn gesture_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
    services: web::Data<PerceptionServices>,
) -> AppResult<HttpResponse> {
    open_session(SessionKind::Gesture, req, stream, app_state, services)
}

pub async fn emotion_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
    services: web::Data<PerceptionServices>,
) -> AppResult<HttpResponse> {
    open_session(SessionKind::Emotion, req, stream, app_state, services)
}

fn open_session(
    kind: SessionKind,
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
    services: web::Data<PerceptionServices>,
) -> AppResult<HttpResponse> {
    info!(
        "New {} session request from {:?}",
        kind.as_str(),
        req.connection_info().peer_addr()
    );

    let limit = app_state.get_config().performance.max_concurrent_sessions;
    let Some(lease) = app_state.lease_session(limit) else {
        warn!("Refusing {} session: limit of {} reached", kind.as_str(), limit);
        return Err(AppError::ServiceUnavailable(format!(
            "Session limit reached ({} active)",
            limit
        )));
    };

    // On a failed handshake the actor, and with it the lease, is dropped
    let actor = PerceptionWebSocket::new(kind, lease, &app_state, services.get_ref().clone());
    ws::WsResponseBuilder::new(actor, &req, stream)
        .frame_size(MAX_FRAME_BYTES)
        .start()
        .map_err(|e| AppError::BadRequest(format!("Websocket handshake failed: {}", e)))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(gesture_websocket))
        .route("/ws/emotion", web::get().to(emotion_websocket));
}
