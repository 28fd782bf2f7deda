//! Session driver task.
//!
//! One driver runs per session. It consumes the connection's inbound queue
//! and the heartbeat ticks, in that priority, and stops when the session's
//! stop token is cancelled. Handlers run inline, so a session processes its
//! packets strictly in arrival order. Waiting for room in the sender queue
//! is abandoned when the session stops, and heartbeats never wait at all.

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, warn};
use tokio::{select, sync::mpsc, time::Instant};

use super::{
    CloseReason,
    Phase,
    Session,
    rate_limit::{Admission, RateLimiter},
};
use crate::{
    connection::ConnectionError,
    error::HandlerError,
    frame::{self, Frame, PacketType},
    handler::HandlerContext,
    handshake::HandshakeRequest,
    message::{Message, MessageType},
    metrics,
    panic::await_guarded,
    poller::Inbound,
    route::Route,
    sender::Outbound,
    serializer::Serializer,
};

struct Driver<S: Serializer> {
    session: Session<S>,
    last_activity: Instant,
    limiter: Option<RateLimiter>,
}

/// Drive `session` until it closes.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub(crate) async fn run<S: Serializer>(
    session: Session<S>,
    mut inbound: mpsc::Receiver<Inbound>,
    mut ticks: mpsc::Receiver<()>,
) {
    let config = &session.context().config;
    let limiter = RateLimiter::new(config.rate_limit_per_second, config.heartbeat_interval);
    let mut driver = Driver {
        session,
        last_activity: Instant::now(),
        limiter,
    };
    let core = Arc::clone(driver.session.core());
    loop {
        select! {
            biased;

            () = core.stop_token().cancelled() => {
                core.close(CloseReason::ServerShutdown);
                break;
            }
            item = inbound.recv() => match item {
                Some(Ok(frame)) => driver.on_frame(frame).await,
                Some(Err(e)) => {
                    driver.on_transport_error(&e);
                    break;
                }
                None => {
                    core.close(CloseReason::Transport);
                    break;
                }
            },
            tick = ticks.recv() => match tick {
                Some(()) => driver.on_tick(),
                None => {
                    core.close(CloseReason::ServerShutdown);
                    break;
                }
            },
        }
    }
    driver.session.context().sessions.remove(core.id());
    debug!("session driver stopped: id={}", core.id());
}

impl<S: Serializer> Driver<S> {
    async fn on_frame(&mut self, frame: Frame) {
        self.last_activity = Instant::now();
        match frame.packet_type() {
            PacketType::Handshake => self.on_handshake(frame.payload()).await,
            PacketType::HandshakeAck | PacketType::Heartbeat => {}
            PacketType::Data => self.on_data(frame.into_payload()).await,
            PacketType::Kick => {
                self.session.core().close(CloseReason::ClientKick);
            }
        }
    }

    fn on_transport_error(&self, error: &ConnectionError) {
        let core = self.session.core();
        match error {
            ConnectionError::Eof => {
                core.close(CloseReason::Transport);
            }
            ConnectionError::Io(e) => {
                debug!("connection read failed: id={}, error={e}", core.id());
                core.close(CloseReason::Transport);
            }
            ConnectionError::Frame(_) | ConnectionError::WebSocket(_) => {
                warn!("protocol violation: id={}, error={error}", core.id());
                metrics::inc_errors();
                core.close(CloseReason::Protocol);
            }
        }
    }

    async fn on_handshake(&mut self, payload: &Bytes) {
        let core = self.session.core();
        if core.phase() != Phase::AwaitingHandshake {
            debug!("repeated handshake ignored: id={}", core.id());
            return;
        }
        let request = match HandshakeRequest::parse(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("invalid handshake: id={}, error={e}", core.id());
                metrics::inc_errors();
                core.close(CloseReason::Protocol);
                return;
            }
        };
        let ack = self.session.context().handshake_frame.clone();
        if self.send(ack).await {
            debug!(
                "handshake completed: id={}, platform={:?}",
                core.id(),
                request.sys.platform
            );
            core.activate(request);
        }
    }

    async fn on_data(&mut self, payload: Bytes) {
        let core = Arc::clone(self.session.core());
        match core.phase() {
            Phase::Active => {}
            Phase::AwaitingHandshake => {
                warn!("data before handshake: id={}", core.id());
                core.close(CloseReason::HandshakeRequired);
                return;
            }
            Phase::Closing | Phase::Closed => return,
        }
        let message = match self.session.context().codec.decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("invalid message: id={}, error={e}", core.id());
                metrics::inc_errors();
                core.close(CloseReason::Protocol);
                return;
            }
        };
        if let Some(limiter) = &mut self.limiter {
            match limiter.admit() {
                Admission::Allow => {}
                Admission::Drop => {
                    debug!("rate limit exceeded, message dropped: id={}", core.id());
                    if message.kind == MessageType::Request {
                        self.reply_error(message.id, &HandlerError::rate_limited()).await;
                    }
                    return;
                }
                Admission::Kick => {
                    warn!("rate limit abuse, kicking: id={}", core.id());
                    if message.kind == MessageType::Request {
                        self.reply_error(message.id, &HandlerError::rate_limited()).await;
                    }
                    self.session.kick_with(CloseReason::RateLimited);
                    return;
                }
            }
        }
        match message.kind {
            MessageType::Request | MessageType::Notify => self.dispatch(message).await,
            MessageType::Response | MessageType::Push => {
                warn!(
                    "unexpected {:?} message from client dropped: id={}",
                    message.kind,
                    core.id()
                );
            }
        }
    }

    async fn dispatch(&mut self, message: Message) {
        let Message {
            kind, id, route, body, ..
        } = message;
        let is_request = kind == MessageType::Request;
        let result = match route.parse::<Route>() {
            Ok(route) => self.invoke(route, is_request.then_some(id), body).await,
            Err(e) => Err(HandlerError::bad_route(&e)),
        };
        match (result, is_request) {
            (Ok(body), true) => {
                self.reply(Message::response(id, body)).await;
            }
            (Err(e), true) => self.reply_error(id, &e).await,
            (Ok(_), false) => {}
            (Err(e), false) => {
                debug!(
                    "notify failed: id={}, route={route}, error={e}",
                    self.session.id()
                );
            }
        }
    }

    async fn invoke(&self, route: Route, id: Option<u64>, body: Bytes) -> Result<Bytes, HandlerError> {
        let handler = self.session.context().handlers.lookup(&route)?;
        let ctx = HandlerContext::new(self.session.clone(), route, id);
        let key = ctx.route().to_string();
        match await_guarded(handler.call(ctx, body)).await {
            Ok(result) => result,
            Err(panic) => {
                tracing::error!(
                    "handler panicked: id={}, route={key}, panic={panic}",
                    self.session.id()
                );
                metrics::inc_handler_panics();
                Err(HandlerError::panicked())
            }
        }
    }

    async fn reply_error(&self, id: u64, error: &HandlerError) {
        match self.session.serializer().marshal(error) {
            Ok(body) => {
                self.reply(Message::error_response(id, body)).await;
            }
            Err(e) => warn!(
                "failed to serialize error response: id={}, error={e}",
                self.session.id()
            ),
        }
    }

    async fn reply(&self, message: Message) -> bool {
        let packet = match self.session.context().codec.encode(&message) {
            Ok(payload) => frame::encode(PacketType::Data, &payload),
            Err(e) => {
                warn!("failed to encode response: id={}, error={e}", self.session.id());
                metrics::inc_errors();
                return false;
            }
        };
        match packet {
            Ok(packet) => self.send(packet).await,
            Err(e) => {
                warn!("response too large: id={}, error={e}", self.session.id());
                metrics::inc_errors();
                false
            }
        }
    }

    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    async fn send(&self, packet: Bytes) -> bool {
        let core = self.session.core();
        let queued = select! {
            biased;

            () = core.stop_token().cancelled() => {
                debug!("outbound packet abandoned on close: id={}", core.id());
                return false;
            }
            queued = self
                .session
                .context()
                .sender
                .send(Outbound::new(Arc::clone(core), packet)) => queued,
        };
        match queued {
            Ok(()) => true,
            Err(e) => {
                debug!("outbound packet dropped: id={}, error={e}", core.id());
                false
            }
        }
    }

    fn send_heartbeat(&self) {
        let core = self.session.core();
        let heartbeat = self.session.context().heartbeat_frame.clone();
        if let Err(e) = self
            .session
            .context()
            .sender
            .try_send(Outbound::new(Arc::clone(core), heartbeat))
        {
            debug!("heartbeat skipped: id={}, error={e}", core.id());
        }
    }

    fn on_tick(&mut self) {
        let core = Arc::clone(self.session.core());
        match core.phase() {
            Phase::AwaitingHandshake => {
                debug!(
                    "handshake timeout: id={}, waited={:?}",
                    core.id(),
                    core.created().elapsed()
                );
                core.close(CloseReason::HandshakeTimeout);
            }
            Phase::Active => {
                if let Some(limiter) = &mut self.limiter {
                    limiter.refill();
                }
                let config = &self.session.context().config;
                if self.last_activity.elapsed() > config.heartbeat_timeout() {
                    debug!(
                        "heartbeat timeout: id={}, idle={:?}",
                        core.id(),
                        self.last_activity.elapsed()
                    );
                    core.close(CloseReason::HeartbeatTimeout);
                    return;
                }
                self.send_heartbeat();
            }
            Phase::Closing => {
                core.close(core.pending_close().unwrap_or(CloseReason::Kicked));
            }
            Phase::Closed => {}
        }
    }
}
