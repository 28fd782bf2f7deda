//! Per-connection protocol sessions.
//!
//! Every accepted connection gets a session that walks through
//! `AwaitingHandshake → Active → Closing → Closed`. The state lives in a
//! shared [`SessionCore`]; a driver task consumes the connection's inbound
//! queue and heartbeat ticks, and application code holds [`Session`]
//! handles to push messages, read the attachment store or close the session.
//!
//! Closing runs exactly once no matter how many triggers race: the
//! connection is closed, the attachment store is cleared, the driver is
//! stopped and the close callbacks fire.

mod counter;
pub(crate) mod driver;
mod rate_limit;
mod registry;

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        OnceLock,
        atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
    },
};

use bytes::Bytes;
pub use counter::active_session_count;
use log::{debug, trace};
pub(crate) use registry::SessionRegistry;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use self::counter::ActiveSession;
use crate::{
    app::AppContext,
    attachment::Attachment,
    callbacks::CallbackList,
    connection::{Connection, Transport},
    frame::{self, FrameError, PacketType},
    handshake::HandshakeRequest,
    message::{Message, MessageError},
    metrics,
    sender::{Outbound, SendError},
    serializer::{JsonSerializer, Serializer, SerializerError},
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide session identifier; never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self { Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "SessionId({})", self.0) }
}

/// Protocol phase of a session.
///
/// Phases only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    /// Connected; waiting for the client's handshake.
    AwaitingHandshake = 0,
    /// Handshake completed; messages are dispatched.
    Active = 1,
    /// Shutting down; nothing new is processed.
    Closing = 2,
    /// Torn down.
    Closed = 3,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::AwaitingHandshake,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Why a session was closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// No handshake within one heartbeat interval.
    HandshakeTimeout,
    /// No traffic for three heartbeat intervals.
    HeartbeatTimeout,
    /// Inbound rate limit exceeded past the kick threshold.
    RateLimited,
    /// Kicked by the application.
    Kicked,
    /// The client sent a `Kick` packet.
    ClientKick,
    /// The client violated the protocol.
    Protocol,
    /// Data arrived before the handshake.
    HandshakeRequired,
    /// The connection ended or failed while reading.
    Transport,
    /// Writing to the connection failed.
    WriteFailed,
    /// Closed by the application.
    Closed,
    /// The server is shutting down.
    ServerShutdown,
}

impl CloseReason {
    /// Stable label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HandshakeTimeout => "handshake_timeout",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::RateLimited => "rate_limited",
            Self::Kicked => "kicked",
            Self::ClientKick => "client_kick",
            Self::Protocol => "protocol",
            Self::HandshakeRequired => "handshake_required",
            Self::Transport => "transport",
            Self::WriteFailed => "write_failed",
            Self::Closed => "closed",
            Self::ServerShutdown => "server_shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Errors returned by [`Session::push`].
#[derive(Debug, Error)]
pub enum PushError {
    /// The session has not completed its handshake.
    #[error("session is not active")]
    NotActive,
    /// The value could not be serialized.
    #[error("failed to serialize push body: {0}")]
    Serialize(#[source] SerializerError),
    /// The message could not be encoded.
    #[error(transparent)]
    Message(#[from] MessageError),
    /// The encoded message does not fit in a packet.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// The packet could not be queued.
    #[error(transparent)]
    Send(#[from] SendError),
}

/// State shared by a session's driver, its handles and the sender.
pub(crate) struct SessionCore {
    id: SessionId,
    connection: Arc<Connection>,
    phase: AtomicU8,
    closed: AtomicBool,
    attachment: Attachment,
    handshake: OnceLock<HandshakeRequest>,
    on_handshaken: CallbackList<()>,
    on_closed: CallbackList<()>,
    pending_close: OnceLock<CloseReason>,
    close_reason: OnceLock<CloseReason>,
    stop: CancellationToken,
    created: Instant,
    _active: ActiveSession,
}

impl SessionCore {
    /// Create the state for a new connection.
    ///
    /// `stop` is cancelled when the session closes; passing a child of the
    /// server's shutdown token also stops the driver on shutdown.
    pub(crate) fn new(connection: Arc<Connection>, stop: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::next(),
            connection,
            phase: AtomicU8::new(Phase::AwaitingHandshake as u8),
            closed: AtomicBool::new(false),
            attachment: Attachment::default(),
            handshake: OnceLock::new(),
            on_handshaken: CallbackList::default(),
            on_closed: CallbackList::default(),
            pending_close: OnceLock::new(),
            close_reason: OnceLock::new(),
            stop,
            created: Instant::now(),
            _active: ActiveSession::new(),
        })
    }

    pub(crate) fn id(&self) -> SessionId { self.id }

    pub(crate) fn connection(&self) -> &Connection { &self.connection }

    pub(crate) fn phase(&self) -> Phase { Phase::from_u8(self.phase.load(Ordering::Acquire)) }

    pub(crate) fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

    pub(crate) fn created(&self) -> Instant { self.created }

    pub(crate) fn stop_token(&self) -> &CancellationToken { &self.stop }

    /// Move from `AwaitingHandshake` to `Active`, recording the handshake.
    ///
    /// Returns `false` if the session was not awaiting a handshake.
    pub(crate) fn activate(&self, handshake: HandshakeRequest) -> bool {
        let _ = self.handshake.set(handshake);
        let swapped = self
            .phase
            .compare_exchange(
                Phase::AwaitingHandshake as u8,
                Phase::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if swapped {
            self.on_handshaken.take_and_invoke(&());
        }
        swapped
    }

    /// Enter `Closing` without tearing down yet, remembering `reason` for
    /// the eventual close.
    ///
    /// Returns `false` if the session was already closing or closed.
    pub(crate) fn begin_closing(&self, reason: CloseReason) -> bool {
        let first = self.advance_phase(Phase::Closing) < Phase::Closing;
        if first {
            let _ = self.pending_close.set(reason);
        }
        first
    }

    /// Reason passed to the [`begin_closing`](Self::begin_closing) call that
    /// moved the session into `Closing`.
    pub(crate) fn pending_close(&self) -> Option<CloseReason> { self.pending_close.get().copied() }

    fn advance_phase(&self, phase: Phase) -> Phase {
        Phase::from_u8(self.phase.fetch_max(phase as u8, Ordering::AcqRel))
    }

    /// Tear the session down.
    ///
    /// Only the first call does anything; it returns `true`.
    pub(crate) fn close(&self, reason: CloseReason) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.close_reason.set(reason);
        self.advance_phase(Phase::Closing);
        self.connection.close();
        self.attachment.clear();
        self.stop.cancel();
        self.advance_phase(Phase::Closed);
        tracing::info!(
            "session closed: id={}, peer={}, reason={reason}",
            self.id,
            self.connection.peer_addr()
        );
        metrics::inc_sessions_closed(reason.as_str());
        self.on_handshaken.seal();
        self.on_closed.take_and_invoke(&());
        true
    }
}

/// Handle to a session.
///
/// Handles are cheap to clone and stay valid after the session closes;
/// pushes on a closed session are ignored.
pub struct Session<S: Serializer = JsonSerializer> {
    core: Arc<SessionCore>,
    context: Arc<AppContext<S>>,
}

impl<S: Serializer> Clone for Session<S> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            context: Arc::clone(&self.context),
        }
    }
}

impl<S: Serializer> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.core.id)
            .field("phase", &self.core.phase())
            .field("peer_addr", &self.core.connection.peer_addr())
            .finish_non_exhaustive()
    }
}

impl<S: Serializer> Session<S> {
    pub(crate) fn new(core: Arc<SessionCore>, context: Arc<AppContext<S>>) -> Self { Self { core, context } }

    pub(crate) fn core(&self) -> &Arc<SessionCore> { &self.core }

    pub(crate) fn context(&self) -> &Arc<AppContext<S>> { &self.context }

    /// Identifier of this session.
    #[must_use]
    pub fn id(&self) -> SessionId { self.core.id }

    /// Current protocol phase.
    #[must_use]
    pub fn phase(&self) -> Phase { self.core.phase() }

    /// Returns `true` once the session has been torn down.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.core.is_closed() }

    /// Why the session closed, once it has.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> { self.core.close_reason.get().copied() }

    /// Remote address of the client.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr { self.core.connection.peer_addr() }

    /// Local address the client connected to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr { self.core.connection.local_addr() }

    /// Transport the client connected over.
    #[must_use]
    pub fn transport(&self) -> Transport { self.core.connection.transport() }

    /// Key/value store scoped to the session; cleared on close.
    #[must_use]
    pub fn attachment(&self) -> &Attachment { &self.core.attachment }

    /// The client's handshake, once received.
    #[must_use]
    pub fn handshake(&self) -> Option<&HandshakeRequest> { self.core.handshake.get() }

    /// Serializer configured on the application.
    #[must_use]
    pub fn serializer(&self) -> &S { &self.context.serializer }

    /// Look up another open session of the same server.
    #[must_use]
    pub fn find(&self, id: SessionId) -> Option<Self> {
        self.context
            .sessions
            .get(id)
            .map(|core| Self::new(core, Arc::clone(&self.context)))
    }

    /// Identifiers of every open session of the same server.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionId> { self.context.sessions.active_ids() }

    /// Register a callback fired once the handshake completes.
    ///
    /// Callbacks registered after the handshake never fire.
    pub fn on_handshaken<F>(&self, callback: F)
    where
        F: Fn(&Session<S>) + Send + Sync + 'static,
    {
        self.core.on_handshaken.add(self.bind(callback));
    }

    /// Register a callback fired once when the session closes.
    ///
    /// Callbacks registered after the session closed never fire.
    pub fn on_closed<F>(&self, callback: F)
    where
        F: Fn(&Session<S>) + Send + Sync + 'static,
    {
        self.core.on_closed.add(self.bind(callback));
    }

    /// Adapt a handle callback to the core's unit callback list without
    /// a strong reference from the core to itself.
    fn bind<F>(&self, callback: F) -> impl Fn(&()) + Send + Sync + 'static
    where
        F: Fn(&Session<S>) + Send + Sync + 'static,
    {
        let core = Arc::downgrade(&self.core);
        let context = Arc::clone(&self.context);
        move |()| {
            if let Some(core) = core.upgrade() {
                callback(&Session::new(core, Arc::clone(&context)));
            }
        }
    }

    /// Serialize `value` and push it to the client on `route`.
    ///
    /// Pushing to a closing or closed session does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`PushError`] if the session has not completed its handshake
    /// or the message cannot be encoded or queued.
    pub async fn push<T>(&self, route: &str, value: &T) -> Result<(), PushError>
    where
        T: Serialize + ?Sized,
    {
        if !self.accepts_push()? {
            return Ok(());
        }
        let body = self
            .context
            .serializer
            .marshal(value)
            .map_err(PushError::Serialize)?;
        self.push_raw(route, body).await
    }

    /// Push an already serialized body on `route`.
    ///
    /// # Errors
    ///
    /// See [`Session::push`].
    pub async fn push_raw(&self, route: &str, body: impl Into<Bytes>) -> Result<(), PushError> {
        if !self.accepts_push()? {
            return Ok(());
        }
        let payload = self.context.codec.encode(&Message::push(route, body))?;
        let packet = frame::encode(PacketType::Data, &payload)?;
        self.context
            .sender
            .send(Outbound::new(Arc::clone(&self.core), packet))
            .await?;
        Ok(())
    }

    fn accepts_push(&self) -> Result<bool, PushError> {
        match self.core.phase() {
            Phase::Active => Ok(true),
            Phase::AwaitingHandshake => Err(PushError::NotActive),
            Phase::Closing | Phase::Closed => {
                trace!("push to closed session ignored: id={}", self.core.id);
                Ok(false)
            }
        }
    }

    /// Send a `Kick` packet, best effort, then close the session.
    pub fn kick(&self) { self.kick_with(CloseReason::Kicked); }

    pub(crate) fn kick_with(&self, reason: CloseReason) {
        if !self.core.begin_closing(reason) {
            return;
        }
        let kick = Outbound::new(Arc::clone(&self.core), self.context.kick_frame.clone()).then_close(reason);
        if let Err(e) = self.context.sender.try_send(kick) {
            debug!("kick packet dropped: id={}, error={e}", self.core.id);
            self.core.close(reason);
        }
    }

    /// Close the session without notifying the client.
    pub fn close(&self) { self.core.close(CloseReason::Closed); }
}
