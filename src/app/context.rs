//! Runtime state shared by every session of a running server.

use std::sync::Arc;

use bytes::Bytes;

use super::App;
use crate::{
    callbacks::CallbackList,
    config::ServerConfig,
    frame::{self, PacketType},
    handler::HandlerRegistry,
    handshake::{HandshakeError, HandshakeResponse},
    message::MessageCodec,
    sender::Sender,
    serializer::Serializer,
    session::{Session, SessionRegistry},
};

/// An [`App`] frozen for serving, plus the packets every session sends.
pub(crate) struct AppContext<S: Serializer> {
    pub(crate) config: ServerConfig,
    pub(crate) serializer: S,
    pub(crate) codec: MessageCodec,
    pub(crate) handlers: HandlerRegistry<S>,
    pub(crate) sender: Sender,
    pub(crate) sessions: SessionRegistry,
    pub(crate) on_session: CallbackList<Session<S>>,
    pub(crate) handshake_frame: Bytes,
    pub(crate) heartbeat_frame: Bytes,
    pub(crate) kick_frame: Bytes,
}

impl<S: Serializer> AppContext<S> {
    /// Freeze `app` with a normalized `config`, encoding the handshake
    /// response once.
    pub(crate) fn new(app: App<S>, config: ServerConfig, sender: Sender) -> Result<Self, HandshakeError> {
        let App {
            serializer,
            dictionary,
            handlers,
            on_session,
            ..
        } = app;
        let handshake_frame = HandshakeResponse::new(config.heartbeat_interval, &dictionary, serializer.name())
            .to_frame(config.data_compression)?;
        Ok(Self {
            codec: MessageCodec::new(Arc::new(dictionary), config.data_compression),
            heartbeat_frame: frame::encode(PacketType::Heartbeat, &[])?,
            kick_frame: frame::encode(PacketType::Kick, &[])?,
            handshake_frame,
            config,
            serializer,
            handlers,
            sender,
            sessions: SessionRegistry::default(),
            on_session,
        })
    }
}
