//! Packet-level protocol client.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use playwire::{
    codec::{CodecError, PacketCodec},
    frame::{Frame, PacketType},
    handshake::HandshakeResponse,
    message::{Message, MessageCodec, MessageType},
    route::RouteDictionary,
};
use serde_json::{Value, json};
use tokio::{io::AsyncWriteExt, net::TcpStream, time::timeout};
use tokio_util::codec::Framed;

/// How long receive helpers wait before failing with `TimedOut`.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Client speaking the packet protocol over raw TCP.
pub struct TestClient {
    framed: Framed<TcpStream, PacketCodec>,
    messages: MessageCodec,
    next_id: u64,
}

impl TestClient {
    /// Connect to `addr`.
    ///
    /// # Errors
    ///
    /// Returns any connection error.
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(stream, PacketCodec::default()),
            messages: MessageCodec::new(Arc::new(RouteDictionary::new()), false),
            next_id: 1,
        })
    }

    /// Send one packet.
    ///
    /// # Errors
    ///
    /// Returns any write error.
    pub async fn send(&mut self, packet_type: PacketType, payload: impl Into<Bytes>) -> io::Result<()> {
        self.framed
            .send(Frame::new(packet_type, payload))
            .await
            .map_err(into_io)
    }

    /// Write bytes directly to the socket, bypassing the packet codec.
    ///
    /// # Errors
    ///
    /// Returns any write error.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> { self.framed.get_mut().write_all(bytes).await }

    /// Receive the next packet, or `None` once the server closed the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` after [`RECV_TIMEOUT`], or any read error.
    pub async fn recv(&mut self) -> io::Result<Option<Frame>> {
        match timeout(RECV_TIMEOUT, self.framed.next()).await {
            Err(_) => Err(io::ErrorKind::TimedOut.into()),
            Ok(None) => Ok(None),
            Ok(Some(frame)) => frame.map(Some).map_err(into_io),
        }
    }

    /// Receive the next `Data` packet, skipping heartbeats, and decode it.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEof` if the connection closes first and
    /// `InvalidData` for any other packet type or an undecodable message.
    pub async fn recv_message(&mut self) -> io::Result<Message> {
        loop {
            let Some(frame) = self.recv().await? else {
                return Err(io::ErrorKind::UnexpectedEof.into());
            };
            match frame.packet_type() {
                PacketType::Heartbeat => {}
                PacketType::Data => {
                    return self
                        .messages
                        .decode(frame.into_payload())
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
                }
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("expected data packet, got {other:?}"),
                    ));
                }
            }
        }
    }

    /// Send a handshake and wait for the acknowledgement.
    ///
    /// The route dictionary in the response is used for later messages.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the reply is not a handshake acknowledgement.
    pub async fn handshake(&mut self) -> io::Result<HandshakeResponse> {
        self.handshake_with(&json!({
            "sys": {"platform": "rust", "libVersion": env!("CARGO_PKG_VERSION")},
            "user": {},
        }))
        .await
    }

    /// Send `payload` as the handshake and wait for the acknowledgement.
    ///
    /// # Errors
    ///
    /// See [`TestClient::handshake`].
    pub async fn handshake_with(&mut self, payload: &Value) -> io::Result<HandshakeResponse> {
        self.send(PacketType::Handshake, payload.to_string().into_bytes())
            .await?;
        let frame = self
            .recv()
            .await?
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        if frame.packet_type() != PacketType::HandshakeAck {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected handshake ack, got {:?}", frame.packet_type()),
            ));
        }
        let response = HandshakeResponse::parse(frame.payload())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let dictionary = RouteDictionary::from_pairs(
            response
                .sys
                .dict
                .iter()
                .map(|(route, code)| (route.clone(), *code)),
        )
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let compress = !dictionary.is_empty();
        self.messages = MessageCodec::new(Arc::new(dictionary), compress);
        Ok(response)
    }

    /// Send a heartbeat.
    ///
    /// # Errors
    ///
    /// Returns any write error.
    pub async fn heartbeat(&mut self) -> io::Result<()> { self.send(PacketType::Heartbeat, Bytes::new()).await }

    /// Send a request and return its id.
    ///
    /// # Errors
    ///
    /// Returns any encoding or write error.
    pub async fn request(&mut self, route: &str, body: &Value) -> io::Result<u64> {
        let id = self.next_id;
        self.next_id += 1;
        self.send_message(&Message::request(id, route, body.to_string().into_bytes()))
            .await?;
        Ok(id)
    }

    /// Send a request and wait for its response, skipping pushes.
    ///
    /// # Errors
    ///
    /// Returns any error from [`TestClient::recv_message`].
    pub async fn call(&mut self, route: &str, body: &Value) -> io::Result<Message> {
        let id = self.request(route, body).await?;
        loop {
            let message = self.recv_message().await?;
            if message.kind == MessageType::Response && message.id == id {
                return Ok(message);
            }
        }
    }

    /// Send a notify.
    ///
    /// # Errors
    ///
    /// Returns any encoding or write error.
    pub async fn notify(&mut self, route: &str, body: &Value) -> io::Result<()> {
        self.send_message(&Message::notify(route, body.to_string().into_bytes()))
            .await
    }

    async fn send_message(&mut self, message: &Message) -> io::Result<()> {
        let payload = self
            .messages
            .encode(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.send(PacketType::Data, payload).await
    }

    /// Read until the server closes the connection, returning every packet
    /// received on the way.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if the connection stays open for longer than
    /// [`RECV_TIMEOUT`] after the last packet.
    pub async fn until_closed(&mut self) -> io::Result<Vec<Frame>> {
        let mut frames = Vec::new();
        loop {
            match self.recv().await {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return Ok(frames),
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => return Ok(frames),
                Err(e) => return Err(e),
            }
        }
    }
}

/// Decode a JSON body.
///
/// # Panics
///
/// Panics if `body` is not JSON.
#[must_use]
pub fn json_body(body: &[u8]) -> Value { serde_json::from_slice(body).expect("json body") }

fn into_io(error: CodecError) -> io::Error {
    match error {
        CodecError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}
