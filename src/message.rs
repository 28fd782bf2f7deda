//! Application message envelope carried inside `Data` packets.
//!
//! Layout, in order:
//!
//! - flag byte: bit 0 route compressed, bits 1..=3 message type, bit 4 gzip
//!   body (not supported), bit 5 error;
//! - message id as a base-128 varint, low group first (requests and
//!   responses only);
//! - route (requests, notifies and pushes only): a big-endian `u16`
//!   dictionary code when compressed, otherwise a length byte followed by the
//!   UTF-8 route;
//! - the body, filling the rest of the payload.

use std::{fmt, sync::Arc};

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::{
    byte_order::{read_network_u16, write_network_u16},
    route::RouteDictionary,
};

const ROUTE_COMPRESSED: u8 = 0x01;
const TYPE_MASK: u8 = 0x07;
const GZIP: u8 = 0x10;
const ERROR: u8 = 0x20;
const MAX_VARINT_BYTES: usize = 10;

/// Kind of application message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Expects exactly one [`MessageType::Response`] with the same id.
    Request = 0,
    /// Fire-and-forget; never answered.
    Notify = 1,
    /// Answer to a request.
    Response = 2,
    /// Server-initiated message.
    Push = 3,
}

impl MessageType {
    const fn has_id(self) -> bool { matches!(self, Self::Request | Self::Response) }

    const fn has_route(self) -> bool { !matches!(self, Self::Response) }
}

impl TryFrom<u8> for MessageType {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Request),
            1 => Ok(Self::Notify),
            2 => Ok(Self::Response),
            3 => Ok(Self::Push),
            other => Err(MessageError::UnknownType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "request",
            Self::Notify => "notify",
            Self::Response => "response",
            Self::Push => "push",
        };
        f.write_str(name)
    }
}

/// Errors raised while encoding or decoding a message envelope.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    /// The payload was empty.
    #[error("empty message")]
    Empty,
    /// The type bits do not name a known message type.
    #[error("unknown message type: {0}")]
    UnknownType(u8),
    /// The gzip body flag was set.
    #[error("compressed message bodies are not supported")]
    CompressedBody,
    /// The payload ended inside the named field.
    #[error("message truncated in {0}")]
    Truncated(&'static str),
    /// The message id did not fit in 64 bits.
    #[error("message id overflows 64 bits")]
    IdOverflow,
    /// A compressed route used a code missing from the dictionary.
    #[error("unknown route code: {0}")]
    UnknownRouteCode(u16),
    /// The route was longer than a length byte can describe.
    #[error("route too long: {0} bytes")]
    RouteTooLong(usize),
    /// The route was not valid UTF-8.
    #[error("route is not valid utf-8")]
    InvalidRoute,
}

/// One decoded application message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Message kind.
    pub kind: MessageType,
    /// Correlation id; zero for notifies and pushes.
    pub id: u64,
    /// Route; empty for responses.
    pub route: String,
    /// Set on responses that carry an error payload.
    pub error: bool,
    /// Opaque body.
    pub body: Bytes,
}

impl Message {
    /// Build a request.
    #[must_use]
    pub fn request(id: u64, route: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Request,
            id,
            route: route.into(),
            error: false,
            body: body.into(),
        }
    }

    /// Build a notify.
    #[must_use]
    pub fn notify(route: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Notify,
            id: 0,
            route: route.into(),
            error: false,
            body: body.into(),
        }
    }

    /// Build a successful response to request `id`.
    #[must_use]
    pub fn response(id: u64, body: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Response,
            id,
            route: String::new(),
            error: false,
            body: body.into(),
        }
    }

    /// Build an error response to request `id`.
    #[must_use]
    pub fn error_response(id: u64, body: impl Into<Bytes>) -> Self {
        Self {
            error: true,
            ..Self::response(id, body)
        }
    }

    /// Build a push.
    #[must_use]
    pub fn push(route: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageType::Push,
            id: 0,
            route: route.into(),
            error: false,
            body: body.into(),
        }
    }
}

/// Encoder/decoder for [`Message`]s sharing one route dictionary.
///
/// Routes are sent as dictionary codes only when `compress_routes` is set;
/// compressed routes are always accepted on decode.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use playwire::{
///     message::{Message, MessageCodec},
///     route::RouteDictionary,
/// };
///
/// let codec = MessageCodec::new(Arc::new(RouteDictionary::new()), false);
/// let wire = codec
///     .encode(&Message::request(1, "room.enter", &b"{}"[..]))
///     .expect("encode");
/// assert_eq!(&wire[..3], &[0x00, 0x01, 10]);
/// assert_eq!(
///     codec.decode(wire).expect("decode"),
///     Message::request(1, "room.enter", &b"{}"[..])
/// );
/// ```
#[derive(Clone, Debug, Default)]
pub struct MessageCodec {
    dictionary: Arc<RouteDictionary>,
    compress_routes: bool,
}

impl MessageCodec {
    /// Create a codec over `dictionary`.
    #[must_use]
    pub fn new(dictionary: Arc<RouteDictionary>, compress_routes: bool) -> Self {
        Self {
            dictionary,
            compress_routes,
        }
    }

    /// Dictionary used for route compression.
    #[must_use]
    pub fn dictionary(&self) -> &RouteDictionary { &self.dictionary }

    /// Encode `message` into a `Data` packet payload.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::RouteTooLong`] for routes over 255 bytes that
    /// have no dictionary code.
    pub fn encode(&self, message: &Message) -> Result<Bytes, MessageError> {
        let mut flag = (message.kind as u8) << 1;
        if message.error {
            flag |= ERROR;
        }
        let code = if message.kind.has_route() && self.compress_routes {
            self.dictionary.code(&message.route)
        } else {
            None
        };
        if code.is_some() {
            flag |= ROUTE_COMPRESSED;
        }

        let mut dst = BytesMut::with_capacity(
            1 + MAX_VARINT_BYTES + 1 + message.route.len() + message.body.len(),
        );
        dst.put_u8(flag);
        if message.kind.has_id() {
            put_varint(&mut dst, message.id);
        }
        if message.kind.has_route() {
            if let Some(code) = code {
                dst.put_slice(&write_network_u16(code));
            } else {
                let len = u8::try_from(message.route.len())
                    .map_err(|_| MessageError::RouteTooLong(message.route.len()))?;
                dst.put_u8(len);
                dst.put_slice(message.route.as_bytes());
            }
        }
        dst.put_slice(&message.body);
        Ok(dst.freeze())
    }

    /// Decode a `Data` packet payload.
    ///
    /// The body is a zero-copy slice of `payload`.
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] for any malformed envelope.
    pub fn decode(&self, payload: Bytes) -> Result<Message, MessageError> {
        let flag = *payload.first().ok_or(MessageError::Empty)?;
        if flag & GZIP != 0 {
            return Err(MessageError::CompressedBody);
        }
        let kind = MessageType::try_from((flag >> 1) & TYPE_MASK)?;
        let mut offset = 1;

        let id = if kind.has_id() {
            let (id, used) = read_varint(payload.get(offset..).unwrap_or_default())?;
            offset += used;
            id
        } else {
            0
        };

        let route = if kind.has_route() {
            if flag & ROUTE_COMPRESSED == 0 {
                let len = usize::from(*payload.get(offset).ok_or(MessageError::Truncated("route length"))?);
                let raw = payload
                    .get(offset + 1..offset + 1 + len)
                    .ok_or(MessageError::Truncated("route"))?;
                let route = std::str::from_utf8(raw)
                    .map_err(|_| MessageError::InvalidRoute)?
                    .to_owned();
                offset += 1 + len;
                route
            } else {
                let raw = payload
                    .get(offset..offset + 2)
                    .and_then(|slice| <[u8; 2]>::try_from(slice).ok())
                    .ok_or(MessageError::Truncated("route code"))?;
                let code = read_network_u16(raw);
                offset += 2;
                self.dictionary
                    .route(code)
                    .ok_or(MessageError::UnknownRouteCode(code))?
                    .to_owned()
            }
        } else {
            String::new()
        };

        Ok(Message {
            kind,
            id,
            route,
            error: flag & ERROR != 0,
            body: payload.slice(offset..),
        })
    }
}

fn put_varint(dst: &mut BytesMut, mut value: u64) {
    loop {
        let low = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            dst.put_u8(low);
            return;
        }
        dst.put_u8(low | 0x80);
    }
}

fn read_varint(buf: &[u8]) -> Result<(u64, usize), MessageError> {
    let mut value = 0_u64;
    for (i, byte) in buf.iter().take(MAX_VARINT_BYTES).enumerate() {
        let group = u64::from(byte & 0x7f);
        let shift = 7 * i;
        if shift == 63 && group > 1 {
            return Err(MessageError::IdOverflow);
        }
        value |= group << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    if buf.len() >= MAX_VARINT_BYTES {
        Err(MessageError::IdOverflow)
    } else {
        Err(MessageError::Truncated("message id"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use rstest::{fixture, rstest};

    use super::{Message, MessageCodec, MessageError, MessageType, put_varint, read_varint};
    use crate::route::RouteDictionary;

    #[fixture]
    fn codec() -> MessageCodec {
        let dict = RouteDictionary::from_pairs([("room.enter", 0x0102)]).expect("dictionary");
        MessageCodec::new(Arc::new(dict), true)
    }

    #[rstest]
    #[case::zero(0, &[0x00])]
    #[case::one_group(127, &[0x7f])]
    #[case::two_groups(128, &[0x80, 0x01])]
    #[case::three_hundred(300, &[0xac, 0x02])]
    fn varint_layout_is_low_group_first(#[case] value: u64, #[case] wire: &[u8]) {
        let mut dst = bytes::BytesMut::new();
        put_varint(&mut dst, value);
        assert_eq!(&dst[..], wire);
        assert_eq!(read_varint(wire), Ok((value, wire.len())));
    }

    #[test]
    fn varint_round_trips_max_id() {
        let mut dst = bytes::BytesMut::new();
        put_varint(&mut dst, u64::MAX);
        assert_eq!(read_varint(&dst), Ok((u64::MAX, 10)));
    }

    #[test]
    fn overlong_varint_is_rejected() {
        assert_eq!(read_varint(&[0xff; 11]), Err(MessageError::IdOverflow));
        assert_eq!(
            read_varint(&[0x80, 0x80]),
            Err(MessageError::Truncated("message id"))
        );
    }

    #[rstest]
    fn compresses_known_routes(codec: MessageCodec) {
        let wire = codec
            .encode(&Message::push("room.enter", Bytes::from_static(b"x")))
            .expect("encode");
        assert_eq!(&wire[..], &[0x07, 0x01, 0x02, b'x']);
        assert_eq!(
            codec.decode(wire).expect("decode"),
            Message::push("room.enter", Bytes::from_static(b"x"))
        );
    }

    #[rstest]
    fn leaves_unknown_routes_uncompressed(codec: MessageCodec) {
        let wire = codec
            .encode(&Message::notify("chat.say", Bytes::new()))
            .expect("encode");
        assert_eq!(&wire[..], b"\x02\x08chat.say");
    }

    #[rstest]
    fn error_responses_carry_the_error_flag(codec: MessageCodec) {
        let wire = codec
            .encode(&Message::error_response(5, Bytes::from_static(b"{}")))
            .expect("encode");
        assert_eq!(&wire[..], &[0x24, 0x05, b'{', b'}']);
        let decoded = codec.decode(wire).expect("decode");
        assert_eq!(decoded.kind, MessageType::Response);
        assert!(decoded.error);
        assert!(decoded.route.is_empty());
    }

    #[rstest]
    #[case::empty(&[], MessageError::Empty)]
    #[case::bad_type(&[0x08], MessageError::UnknownType(4))]
    #[case::gzip(&[0x10], MessageError::CompressedBody)]
    #[case::missing_route(&[0x00, 0x01], MessageError::Truncated("route length"))]
    #[case::short_route(&[0x02, 0x05, b'a'], MessageError::Truncated("route"))]
    #[case::unknown_code(&[0x03, 0x00, 0x09], MessageError::UnknownRouteCode(9))]
    #[case::bad_utf8(&[0x02, 0x01, 0xff], MessageError::InvalidRoute)]
    fn malformed_envelopes_are_rejected(
        codec: MessageCodec,
        #[case] wire: &'static [u8],
        #[case] expected: MessageError,
    ) {
        assert_eq!(codec.decode(Bytes::from_static(wire)), Err(expected));
    }

    #[rstest]
    fn overlong_routes_cannot_be_encoded(codec: MessageCodec) {
        let route = "r".repeat(256);
        assert_eq!(
            codec.encode(&Message::notify(route, Bytes::new())),
            Err(MessageError::RouteTooLong(256))
        );
    }
}
