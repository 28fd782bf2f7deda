//! Handshake payloads.
//!
//! The client opens with a `Handshake` packet describing itself; the server
//! answers with a `HandshakeAck` packet carrying the heartbeat interval, the
//! route dictionary and the serializer name. The answer is identical for
//! every session, so it is encoded once per application.

use std::{collections::BTreeMap, time::Duration};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::{
    compression,
    frame::{self, FrameError, PacketType},
    route::RouteDictionary,
};

/// Status code sent in a successful handshake response.
pub const HANDSHAKE_OK: u16 = 200;

/// Errors raised while building or parsing handshake payloads.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The payload was not valid handshake JSON.
    #[error("invalid handshake payload: {0}")]
    Json(#[from] serde_json::Error),
    /// Compressing or decompressing the payload failed.
    #[error("handshake compression failed: {0}")]
    Compression(#[from] std::io::Error),
    /// The encoded response did not fit in a packet.
    #[error("handshake response does not fit in a frame: {0}")]
    Frame(#[from] FrameError),
}

/// Client details sent in the `sys` section of a handshake.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientInfo {
    /// Client platform, for example `"android"`.
    pub platform: String,
    /// Version of the client protocol library.
    #[serde(rename = "libVersion")]
    pub lib_version: String,
    /// Build number of the client application.
    #[serde(rename = "clientBuildNumber")]
    pub build_number: String,
    /// Version of the client application.
    #[serde(rename = "clientVersion")]
    pub version: String,
}

/// Handshake sent by a client.
///
/// Every field is optional; an empty payload decodes to the default value.
///
/// # Examples
///
/// ```
/// use playwire::handshake::HandshakeRequest;
///
/// let request = HandshakeRequest::parse(
///     br#"{"sys":{"platform":"ios","clientVersion":"1.2"},"user":{"age":3}}"#,
/// )
/// .expect("valid handshake");
/// assert_eq!(request.sys.platform, "ios");
/// assert_eq!(request.sys.version, "1.2");
/// assert_eq!(request.user["age"], 3);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeRequest {
    /// Library-level client details.
    pub sys: ClientInfo,
    /// Application-defined data.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub user: Map<String, Value>,
}

impl HandshakeRequest {
    /// Parse a handshake payload, inflating it first if it is compressed.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError`] if the payload is not a handshake object.
    pub fn parse(payload: &[u8]) -> Result<Self, HandshakeError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        if compression::is_compressed(payload) {
            let inflated = compression::inflate(payload)?;
            return Ok(serde_json::from_slice(&inflated)?);
        }
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Server parameters sent in the `sys` section of the handshake response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Heartbeat interval in seconds.
    pub heartbeat: Number,
    /// Route compression dictionary.
    pub dict: BTreeMap<String, u16>,
    /// Name of the body serializer.
    pub serializer: String,
}

/// Handshake response sent by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    /// Status code; [`HANDSHAKE_OK`] on success.
    pub code: u16,
    /// Server parameters.
    pub sys: ServerInfo,
}

impl HandshakeResponse {
    /// Build a successful response.
    #[must_use]
    pub fn new(heartbeat: Duration, dictionary: &RouteDictionary, serializer: &str) -> Self {
        Self {
            code: HANDSHAKE_OK,
            sys: ServerInfo {
                heartbeat: seconds(heartbeat),
                dict: dictionary.entries().clone(),
                serializer: serializer.to_owned(),
            },
        }
    }

    /// Encode the response as JSON, deflating it when `compress` is set and
    /// the compressed form is smaller.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError`] if serialization or compression fails.
    pub fn to_payload(&self, compress: bool) -> Result<Vec<u8>, HandshakeError> {
        let json = serde_json::to_vec(self)?;
        if compress {
            let deflated = compression::deflate(&json)?;
            if deflated.len() < json.len() {
                return Ok(deflated);
            }
        }
        Ok(json)
    }

    /// Encode the response as a complete `HandshakeAck` packet.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError`] if the payload cannot be built or framed.
    pub fn to_frame(&self, compress: bool) -> Result<Bytes, HandshakeError> {
        let payload = self.to_payload(compress)?;
        Ok(frame::encode(PacketType::HandshakeAck, &payload)?)
    }

    /// Decode a response payload, inflating it first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError`] if the payload is not a handshake response.
    pub fn parse(payload: &[u8]) -> Result<Self, HandshakeError> {
        if compression::is_compressed(payload) {
            let inflated = compression::inflate(payload)?;
            return Ok(serde_json::from_slice(&inflated)?);
        }
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Whole seconds as an integer, otherwise fractional seconds.
fn seconds(interval: Duration) -> Number {
    if interval.subsec_nanos() == 0 {
        Number::from(interval.as_secs())
    } else {
        Number::from_f64(interval.as_secs_f64()).unwrap_or_else(|| Number::from(0_u64))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::{HandshakeRequest, HandshakeResponse};
    use crate::{
        compression,
        frame::{self, PacketType},
        route::RouteDictionary,
    };

    #[test]
    fn response_json_matches_wire_contract() {
        let dict = RouteDictionary::from_pairs([("room.enter", 1)]).expect("dictionary");
        let response = HandshakeResponse::new(Duration::from_secs(5), &dict, "json");
        let payload = response.to_payload(false).expect("payload");
        let value: Value = serde_json::from_slice(&payload).expect("json");
        assert_eq!(
            value,
            json!({"code": 200, "sys": {"heartbeat": 5, "dict": {"room.enter": 1}, "serializer": "json"}})
        );
    }

    #[test]
    fn sub_second_heartbeat_is_fractional() {
        let response =
            HandshakeResponse::new(Duration::from_millis(250), &RouteDictionary::new(), "json");
        assert_eq!(response.sys.heartbeat.as_f64(), Some(0.25));
    }

    #[test]
    fn compression_is_used_only_when_smaller() {
        let small = HandshakeResponse::new(Duration::from_secs(1), &RouteDictionary::new(), "json");
        let payload = small.to_payload(true).expect("payload");
        assert!(!compression::is_compressed(&payload));

        let routes = (0..64).map(|i| (format!("service{i}.method{i}"), i));
        let dict = RouteDictionary::from_pairs(routes).expect("dictionary");
        let large = HandshakeResponse::new(Duration::from_secs(1), &dict, "json");
        let payload = large.to_payload(true).expect("payload");
        assert!(compression::is_compressed(&payload));
        assert_eq!(HandshakeResponse::parse(&payload).expect("parse"), large);
    }

    #[test]
    fn response_frame_is_a_handshake_ack() {
        let response = HandshakeResponse::new(Duration::from_secs(3), &RouteDictionary::new(), "json");
        let wire = response.to_frame(false).expect("frame");
        let (frames, _) = frame::decode(&wire, 1024).expect("decode");
        assert_eq!(frames[0].packet_type(), PacketType::HandshakeAck);
    }

    #[test]
    fn empty_request_payload_is_default() {
        assert_eq!(HandshakeRequest::parse(b"").expect("parse"), HandshakeRequest::default());
    }

    #[test]
    fn malformed_request_payload_is_rejected() {
        assert!(HandshakeRequest::parse(b"[1,2").is_err());
    }
}
