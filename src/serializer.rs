//! Payload serialization.
//!
//! Handlers exchange typed values; the [`Serializer`] configured on the
//! application turns them into message bodies and back. Its [`name`] is
//! advertised to clients in the handshake response.
//!
//! [`name`]: Serializer::name

use std::error::Error;

use serde::{Serialize, de::DeserializeOwned};

/// Boxed error returned by serializers.
pub type SerializerError = Box<dyn Error + Send + Sync>;

/// Trait for serializing and deserializing message bodies.
///
/// # Object Safety
///
/// This trait is not object-safe: its methods are generic over the value
/// type. Use concrete serializer types in API bounds.
pub trait Serializer: Send + Sync + 'static {
    /// Name advertised in the handshake, for example `"json"`.
    fn name(&self) -> &str;

    /// Serialize `value` into bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    fn marshal<T>(&self, value: &T) -> Result<Vec<u8>, SerializerError>
    where
        T: Serialize + ?Sized;

    /// Deserialize a value from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` do not describe a `T`.
    fn unmarshal<T>(&self, bytes: &[u8]) -> Result<T, SerializerError>
    where
        T: DeserializeOwned;
}

/// Serializer using `serde_json`.
///
/// # Examples
///
/// ```
/// use playwire::serializer::{JsonSerializer, Serializer};
///
/// let json = JsonSerializer;
/// let bytes = json.marshal(&vec![1, 2]).expect("serialize");
/// assert_eq!(bytes, b"[1,2]");
/// let back: Vec<u8> = json.unmarshal(&bytes).expect("deserialize");
/// assert_eq!(back, vec![1, 2]);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &str { "json" }

    fn marshal<T>(&self, value: &T) -> Result<Vec<u8>, SerializerError>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_vec(value).map_err(Into::into)
    }

    fn unmarshal<T>(&self, bytes: &[u8]) -> Result<T, SerializerError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(bytes).map_err(Into::into)
    }
}
