//! # Codec Contract
//!
//! Every type carried by the bus implements [`Message`]: a stable type
//! identifier plus encode/decode to raw bytes. The payload format is the
//! type's own business; [`bincode_message!`](crate::bincode_message) covers
//! the common case of a serde-derived struct.

use std::any::Any;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DecodeError, EncodeError};

/// A message that can travel over the bus.
///
/// `decode` fills an existing instance. Instances reconstructed on the
/// subscribe side come from the factory registered in
/// [`TypeRegistry`](crate::TypeRegistry), so `decode` must not rely on any
/// field set by a constructor.
pub trait Message: Any + Send + Sync {
    /// Identifier shared by publisher and subscriber processes.
    ///
    /// Must be non-empty and unique among all message types on the bus.
    const MESSAGE_TYPE: &'static str;

    /// Serialize to the wire payload.
    ///
    /// # Errors
    ///
    /// `EncodeError` when the value cannot be represented.
    fn encode(&self) -> Result<Vec<u8>, EncodeError>;

    /// Populate `self` from a wire payload.
    ///
    /// # Errors
    ///
    /// `DecodeError::Truncated` on short input, `DecodeError::Malformed`
    /// on anything else that cannot be parsed.
    fn decode(&mut self, bytes: &[u8]) -> Result<(), DecodeError>;
}

/// Object-safe view of a [`Message`] whose concrete type is only known at
/// runtime.
pub trait ErasedMessage: Send + Sync {
    fn message_type(&self) -> &'static str;

    fn decode_bytes(&mut self, bytes: &[u8]) -> Result<(), DecodeError>;

    fn as_any(&self) -> &dyn Any;
}

impl<T: Message> ErasedMessage for T {
    fn message_type(&self) -> &'static str {
        T::MESSAGE_TYPE
    }

    fn decode_bytes(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        Message::decode(self, bytes)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Serialize a serde value with bincode.
pub fn encode_bincode<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serialize(value).map_err(|e| EncodeError::Serialization(e.to_string()))
}

/// Deserialize a serde value with bincode, separating short input from
/// otherwise invalid input. Bytes left over after the value are malformed.
pub fn decode_bincode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    // Fixint matches the layout written by `bincode::serialize`.
    bincode::options()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .deserialize(bytes)
        .map_err(|err| match err.as_ref() {
            bincode::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                DecodeError::Truncated(io.to_string())
            }
            other => DecodeError::Malformed(other.to_string()),
        })
}

/// Implement [`Message`] for a serde type using bincode payloads.
///
/// ```ignore
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct Ping { seq: u64 }
///
/// typed_bus::bincode_message!(Ping, "app.Ping");
/// ```
#[macro_export]
macro_rules! bincode_message {
    ($ty:ty, $id:expr) => {
        impl $crate::Message for $ty {
            const MESSAGE_TYPE: &'static str = $id;

            fn encode(&self) -> ::std::result::Result<::std::vec::Vec<u8>, $crate::EncodeError> {
                $crate::codec::encode_bincode(self)
            }

            fn decode(&mut self, bytes: &[u8]) -> ::std::result::Result<(), $crate::DecodeError> {
                *self = $crate::codec::decode_bincode(bytes)?;
                ::std::result::Result::Ok(())
            }
        }
    };
}
