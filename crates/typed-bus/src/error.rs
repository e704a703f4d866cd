//! Error types for the typed bus.
//!
//! Every failure in the bus is recoverable: publish failures are logged and
//! the message dropped, delivery failures are logged, counted and dropped.

use std::fmt;

use thiserror::Error;

use crate::registry::HandlerId;

/// Failure to serialize a message on the publish side.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Message is in an invalid state: {0}")]
    InvalidState(String),
}

/// Failure to populate a message from received bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload truncated: {0}")]
    Truncated(String),

    #[error("Payload malformed: {0}")]
    Malformed(String),
}

/// Errors from mapping between channel names and type identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel does not start with the expected prefix, or carries no
    /// identifier after it.
    #[error("Channel {channel:?} does not belong to prefix {prefix:?}")]
    UnknownChannel { channel: String, prefix: String },

    /// The prefix contains a glob metacharacter.
    #[error("Prefix {prefix:?} contains glob metacharacter {found:?}")]
    InvalidPrefix { prefix: String, found: char },
}

/// Errors from the message type registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeRegistryError {
    #[error("No message type registered under {0:?}")]
    UnknownType(String),

    #[error("Identifier {identifier:?} already belongs to {existing}, cannot register {attempted}")]
    TypeConflict {
        identifier: String,
        existing: &'static str,
        attempted: &'static str,
    },

    #[error("Message type identifier must not be empty")]
    EmptyIdentifier,
}

/// Errors from the handler registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Another Rust type already owns handlers under this identifier.
    #[error("Identifier {identifier:?} already has handlers for {existing}, cannot add one for {attempted}")]
    TypeConflict {
        identifier: String,
        existing: &'static str,
        attempted: &'static str,
    },

    /// A dispatched message is not of the type the handlers expect.
    #[error("Handlers for {identifier:?} expect {expected}")]
    TypeMismatch {
        identifier: String,
        expected: &'static str,
    },
}

/// Errors reported by a pub/sub store backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store connection closed")]
    Closed,

    #[error("Invalid subscription pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Publish-side failure. Only surfaced through `MessagePublisher::try_publish`.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to encode {message_type}: {source}")]
    Encode {
        message_type: &'static str,
        #[source]
        source: EncodeError,
    },

    #[error("Failed to publish on {channel}: {source}")]
    Store {
        channel: String,
        #[source]
        source: StoreError,
    },
}

/// Classification of a dropped delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropKind {
    UnknownChannel,
    UnknownType,
    CapabilityMismatch,
    Decode,
}

impl DropKind {
    /// Stable label used in log records.
    pub fn as_str(&self) -> &'static str {
        match self {
            DropKind::UnknownChannel => "unknown_channel",
            DropKind::UnknownType => "unknown_type",
            DropKind::CapabilityMismatch => "capability_mismatch",
            DropKind::Decode => "decode",
        }
    }
}

impl fmt::Display for DropKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason an inbound delivery was dropped before reaching any handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error(transparent)]
    UnknownChannel(ChannelError),

    #[error(transparent)]
    UnknownType(TypeRegistryError),

    #[error("Type {identifier:?} resolved to {resolved} but handlers expect {expected}")]
    CapabilityMismatch {
        identifier: String,
        resolved: &'static str,
        expected: &'static str,
    },

    #[error("Failed to decode {identifier:?}: {source}")]
    Decode {
        identifier: String,
        #[source]
        source: DecodeError,
    },
}

impl DeliveryError {
    pub fn kind(&self) -> DropKind {
        match self {
            DeliveryError::UnknownChannel(_) => DropKind::UnknownChannel,
            DeliveryError::UnknownType(_) => DropKind::UnknownType,
            DeliveryError::CapabilityMismatch { .. } => DropKind::CapabilityMismatch,
            DeliveryError::Decode { .. } => DropKind::Decode,
        }
    }
}

impl From<ChannelError> for DeliveryError {
    fn from(err: ChannelError) -> Self {
        DeliveryError::UnknownChannel(err)
    }
}

impl From<TypeRegistryError> for DeliveryError {
    fn from(err: TypeRegistryError) -> Self {
        DeliveryError::UnknownType(err)
    }
}

impl From<RegistryError> for DeliveryError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::TypeMismatch {
                identifier,
                expected,
            } => DeliveryError::CapabilityMismatch {
                identifier,
                resolved: "<unknown>",
                expected,
            },
            RegistryError::TypeConflict {
                identifier,
                existing,
                attempted,
            } => DeliveryError::CapabilityMismatch {
                identifier,
                resolved: attempted,
                expected: existing,
            },
        }
    }
}

/// A handler that failed while processing a message.
#[derive(Debug, Error)]
pub enum HandlerFailure {
    #[error("Handler {handler} returned an error: {error:#}")]
    Failed {
        handler: HandlerId,
        error: anyhow::Error,
    },

    #[error("Handler {handler} panicked: {message}")]
    Panicked { handler: HandlerId, message: String },
}

impl HandlerFailure {
    pub fn handler(&self) -> HandlerId {
        match self {
            HandlerFailure::Failed { handler, .. } | HandlerFailure::Panicked { handler, .. } => {
                *handler
            }
        }
    }
}
