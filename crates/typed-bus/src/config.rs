//! # Bus Configuration
//!
//! Plain values supplied by the embedding application. The bus itself reads
//! no environment variables.

use crate::error::ChannelError;
use crate::naming::ChannelNaming;
use crate::{DEFAULT_PREFIX, DEFAULT_SUBSCRIPTION_BUFFER};

/// Configuration for a [`MessageBus`](crate::MessageBus).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Namespace prepended to every channel name.
    pub prefix: String,
    /// Payloads buffered per subscription by in-process stores.
    pub subscription_buffer: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER,
        }
    }
}

impl BusConfig {
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_subscription_buffer(mut self, buffer: usize) -> Self {
        self.subscription_buffer = buffer;
        self
    }

    /// Validated naming scheme for the configured prefix.
    ///
    /// # Errors
    ///
    /// `ChannelError::InvalidPrefix` if the prefix contains a glob
    /// metacharacter.
    pub fn naming(&self) -> Result<ChannelNaming, ChannelError> {
        ChannelNaming::new(self.prefix.clone())
    }
}
