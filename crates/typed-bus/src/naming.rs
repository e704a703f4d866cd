//! # Channel Naming
//!
//! `channel = prefix + message type identifier`, and a single pattern
//! subscription `prefix + "*"` covers every type under the prefix.

use crate::error::ChannelError;

/// Characters with special meaning in store glob patterns.
const GLOB_METACHARACTERS: [char; 5] = ['*', '?', '[', ']', '\\'];

/// Maps message type identifiers to channel names and back for one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNaming {
    prefix: String,
}

impl ChannelNaming {
    /// Create a naming scheme for `prefix`.
    ///
    /// # Errors
    ///
    /// `ChannelError::InvalidPrefix` if the prefix contains a glob
    /// metacharacter, since the wildcard subscription would then match
    /// channels outside the namespace.
    pub fn new(prefix: impl Into<String>) -> Result<Self, ChannelError> {
        let prefix = prefix.into();
        if let Some(found) = prefix.chars().find(|c| GLOB_METACHARACTERS.contains(c)) {
            return Err(ChannelError::InvalidPrefix { prefix, found });
        }
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Channel carrying messages of `identifier`.
    #[must_use]
    pub fn to_channel(&self, identifier: &str) -> String {
        let mut channel = String::with_capacity(self.prefix.len() + identifier.len());
        channel.push_str(&self.prefix);
        channel.push_str(identifier);
        channel
    }

    /// Recover the type identifier from a received channel name.
    ///
    /// Only a leading prefix is stripped; occurrences elsewhere in the
    /// channel are part of the identifier.
    ///
    /// # Errors
    ///
    /// `ChannelError::UnknownChannel` if the channel does not start with the
    /// prefix or nothing follows it.
    pub fn identifier_of<'a>(&self, channel: &'a str) -> Result<&'a str, ChannelError> {
        match channel.strip_prefix(self.prefix.as_str()) {
            Some(identifier) if !identifier.is_empty() => Ok(identifier),
            _ => Err(ChannelError::UnknownChannel {
                channel: channel.to_string(),
                prefix: self.prefix.clone(),
            }),
        }
    }

    /// Pattern subscribing to every channel under the prefix.
    #[must_use]
    pub fn pattern(&self) -> String {
        format!("{}*", self.prefix)
    }
}
