//! # Message Publisher
//!
//! Encodes a message and publishes it on the channel derived from its type.
//! Publishing is fire-and-forget: failures are logged and the message is
//! dropped, matching the store's own non-durable semantics.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::codec::Message;
use crate::error::PublishError;
use crate::naming::ChannelNaming;
use crate::stats::{PublishStats, PublishStatsSnapshot};
use crate::store::PubSubStore;

/// Publishing side of the bus. Cheap to clone; clones share counters.
pub struct MessagePublisher<S: PubSubStore + ?Sized> {
    store: Arc<S>,
    naming: ChannelNaming,
    stats: Arc<PublishStats>,
}

impl<S: PubSubStore + ?Sized> Clone for MessagePublisher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            naming: self.naming.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<S: PubSubStore + ?Sized> MessagePublisher<S> {
    pub fn new(store: Arc<S>, naming: ChannelNaming) -> Self {
        Self {
            store,
            naming,
            stats: Arc::new(PublishStats::default()),
        }
    }

    /// Publish `message`, logging and dropping it on failure.
    pub async fn publish<T: Message>(&self, message: &T) {
        match self.try_publish(message).await {
            Ok(_) => {}
            Err(err @ PublishError::Encode { .. }) => {
                error!(message_type = T::MESSAGE_TYPE, error = %err, "Message dropped: encode failed");
            }
            Err(err @ PublishError::Store { .. }) => {
                warn!(message_type = T::MESSAGE_TYPE, error = %err, "Message dropped: store publish failed");
            }
        }
    }

    /// Publish `message` and report the outcome.
    ///
    /// Returns the number of subscriptions the store handed the payload to;
    /// zero is not an error.
    ///
    /// # Errors
    ///
    /// - `PublishError::Encode` - the message could not be encoded
    /// - `PublishError::Store` - the store rejected the publish
    pub async fn try_publish<T: Message>(&self, message: &T) -> Result<usize, PublishError> {
        let payload = message.encode().map_err(|source| {
            self.stats.record_encode_failure();
            PublishError::Encode {
                message_type: T::MESSAGE_TYPE,
                source,
            }
        })?;

        let channel = self.naming.to_channel(T::MESSAGE_TYPE);
        let size = payload.len();
        match self.store.publish(&channel, payload).await {
            Ok(receivers) => {
                self.stats.record_published();
                debug!(
                    channel = %channel,
                    bytes = size,
                    receivers = receivers,
                    "Message published"
                );
                Ok(receivers)
            }
            Err(source) => {
                self.stats.record_store_failure();
                Err(PublishError::Store { channel, source })
            }
        }
    }

    pub fn naming(&self) -> &ChannelNaming {
        &self.naming
    }

    #[must_use]
    pub fn stats(&self) -> PublishStatsSnapshot {
        self.stats.snapshot()
    }
}
