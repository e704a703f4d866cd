//! # Subscription Dispatcher
//!
//! Subscribes to `prefix + "*"`, recovers the message type from each
//! channel, rebuilds a typed instance from the payload and hands it to the
//! handler registry.
//!
//! ## Lifecycle
//!
//! ```text
//! SubscriptionDispatcher ──register()──▶ RunningDispatcher
//!     (unsubscribed)                        (subscribed)
//! ```
//!
//! `register` consumes the dispatcher, so a dispatcher subscribes at most
//! once. The delivery task stops only when the store closes the
//! subscription.
//!
//! ## Head-of-line blocking
//!
//! Deliveries are processed one at a time, in order, and handlers run
//! synchronously on the delivery task. A slow handler delays every later
//! message; handlers needing parallelism should hand work off themselves
//! (for example with `tokio::spawn`). Handlers have no timeout.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{error, info, trace, warn};

use crate::error::{DecodeError, DeliveryError, StoreError};
use crate::naming::ChannelNaming;
use crate::registry::{panic_message, DispatchReport, HandlerRegistry};
use crate::stats::{DispatchStats, DispatchStatsSnapshot};
use crate::store::{PatternSubscription, PubSubStore};
use crate::types::{TypeDescriptor, TypeRegistry};

/// A dispatcher that has not subscribed yet.
pub struct SubscriptionDispatcher<S: PubSubStore + ?Sized> {
    store: Arc<S>,
    naming: ChannelNaming,
    types: Arc<TypeRegistry>,
    handlers: Arc<HandlerRegistry>,
    stats: Arc<DispatchStats>,
}

impl<S: PubSubStore + ?Sized> SubscriptionDispatcher<S> {
    pub fn new(
        store: Arc<S>,
        naming: ChannelNaming,
        types: Arc<TypeRegistry>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            store,
            naming,
            types,
            handlers,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Subscribe to every channel under the prefix and start delivering on
    /// a background task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Any `StoreError` from the pattern subscription.
    pub async fn register(self) -> Result<RunningDispatcher, StoreError> {
        let pattern = self.naming.pattern();
        let subscription = self.store.psubscribe(&pattern).await?;
        info!(pattern = %pattern, "Dispatcher subscribed");

        let stats = Arc::clone(&self.stats);
        let task = tokio::spawn(self.run(subscription));

        Ok(RunningDispatcher {
            pattern,
            stats,
            task,
        })
    }

    async fn run(self, subscription: PatternSubscription) {
        let pattern = subscription.pattern().to_string();
        let mut messages = subscription.into_stream();
        while let Some(message) = messages.next().await {
            // Drops are logged and counted inside `deliver`.
            let _ = self.deliver(&message.channel, &message.payload);
        }
        info!(pattern = %pattern, "Subscription closed, dispatcher stopped");
    }

    /// Process one inbound `(channel, payload)` delivery.
    ///
    /// Every failure is logged with its drop classification and counted;
    /// the returned error is informational.
    ///
    /// # Errors
    ///
    /// - `DeliveryError::UnknownChannel` - channel outside the prefix
    /// - `DeliveryError::UnknownType` - identifier not registered here
    /// - `DeliveryError::CapabilityMismatch` - resolved type differs from
    ///   the type the handlers accept
    /// - `DeliveryError::Decode` - payload could not be decoded, or the
    ///   type's factory or decoder panicked
    pub fn deliver(&self, channel: &str, payload: &[u8]) -> Result<DispatchReport, DeliveryError> {
        self.stats.record_received();

        match self.try_deliver(channel, payload) {
            Ok(report) => {
                self.stats.record_dispatched(&report);
                trace!(
                    channel = channel,
                    invoked = report.invoked,
                    failed = report.failures.len(),
                    "Delivery dispatched"
                );
                Ok(report)
            }
            Err(err) => {
                let kind = err.kind();
                self.stats.record_drop(kind);
                match &err {
                    DeliveryError::CapabilityMismatch { .. } => {
                        error!(channel = channel, drop = %kind, error = %err, "Delivery dropped");
                    }
                    DeliveryError::UnknownType(_) => {
                        // Expected while publishers run a newer version.
                        info!(channel = channel, drop = %kind, error = %err, "Delivery dropped");
                    }
                    _ => {
                        warn!(channel = channel, drop = %kind, error = %err, "Delivery dropped");
                    }
                }
                Err(err)
            }
        }
    }

    fn try_deliver(&self, channel: &str, payload: &[u8]) -> Result<DispatchReport, DeliveryError> {
        let identifier = self.naming.identifier_of(channel)?;
        let descriptor = self.types.resolve(identifier)?;
        self.check_capability(identifier, &descriptor)?;

        // Factory and decoder are message-type code; a panic there drops this
        // delivery only.
        let decoded = catch_unwind(AssertUnwindSafe(|| {
            let mut instance = descriptor.instantiate_empty();
            instance.decode_bytes(payload).map(|()| instance)
        }));
        let instance = match decoded {
            Ok(Ok(instance)) => instance,
            Ok(Err(source)) => {
                return Err(DeliveryError::Decode {
                    identifier: identifier.to_string(),
                    source,
                })
            }
            Err(panic) => {
                return Err(DeliveryError::Decode {
                    identifier: identifier.to_string(),
                    source: DecodeError::Malformed(format!(
                        "decoder panicked: {}",
                        panic_message(panic.as_ref())
                    )),
                })
            }
        };

        Ok(self.handlers.dispatch(identifier, instance.as_any())?)
    }

    /// The resolved type must be the one the handlers were registered for.
    fn check_capability(&self, identifier: &str, descriptor: &TypeDescriptor) -> Result<(), DeliveryError> {
        match self.handlers.registered_type(identifier) {
            Some((expected, expected_name)) if expected != descriptor.rust_type() => {
                Err(DeliveryError::CapabilityMismatch {
                    identifier: identifier.to_string(),
                    resolved: descriptor.rust_name(),
                    expected: expected_name,
                })
            }
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }
}

/// A dispatcher delivering on a background task.
pub struct RunningDispatcher {
    pattern: String,
    stats: Arc<DispatchStats>,
    task: JoinHandle<()>,
}

impl RunningDispatcher {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// `true` once the store closed the subscription.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the delivery task to end.
    pub async fn closed(self) {
        if let Err(err) = self.task.await {
            error!(pattern = %self.pattern, error = %err, "Dispatcher task failed");
        }
    }
}
