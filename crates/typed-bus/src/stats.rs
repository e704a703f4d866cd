//! Delivery and publish counters.
//!
//! Every drop path has its own counter so operators can tell a
//! misconfigured prefix from a rolling deployment from a codec bug.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::DropKind;
use crate::registry::DispatchReport;

/// Counters for one dispatcher.
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    dispatched: AtomicU64,
    handler_invocations: AtomicU64,
    handler_failures: AtomicU64,
    unknown_channel: AtomicU64,
    unknown_type: AtomicU64,
    capability_mismatch: AtomicU64,
    decode_failures: AtomicU64,
}

impl DispatchStats {
    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatched(&self, report: &DispatchReport) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.handler_invocations
            .fetch_add(report.attempted() as u64, Ordering::Relaxed);
        self.handler_failures
            .fetch_add(report.failures.len() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self, kind: DropKind) {
        let counter = match kind {
            DropKind::UnknownChannel => &self.unknown_channel,
            DropKind::UnknownType => &self.unknown_type,
            DropKind::CapabilityMismatch => &self.capability_mismatch,
            DropKind::Decode => &self.decode_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            handler_invocations: self.handler_invocations.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            unknown_channel: self.unknown_channel.load(Ordering::Relaxed),
            unknown_type: self.unknown_type.load(Ordering::Relaxed),
            capability_mismatch: self.capability_mismatch.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    /// Deliveries taken off the subscription.
    pub received: u64,
    /// Deliveries that reached the handler registry.
    pub dispatched: u64,
    pub handler_invocations: u64,
    pub handler_failures: u64,
    pub unknown_channel: u64,
    pub unknown_type: u64,
    pub capability_mismatch: u64,
    pub decode_failures: u64,
}

impl DispatchStatsSnapshot {
    /// Deliveries dropped before dispatch, all causes.
    pub fn dropped(&self) -> u64 {
        self.unknown_channel + self.unknown_type + self.capability_mismatch + self.decode_failures
    }

    pub fn dropped_by(&self, kind: DropKind) -> u64 {
        match kind {
            DropKind::UnknownChannel => self.unknown_channel,
            DropKind::UnknownType => self.unknown_type,
            DropKind::CapabilityMismatch => self.capability_mismatch,
            DropKind::Decode => self.decode_failures,
        }
    }
}

/// Counters for one publisher.
#[derive(Debug, Default)]
pub struct PublishStats {
    published: AtomicU64,
    encode_failures: AtomicU64,
    store_failures: AtomicU64,
}

impl PublishStats {
    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> PublishStatsSnapshot {
        PublishStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PublishStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStatsSnapshot {
    pub published: u64,
    pub encode_failures: u64,
    pub store_failures: u64,
}
