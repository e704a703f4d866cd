//! # Typed Bus - Typed Publish/Subscribe over Store Channels
//!
//! Producers publish strongly-typed messages; consumers register handlers
//! per message type. Channels are derived from the type identifier, so the
//! two sides never agree on channel names explicitly.
//!
//! ## Data Flow
//!
//! ```text
//! ┌────────────────┐  encode   ┌─────────────────┐  psubscribe(prefix*)  ┌──────────────────┐
//! │MessagePublisher│ ────────▶ │   PubSubStore   │ ────────────────────▶ │SubscriptionDisp. │
//! └────────────────┘  prefix+id└─────────────────┘   (channel, bytes)    └────────┬─────────┘
//!                                                                                │ resolve id,
//!                                                                                │ factory + decode
//!                                                                                ▼
//!                                                                       ┌──────────────────┐
//!                                                                       │ HandlerRegistry  │
//!                                                                       └──────────────────┘
//! ```
//!
//! ## Delivery Semantics
//!
//! - **At-most-once:** inherited from the store; nothing is persisted or retried.
//! - **Fire-and-forget publish:** encode and store failures are logged, not returned.
//! - **Fail closed:** unknown channels, unknown types, type mismatches and bad
//!   payloads are logged, counted and dropped; the dispatcher keeps running.
//! - **Handler isolation:** a handler error or panic never affects other
//!   handlers or later messages.
//!
//! ## Usage
//!
//! ```ignore
//! use typed_bus::{BusConfig, HandlerMode, MessageBus};
//!
//! #[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
//! struct Ping { seq: u64 }
//! typed_bus::bincode_message!(Ping, "app.Ping");
//!
//! let bus = MessageBus::in_memory(&BusConfig::default())?;
//! bus.register_type::<Ping>()?;
//! bus.add_handler(|ping: &Ping| { println!("{}", ping.seq); Ok(()) }, HandlerMode::Persistent)?;
//! let _running = bus.register().await?;
//! bus.publish(&Ping { seq: 1 }).await;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod naming;
pub mod publisher;
pub mod registry;
pub mod stats;
pub mod store;
pub mod subscriber;
pub mod types;

// Re-export main types
pub use bus::MessageBus;
pub use codec::{ErasedMessage, Message};
pub use config::BusConfig;
pub use error::{
    ChannelError, DecodeError, DeliveryError, DropKind, EncodeError, HandlerFailure, PublishError,
    RegistryError, StoreError, TypeRegistryError,
};
pub use naming::ChannelNaming;
pub use publisher::MessagePublisher;
pub use registry::{DispatchReport, HandlerId, HandlerMode, HandlerRegistry, HandlerResult, MessageHandler};
pub use stats::{DispatchStats, DispatchStatsSnapshot, PublishStats, PublishStatsSnapshot};
pub use store::{GlobPattern, InMemoryPubSub, PatternSubscription, PubSubStore, StoreMessage};
pub use subscriber::{RunningDispatcher, SubscriptionDispatcher};
pub use types::{TypeDescriptor, TypeRegistry};

/// Channel prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "bus:";

/// Payloads buffered per subscription by [`InMemoryPubSub`].
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 1024;
