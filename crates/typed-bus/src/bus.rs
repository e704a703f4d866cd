//! # Message Bus
//!
//! Wires one store, one naming scheme and one pair of registries together.
//! Publishers and dispatchers handed out by a bus share its registries, so
//! handlers added at any time are seen by every dispatcher of that bus.
//! Separate buses are fully independent.

use std::sync::Arc;

use crate::codec::Message;
use crate::config::BusConfig;
use crate::error::{ChannelError, PublishError, RegistryError, StoreError, TypeRegistryError};
use crate::naming::ChannelNaming;
use crate::publisher::MessagePublisher;
use crate::registry::{HandlerId, HandlerMode, HandlerRegistry, HandlerResult, MessageHandler};
use crate::store::{InMemoryPubSub, PubSubStore};
use crate::subscriber::{RunningDispatcher, SubscriptionDispatcher};
use crate::types::TypeRegistry;

/// Typed publish/subscribe over a [`PubSubStore`].
pub struct MessageBus<S: PubSubStore + ?Sized> {
    store: Arc<S>,
    naming: ChannelNaming,
    types: Arc<TypeRegistry>,
    handlers: Arc<HandlerRegistry>,
    publisher: MessagePublisher<S>,
}

impl MessageBus<InMemoryPubSub> {
    /// Bus over a fresh in-process store.
    ///
    /// # Errors
    ///
    /// `ChannelError::InvalidPrefix` for an invalid configured prefix.
    pub fn in_memory(config: &BusConfig) -> Result<Self, ChannelError> {
        let store = Arc::new(InMemoryPubSub::with_buffer(config.subscription_buffer));
        Self::new(store, config)
    }
}

impl<S: PubSubStore + ?Sized> MessageBus<S> {
    /// # Errors
    ///
    /// `ChannelError::InvalidPrefix` for an invalid configured prefix.
    pub fn new(store: Arc<S>, config: &BusConfig) -> Result<Self, ChannelError> {
        let naming = config.naming()?;
        let publisher = MessagePublisher::new(Arc::clone(&store), naming.clone());
        Ok(Self {
            store,
            naming,
            types: Arc::new(TypeRegistry::new()),
            handlers: Arc::new(HandlerRegistry::new()),
            publisher,
        })
    }

    /// Make `T` receivable, building empty instances with `T::default()`.
    ///
    /// # Errors
    ///
    /// See [`TypeRegistry::register_with`].
    pub fn register_type<T: Message + Default>(&self) -> Result<(), TypeRegistryError> {
        self.types.register::<T>()
    }

    /// Make `T` receivable with an explicit empty-instance factory.
    ///
    /// # Errors
    ///
    /// See [`TypeRegistry::register_with`].
    pub fn register_type_with<T: Message>(&self, factory: fn() -> T) -> Result<(), TypeRegistryError> {
        self.types.register_with(factory)
    }

    /// # Errors
    ///
    /// See [`HandlerRegistry::add_handler`].
    pub fn add_handler<T, F>(&self, handler: F, mode: HandlerMode) -> Result<HandlerId, RegistryError>
    where
        T: Message,
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.add_handler(handler, mode)
    }

    /// # Errors
    ///
    /// See [`HandlerRegistry::add_handler`].
    pub fn add_one_time_handler<T, F>(&self, handler: F) -> Result<HandlerId, RegistryError>
    where
        T: Message,
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.add_one_time_handler(handler)
    }

    /// # Errors
    ///
    /// See [`HandlerRegistry::add_handler`].
    pub fn add_message_handler<T, H>(&self, handler: H, mode: HandlerMode) -> Result<HandlerId, RegistryError>
    where
        T: Message,
        H: MessageHandler<T>,
    {
        self.handlers.add_message_handler(handler, mode)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.handlers.remove_handler(id)
    }

    /// Fire-and-forget publish; failures are logged, never returned.
    pub async fn publish<T: Message>(&self, message: &T) {
        self.publisher.publish(message).await;
    }

    /// # Errors
    ///
    /// See [`MessagePublisher::try_publish`].
    pub async fn try_publish<T: Message>(&self, message: &T) -> Result<usize, PublishError> {
        self.publisher.try_publish(message).await
    }

    /// Subscribe a new dispatcher for this bus and start it.
    ///
    /// # Errors
    ///
    /// Any `StoreError` from the pattern subscription.
    pub async fn register(&self) -> Result<RunningDispatcher, StoreError> {
        self.dispatcher().register().await
    }

    /// A publisher sharing this bus's store, naming and counters.
    #[must_use]
    pub fn publisher(&self) -> MessagePublisher<S> {
        self.publisher.clone()
    }

    /// An unsubscribed dispatcher sharing this bus's registries.
    #[must_use]
    pub fn dispatcher(&self) -> SubscriptionDispatcher<S> {
        SubscriptionDispatcher::new(
            Arc::clone(&self.store),
            self.naming.clone(),
            Arc::clone(&self.types),
            Arc::clone(&self.handlers),
        )
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn naming(&self) -> &ChannelNaming {
        &self.naming
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }
}
