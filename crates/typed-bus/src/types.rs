//! # Message Type Registry
//!
//! A closed, explicit universe of message types. Each type is registered
//! with a zero-argument factory so the dispatcher can build an empty
//! instance of a type it only knows by identifier, then fill it with
//! `decode`.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::codec::{ErasedMessage, Message};
use crate::error::TypeRegistryError;

type Factory = Arc<dyn Fn() -> Box<dyn ErasedMessage> + Send + Sync>;

/// Everything the dispatcher needs to rebuild one message type.
#[derive(Clone)]
pub struct TypeDescriptor {
    identifier: &'static str,
    rust_type: TypeId,
    rust_name: &'static str,
    factory: Factory,
}

impl TypeDescriptor {
    fn of<T: Message>(factory: fn() -> T) -> Self {
        Self {
            identifier: T::MESSAGE_TYPE,
            rust_type: TypeId::of::<T>(),
            rust_name: type_name::<T>(),
            factory: Arc::new(move || Box::new(factory()) as Box<dyn ErasedMessage>),
        }
    }

    pub fn identifier(&self) -> &'static str {
        self.identifier
    }

    pub fn rust_type(&self) -> TypeId {
        self.rust_type
    }

    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    /// Build an empty instance through the registered factory.
    ///
    /// Field values are expected to come from a subsequent `decode`.
    #[must_use]
    pub fn instantiate_empty(&self) -> Box<dyn ErasedMessage> {
        (self.factory)()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("identifier", &self.identifier)
            .field("rust_name", &self.rust_name)
            .finish()
    }
}

/// Identifier → descriptor table shared by every dispatcher of a bus.
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<&'static str, TypeDescriptor>>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`, building empty instances with `T::default()`.
    ///
    /// # Errors
    ///
    /// See [`register_with`](Self::register_with).
    pub fn register<T: Message + Default>(&self) -> Result<(), TypeRegistryError> {
        self.register_with::<T>(T::default)
    }

    /// Register `T` with an explicit factory for empty instances.
    ///
    /// Registering the same Rust type again replaces its factory.
    ///
    /// # Errors
    ///
    /// - `TypeRegistryError::EmptyIdentifier` - `T::MESSAGE_TYPE` is empty
    /// - `TypeRegistryError::TypeConflict` - a different type already owns
    ///   the identifier
    pub fn register_with<T: Message>(&self, factory: fn() -> T) -> Result<(), TypeRegistryError> {
        if T::MESSAGE_TYPE.is_empty() {
            return Err(TypeRegistryError::EmptyIdentifier);
        }

        let descriptor = TypeDescriptor::of::<T>(factory);
        let mut types = self.types.write();
        if let Some(existing) = types.get(T::MESSAGE_TYPE) {
            if existing.rust_type != descriptor.rust_type {
                return Err(TypeRegistryError::TypeConflict {
                    identifier: T::MESSAGE_TYPE.to_string(),
                    existing: existing.rust_name,
                    attempted: descriptor.rust_name,
                });
            }
        }

        debug!(
            message_type = T::MESSAGE_TYPE,
            rust_type = descriptor.rust_name,
            "Message type registered"
        );
        types.insert(T::MESSAGE_TYPE, descriptor);
        Ok(())
    }

    /// Look up the descriptor for a received identifier.
    ///
    /// # Errors
    ///
    /// `TypeRegistryError::UnknownType` if nothing is registered under it.
    pub fn resolve(&self, identifier: &str) -> Result<TypeDescriptor, TypeRegistryError> {
        self.types
            .read()
            .get(identifier)
            .cloned()
            .ok_or_else(|| TypeRegistryError::UnknownType(identifier.to_string()))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.types.read().contains_key(identifier)
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.types.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}
