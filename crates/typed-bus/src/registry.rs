//! # Handler Registry
//!
//! Maps each message type identifier to the ordered handlers registered for
//! it. Shared between application code adding handlers and the dispatch
//! task invoking them.
//!
//! ## Dispatch semantics
//!
//! - Every handler present when dispatch starts is invoked once, in
//!   registration order.
//! - One-time handlers are claimed (removed) under the slot lock before any
//!   handler runs, so concurrent dispatches never invoke one twice.
//! - No lock is held while handlers run; a handler may register or remove
//!   handlers, which takes effect from the next dispatch.
//! - A handler returning `Err` or panicking is logged and recorded; the
//!   remaining handlers still run.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, trace};

use crate::codec::Message;
use crate::error::{HandlerFailure, RegistryError};

/// Result returned by every handler.
pub type HandlerResult = anyhow::Result<()>;

/// Callback object for messages of type `T`.
///
/// Closures go through [`HandlerRegistry::add_handler`]; implement this
/// trait for handlers that carry their own state.
pub trait MessageHandler<T: Message>: Send + Sync + 'static {
    fn handle(&self, message: &T) -> HandlerResult;
}

/// Process-unique handle for a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a handler stays registered after it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerMode {
    #[default]
    Persistent,
    /// Removed after its first invocation.
    OneTime,
}

type ErasedHandler = Arc<dyn Fn(&dyn Any) -> HandlerResult + Send + Sync>;

struct HandlerEntry {
    id: HandlerId,
    mode: HandlerMode,
    callback: ErasedHandler,
}

/// Handlers for one identifier. All entries accept the same Rust type.
struct HandlerSlot {
    rust_type: TypeId,
    rust_name: &'static str,
    entries: Vec<HandlerEntry>,
}

/// Outcome of dispatching one message.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Handlers that completed successfully.
    pub invoked: usize,
    /// One-time handlers removed by this dispatch.
    pub removed: usize,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    /// Handlers called, whether they succeeded or not.
    pub fn attempted(&self) -> usize {
        self.invoked + self.failures.len()
    }
}

/// Thread-safe identifier → handlers table.
#[derive(Default)]
pub struct HandlerRegistry {
    table: RwLock<HashMap<&'static str, Arc<Mutex<HandlerSlot>>>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a closure handler for `T`.
    ///
    /// # Errors
    ///
    /// `RegistryError::TypeConflict` if handlers for a different Rust type
    /// already exist under `T::MESSAGE_TYPE`.
    pub fn add_handler<T, F>(&self, handler: F, mode: HandlerMode) -> Result<HandlerId, RegistryError>
    where
        T: Message,
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        self.insert::<T>(mode, Arc::new(move |message: &dyn Any| {
            match message.downcast_ref::<T>() {
                Some(message) => handler(message),
                None => Err(type_mismatch::<T>()),
            }
        }))
    }

    /// Append a [`MessageHandler`] implementation for `T`.
    ///
    /// # Errors
    ///
    /// See [`add_handler`](Self::add_handler).
    pub fn add_message_handler<T, H>(&self, handler: H, mode: HandlerMode) -> Result<HandlerId, RegistryError>
    where
        T: Message,
        H: MessageHandler<T>,
    {
        self.insert::<T>(mode, Arc::new(move |message: &dyn Any| {
            match message.downcast_ref::<T>() {
                Some(message) => handler.handle(message),
                None => Err(type_mismatch::<T>()),
            }
        }))
    }

    fn insert<T: Message>(&self, mode: HandlerMode, callback: ErasedHandler) -> Result<HandlerId, RegistryError> {
        let slot = {
            let mut table = self.table.write();
            Arc::clone(table.entry(T::MESSAGE_TYPE).or_insert_with(|| {
                Arc::new(Mutex::new(HandlerSlot {
                    rust_type: TypeId::of::<T>(),
                    rust_name: type_name::<T>(),
                    entries: Vec::new(),
                }))
            }))
        };

        let mut slot = slot.lock();
        if slot.rust_type != TypeId::of::<T>() {
            return Err(RegistryError::TypeConflict {
                identifier: T::MESSAGE_TYPE.to_string(),
                existing: slot.rust_name,
                attempted: type_name::<T>(),
            });
        }

        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        slot.entries.push(HandlerEntry { id, mode, callback });

        debug!(
            message_type = T::MESSAGE_TYPE,
            handler_id = %id,
            ?mode,
            handlers = slot.entries.len(),
            "Handler registered"
        );
        Ok(id)
    }

    /// Append a handler removed after its first invocation.
    ///
    /// # Errors
    ///
    /// See [`add_handler`](Self::add_handler).
    pub fn add_one_time_handler<T, F>(&self, handler: F) -> Result<HandlerId, RegistryError>
    where
        T: Message,
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_handler(handler, HandlerMode::OneTime)
    }

    /// Remove a handler. Returns `false` if it was not registered (or a
    /// one-time handler that already ran).
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let slots: Vec<_> = self.table.read().values().cloned().collect();
        for slot in slots {
            let mut slot = slot.lock();
            if let Some(index) = slot.entries.iter().position(|entry| entry.id == id) {
                slot.entries.remove(index);
                return true;
            }
        }
        false
    }

    /// Invoke every handler registered for `identifier` with `message`.
    ///
    /// An identifier with no handlers yields an empty report.
    ///
    /// # Errors
    ///
    /// `RegistryError::TypeMismatch` if `message` is not the Rust type the
    /// handlers were registered for; no handler runs.
    pub fn dispatch(&self, identifier: &str, message: &dyn Any) -> Result<DispatchReport, RegistryError> {
        let Some(slot) = self.table.read().get(identifier).cloned() else {
            trace!(message_type = identifier, "No handlers registered");
            return Ok(DispatchReport::default());
        };

        let mut report = DispatchReport::default();
        let claimed: Vec<(HandlerId, ErasedHandler)> = {
            let mut slot = slot.lock();
            if slot.rust_type != message.type_id() {
                return Err(RegistryError::TypeMismatch {
                    identifier: identifier.to_string(),
                    expected: slot.rust_name,
                });
            }

            let claimed = slot
                .entries
                .iter()
                .map(|entry| (entry.id, Arc::clone(&entry.callback)))
                .collect();
            let before = slot.entries.len();
            slot.entries.retain(|entry| entry.mode != HandlerMode::OneTime);
            report.removed = before - slot.entries.len();
            claimed
        };

        for (id, callback) in claimed {
            match catch_unwind(AssertUnwindSafe(|| (*callback)(message))) {
                Ok(Ok(())) => report.invoked += 1,
                Ok(Err(err)) => {
                    error!(
                        message_type = identifier,
                        handler_id = %id,
                        error = %format!("{err:#}"),
                        "Handler failed"
                    );
                    report.failures.push(HandlerFailure::Failed {
                        handler: id,
                        error: err,
                    });
                }
                Err(payload) => {
                    let panic_message = panic_message(payload.as_ref());
                    error!(
                        message_type = identifier,
                        handler_id = %id,
                        panic = %panic_message,
                        "Handler panicked"
                    );
                    report.failures.push(HandlerFailure::Panicked {
                        handler: id,
                        message: panic_message,
                    });
                }
            }
        }

        trace!(
            message_type = identifier,
            invoked = report.invoked,
            failed = report.failures.len(),
            removed = report.removed,
            "Message dispatched"
        );
        Ok(report)
    }

    /// Rust type of the handlers registered under `identifier`.
    pub fn registered_type(&self, identifier: &str) -> Option<(TypeId, &'static str)> {
        let slot = self.table.read().get(identifier).cloned()?;
        let slot = slot.lock();
        Some((slot.rust_type, slot.rust_name))
    }

    pub fn handler_count(&self, identifier: &str) -> usize {
        self.table
            .read()
            .get(identifier)
            .map_or(0, |slot| slot.lock().entries.len())
    }

    /// Identifiers that have ever had a handler, sorted.
    pub fn registered_identifiers(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.table.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

fn type_mismatch<T>() -> anyhow::Error {
    anyhow::anyhow!("handler expects {} but received another type", type_name::<T>())
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
