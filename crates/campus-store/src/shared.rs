//! One durable store, many contexts, change notifications between them.
//!
//! Browsers fire a `storage` event in every OTHER tab of the same origin
//! when one tab writes to `localStorage`. [`SharedStorage`] reproduces that
//! contract: each context gets its own [`StorageContext`] handle, writes go
//! to the shared backing store, and every real change is announced on a
//! broadcast bus. A [`StorageListener`] hands a context only the changes
//! made by someone else, never its own.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use crate::{KeyValueStore, StoreError};

/// Counter for generating unique context IDs.
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Bus capacity. Listeners that fall further behind skip ahead (and log).
const DEFAULT_BUS_CAPACITY: usize = 64;

/// Identifies one context (tab) attached to a [`SharedStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A change made to the shared store by one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// The key that changed.
    pub key: String,
    /// Value before the change (`None` if the key was absent).
    pub old_value: Option<String>,
    /// Value after the change (`None` if the key was removed).
    pub new_value: Option<String>,
    /// The context that made the change.
    pub origin: ContextId,
}

impl StorageEvent {
    /// Whether this event removed a key that previously held a value.
    pub fn is_removal(&self) -> bool {
        self.old_value.is_some() && self.new_value.is_none()
    }
}

/// A durable store shared by several contexts.
///
/// Cheap to clone; clones share the same store and bus.
#[derive(Clone)]
pub struct SharedStorage {
    store: Arc<dyn KeyValueStore>,
    bus: broadcast::Sender<StorageEvent>,
}

impl SharedStorage {
    /// Wraps `store` so it can be shared between contexts.
    pub fn new(store: impl KeyValueStore) -> Self {
        let (bus, _) = broadcast::channel(DEFAULT_BUS_CAPACITY);
        Self {
            store: Arc::new(store),
            bus,
        }
    }

    /// Attaches a new context (one per tab).
    pub fn context(&self) -> StorageContext {
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, "storage context attached");
        StorageContext {
            id,
            store: Arc::clone(&self.store),
            bus: self.bus.clone(),
        }
    }
}

/// One context's view of a [`SharedStorage`].
///
/// Implements [`KeyValueStore`], so it can be handed to a
/// [`Persistor`](crate::Persistor) as the durable tier. Writes that don't
/// change anything (setting the same value, removing an absent key) are
/// not announced.
#[derive(Clone)]
pub struct StorageContext {
    id: ContextId,
    store: Arc<dyn KeyValueStore>,
    bus: broadcast::Sender<StorageEvent>,
}

impl StorageContext {
    /// This context's identity on the bus.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Starts listening for changes made by OTHER contexts.
    ///
    /// Only changes made after this call are delivered.
    pub fn subscribe(&self) -> StorageListener {
        StorageListener {
            own: self.id,
            rx: self.bus.subscribe(),
        }
    }

    fn announce(&self, key: &str, old_value: Option<String>, new_value: Option<String>) {
        let event = StorageEvent {
            key: key.to_owned(),
            old_value,
            new_value,
            origin: self.id,
        };
        // No listeners is fine; nobody else is open.
        let _ = self.bus.send(event);
    }
}

impl KeyValueStore for StorageContext {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.store.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let old = self.store.get(key)?;
        self.store.set(key, value)?;
        if old.as_deref() != Some(value) {
            self.announce(key, old, Some(value.to_owned()));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let old = self.store.get(key)?;
        if old.is_some() {
            self.store.remove(key)?;
            self.announce(key, old, None);
        }
        Ok(())
    }
}

/// Receives changes made by other contexts.
pub struct StorageListener {
    own: ContextId,
    rx: broadcast::Receiver<StorageEvent>,
}

impl StorageListener {
    /// Waits for the next change made by another context.
    ///
    /// Returns `None` once every [`SharedStorage`] and [`StorageContext`]
    /// handle has been dropped. If this listener fell behind, the missed
    /// events are skipped with a warning.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.own => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(context = %self.own, skipped, "storage listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
