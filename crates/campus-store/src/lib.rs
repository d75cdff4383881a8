//! Session persistence for the campus portal.
//!
//! This crate owns everything that touches storage:
//!
//! 1. **Stores**: the [`KeyValueStore`] trait with an ephemeral
//!    [`MemoryStore`] and a durable [`FileStore`]
//! 2. **Sharing**: [`SharedStorage`] lets several contexts (tabs, windows,
//!    processes in one host) use the same durable store and hear about each
//!    other's writes through [`StorageListener`]
//! 3. **Records**: [`SessionRecord`], [`UserSnapshot`], [`BackupMarker`]
//! 4. **Persistence**: [`Persistor`] writes one record into the store
//!    picked by its `remember_me` flag and reads it back, durable first
//!
//! # How it fits in the stack
//!
//! ```text
//! Session facade (above)  ← saves, restores, clears one record
//!     ↕
//! Store layer (this crate)  ← two-tier key-value persistence
//!     ↕
//! Token layer (below)  ← ExpiryReason for validity checks
//! ```

mod error;
mod file;
pub mod keys;
mod memory;
mod persistor;
mod record;
mod shared;

pub use error::StoreError;
pub use file::FileStore;
pub use memory::{KeyValueStore, MemoryStore};
pub use persistor::{Persistor, Preference};
pub use record::{BackupMarker, Role, SessionRecord, UserSnapshot};
pub use shared::{
    ContextId, SharedStorage, StorageContext, StorageEvent, StorageListener,
};
