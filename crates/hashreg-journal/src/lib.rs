//! Durable journal and service handle for the hash registry.
//!
//! Every call against the registry produces events. This crate persists
//! them in a write-ahead journal before they take effect, fans them out to
//! monitors, and wraps the registry in a handle that serializes mutations
//! while letting reads run concurrently against fully applied state.

pub mod bus;
pub mod config;
pub mod error;
pub mod journal;
pub mod service;

pub use bus::{EventBus, EventFilter, EventStream};
pub use config::{JournalConfig, SyncMode};
pub use error::{JournalError, Result};
pub use journal::{Journal, Recovery};
pub use service::JournaledRegistry;
