//! Content-addressed hash registry.
//!
//! This crate is the heart of hashreg. It provides:
//! - [`Registry`]: the write-once fingerprint ledger with an administrator
//! - Two-phase mutations (`prepare_*` then `apply_all`) so callers can
//!   persist events before state changes
//! - [`RegistryEvent`]: the audit notifications every call produces
//! - Deterministic replay of an event log back into a registry

pub mod error;
pub mod event;
pub mod record;
pub mod registry;
pub mod replay;

pub use error::{InputRejection, RegistryError};
pub use event::{EventBody, EventKind, RegistryEvent};
pub use record::{HashRecord, RegistryStats};
pub use registry::{Registry, RegistryOptions, DEFAULT_MAX_BATCH_VERIFY, MAX_BATCH_STORE};
pub use replay::ReplaySummary;
