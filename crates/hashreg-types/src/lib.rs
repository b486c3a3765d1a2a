//! Foundation types for the hash registry.
//!
//! Every other hashreg crate depends on `hashreg-types`.
//!
//! # Key Types
//!
//! - [`Fingerprint`]: 32-byte content fingerprint (SHA-256 of an artifact)
//! - [`ActorId`]: Identity of a caller or administrator
//! - [`TemporalAnchor`]: Hybrid Logical Clock timestamp for record creation

pub mod error;
pub mod fingerprint;
mod hex_serde;
pub mod identity;
pub mod temporal;

pub use error::TypeError;
pub use fingerprint::Fingerprint;
pub use identity::ActorId;
pub use temporal::TemporalAnchor;
