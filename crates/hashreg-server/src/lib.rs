//! HTTP server for the hash registry.
//!
//! Exposes the registry operations as a JSON API over a journaled
//! registry. Callers are identified per request by a [`CallerResolver`].

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use auth::{CallerResolver, Credentials, HeaderCaller, TokenCaller, CALLER_HEADER};
pub use config::{ServerConfig, TokenConfig};
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::HashregServer;
