use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};

use hashreg_types::ActorId;

use crate::config::TokenConfig;
use crate::error::{ServerError, ServerResult};

/// Header carrying the caller's identity for [`HeaderCaller`].
pub const CALLER_HEADER: &str = "x-hashreg-caller";

/// What a request presented to identify its caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Caller(String),
    Anonymous,
}

impl Credentials {
    /// Extract credentials from request headers. A bearer token wins over
    /// the caller header.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if let Some(token) = bearer {
            return Self::Bearer(token.trim().to_string());
        }
        match headers.get(CALLER_HEADER).and_then(|v| v.to_str().ok()) {
            Some(caller) => Self::Caller(caller.trim().to_string()),
            None => Self::Anonymous,
        }
    }
}

/// Turns request credentials into the identity a registry call runs as.
#[async_trait]
pub trait CallerResolver: Send + Sync {
    async fn resolve(&self, credentials: &Credentials) -> ServerResult<ActorId>;
}

/// Trusts the `x-hashreg-caller` header. Suitable behind a gateway that
/// has already authenticated the caller.
pub struct HeaderCaller;

#[async_trait]
impl CallerResolver for HeaderCaller {
    async fn resolve(&self, credentials: &Credentials) -> ServerResult<ActorId> {
        match credentials {
            Credentials::Caller(hex) => ActorId::from_hex(hex)
                .map_err(|e| ServerError::AuthFailed(format!("{CALLER_HEADER}: {e}"))),
            _ => Err(ServerError::AuthFailed(format!(
                "missing {CALLER_HEADER} header"
            ))),
        }
    }
}

/// Maps bearer tokens to configured identities.
pub struct TokenCaller {
    tokens: HashMap<String, ActorId>,
}

impl TokenCaller {
    pub fn new(tokens: HashMap<String, ActorId>) -> Self {
        Self { tokens }
    }

    pub fn from_config(entries: &[TokenConfig]) -> ServerResult<Self> {
        let mut tokens = HashMap::with_capacity(entries.len());
        for entry in entries {
            let actor = entry.actor.parse::<ActorId>().map_err(|e| {
                ServerError::Config(format!("token actor {:?}: {e}", entry.actor))
            })?;
            tokens.insert(entry.token.clone(), actor);
        }
        Ok(Self::new(tokens))
    }
}

#[async_trait]
impl CallerResolver for TokenCaller {
    async fn resolve(&self, credentials: &Credentials) -> ServerResult<ActorId> {
        match credentials {
            Credentials::Bearer(token) => self
                .tokens
                .get(token)
                .copied()
                .ok_or_else(|| ServerError::AuthFailed("unknown bearer token".into())),
            _ => Err(ServerError::AuthFailed("missing bearer token".into())),
        }
    }
}
