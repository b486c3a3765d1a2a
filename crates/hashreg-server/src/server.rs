use std::sync::Arc;

use tokio::net::TcpListener;

use hashreg_journal::JournaledRegistry;
use hashreg_types::ActorId;

use crate::auth::{CallerResolver, HeaderCaller, TokenCaller};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Hash registry HTTP server.
pub struct HashregServer {
    config: ServerConfig,
    registry: Arc<JournaledRegistry>,
    resolver: Arc<dyn CallerResolver>,
}

impl HashregServer {
    /// Open the journal named in `config` and pick the caller resolver:
    /// bearer tokens when any are configured, the caller header otherwise.
    pub fn open(config: ServerConfig) -> ServerResult<Self> {
        let administrator = config
            .administrator
            .as_deref()
            .map(|s| {
                s.parse::<ActorId>()
                    .map_err(|e| ServerError::Config(format!("administrator {s:?}: {e}")))
            })
            .transpose()?;
        let registry =
            JournaledRegistry::open(&config.journal_path, &config.journal, administrator)?;
        Self::with_registry(config, Arc::new(registry))
    }

    /// Serve an already opened registry.
    pub fn with_registry(
        config: ServerConfig,
        registry: Arc<JournaledRegistry>,
    ) -> ServerResult<Self> {
        let resolver: Arc<dyn CallerResolver> = if config.tokens.is_empty() {
            Arc::new(HeaderCaller)
        } else {
            Arc::new(TokenCaller::from_config(&config.tokens)?)
        };
        Ok(Self {
            config,
            registry,
            resolver,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<JournaledRegistry> {
        &self.registry
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            resolver: Arc::clone(&self.resolver),
        };
        build_router(state, self.config.allow_cors)
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            journal = %self.config.journal_path.display(),
            "hashreg server listening"
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
