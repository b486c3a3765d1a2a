use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use hashreg_journal::JournalConfig;
use hashreg_types::ActorId;

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub journal_path: PathBuf,
    /// Administrator written into a new journal, as hex or `@label`.
    /// Ignored once the journal exists.
    pub administrator: Option<String>,
    /// Send permissive CORS headers, for browser dashboards.
    pub allow_cors: bool,
    pub journal: JournalConfig,
    /// Bearer tokens. When empty, callers identify themselves with the
    /// `x-hashreg-caller` header instead.
    pub tokens: Vec<TokenConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8420)),
            journal_path: PathBuf::from("hashreg.journal"),
            administrator: None,
            allow_cors: false,
            journal: JournalConfig::default(),
            tokens: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    /// Identity the token acts as, as hex or `@label`.
    pub actor: String,
}

impl TokenConfig {
    /// A fresh random bearer token that acts as `actor`.
    pub fn generate(actor: ActorId) -> Self {
        let mut secret = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut secret);
        Self {
            token: hex::encode(secret),
            actor: actor.to_hex(),
        }
    }

    /// This entry as a `[[tokens]]` table, ready to paste into a config file.
    pub fn to_toml(&self) -> ServerResult<String> {
        #[derive(Serialize)]
        struct Tokens<'a> {
            tokens: [&'a TokenConfig; 1],
        }
        toml::to_string(&Tokens { tokens: [self] })
            .map_err(|e| ServerError::Config(e.to_string()))
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))
    }
}
