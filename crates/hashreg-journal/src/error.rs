use std::io;
use std::path::PathBuf;

use hashreg_core::RegistryError;

/// Errors produced by the journal and the service handle.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The call was refused by the registry itself.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("journal {0} is empty and no administrator was given to initialize it")]
    Uninitialized(PathBuf),

    #[error("journal {0} is held by another process")]
    Locked(PathBuf),

    #[error("registry lock poisoned")]
    LockPoisoned,
}

impl JournalError {
    /// The registry error behind this failure, if it was a refused call.
    pub fn as_registry(&self) -> Option<&RegistryError> {
        match self {
            Self::Registry(e) => Some(e),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the journal crate.
pub type Result<T> = std::result::Result<T, JournalError>;
