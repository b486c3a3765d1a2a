use hashreg_types::{ActorId, Fingerprint};

/// Why a caller's input was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputRejection {
    #[error("invalid hash")]
    ZeroFingerprint,

    #[error("no hashes provided")]
    EmptyBatch,

    #[error("batch too large: {len} entries, limit is {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("new administrator cannot be zero identity")]
    ZeroAdministrator,
}

/// Errors produced by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid input: {0}")]
    InvalidInput(InputRejection),

    #[error("hash already exists: {0}")]
    DuplicateEntry(Fingerprint),

    #[error("only administrator may call (caller {caller})")]
    Unauthorized { caller: ActorId },

    #[error("integrity violation at seq {seq}: {reason}")]
    Integrity { seq: u64, reason: String },
}

impl RegistryError {
    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::DuplicateEntry(_) => "duplicate_entry",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Integrity { .. } => "integrity",
        }
    }
}

impl From<InputRejection> for RegistryError {
    fn from(rejection: InputRejection) -> Self {
        Self::InvalidInput(rejection)
    }
}
