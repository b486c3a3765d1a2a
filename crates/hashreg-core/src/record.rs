use serde::{Deserialize, Serialize};

use hashreg_types::{ActorId, TemporalAnchor};

/// Metadata kept for every stored fingerprint.
///
/// Created once, when the fingerprint is first accepted, and never
/// modified afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    pub exists: bool,
    /// First submitter; fixed at insertion.
    pub storer: ActorId,
    pub timestamp: TemporalAnchor,
}

impl HashRecord {
    pub(crate) fn stored(storer: ActorId, timestamp: TemporalAnchor) -> Self {
        Self {
            exists: true,
            storer,
            timestamp,
        }
    }

    /// Projection returned for fingerprints that were never stored.
    pub const fn absent() -> Self {
        Self {
            exists: false,
            storer: ActorId::zero(),
            timestamp: TemporalAnchor::zero(),
        }
    }
}

impl Default for HashRecord {
    fn default() -> Self {
        Self::absent()
    }
}

/// Aggregate snapshot of the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: u64,
    pub administrator: ActorId,
}
