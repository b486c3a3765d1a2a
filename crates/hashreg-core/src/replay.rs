use tracing::debug;

use crate::error::RegistryError;
use crate::event::{EventBody, RegistryEvent};
use crate::registry::{Registry, RegistryOptions};

/// Counts gathered while replaying an event log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: u64,
    pub stored: u64,
    pub verifications: u64,
    pub transfers: u64,
}

impl Registry {
    /// Rebuild a registry from a complete event log.
    ///
    /// The log must start with the genesis event and continue without gaps.
    /// Any event that the live registry would have refused surfaces as
    /// [`RegistryError::Integrity`].
    pub fn replay(
        events: &[RegistryEvent],
        options: RegistryOptions,
    ) -> Result<(Registry, ReplaySummary), RegistryError> {
        let Some((genesis, rest)) = events.split_first() else {
            return Err(RegistryError::Integrity {
                seq: 0,
                reason: "event log is empty".into(),
            });
        };

        let mut registry = Registry::from_genesis(genesis, options)?;
        registry.apply_all(rest)?;

        let mut summary = ReplaySummary {
            events: events.len() as u64,
            ..ReplaySummary::default()
        };
        for event in rest {
            match event.body {
                EventBody::HashStored { .. } => summary.stored += 1,
                EventBody::HashVerified { .. } => summary.verifications += 1,
                EventBody::OwnershipTransferred { .. } => summary.transfers += 1,
                EventBody::Genesis { .. } => {}
            }
        }

        debug!(
            events = summary.events,
            stored = summary.stored,
            "registry replayed"
        );
        Ok((registry, summary))
    }
}
