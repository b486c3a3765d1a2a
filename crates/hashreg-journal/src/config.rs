use serde::{Deserialize, Serialize};

use hashreg_core::{RegistryOptions, DEFAULT_MAX_BATCH_VERIFY};

/// Flush strategy for journal writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every committed call.
    EveryWrite,
    /// Flush to the OS and rely on its page cache.
    #[default]
    OsDefault,
}

/// Settings for [`crate::JournaledRegistry`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub sync_mode: SyncMode,
    /// Capacity of each subscriber's broadcast channel.
    pub channel_capacity: usize,
    pub node_id: u16,
    pub max_batch_verify: usize,
}

impl JournalConfig {
    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            node_id: self.node_id,
            max_batch_verify: self.max_batch_verify,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::default(),
            channel_capacity: 1024,
            node_id: 0,
            max_batch_verify: DEFAULT_MAX_BATCH_VERIFY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = JournalConfig::default();
        assert_eq!(c.sync_mode, SyncMode::OsDefault);
        assert_eq!(c.channel_capacity, 1024);
        assert_eq!(c.registry_options().max_batch_verify, 1000);
    }
}
