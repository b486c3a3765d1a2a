use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard};

use tracing::{info, warn};

use hashreg_core::{HashRecord, Registry, RegistryError, RegistryEvent, RegistryStats};
use hashreg_types::{ActorId, Fingerprint};

use crate::bus::{EventBus, EventFilter, EventStream};
use crate::config::JournalConfig;
use crate::error::{JournalError, Result};
use crate::journal::Journal;

struct Inner {
    registry: Registry,
    /// Every committed event since genesis.
    log: Vec<RegistryEvent>,
}

/// Shared handle to one registry deployment.
///
/// Mutating calls are serialized by a write lock and follow the same path:
/// prepare (validate the whole call), append to the journal, apply, then
/// publish. A refused call or a failed journal write leaves the registry
/// untouched. Queries take the read lock and so never observe a partially
/// applied call.
pub struct JournaledRegistry {
    inner: RwLock<Inner>,
    journal: Option<Journal>,
    bus: EventBus,
}

impl JournaledRegistry {
    /// Open the registry persisted at `path`.
    ///
    /// An existing journal is replayed; `administrator` is only used to
    /// deploy a registry into an empty journal.
    pub fn open(
        path: &Path,
        config: &JournalConfig,
        administrator: Option<ActorId>,
    ) -> Result<Self> {
        let journal = Journal::open(path, config.sync_mode)?;
        let recovery = journal.recover()?;
        journal.truncate_torn_tail(&recovery)?;
        let recovered = recovery.events;
        let options = config.registry_options();

        let (registry, log) = if recovered.is_empty() {
            let admin =
                administrator.ok_or_else(|| JournalError::Uninitialized(path.to_path_buf()))?;
            let (registry, genesis) = Registry::genesis(admin, options)?;
            journal.append_all(std::slice::from_ref(&genesis))?;
            info!(administrator = %admin, path = %path.display(), "registry deployed");
            (registry, vec![genesis])
        } else {
            let (registry, summary) = Registry::replay(&recovered, options)?;
            if let Some(requested) = administrator {
                if requested != registry.administrator() {
                    warn!(
                        requested = %requested,
                        current = %registry.administrator(),
                        "ignoring bootstrap administrator for existing journal"
                    );
                }
            }
            info!(
                events = summary.events,
                total = registry.total(),
                path = %path.display(),
                "registry recovered from journal"
            );
            (registry, recovered)
        };

        Ok(Self {
            inner: RwLock::new(Inner { registry, log }),
            journal: Some(journal),
            bus: EventBus::new(config.channel_capacity),
        })
    }

    /// Registry without persistence, for tests and embedding.
    pub fn in_memory(administrator: ActorId, config: &JournalConfig) -> Result<Self> {
        let (registry, genesis) = Registry::genesis(administrator, config.registry_options())?;
        Ok(Self {
            inner: RwLock::new(Inner {
                registry,
                log: vec![genesis],
            }),
            journal: None,
            bus: EventBus::new(config.channel_capacity),
        })
    }

    pub fn store_hash(&self, fingerprint: Fingerprint, caller: ActorId) -> Result<HashRecord> {
        let record = self.commit(
            |reg| reg.prepare_store(fingerprint, caller).map(|e| vec![e]),
            |reg| reg.hash_info(&fingerprint),
        )?;
        info!(fingerprint = %fingerprint.short_hex(), storer = %caller, "hash stored");
        Ok(record)
    }

    pub fn verify_hash(&self, fingerprint: Fingerprint, caller: ActorId) -> Result<bool> {
        self.commit(
            |reg| Ok(vec![reg.prepare_verify(fingerprint, caller)]),
            |reg| reg.contains(&fingerprint),
        )
    }

    pub fn batch_store_hashes(
        &self,
        fingerprints: &[Fingerprint],
        caller: ActorId,
    ) -> Result<Vec<HashRecord>> {
        let records: Vec<HashRecord> = self.commit(
            |reg| reg.prepare_batch_store(fingerprints, caller),
            |reg| fingerprints.iter().map(|fp| reg.hash_info(fp)).collect(),
        )?;
        info!(count = records.len(), storer = %caller, "hash batch stored");
        Ok(records)
    }

    pub fn transfer_ownership(&self, new_administrator: ActorId, caller: ActorId) -> Result<()> {
        self.commit(
            |reg| reg.prepare_transfer(new_administrator, caller).map(|e| vec![e]),
            |_| (),
        )?;
        info!(previous = %caller, new = %new_administrator, "ownership transferred");
        Ok(())
    }

    pub fn batch_verify_hashes(&self, fingerprints: &[Fingerprint]) -> Result<Vec<bool>> {
        Ok(self.read()?.registry.batch_verify_hashes(fingerprints)?)
    }

    /// Existence check without an audit event.
    pub fn contains(&self, fingerprint: &Fingerprint) -> Result<bool> {
        Ok(self.read()?.registry.contains(fingerprint))
    }

    pub fn hash_info(&self, fingerprint: &Fingerprint) -> Result<HashRecord> {
        Ok(self.read()?.registry.hash_info(fingerprint))
    }

    pub fn stats(&self) -> Result<RegistryStats> {
        Ok(self.read()?.registry.stats())
    }

    /// The full event history, starting with genesis.
    pub fn audit_log(&self) -> Result<Vec<RegistryEvent>> {
        Ok(self.read()?.log.clone())
    }

    /// At most `limit` committed events with `seq > since`, oldest first.
    /// Page through the history by passing the last returned `seq` back in.
    pub fn events_since(&self, since: u64, limit: usize) -> Result<Vec<RegistryEvent>> {
        let inner = self.read()?;
        // seq n lives at index n - 1.
        let start = usize::try_from(since).unwrap_or(usize::MAX).min(inner.log.len());
        let end = start.saturating_add(limit).min(inner.log.len());
        Ok(inner.log[start..end].to_vec())
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        self.bus.subscribe(filter)
    }

    pub fn check_invariants(&self) -> Result<()> {
        Ok(self.read()?.registry.check_invariants()?)
    }

    pub fn journal_path(&self) -> Option<&Path> {
        self.journal.as_ref().map(Journal::path)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| JournalError::LockPoisoned)
    }

    fn commit<T>(
        &self,
        prepare: impl FnOnce(&Registry) -> std::result::Result<Vec<RegistryEvent>, RegistryError>,
        project: impl FnOnce(&Registry) -> T,
    ) -> Result<T> {
        let mut inner = self.inner.write().map_err(|_| JournalError::LockPoisoned)?;

        let events = prepare(&inner.registry).inspect_err(|e| {
            warn!(kind = e.kind(), error = %e, "call refused");
        })?;

        if let Some(journal) = &self.journal {
            journal.append_all(&events)?;
        }
        inner.registry.apply_all(&events)?;
        inner.log.extend(events.iter().cloned());

        let value = project(&inner.registry);
        // Publish under the lock so monitors see events in seq order.
        self.bus.publish(&events);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashreg_core::{EventBody, EventKind, InputRejection};

    fn fp(seed: u8) -> Fingerprint {
        Fingerprint::from_hash([seed; 32])
    }

    fn service() -> JournaledRegistry {
        JournaledRegistry::in_memory(ActorId::derive("owner"), &JournalConfig::default()).unwrap()
    }

    #[test]
    fn in_memory_store_and_query() {
        let svc = service();
        let record = svc.store_hash(fp(1), ActorId::derive("a")).unwrap();
        assert!(record.exists);
        assert!(svc.contains(&fp(1)).unwrap());
        assert_eq!(svc.hash_info(&fp(1)).unwrap(), record);
        assert_eq!(svc.stats().unwrap().total, 1);
        assert!(svc.journal_path().is_none());
    }

    #[test]
    fn refused_call_surfaces_registry_error() {
        let svc = service();
        svc.store_hash(fp(1), ActorId::derive("a")).unwrap();
        let err = svc.store_hash(fp(1), ActorId::derive("b")).unwrap_err();
        assert_eq!(
            err.as_registry(),
            Some(&RegistryError::DuplicateEntry(fp(1)))
        );
    }

    #[test]
    fn events_since_returns_tail() {
        let svc = service();
        svc.store_hash(fp(1), ActorId::derive("a")).unwrap();
        svc.verify_hash(fp(1), ActorId::derive("b")).unwrap();

        let all = svc.events_since(0, usize::MAX).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].kind(), EventKind::Genesis);

        let tail = svc.events_since(2, 10).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].seq, 3);

        assert!(svc.events_since(99, 10).unwrap().is_empty());
    }

    #[test]
    fn events_since_pages_by_limit() {
        let svc = service();
        for seed in 1..=5 {
            svc.store_hash(fp(seed), ActorId::derive("a")).unwrap();
        }

        let mut seen = Vec::new();
        let mut since = 0;
        loop {
            let page = svc.events_since(since, 2).unwrap();
            if page.is_empty() {
                break;
            }
            assert!(page.len() <= 2);
            since = page.last().map(|e| e.seq).unwrap();
            seen.extend(page.into_iter().map(|e| e.seq));
        }
        assert_eq!(seen, (1..=6).collect::<Vec<u64>>());
        assert!(svc.events_since(0, 0).unwrap().is_empty());
    }

    #[test]
    fn subscribers_see_committed_events_only() {
        let svc = service();
        let mut stream = svc.subscribe(EventFilter::default());

        svc.batch_store_hashes(&[fp(1), fp(2)], ActorId::derive("a"))
            .unwrap();
        let _ = svc.batch_store_hashes(&[fp(3), fp(1)], ActorId::derive("a"));

        assert_eq!(stream.try_recv().unwrap().body.fingerprint(), Some(&fp(1)));
        assert_eq!(stream.try_recv().unwrap().body.fingerprint(), Some(&fp(2)));
        assert!(stream.try_recv().is_err());
    }

    #[test]
    fn batch_verify_respects_configured_cap() {
        let config = JournalConfig {
            max_batch_verify: 1,
            ..JournalConfig::default()
        };
        let svc = JournaledRegistry::in_memory(ActorId::derive("owner"), &config).unwrap();
        let err = svc.batch_verify_hashes(&[fp(1), fp(2)]).unwrap_err();
        assert_eq!(
            err.as_registry(),
            Some(&RegistryError::InvalidInput(InputRejection::BatchTooLarge {
                len: 2,
                max: 1
            }))
        );
    }

    #[test]
    fn open_requires_administrator_for_new_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.journal");
        let err = JournaledRegistry::open(&path, &JournalConfig::default(), None)
            .err()
            .unwrap();
        assert!(matches!(err, JournalError::Uninitialized(_)));
    }

    #[test]
    fn reopen_restores_state_and_ignores_bootstrap_admin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.journal");
        let owner = ActorId::derive("owner");
        {
            let svc =
                JournaledRegistry::open(&path, &JournalConfig::default(), Some(owner)).unwrap();
            svc.store_hash(fp(1), ActorId::derive("a")).unwrap();
            svc.transfer_ownership(ActorId::derive("b"), owner).unwrap();
        }

        let svc = JournaledRegistry::open(
            &path,
            &JournalConfig::default(),
            Some(ActorId::derive("someone-else")),
        )
        .unwrap();
        let stats = svc.stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.administrator, ActorId::derive("b"));
        assert_eq!(svc.hash_info(&fp(1)).unwrap().storer, ActorId::derive("a"));

        let log = svc.audit_log().unwrap();
        assert_eq!(log.len(), 3);
        assert!(matches!(
            log.last().map(|e| &e.body),
            Some(EventBody::OwnershipTransferred { .. })
        ));
    }
}
