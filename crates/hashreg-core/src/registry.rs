use std::collections::{HashMap, HashSet};

use tracing::debug;

use hashreg_types::{ActorId, Fingerprint, TemporalAnchor};

use crate::error::{InputRejection, RegistryError};
use crate::event::{EventBody, RegistryEvent};
use crate::record::{HashRecord, RegistryStats};

/// Maximum number of fingerprints accepted by one batch store.
pub const MAX_BATCH_STORE: usize = 50;

/// Default cap on the length of a batch verification query.
pub const DEFAULT_MAX_BATCH_VERIFY: usize = 1000;

/// Tunables fixed at registry creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Node identifier stamped into event timestamps.
    pub node_id: u16,
    /// Upper bound on `batch_verify_hashes` input length.
    pub max_batch_verify: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            node_id: 0,
            max_batch_verify: DEFAULT_MAX_BATCH_VERIFY,
        }
    }
}

/// Effects of events validated within the current call but not yet applied.
struct Staging {
    seq: u64,
    timestamp: TemporalAnchor,
    administrator: ActorId,
    stored: HashSet<Fingerprint>,
}

/// The fingerprint ledger.
///
/// Records are write-once: a stored fingerprint can never be removed,
/// overwritten, or re-attributed. `total` always equals the number of
/// stored records, the zero fingerprint is never a key, and the
/// administrator is never the zero identity.
///
/// Every mutation goes through [`Registry::apply_all`] or the internal
/// commit path, both of which validate a whole call before touching state,
/// so a failed call leaves the registry exactly as it was.
#[derive(Clone, Debug)]
pub struct Registry {
    records: HashMap<Fingerprint, HashRecord>,
    total: u64,
    administrator: ActorId,
    last_seq: u64,
    last_timestamp: TemporalAnchor,
    options: RegistryOptions,
    outbox: Vec<RegistryEvent>,
}

impl Registry {
    /// Deploy a fresh registry controlled by `administrator`.
    ///
    /// Returns the registry together with its genesis event, which must be
    /// the first entry of any persisted log.
    pub fn genesis(
        administrator: ActorId,
        options: RegistryOptions,
    ) -> Result<(Self, RegistryEvent), RegistryError> {
        if administrator.is_zero() {
            return Err(InputRejection::ZeroAdministrator.into());
        }
        let event = RegistryEvent {
            seq: 1,
            timestamp: TemporalAnchor::now(options.node_id),
            body: EventBody::Genesis { administrator },
        };
        let registry = Self::from_genesis(&event, options)?;
        Ok((registry, event))
    }

    /// Rebuild the empty registry described by a genesis event.
    pub fn from_genesis(
        event: &RegistryEvent,
        options: RegistryOptions,
    ) -> Result<Self, RegistryError> {
        let EventBody::Genesis { administrator } = &event.body else {
            return Err(RegistryError::Integrity {
                seq: event.seq,
                reason: format!("log starts with {} instead of Genesis", event.kind()),
            });
        };
        if event.seq != 1 {
            return Err(RegistryError::Integrity {
                seq: event.seq,
                reason: "genesis must have seq 1".into(),
            });
        }
        if administrator.is_zero() {
            return Err(RegistryError::Integrity {
                seq: event.seq,
                reason: "genesis administrator is the zero identity".into(),
            });
        }

        Ok(Self {
            records: HashMap::new(),
            total: 0,
            administrator: *administrator,
            last_seq: event.seq,
            last_timestamp: event.timestamp,
            options,
            outbox: Vec::new(),
        })
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    /// Store a single fingerprint on behalf of `caller`.
    pub fn store_hash(
        &mut self,
        fingerprint: Fingerprint,
        caller: ActorId,
    ) -> Result<HashRecord, RegistryError> {
        let event = self.prepare_store(fingerprint, caller)?;
        self.commit(vec![event]);
        Ok(self.hash_info(&fingerprint))
    }

    /// Report whether `fingerprint` is stored, leaving a `HashVerified`
    /// audit event behind. The zero fingerprint is simply reported absent.
    pub fn verify_hash(&mut self, fingerprint: Fingerprint, caller: ActorId) -> bool {
        let present = self.contains(&fingerprint);
        let event = self.prepare_verify(fingerprint, caller);
        self.commit(vec![event]);
        present
    }

    /// Store up to [`MAX_BATCH_STORE`] fingerprints as one atomic unit.
    ///
    /// Either every entry is stored, in input order, or none is.
    pub fn batch_store_hashes(
        &mut self,
        fingerprints: &[Fingerprint],
        caller: ActorId,
    ) -> Result<Vec<HashRecord>, RegistryError> {
        let events = self.prepare_batch_store(fingerprints, caller)?;
        self.commit(events);
        Ok(fingerprints.iter().map(|fp| self.hash_info(fp)).collect())
    }

    /// Hand administrative control to `new_administrator`.
    pub fn transfer_ownership(
        &mut self,
        new_administrator: ActorId,
        caller: ActorId,
    ) -> Result<(), RegistryError> {
        let event = self.prepare_transfer(new_administrator, caller)?;
        self.commit(vec![event]);
        Ok(())
    }

    /// Drain the events produced by the convenience mutations above.
    pub fn take_events(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.outbox)
    }

    // ---------------------------------------------------------------
    // Two-phase interface
    // ---------------------------------------------------------------

    /// Validate a single store and return the event it would commit.
    pub fn prepare_store(
        &self,
        fingerprint: Fingerprint,
        caller: ActorId,
    ) -> Result<RegistryEvent, RegistryError> {
        let body = EventBody::HashStored {
            fingerprint,
            storer: caller,
        };
        self.stage(&mut self.staging(), &body)?;
        Ok(self.seal_one(body))
    }

    /// Validate a whole batch against current state and against its own
    /// earlier entries. Nothing is returned unless every entry passes.
    pub fn prepare_batch_store(
        &self,
        fingerprints: &[Fingerprint],
        caller: ActorId,
    ) -> Result<Vec<RegistryEvent>, RegistryError> {
        if fingerprints.is_empty() {
            return Err(InputRejection::EmptyBatch.into());
        }
        if fingerprints.len() > MAX_BATCH_STORE {
            return Err(InputRejection::BatchTooLarge {
                len: fingerprints.len(),
                max: MAX_BATCH_STORE,
            }
            .into());
        }

        let mut staging = self.staging();
        let mut bodies = Vec::with_capacity(fingerprints.len());
        for (index, fingerprint) in fingerprints.iter().enumerate() {
            let body = EventBody::HashStored {
                fingerprint: *fingerprint,
                storer: caller,
            };
            if let Err(error) = self.stage(&mut staging, &body) {
                debug!(index, %error, "batch entry rejected; discarding batch");
                return Err(error);
            }
            bodies.push(body);
        }

        Ok(self.seal(bodies))
    }

    /// Build the audit event for a verification. Never fails.
    pub fn prepare_verify(&self, fingerprint: Fingerprint, caller: ActorId) -> RegistryEvent {
        self.seal_one(EventBody::HashVerified {
            fingerprint,
            verifier: caller,
            present: self.contains(&fingerprint),
        })
    }

    /// Validate an ownership transfer requested by `caller`.
    pub fn prepare_transfer(
        &self,
        new_administrator: ActorId,
        caller: ActorId,
    ) -> Result<RegistryEvent, RegistryError> {
        if caller != self.administrator {
            return Err(RegistryError::Unauthorized { caller });
        }
        let body = EventBody::OwnershipTransferred {
            previous: caller,
            new: new_administrator,
        };
        self.stage(&mut self.staging(), &body)?;
        Ok(self.seal_one(body))
    }

    /// Apply events that continue this registry's sequence.
    ///
    /// The whole slice is checked first (sequence, timestamps, and every
    /// invariant); state changes only if all events pass. Used both for
    /// events from `prepare_*` and for replaying a persisted log.
    pub fn apply_all(&mut self, events: &[RegistryEvent]) -> Result<(), RegistryError> {
        let mut staging = self.staging();
        for event in events {
            let expected = staging.seq + 1;
            if event.seq != expected {
                return Err(RegistryError::Integrity {
                    seq: event.seq,
                    reason: format!("expected seq {expected}"),
                });
            }
            if !event.timestamp.is_after(&staging.timestamp) {
                return Err(RegistryError::Integrity {
                    seq: event.seq,
                    reason: "timestamp does not advance".into(),
                });
            }
            self.stage(&mut staging, &event.body).map_err(|e| match e {
                RegistryError::Integrity { .. } => e,
                other => RegistryError::Integrity {
                    seq: event.seq,
                    reason: other.to_string(),
                },
            })?;
            staging.timestamp = event.timestamp;
        }

        for event in events {
            self.mutate(event);
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Pure existence check; records no audit event.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.records.contains_key(fingerprint)
    }

    /// Stored record, or [`HashRecord::absent`].
    pub fn hash_info(&self, fingerprint: &Fingerprint) -> HashRecord {
        self.records
            .get(fingerprint)
            .copied()
            .unwrap_or_else(HashRecord::absent)
    }

    /// One answer per input, in input order. Duplicates are answered
    /// independently.
    pub fn batch_verify_hashes(
        &self,
        fingerprints: &[Fingerprint],
    ) -> Result<Vec<bool>, RegistryError> {
        if fingerprints.len() > self.options.max_batch_verify {
            return Err(InputRejection::BatchTooLarge {
                len: fingerprints.len(),
                max: self.options.max_batch_verify,
            }
            .into());
        }
        Ok(fingerprints.iter().map(|fp| self.contains(fp)).collect())
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total: self.total,
            administrator: self.administrator,
        }
    }

    pub fn administrator(&self) -> ActorId {
        self.administrator
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sequence number of the last applied event.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Check the structural invariants over the whole state.
    pub fn check_invariants(&self) -> Result<(), RegistryError> {
        let violation = |reason: &str| RegistryError::Integrity {
            seq: self.last_seq,
            reason: reason.to_string(),
        };

        if self.administrator.is_zero() {
            return Err(violation("administrator is the zero identity"));
        }
        if self.records.contains_key(&Fingerprint::zero()) {
            return Err(violation("zero fingerprint is stored"));
        }
        let live = self.records.values().filter(|r| r.exists).count() as u64;
        if live != self.total || self.records.len() as u64 != self.total {
            return Err(violation("total does not match stored records"));
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn staging(&self) -> Staging {
        Staging {
            seq: self.last_seq,
            timestamp: self.last_timestamp,
            administrator: self.administrator,
            stored: HashSet::new(),
        }
    }

    fn is_stored(&self, staging: &Staging, fingerprint: &Fingerprint) -> bool {
        self.records.contains_key(fingerprint) || staging.stored.contains(fingerprint)
    }

    /// Validate `body` against state plus everything already staged, then
    /// stage it.
    fn stage(&self, staging: &mut Staging, body: &EventBody) -> Result<(), RegistryError> {
        match body {
            EventBody::Genesis { .. } => {
                return Err(RegistryError::Integrity {
                    seq: staging.seq + 1,
                    reason: "genesis after start of log".into(),
                });
            }
            EventBody::HashStored { fingerprint, .. } => {
                if fingerprint.is_zero() {
                    return Err(InputRejection::ZeroFingerprint.into());
                }
                if self.is_stored(staging, fingerprint) {
                    return Err(RegistryError::DuplicateEntry(*fingerprint));
                }
                staging.stored.insert(*fingerprint);
            }
            EventBody::HashVerified {
                fingerprint,
                present,
                ..
            } => {
                if *present != self.is_stored(staging, fingerprint) {
                    return Err(RegistryError::Integrity {
                        seq: staging.seq + 1,
                        reason: "verification result disagrees with state".into(),
                    });
                }
            }
            EventBody::OwnershipTransferred { previous, new } => {
                if *previous != staging.administrator {
                    return Err(RegistryError::Unauthorized { caller: *previous });
                }
                if new.is_zero() {
                    return Err(InputRejection::ZeroAdministrator.into());
                }
                staging.administrator = *new;
            }
        }
        staging.seq += 1;
        Ok(())
    }

    /// Number and timestamp freshly validated bodies.
    fn seal(&self, bodies: Vec<EventBody>) -> Vec<RegistryEvent> {
        let mut seq = self.last_seq;
        let mut timestamp = self.last_timestamp;
        bodies
            .into_iter()
            .map(|body| {
                seq += 1;
                timestamp = timestamp.successor(self.options.node_id);
                RegistryEvent {
                    seq,
                    timestamp,
                    body,
                }
            })
            .collect()
    }

    fn seal_one(&self, body: EventBody) -> RegistryEvent {
        RegistryEvent {
            seq: self.last_seq + 1,
            timestamp: self.last_timestamp.successor(self.options.node_id),
            body,
        }
    }

    /// Apply events produced by `prepare_*` on this exact state.
    fn commit(&mut self, events: Vec<RegistryEvent>) {
        for event in &events {
            self.mutate(event);
        }
        self.outbox.extend(events);
    }

    fn mutate(&mut self, event: &RegistryEvent) {
        match &event.body {
            EventBody::HashStored {
                fingerprint,
                storer,
            } => {
                self.records
                    .insert(*fingerprint, HashRecord::stored(*storer, event.timestamp));
                self.total += 1;
            }
            EventBody::OwnershipTransferred { new, .. } => {
                self.administrator = *new;
            }
            EventBody::Genesis { .. } | EventBody::HashVerified { .. } => {}
        }
        self.last_seq = event.seq;
        self.last_timestamp = event.timestamp;
    }
}
