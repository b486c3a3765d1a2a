//! End-to-end scenarios through the journaled service.

use std::sync::Arc;
use std::thread;

use hashreg_core::{EventBody, EventKind, InputRejection, RegistryError, MAX_BATCH_STORE};
use hashreg_journal::{EventFilter, JournalConfig, JournalError, JournaledRegistry, SyncMode};
use hashreg_types::{ActorId, Fingerprint};

fn h(seed: u8) -> Fingerprint {
    Fingerprint::digest(&[seed])
}

fn open(dir: &tempfile::TempDir, admin: ActorId) -> JournaledRegistry {
    let config = JournalConfig {
        sync_mode: SyncMode::EveryWrite,
        ..JournalConfig::default()
    };
    JournaledRegistry::open(&dir.path().join("registry.journal"), &config, Some(admin)).unwrap()
}

fn registry_error(err: JournalError) -> RegistryError {
    err.as_registry().cloned().expect("registry error")
}

#[test]
fn store_then_query() {
    let dir = tempfile::tempdir().unwrap();
    let a = ActorId::derive("a");
    let reg = open(&dir, ActorId::derive("admin"));

    reg.store_hash(h(1), a).unwrap();

    let info = reg.hash_info(&h(1)).unwrap();
    assert!(info.exists);
    assert_eq!(info.storer, a);
    assert_eq!(reg.stats().unwrap().total, 1);
}

#[test]
fn duplicate_store_keeps_first_storer() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = (ActorId::derive("a"), ActorId::derive("b"));
    let reg = open(&dir, ActorId::derive("admin"));

    reg.store_hash(h(1), a).unwrap();
    let err = registry_error(reg.store_hash(h(1), b).unwrap_err());

    assert_eq!(err, RegistryError::DuplicateEntry(h(1)));
    assert!(err.to_string().contains("hash already exists"));
    assert_eq!(reg.hash_info(&h(1)).unwrap().storer, a);
}

#[test]
fn batch_store_emits_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let reg = open(&dir, ActorId::derive("admin"));
    let mut stream = reg.subscribe(EventFilter::kinds([EventKind::HashStored]));

    let records = reg
        .batch_store_hashes(&[h(1), h(2), h(3)], ActorId::derive("a"))
        .unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(reg.stats().unwrap().total, 3);
    for expected in [h(1), h(2), h(3)] {
        let event = stream.try_recv().unwrap();
        assert_eq!(event.body.fingerprint(), Some(&expected));
    }
}

#[test]
fn empty_batch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let reg = open(&dir, ActorId::derive("admin"));

    let err = registry_error(reg.batch_store_hashes(&[], ActorId::derive("a")).unwrap_err());

    assert_eq!(err, InputRejection::EmptyBatch.into());
    assert!(err.to_string().contains("no hashes provided"));
    assert_eq!(reg.stats().unwrap().total, 0);
}

#[test]
fn oversized_batch_stores_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let reg = open(&dir, ActorId::derive("admin"));
    let batch: Vec<_> = (1..=(MAX_BATCH_STORE as u8 + 1)).map(h).collect();

    let err = registry_error(reg.batch_store_hashes(&batch, ActorId::derive("a")).unwrap_err());

    assert!(err.to_string().contains("batch too large"));
    assert_eq!(reg.stats().unwrap().total, 0);
    assert!(!reg.contains(&batch[0]).unwrap());
}

#[test]
fn ownership_handover() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = (ActorId::derive("a"), ActorId::derive("b"));
    let reg = open(&dir, a);

    reg.transfer_ownership(b, a).unwrap();
    assert_eq!(reg.stats().unwrap().administrator, b);

    let err = registry_error(reg.transfer_ownership(a, a).unwrap_err());
    assert_eq!(err, RegistryError::Unauthorized { caller: a });
}

#[test]
fn refused_calls_leave_no_trace_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let admin = ActorId::derive("admin");
    {
        let reg = open(&dir, admin);
        reg.store_hash(h(1), ActorId::derive("a")).unwrap();
        let _ = reg.store_hash(h(1), ActorId::derive("b"));
        let _ = reg.batch_store_hashes(&[h(2), Fingerprint::zero()], ActorId::derive("b"));
        let _ = reg.transfer_ownership(ActorId::derive("b"), ActorId::derive("b"));
    }

    let reg = open(&dir, admin);
    let log = reg.audit_log().unwrap();
    assert_eq!(log.len(), 2);
    assert!(matches!(log[0].body, EventBody::Genesis { .. }));
    assert!(!reg.contains(&h(2)).unwrap());
    reg.check_invariants().unwrap();
}

#[test]
fn history_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let admin = ActorId::derive("admin");
    {
        let reg = open(&dir, admin);
        reg.batch_store_hashes(&[h(1), h(2)], ActorId::derive("a"))
            .unwrap();
        assert!(reg.verify_hash(h(1), ActorId::derive("v")).unwrap());
        assert!(!reg.verify_hash(h(9), ActorId::derive("v")).unwrap());
    }

    let reg = open(&dir, admin);
    assert_eq!(reg.stats().unwrap().total, 2);
    assert_eq!(
        reg.batch_verify_hashes(&[h(1), h(9), h(2)]).unwrap(),
        vec![true, false, true]
    );

    let verified: Vec<_> = reg
        .events_since(0, usize::MAX)
        .unwrap()
        .into_iter()
        .filter(|e| e.kind() == EventKind::HashVerified)
        .collect();
    assert_eq!(verified.len(), 2);

    // New calls continue the sequence where the journal left off.
    reg.store_hash(h(3), ActorId::derive("a")).unwrap();
    let tail = reg.events_since(5, 100).unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].seq, 6);
}

#[test]
fn stores_after_a_torn_tail_survive_the_next_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let admin = ActorId::derive("admin");
    let a = ActorId::derive("a");
    let path = dir.path().join("registry.journal");
    {
        let reg = open(&dir, admin);
        reg.store_hash(h(1), a).unwrap();
        reg.store_hash(h(2), a).unwrap();
    }
    let len = std::fs::metadata(&path).unwrap().len();
    std::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(len - 3)
        .unwrap();

    {
        let reg = open(&dir, admin);
        assert_eq!(reg.stats().unwrap().total, 1);
        assert!(!reg.contains(&h(2)).unwrap());
        reg.store_hash(h(3), a).unwrap();
        reg.store_hash(h(4), a).unwrap();
        assert_eq!(reg.stats().unwrap().total, 3);
    }

    let reg = open(&dir, admin);
    assert_eq!(reg.stats().unwrap().total, 3);
    assert!(reg.contains(&h(3)).unwrap());
    assert!(reg.contains(&h(4)).unwrap());
    let seqs: Vec<u64> = reg.audit_log().unwrap().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);
    reg.check_invariants().unwrap();
}

#[test]
fn one_process_owns_the_journal() {
    let dir = tempfile::tempdir().unwrap();
    let admin = ActorId::derive("admin");
    let first = open(&dir, admin);

    let err = JournaledRegistry::open(
        &dir.path().join("registry.journal"),
        &JournalConfig::default(),
        None,
    )
    .err()
    .unwrap();
    assert!(matches!(err, JournalError::Locked(_)));
    assert!(err.to_string().contains("held by another process"));

    first.store_hash(h(1), ActorId::derive("a")).unwrap();
    drop(first);
    assert_eq!(open(&dir, admin).stats().unwrap().total, 1);
}

#[test]
fn concurrent_stores_of_one_fingerprint_have_one_winner() {
    let reg = Arc::new(
        JournaledRegistry::in_memory(ActorId::derive("admin"), &JournalConfig::default())
            .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let reg = Arc::clone(&reg);
            thread::spawn(move || reg.store_hash(h(1), ActorId::derive(&format!("w{i}"))).is_ok())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|t| t.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(reg.stats().unwrap().total, 1);
    reg.check_invariants().unwrap();
}

#[test]
fn readers_never_see_half_a_batch() {
    let reg = Arc::new(
        JournaledRegistry::in_memory(ActorId::derive("admin"), &JournalConfig::default())
            .unwrap(),
    );

    let writer = {
        let reg = Arc::clone(&reg);
        thread::spawn(move || {
            for round in 0..20u8 {
                let batch: Vec<_> = (0..5u8).map(|i| h(round * 5 + i + 1)).collect();
                reg.batch_store_hashes(&batch, ActorId::derive("w")).unwrap();
            }
        })
    };

    for _ in 0..200 {
        assert_eq!(reg.stats().unwrap().total % 5, 0);
    }
    writer.join().unwrap();
    assert_eq!(reg.stats().unwrap().total, 100);
}
