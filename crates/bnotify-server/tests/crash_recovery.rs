//! Crash recovery tests for the sender queue on `RedbStorage`.
//!
//! Each "crash" drops every handle to the database and reopens it, simulating
//! a daemon restart.

mod common;

use bnotify_server::{
    DeliveryOutcome, DispatcherConfig, NotifyService, RedbStorage, Sequencer, Storage,
};
use common::{RecordingEnv, ScriptedGateway, content, test_key};
use proptest::prelude::*;
use tempfile::tempdir;

#[test]
fn test_sequence_allocation_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.redb");

    let identity = {
        let storage = RedbStorage::open(&db_path).unwrap();
        let sequencer = Sequencer::new(storage, RecordingEnv::with_identity_byte(1), test_key());
        for expected in 1..=3 {
            assert_eq!(sequencer.enqueue(content("T", "X")).unwrap().seq, expected);
        }
        sequencer.ensure_identity().unwrap()
    };

    {
        // A different candidate identity must not replace the stored one
        let storage = RedbStorage::open(&db_path).unwrap();
        let sequencer =
            Sequencer::new(storage.clone(), RecordingEnv::with_identity_byte(2), test_key());
        for expected in 4..=5 {
            assert_eq!(sequencer.enqueue(content("T", "X")).unwrap().seq, expected);
        }
        assert_eq!(storage.server_identity().unwrap(), Some(identity));
        assert_eq!(storage.list_pending().unwrap(), vec![1, 2, 3, 4, 5]);
    }
}

#[tokio::test]
async fn test_unattempted_message_retried_after_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.redb");

    // Queued, then killed before any dispatch
    let seq = {
        let storage = RedbStorage::open(&db_path).unwrap();
        let sequencer = Sequencer::new(storage, RecordingEnv::default(), test_key());
        sequencer.enqueue(content("T", "X")).unwrap().seq
    };

    let storage = RedbStorage::open(&db_path).unwrap();
    assert_eq!(storage.load_pending(seq).unwrap().unwrap().attempts, 0);

    let gateway = ScriptedGateway::default();
    let env = RecordingEnv::default();
    let service = NotifyService::new(
        storage.clone(),
        gateway.clone(),
        env,
        test_key(),
        DispatcherConfig::default(),
    );

    let (_, resumed) = service.recover().unwrap();
    assert_eq!(resumed.len(), 1);
    for handle in resumed {
        assert_eq!(handle.await.unwrap(), DeliveryOutcome::Delivered { attempts: 1 });
    }

    assert_eq!(gateway.pushes().len(), 1);
    assert!(storage.list_pending().unwrap().is_empty());

    // Next allocation continues after the recovered one
    let next = service.send(content("T", "Y")).unwrap();
    assert_eq!(next.seq, seq + 1);
    next.delivery.await.unwrap();
}

#[tokio::test]
async fn test_attempt_count_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.redb");
    let config = DispatcherConfig::default();

    // Four attempts recorded before the crash
    let seq = {
        let storage = RedbStorage::open(&db_path).unwrap();
        let sequencer = Sequencer::new(storage.clone(), RecordingEnv::default(), test_key());
        let seq = sequencer.enqueue(content("T", "X")).unwrap().seq;
        for _ in 0..4 {
            storage.record_attempt(seq).unwrap();
        }
        seq
    };

    let storage = RedbStorage::open(&db_path).unwrap();
    let env = RecordingEnv::default();
    let service = NotifyService::new(
        storage.clone(),
        ScriptedGateway::failing(1),
        env.clone(),
        test_key(),
        config.clone(),
    );

    let (_, resumed) = service.recover().unwrap();
    for handle in resumed {
        assert_eq!(handle.await.unwrap(), DeliveryOutcome::Delivered { attempts: 6 });
    }

    assert_eq!(env.sleeps(), config.schedule[4..6].to_vec());
    assert_eq!(storage.load_pending(seq).unwrap(), None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_allocation_gapless_across_restarts(
        restarts in prop::collection::vec(any::<bool>(), 1..25),
    ) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        let mut storage = RedbStorage::open(&db_path).unwrap();
        let mut allocated = Vec::new();

        for restart in &restarts {
            if *restart {
                drop(storage);
                storage = RedbStorage::open(&db_path).unwrap();
            }
            let sequencer = Sequencer::new(storage.clone(), RecordingEnv::default(), test_key());
            allocated.push(sequencer.enqueue(content("T", "X")).unwrap().seq);
        }

        let expected: Vec<u64> = (1..=restarts.len() as u64).collect();
        prop_assert_eq!(allocated, expected);
    }
}
