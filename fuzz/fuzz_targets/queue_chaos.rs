//! Fuzz target for the sender queue under storage failures
//!
//! # Strategy
//!
//! - Variable failure rates (0% to 90%)
//! - Interleaved enqueues (valid and invalid), attempt records, and removals
//!
//! # Invariants
//!
//! - Storage errors propagate as `Err`, never panics
//! - Successful enqueues get gapless, increasing sequence numbers
//! - A failed enqueue leaves no pending entry and does not advance the counter
//! - Attempt counts only grow

#![no_main]

use std::{collections::BTreeMap, sync::Arc};

use arbitrary::Arbitrary;
use bnotify_crypto::SymmetricKey;
use bnotify_proto::NotificationContent;
use bnotify_server::{ChaoticStorage, MemoryStorage, Sequencer, Storage, SystemEnv};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Scenario {
    chaos_seed: u64,
    failure_rate_tenth: u8,
    operations: Vec<Operation>,
}

#[derive(Debug, Arbitrary)]
enum Operation {
    Enqueue { title: String, text: String },
    RecordAttempt { pick: u8 },
    Remove { pick: u8 },
}

fuzz_target!(|scenario: Scenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let storage =
        ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, scenario.chaos_seed);
    let key = Arc::new(SymmetricKey::from_bytes([3; 32]));
    let sequencer = Sequencer::new(storage.clone(), SystemEnv::new(), key);

    let mut next_seq = 1u64;
    let mut model: BTreeMap<u64, u32> = BTreeMap::new();

    for op in scenario.operations {
        match op {
            Operation::Enqueue { title, text } => {
                let valid = !title.is_empty() && !text.is_empty();
                match sequencer.enqueue(NotificationContent { title, text }) {
                    Ok(pending) => {
                        assert!(valid);
                        assert_eq!(pending.seq, next_seq);
                        model.insert(pending.seq, 0);
                        next_seq += 1;
                    },
                    Err(_) => {},
                }
            },
            Operation::RecordAttempt { pick } => {
                let Some(&seq) = model.keys().nth(pick as usize % model.len().max(1)) else {
                    continue;
                };
                if let Ok(attempts) = storage.record_attempt(seq) {
                    let expected = model.get_mut(&seq).unwrap();
                    *expected += 1;
                    assert_eq!(attempts, *expected);
                }
            },
            Operation::Remove { pick } => {
                let Some(&seq) = model.keys().nth(pick as usize % model.len().max(1)) else {
                    continue;
                };
                if let Ok(existed) = storage.remove_pending(seq) {
                    assert!(existed);
                    model.remove(&seq);
                }
            },
        }
    }

    let inner = storage.inner();
    assert_eq!(inner.next_sequence().unwrap(), next_seq);
    assert_eq!(inner.list_pending().unwrap(), model.keys().copied().collect::<Vec<_>>());
});
