//! Fuzz target for ReplayGuard
//!
//! # Invariants
//!
//! - `use_seq` agrees with a `BTreeSet` model on every call
//! - Ranges stay sorted, disjoint, and non-adjacent (reload succeeds)
//! - Arbitrary persisted range lists either load or are rejected, never
//!   panic

#![no_main]

use std::collections::BTreeSet;

use arbitrary::Arbitrary;
use bnotify_receiver::{ReplayGuard, UsedRange};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    seqs: Vec<u64>,
    persisted: Vec<(u64, u64)>,
}

fuzz_target!(|input: Input| {
    let mut guard = ReplayGuard::new();
    let mut model = BTreeSet::new();

    for seq in input.seqs {
        assert_eq!(guard.use_seq(seq), model.insert(seq));
    }

    let ranges = guard.ranges();
    let covered: u128 = ranges.iter().map(|r| u128::from(r.max - r.min) + 1).sum();
    assert_eq!(covered, model.len() as u128);
    assert_eq!(ReplayGuard::from_ranges(&ranges).unwrap(), guard);

    let persisted: Vec<UsedRange> =
        input.persisted.into_iter().map(|(min, max)| UsedRange { min, max }).collect();
    if let Ok(mut loaded) = ReplayGuard::from_ranges(&persisted) {
        assert_eq!(loaded.ranges(), persisted);
        for range in &persisted {
            assert!(!loaded.use_seq(range.min));
            assert!(!loaded.use_seq(range.max));
        }
    }
});
