// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::test_util::seq;
use crate::{arb_seq, canonical};
use proptest::prelude::*;
use thin_diff::{AlignedPair, Aligner, Extent, ExtentSeq};

fn align(from: &ExtentSeq, to: &ExtentSeq) -> Vec<AlignedPair> {
    Aligner::new(from, to).map(|pair| pair.unwrap()).collect()
}

/// Logical region covered by a pair.
fn region(pair: &AlignedPair) -> (u64, u64) {
    let e = if pair.from.is_empty() {
        pair.to
    } else {
        pair.from
    };
    (e.origin_offset, e.origin_offset + e.length)
}

#[test]
fn test_align_example() {
    let from = seq(&[(0, 100, 10), (20, 200, 10)]);
    let to = seq(&[(5, 300, 20)]);
    assert_eq!(
        align(&from, &to),
        [
            AlignedPair {
                from: Extent::new(0, 100, 5),
                to: Extent::EMPTY,
            },
            AlignedPair {
                from: Extent::new(5, 105, 5),
                to: Extent::new(5, 300, 5),
            },
            AlignedPair {
                from: Extent::EMPTY,
                to: Extent::new(10, 305, 10),
            },
            AlignedPair {
                from: Extent::new(20, 200, 5),
                to: Extent::new(20, 315, 5),
            },
            AlignedPair {
                from: Extent::new(25, 205, 5),
                to: Extent::EMPTY,
            },
        ]
    );
}

/// The aligner copies its input, so the sequences can be dropped or
/// reused while it runs.
#[test]
fn test_align_owns_input() {
    let from = seq(&[(0, 0, 8)]);
    let to = seq(&[(0, 8, 8)]);
    let mut aligner = Aligner::new(&from, &to);
    drop(from);
    drop(to);
    let pair = aligner.next().unwrap().unwrap();
    assert_eq!(pair.from, Extent::new(0, 0, 8));
    assert_eq!(pair.to, Extent::new(0, 8, 8));
    assert!(aligner.next().is_none());
    assert!(aligner.next().is_none());
}

proptest! {
    /// The non-empty sides of the pairs reassemble into the original
    /// mappings.
    #[test]
    fn aligned_pairs_cover_both_mappings(from in arb_seq(), to in arb_seq()) {
        let pairs = align(&from, &to);
        prop_assert_eq!(
            canonical(pairs.iter().map(|p| p.from)),
            canonical(from.as_slice().iter().copied())
        );
        prop_assert_eq!(
            canonical(pairs.iter().map(|p| p.to)),
            canonical(to.as_slice().iter().copied())
        );
    }

    /// Both sides of a pair cover the same region, and pairs are
    /// ordered without overlapping.
    #[test]
    fn aligned_pairs_are_colocated(from in arb_seq(), to in arb_seq()) {
        let mut prev_end = 0;
        for pair in align(&from, &to) {
            prop_assert!(!(pair.from.is_empty() && pair.to.is_empty()));
            if !pair.from.is_empty() && !pair.to.is_empty() {
                prop_assert_eq!(pair.from.origin_offset, pair.to.origin_offset);
                prop_assert_eq!(pair.from.length, pair.to.length);
            }
            let (start, end) = region(&pair);
            prop_assert!(start >= prev_end);
            prev_end = end;
        }
    }

    /// Aligning a mapping with itself gives pairs of identical extents.
    #[test]
    fn aligned_with_self(extents in arb_seq()) {
        for pair in align(&extents, &extents) {
            prop_assert_eq!(pair.from, pair.to);
        }
    }
}
