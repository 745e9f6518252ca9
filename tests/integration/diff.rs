// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::test_util::{device, pattern_store};
use crate::{STORE_SIZE, arb_seq};
use proptest::prelude::*;
use std::num::NonZero;
use thin_diff::{
    Aligner, Device, DiffOptions, Extent, Operation, Patch, Record,
    RecordReader, make_diff,
};

fn patch(operation: Operation, offset: u64, length: u64) -> Patch {
    Patch {
        operation,
        offset,
        length,
    }
}

/// Generate a diff and decode it again.
fn diff_records(from: &Device, to: &Device, chunk_size: u32) -> Vec<Record> {
    let mut store = pattern_store(STORE_SIZE);
    let options = DiffOptions {
        chunk_size: NonZero::new(chunk_size).unwrap(),
    };
    let mut stream: Vec<u8> = Vec::new();
    make_diff(from, to, &mut store, &mut stream, &options).unwrap();

    let mut src: &[u8] = &stream;
    RecordReader::new(&mut src)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

#[test]
fn test_diff_rewritten() {
    let store = pattern_store(STORE_SIZE);
    let from = device(1, &[(100, 200, 300), (400, 500, 600)]);
    let to = device(2, &[(100, 250, 300), (400, 550, 600)]);

    let pairs: Vec<_> = Aligner::new(&from.extents, &to.extents)
        .map(|pair| pair.unwrap())
        .collect();
    assert_eq!(pairs.len(), 2);

    let records = diff_records(&from, &to, 1024);
    assert_eq!(
        records,
        [
            Record::Patch(patch(Operation::Write, 100, 300)),
            Record::Chunk(store[250..550].to_vec()),
            Record::Patch(patch(Operation::Write, 400, 600)),
            Record::Chunk(store[550..1150].to_vec()),
            Record::End { records: 4 },
        ]
    );
}

#[test]
fn test_diff_gap() {
    let store = pattern_store(STORE_SIZE);
    let from = device(1, &[(100, 200, 300)]);
    let to = device(2, &[(800, 550, 600)]);

    let pairs: Vec<_> = Aligner::new(&from.extents, &to.extents)
        .map(|pair| pair.unwrap())
        .map(|pair| (pair.from, pair.to))
        .collect();
    assert_eq!(
        pairs,
        [
            (Extent::new(100, 200, 300), Extent::EMPTY),
            (Extent::EMPTY, Extent::new(800, 550, 600)),
        ]
    );

    let records = diff_records(&from, &to, 256);
    assert_eq!(
        records,
        [
            Record::Patch(patch(Operation::Delete, 100, 300)),
            Record::Patch(patch(Operation::Write, 800, 600)),
            Record::Chunk(store[550..806].to_vec()),
            Record::Chunk(store[806..1062].to_vec()),
            Record::Chunk(store[1062..1150].to_vec()),
            Record::End { records: 5 },
        ]
    );
}

#[test]
fn test_diff_empty_devices() {
    let from = device(1, &[]);
    let to = device(2, &[(0, 0, 0), (10, 0, 0)]);
    assert_eq!(diff_records(&from, &to, 16), [Record::End { records: 0 }]);
}

proptest! {
    /// A device diffed against itself only yields patches that change
    /// nothing.
    #[test]
    fn diff_with_self_is_empty(extents in arb_seq()) {
        let dev = Device { id: 1, extents };
        for record in diff_records(&dev, &dev, 64) {
            match record {
                Record::Patch(patch) => prop_assert_eq!(patch, Patch::NONE),
                Record::Chunk(_) => prop_assert!(false, "unexpected chunk"),
                Record::End { .. } => {}
            }
        }
    }

    /// Every write is followed by exactly its length in data, in chunks
    /// no larger than the chunk size.
    #[test]
    fn diff_chunks_match_writes(
        from in arb_seq(),
        to in arb_seq(),
        chunk_size in 1..100u32,
    ) {
        let from = Device { id: 1, extents: from };
        let to = Device { id: 2, extents: to };
        let mut remaining = 0;
        for record in diff_records(&from, &to, chunk_size) {
            match record {
                Record::Patch(patch) => {
                    prop_assert_eq!(remaining, 0);
                    if patch.operation == Operation::Write {
                        remaining = patch.length;
                    }
                }
                Record::Chunk(data) => {
                    prop_assert!(!data.is_empty());
                    prop_assert!(data.len() <= chunk_size as usize);
                    remaining -= data.len() as u64;
                }
                Record::End { .. } => prop_assert_eq!(remaining, 0),
            }
        }
    }
}
