// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// In addition to being used as a regular module in lib.rs, this module
// is used in `tests` via the `include!` macro.

use super::{DataRead, Device, Extent, ExtentSeq};

/// Create an `ExtentSeq` from `(origin_offset, data_offset, length)`
/// tuples.
pub(crate) fn seq(extents: &[(u64, u64, u64)]) -> ExtentSeq {
    ExtentSeq::new(
        extents
            .iter()
            .map(|(origin, data, length)| Extent::new(*origin, *data, *length))
            .collect(),
    )
    .unwrap()
}

pub(crate) fn device(id: u32, extents: &[(u64, u64, u64)]) -> Device {
    Device {
        id,
        extents: seq(extents),
    }
}

/// Create a data store of `len` bytes in which nearby offsets hold
/// different values.
pub(crate) fn pattern_store(len: usize) -> Vec<u8> {
    (0..len).map(|i| u8::try_from(i % 251).unwrap()).collect()
}

/// Get the logical contents of a device: each extent's data is read
/// from `store` and placed at its origin offset. Unmapped regions read
/// as zero. The result ends at the end of the last extent.
pub(crate) fn materialize(seq: &ExtentSeq, store: &mut dyn DataRead) -> Vec<u8> {
    let size = seq
        .as_slice()
        .iter()
        .map(|e| e.origin_offset + e.length)
        .max()
        .unwrap_or(0);
    let mut image = vec![0; usize::try_from(size).unwrap()];
    for e in seq.as_slice() {
        let start = usize::try_from(e.origin_offset).unwrap();
        let end = start + usize::try_from(e.length).unwrap();
        store.read(e.data_offset, &mut image[start..end]).unwrap();
    }
    image
}
