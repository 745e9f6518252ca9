// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod align;
mod apply;
mod diff;
#[cfg(feature = "std")]
mod metadata;

use proptest::prelude::*;
use thin_diff::{DataRead, Device, Extent, ExtentSeq};

#[allow(dead_code)]
mod test_util {
    include!("../../src/test_util.rs");
}

/// Size of the data store used with `arb_seq`.
const STORE_SIZE: usize = 8192;

/// Strategy for a valid `ExtentSeq`, including zero-length extents and
/// unmapped gaps. All data lies within the first `STORE_SIZE` bytes.
fn arb_seq() -> impl Strategy<Value = ExtentSeq> {
    prop::collection::vec((0..64u64, 0..64u64, 0..4000u64), 0..12).prop_map(
        |parts| {
            let mut origin = 0;
            let mut extents = Vec::new();
            for (gap, length, data) in parts {
                origin += gap;
                extents.push(Extent::new(origin, data, length));
                origin += length;
            }
            ExtentSeq::new(extents).unwrap()
        },
    )
}

/// Merge extents that continue each other both logically and
/// physically, dropping empty extents. Two sequences describing the
/// same mapping have the same canonical form.
fn canonical(extents: impl IntoIterator<Item = Extent>) -> Vec<Extent> {
    let mut out: Vec<Extent> = Vec::new();
    for e in extents.into_iter().filter(|e| !e.is_empty()) {
        if let Some(prev) = out.last_mut() {
            if prev.origin_offset + prev.length == e.origin_offset
                && prev.data_offset + prev.length == e.data_offset
            {
                prev.length += e.length;
                continue;
            }
        }
        out.push(e);
    }
    out
}
