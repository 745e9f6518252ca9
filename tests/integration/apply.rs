// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::test_util::{materialize, pattern_store};
use crate::{STORE_SIZE, arb_seq};
use anyhow::{Result, bail};
use proptest::prelude::*;
use std::num::NonZero;
use thin_diff::{
    CorruptStream, Device, DiffOptions, ExtentSeq, apply_diff, make_diff,
};

fn make_stream(from: &ExtentSeq, to: &ExtentSeq, chunk_size: u32) -> Vec<u8> {
    let from = Device {
        id: 1,
        extents: from.clone(),
    };
    let to = Device {
        id: 2,
        extents: to.clone(),
    };
    let options = DiffOptions {
        chunk_size: NonZero::new(chunk_size).unwrap(),
    };
    let mut store = pattern_store(STORE_SIZE);
    let mut stream: Vec<u8> = Vec::new();
    make_diff(&from, &to, &mut store, &mut stream, &options).unwrap();
    stream
}

/// Apply `stream` to the image of `from` and check that the result is
/// the image of `to`.
fn check_apply(
    from: &ExtentSeq,
    to: &ExtentSeq,
    stream: &[u8],
) -> Result<(), TestCaseError> {
    let mut store = pattern_store(STORE_SIZE);
    let mut image = materialize(from, &mut store);
    let mut expected = materialize(to, &mut store);

    let mut src = stream;
    apply_diff(&mut src, &mut image).unwrap();

    // The images may differ in length by a trailing unmapped region.
    let len = image.len().max(expected.len());
    image.resize(len, 0);
    expected.resize(len, 0);
    prop_assert_eq!(image, expected);
    Ok(())
}

#[test]
fn test_apply_rejects_tampering() -> Result<()> {
    let from = crate::test_util::seq(&[(0, 0, 64)]);
    let to = crate::test_util::seq(&[(0, 100, 64)]);
    let stream = make_stream(&from, &to, 16);

    // Truncated anywhere.
    for len in 0..stream.len() {
        let mut image = vec![0; 64];
        let mut src = &stream[..len];
        if apply_diff(&mut src, &mut image).is_ok() {
            bail!("stream truncated to {len} bytes was accepted");
        }
    }

    // Any data byte changed.
    let mut tampered = stream.clone();
    tampered[16 + 18 + 5] ^= 0xff;
    let mut image = vec![0; 64];
    let Err(err) = apply_diff(&mut tampered.as_slice(), &mut image) else {
        bail!("tampered stream was accepted");
    };
    assert!(matches!(
        err.as_corrupt_stream(),
        Some(CorruptStream::Checksum { .. })
    ));
    Ok(())
}

proptest! {
    /// Applying a diff to the old image gives the new image.
    #[test]
    fn apply_reproduces_target(
        from in arb_seq(),
        to in arb_seq(),
        chunk_size in 1..200u32,
    ) {
        let stream = make_stream(&from, &to, chunk_size);
        check_apply(&from, &to, &stream)?;
    }
}
