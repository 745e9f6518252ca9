// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::test_util::pattern_store;
use anyhow::{Context, Result};
use std::io::BufReader;
use thin_diff::{
    DiffError, DiffOptions, Extent, StdRead, apply_diff, find_device,
    make_diff, parse_thin_dump,
};

/// A pool with an origin volume and a snapshot of it that has since
/// been modified. Block size is 8 sectors.
const METADATA: &str = r#"<superblock uuid="" time="3" transaction="4" data_block_size="8" nr_data_blocks="32">
  <device dev_id="1" mapped_blocks="6" transaction="0" creation_time="0" snap_time="2">
    <range_mapping origin_begin="0" data_begin="0" length="4" time="0"/>
    <range_mapping origin_begin="10" data_begin="4" length="2" time="0"/>
  </device>
  <device dev_id="2" mapped_blocks="7" transaction="2" creation_time="2" snap_time="2">
    <range_mapping origin_begin="0" data_begin="0" length="2" time="0"/>
    <single_mapping origin_block="2" data_block="20" time="2"/>
    <single_mapping origin_block="3" data_block="3" time="0"/>
    <range_mapping origin_begin="11" data_begin="5" length="1" time="0"/>
    <range_mapping origin_begin="12" data_begin="21" length="2" time="2"/>
  </device>
</superblock>
"#;

const BLOCK: u64 = 8 * 512;

#[test]
fn test_diff_from_metadata() -> Result<()> {
    let devices = parse_thin_dump(BufReader::new(METADATA.as_bytes()))
        .context("failed to parse metadata")?;
    let origin = find_device(&devices, 1)?;
    let snap = find_device(&devices, 2)?;
    assert_eq!(
        snap.extents.as_slice()[1],
        Extent::new(2 * BLOCK, 20 * BLOCK, BLOCK)
    );
    assert_eq!(origin.extents.mapped_bytes(), 6 * BLOCK);
    assert_eq!(snap.extents.mapped_bytes(), 7 * BLOCK);
    assert!(matches!(
        find_device(&devices, 3),
        Err(DiffError::DeviceNotFound(3))
    ));

    let mut store = pattern_store(usize::try_from(32 * BLOCK)?);
    let mut stream: Vec<u8> = Vec::new();
    let summary = make_diff(
        origin,
        snap,
        &mut store,
        &mut stream,
        &DiffOptions::default(),
    )
    .context("failed to make diff")?;
    // Block 2 rewritten, block 10 deleted, blocks 12 and 13 added.
    assert_eq!(summary.unchanged, 3);
    assert_eq!(summary.writes, 2);
    assert_eq!(summary.deletes, 1);
    assert_eq!(summary.bytes_written, 3 * BLOCK);

    // Apply through the `std::io::Read` adapter.
    let mut image = vec![0; usize::try_from(12 * BLOCK)?];
    let mut src = StdRead(stream.as_slice());
    let applied =
        apply_diff(&mut src, &mut image).context("failed to apply diff")?;
    assert_eq!(applied.bytes_written, 3 * BLOCK);
    assert_eq!(applied.bytes_discarded, BLOCK);
    assert_eq!(image.len(), usize::try_from(14 * BLOCK)?);
    Ok(())
}
