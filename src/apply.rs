// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::DiffError;
use crate::patch::Operation;
use crate::reader::StreamRead;
use crate::record::{Record, RecordReader};
use crate::util::u64_from_usize;
use crate::writer::ImageWrite;

/// Counts of what [`apply_diff`] changed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ApplySummary {
    /// Number of write patches applied.
    pub writes: u64,

    /// Number of delete patches applied.
    pub deletes: u64,

    /// Number of patches that change nothing.
    pub unchanged: u64,

    /// Number of data bytes written.
    pub bytes_written: u64,

    /// Number of bytes discarded by delete patches.
    pub bytes_discarded: u64,
}

/// Apply the diff stream in `src` to `image`.
///
/// `image` holds the logical contents of the device the stream was
/// generated from. After a successful return it holds the contents of
/// the target device, with deleted regions discarded.
///
/// Data is written as it arrives. If the stream turns out to be
/// corrupt, `image` has already been partially modified.
#[tracing::instrument(skip_all)]
pub fn apply_diff(
    src: &mut dyn StreamRead,
    image: &mut dyn ImageWrite,
) -> Result<ApplySummary, DiffError> {
    let reader = RecordReader::new(src)?;
    let mut summary = ApplySummary::default();
    // Logical offset at which the next chunk is written.
    let mut write_pos: u64 = 0;

    for record in reader {
        match record? {
            Record::Patch(patch) => {
                tracing::debug!(%patch, "applying");
                match patch.operation {
                    Operation::None => summary.unchanged += 1,
                    Operation::Write => {
                        summary.writes += 1;
                        write_pos = patch.offset;
                    }
                    Operation::Delete => {
                        summary.deletes += 1;
                        image
                            .discard(patch.offset, patch.length)
                            .map_err(DiffError::Io)?;
                        summary.bytes_discarded += patch.length;
                    }
                }
            }
            Record::Chunk(data) => {
                image.write_at(write_pos, &data).map_err(DiffError::Io)?;
                let len = u64_from_usize(data.len());
                // Cannot overflow: the reader checks that chunks stay
                // within the patch length.
                write_pos += len;
                summary.bytes_written += len;
            }
            Record::End { .. } => {}
        }
    }

    tracing::info!(
        writes = summary.writes,
        deletes = summary.deletes,
        unchanged = summary.unchanged,
        bytes_written = summary.bytes_written,
        bytes_discarded = summary.bytes_discarded,
        "diff applied"
    );
    Ok(summary)
}
