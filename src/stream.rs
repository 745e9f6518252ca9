// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::align::Aligner;
use crate::device::Device;
use crate::error::DiffError;
use crate::extent::Extent;
use crate::patch::{Operation, Patch};
use crate::reader::DataRead;
use crate::record::RecordWriter;
use crate::util::{u64_from_usize, usize_from_u32};
use crate::writer::PatchWrite;
use alloc::vec;
use core::num::NonZero;

/// Options for [`make_diff`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DiffOptions {
    /// Maximum size of a single data chunk, and of the read buffer.
    pub chunk_size: NonZero<u32>,
}

impl DiffOptions {
    /// Default chunk size, 4 MiB.
    // OK to unwrap: the value is non-zero.
    pub const DEFAULT_CHUNK_SIZE: NonZero<u32> =
        NonZero::new(4 * 1024 * 1024).unwrap();
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Counts of what [`make_diff`] wrote.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DiffSummary {
    /// Number of aligned pairs (and therefore patch records).
    pub pairs: u64,

    /// Number of write patches.
    pub writes: u64,

    /// Number of delete patches.
    pub deletes: u64,

    /// Number of patches that change nothing.
    pub unchanged: u64,

    /// Number of data bytes streamed for write patches.
    pub bytes_written: u64,

    /// Number of records in the stream, not counting the end record.
    pub records: u64,
}

impl DiffSummary {
    fn count(&mut self, patch: &Patch) {
        self.pairs += 1;
        match patch.operation {
            Operation::None => self.unchanged += 1,
            Operation::Write => self.writes += 1,
            Operation::Delete => self.deletes += 1,
        }
    }
}

/// Write the diff stream that turns device `from` into device `to`.
///
/// Both devices must belong to the same pool, with `store` giving
/// access to the pool's data. For each write patch, the new data is
/// read from `store` and streamed in chunks of at most
/// `options.chunk_size` bytes.
///
/// On error the stream is left truncated after the last complete
/// record; there is no way to resume it.
#[tracing::instrument(skip_all, fields(from = from.id, to = to.id))]
pub fn make_diff(
    from: &Device,
    to: &Device,
    store: &mut dyn DataRead,
    out: &mut dyn PatchWrite,
    options: &DiffOptions,
) -> Result<DiffSummary, DiffError> {
    let mut writer = RecordWriter::new(out, options.chunk_size.get())?;
    let mut buf = vec![0; usize_from_u32(options.chunk_size.get())];
    let mut summary = DiffSummary::default();

    for pair in Aligner::new(&from.extents, &to.extents) {
        let pair = pair?;
        let patch = Patch::derive(&pair.from, &pair.to)?;
        tracing::debug!(from = %pair.from, to = %pair.to, %patch, "patch");

        writer.write_patch(&patch)?;
        summary.count(&patch);

        if patch.operation == Operation::Write {
            let streamed =
                stream_data(&pair.to, store, &mut writer, &mut buf)?;
            check_streamed(&patch, streamed)?;
            summary.bytes_written += streamed;
        }
    }

    summary.records = writer.finish()?;
    tracing::info!(
        pairs = summary.pairs,
        writes = summary.writes,
        deletes = summary.deletes,
        unchanged = summary.unchanged,
        bytes = summary.bytes_written,
        "diff complete"
    );
    Ok(summary)
}

/// Copy the physical data of `extent` from `store` into chunk records,
/// using `buf` as the read buffer. Returns the number of bytes
/// streamed.
fn stream_data(
    extent: &Extent,
    store: &mut dyn DataRead,
    writer: &mut RecordWriter<'_>,
    buf: &mut [u8],
) -> Result<u64, DiffError> {
    let mut streamed: u64 = 0;
    while streamed < extent.length {
        let remaining = extent.length - streamed;
        let len = usize::try_from(remaining)
            .map_or(buf.len(), |r| r.min(buf.len()));
        let chunk = &mut buf[..len];

        // Cannot overflow: the extent was validated as part of an
        // `ExtentSeq`.
        let start = extent.data_offset + streamed;
        store
            .read(start, chunk)
            .map_err(|source| DiffError::StoreRead {
                data_offset: start,
                patch_offset: extent.origin_offset,
                len: u64_from_usize(len),
                source,
            })?;
        writer.write_chunk(chunk)?;
        streamed += u64_from_usize(chunk.len());
    }
    Ok(streamed)
}

/// Check that exactly the length of the write `patch` was streamed.
fn check_streamed(patch: &Patch, streamed: u64) -> Result<(), DiffError> {
    if streamed != patch.length {
        return Err(DiffError::ChunkMismatch {
            offset: patch.offset,
            expected: patch.length,
            actual: streamed,
        });
    }
    Ok(())
}
