// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Diff stream encoding.
//!
//! A stream is a header followed by records. All integers are
//! little-endian.
//!
//! ```text
//! header := "THINDIFF" version:u32 max_chunk:u32
//! record := 0x01 operation:u8 offset:u64 length:u64   (patch)
//!         | 0x02 len:u32 data[len]                    (chunk)
//!         | 0x03 records:u64 checksum:u32             (end)
//! ```
//!
//! Chunk records only follow a write patch, and their lengths add up to
//! the patch length. The end record holds the number of patch and
//! chunk records, and the CRC32C of every byte before the end tag.

use crate::checksum::Checksum;
use crate::error::{CorruptStream, DiffError};
use crate::patch::{Operation, Patch};
use crate::reader::StreamRead;
use crate::util::{read_u32le, read_u64le, usize_from_u32};
use crate::writer::PatchWrite;
use alloc::vec::Vec;

const MAGIC: [u8; 8] = *b"THINDIFF";

/// Current stream format version.
pub const FORMAT_VERSION: u32 = 1;

const HEADER_SIZE: usize = 16;

const TAG_PATCH: u8 = 0x01;
const TAG_CHUNK: u8 = 0x02;
const TAG_END: u8 = 0x03;

/// Size of a patch record's body (operation, offset, length).
const PATCH_BODY_SIZE: usize = 17;

/// Size of an end record's body (record count, checksum).
const END_BODY_SIZE: usize = 12;

/// Maximum number of chunk bytes read at once.
const READ_STEP: usize = 64 * 1024;

/// One decoded record of a diff stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Record {
    /// A patch. If it is a write, its data follows in chunk records.
    Patch(Patch),

    /// Data for the preceding write patch.
    Chunk(Vec<u8>),

    /// End of the stream.
    End {
        /// Number of patch and chunk records in the stream.
        records: u64,
    },
}

/// Encoder for a diff stream.
///
/// The header is written on creation. Callers must call
/// [`RecordWriter::finish`] to write the end record.
pub(crate) struct RecordWriter<'a> {
    out: &'a mut dyn PatchWrite,
    checksum: Checksum,
    records: u64,
    max_chunk: u32,
}

impl<'a> RecordWriter<'a> {
    pub(crate) fn new(
        out: &'a mut dyn PatchWrite,
        max_chunk: u32,
    ) -> Result<Self, DiffError> {
        let mut header = [0; HEADER_SIZE];
        header[..8].copy_from_slice(&MAGIC);
        header[8..12].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        header[12..16].copy_from_slice(&max_chunk.to_le_bytes());

        let mut writer = Self {
            out,
            checksum: Checksum::new(),
            records: 0,
            max_chunk,
        };
        writer.emit(&header)?;
        Ok(writer)
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<(), DiffError> {
        self.checksum.update(bytes);
        self.out.emit(bytes).map_err(DiffError::Io)
    }

    pub(crate) fn write_patch(&mut self, patch: &Patch) -> Result<(), DiffError> {
        let mut record = [0; 1 + PATCH_BODY_SIZE];
        record[0] = TAG_PATCH;
        record[1] = patch.operation.to_u8();
        record[2..10].copy_from_slice(&patch.offset.to_le_bytes());
        record[10..18].copy_from_slice(&patch.length.to_le_bytes());
        self.emit(&record)?;
        self.records += 1;
        Ok(())
    }

    /// Write one chunk of data. `data` must not be larger than the
    /// maximum chunk size given in [`RecordWriter::new`].
    pub(crate) fn write_chunk(&mut self, data: &[u8]) -> Result<(), DiffError> {
        let len = u32::try_from(data.len())
            .ok()
            .filter(|len| *len <= self.max_chunk)
            .ok_or(CorruptStream::ChunkTooLarge {
                len: u32::try_from(data.len()).unwrap_or(u32::MAX),
                max: self.max_chunk,
            })?;

        let mut prefix = [0; 5];
        prefix[0] = TAG_CHUNK;
        prefix[1..].copy_from_slice(&len.to_le_bytes());
        self.emit(&prefix)?;
        self.emit(data)?;
        self.records += 1;
        Ok(())
    }

    /// Write the end record. Returns the number of records written,
    /// not including the end record.
    pub(crate) fn finish(mut self) -> Result<u64, DiffError> {
        let checksum = self.checksum.value();
        let mut record = [0; 1 + END_BODY_SIZE];
        record[0] = TAG_END;
        record[1..9].copy_from_slice(&self.records.to_le_bytes());
        record[9..13].copy_from_slice(&checksum.to_le_bytes());
        self.out.emit(&record).map_err(DiffError::Io)?;
        Ok(self.records)
    }
}

/// Write currently in progress in a [`RecordReader`].
#[derive(Clone, Copy, Debug)]
struct PendingWrite {
    offset: u64,
    remaining: u64,
}

/// Decoder for a diff stream.
///
/// Yields each [`Record`] in order, ending with [`Record::End`]. The
/// framing of the stream is validated as it is read: chunks only
/// appear inside a write, each write receives exactly its length in
/// data, and the end record's count and checksum match. Any problem
/// is reported as [`DiffError::CorruptStream`] and ends iteration.
pub struct RecordReader<'a> {
    src: &'a mut dyn StreamRead,
    checksum: Checksum,
    records: u64,
    max_chunk: u32,
    pending: Option<PendingWrite>,
    is_done: bool,
}

impl<'a> RecordReader<'a> {
    /// Create a `RecordReader`, reading and checking the stream header.
    pub fn new(src: &'a mut dyn StreamRead) -> Result<Self, DiffError> {
        let mut reader = Self {
            src,
            checksum: Checksum::new(),
            records: 0,
            max_chunk: 0,
            pending: None,
            is_done: false,
        };

        let mut header = [0; HEADER_SIZE];
        reader.read(&mut header)?;
        if header[..8] != MAGIC {
            return Err(CorruptStream::Magic.into());
        }
        let version = read_u32le(&header, 8);
        if version != FORMAT_VERSION {
            return Err(CorruptStream::UnsupportedVersion(version).into());
        }
        reader.max_chunk = read_u32le(&header, 12);
        if reader.max_chunk == 0 {
            return Err(CorruptStream::ZeroChunkSize.into());
        }
        Ok(reader)
    }

    /// Maximum chunk size declared in the header.
    #[must_use]
    pub fn max_chunk(&self) -> u32 {
        self.max_chunk
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<(), DiffError> {
        self.src.read_next(dst).map_err(DiffError::Io)?;
        self.checksum.update(dst);
        Ok(())
    }

    fn check_no_pending(&self) -> Result<(), CorruptStream> {
        match self.pending {
            Some(PendingWrite { offset, remaining }) => {
                Err(CorruptStream::MissingChunks { offset, remaining })
            }
            None => Ok(()),
        }
    }

    fn read_patch(&mut self) -> Result<Patch, DiffError> {
        self.check_no_pending()?;

        let mut body = [0; PATCH_BODY_SIZE];
        self.read(&mut body)?;
        let patch = Patch {
            operation: Operation::try_from(body[0])?,
            offset: read_u64le(&body, 1),
            length: read_u64le(&body, 9),
        };
        if patch.operation == Operation::Write && patch.length > 0 {
            self.pending = Some(PendingWrite {
                offset: patch.offset,
                remaining: patch.length,
            });
        }
        self.records += 1;
        Ok(patch)
    }

    fn read_chunk(&mut self) -> Result<Vec<u8>, DiffError> {
        let mut len = [0; 4];
        self.read(&mut len)?;
        let len = u32::from_le_bytes(len);

        if len > self.max_chunk {
            return Err(CorruptStream::ChunkTooLarge {
                len,
                max: self.max_chunk,
            }
            .into());
        }
        let unexpected = CorruptStream::UnexpectedChunk {
            offset: self.pending.map(|p| p.offset),
            len,
        };
        let Some(pending) = &mut self.pending else {
            return Err(unexpected.into());
        };
        if u64::from(len) > pending.remaining {
            return Err(unexpected.into());
        }
        pending.remaining -= u64::from(len);
        if pending.remaining == 0 {
            self.pending = None;
        }

        // Grow the buffer as data arrives. The length is untrusted
        // until the data is actually present.
        let len = usize_from_u32(len);
        let mut data = Vec::with_capacity(len.min(READ_STEP));
        while data.len() < len {
            let start = data.len();
            data.resize(start + (len - start).min(READ_STEP), 0);
            self.read(&mut data[start..])?;
        }
        self.records += 1;
        Ok(data)
    }

    fn read_end(&mut self) -> Result<u64, DiffError> {
        self.check_no_pending()?;

        // The checksum covers everything before the end tag, which has
        // already been fed to `self.checksum`. Read the body directly.
        let actual_checksum = self.checksum.value();
        let mut body = [0; END_BODY_SIZE];
        self.src.read_next(&mut body).map_err(DiffError::Io)?;

        let records = read_u64le(&body, 0);
        if records != self.records {
            return Err(CorruptStream::RecordCount {
                expected: records,
                actual: self.records,
            }
            .into());
        }
        let checksum = read_u32le(&body, 8);
        if checksum != actual_checksum {
            return Err(CorruptStream::Checksum {
                expected: checksum,
                actual: actual_checksum,
            }
            .into());
        }
        Ok(records)
    }

    fn next_impl(&mut self) -> Result<Option<Record>, DiffError> {
        let mut tag = [0];
        // The end tag is excluded from the checksum.
        self.src.read_next(&mut tag).map_err(DiffError::Io)?;
        let record = match tag[0] {
            TAG_PATCH => {
                self.checksum.update(&tag);
                Record::Patch(self.read_patch()?)
            }
            TAG_CHUNK => {
                self.checksum.update(&tag);
                Record::Chunk(self.read_chunk()?)
            }
            TAG_END => {
                let records = self.read_end()?;
                self.is_done = true;
                Record::End { records }
            }
            other => return Err(CorruptStream::UnknownRecord(other).into()),
        };
        Ok(Some(record))
    }
}

impl_result_iter!(RecordReader<'_>, Record);
