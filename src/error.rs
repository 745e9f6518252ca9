// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::extent::Extent;
use alloc::boxed::Box;
use alloc::string::String;
use core::any::Any;
use core::fmt::{self, Debug, Display, Formatter};

/// Underlying error type for [`DiffError::Io`].
pub trait IoError: Any + Debug + Display + Send + Sync {}

/// Boxed [`IoError`], as returned by the I/O traits.
pub type BoxedError = Box<dyn IoError>;

/// Common error type for all diff operations.
#[derive(Debug)]
#[non_exhaustive]
pub enum DiffError {
    /// Input extents or metadata do not satisfy the required
    /// invariants.
    MalformedInput(MalformedInput),

    /// A requested device is not present in the metadata.
    DeviceNotFound(
        /// Device id.
        u32,
    ),

    /// The diff engine reached a state that correct code cannot
    /// reach. This is a bug in this library, not a problem with the
    /// input data.
    InternalInvariantViolation(InvariantViolation),

    /// An IO operation failed. This error comes from the
    /// [`PatchWrite`], [`StreamRead`] or [`ImageWrite`] in use. Data
    /// store reads are reported as [`DiffError::StoreRead`].
    ///
    /// [`ImageWrite`]: crate::ImageWrite
    /// [`PatchWrite`]: crate::PatchWrite
    /// [`StreamRead`]: crate::StreamRead
    Io(
        /// Underlying error.
        BoxedError,
    ),

    /// Reading new data for a write patch from the data store failed.
    StoreRead {
        /// Offset in the data store of the failed read.
        data_offset: u64,
        /// Logical offset of the write patch.
        patch_offset: u64,
        /// Number of bytes requested.
        len: u64,
        /// Underlying error.
        source: BoxedError,
    },

    /// The data streamed for a write patch does not match the patch
    /// length.
    ChunkMismatch {
        /// Logical offset of the patch.
        offset: u64,
        /// Patch length.
        expected: u64,
        /// Number of bytes actually streamed.
        actual: u64,
    },

    /// A diff stream could not be decoded.
    CorruptStream(CorruptStream),
}

impl DiffError {
    /// If the error type is [`DiffError::MalformedInput`], get the
    /// underlying error.
    pub fn as_malformed_input(&self) -> Option<&MalformedInput> {
        if let Self::MalformedInput(err) = self {
            Some(err)
        } else {
            None
        }
    }

    /// If the error type is [`DiffError::InternalInvariantViolation`],
    /// get the underlying error.
    pub fn as_invariant_violation(&self) -> Option<&InvariantViolation> {
        if let Self::InternalInvariantViolation(err) = self {
            Some(err)
        } else {
            None
        }
    }

    /// If the error type is [`DiffError::CorruptStream`], get the
    /// underlying error.
    pub fn as_corrupt_stream(&self) -> Option<&CorruptStream> {
        if let Self::CorruptStream(err) = self {
            Some(err)
        } else {
            None
        }
    }

    /// If the error type is [`DiffError::Io`], get the underlying error.
    pub fn as_io(&self) -> Option<&dyn IoError> {
        if let Self::Io(err) = self {
            Some(&**err)
        } else {
            None
        }
    }
}

impl Display for DiffError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedInput(m) => write!(f, "malformed input: {m}"),
            Self::DeviceNotFound(id) => write!(f, "device {id} not found"),
            Self::InternalInvariantViolation(v) => {
                write!(f, "internal invariant violated: {v}")
            }
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::StoreRead {
                data_offset,
                patch_offset,
                len,
                source,
            } => write!(
                f,
                "failed to read {len} bytes at data offset {data_offset} for write at offset {patch_offset}: {source}"
            ),
            Self::ChunkMismatch {
                offset,
                expected,
                actual,
            } => write!(
                f,
                "write at offset {offset} expected {expected} bytes of data, got {actual}"
            ),
            Self::CorruptStream(c) => write!(f, "corrupt diff stream: {c}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DiffError {}

impl From<MalformedInput> for DiffError {
    fn from(m: MalformedInput) -> Self {
        Self::MalformedInput(m)
    }
}

impl From<InvariantViolation> for DiffError {
    fn from(v: InvariantViolation) -> Self {
        Self::InternalInvariantViolation(v)
    }
}

impl From<CorruptStream> for DiffError {
    fn from(c: CorruptStream) -> Self {
        Self::CorruptStream(c)
    }
}

impl PartialEq<MalformedInput> for DiffError {
    fn eq(&self, m: &MalformedInput) -> bool {
        self.as_malformed_input() == Some(m)
    }
}

impl PartialEq<CorruptStream> for DiffError {
    fn eq(&self, c: &CorruptStream) -> bool {
        self.as_corrupt_stream() == Some(c)
    }
}

/// Error type used in [`DiffError::MalformedInput`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum MalformedInput {
    /// An extent starts before the end of the previous extent.
    Unsorted {
        /// Index of the offending extent.
        index: usize,
    },

    /// An extent's end offset does not fit in a [`u64`].
    Overflow {
        /// Index of the offending extent.
        index: usize,
    },

    /// The metadata is not well-formed XML.
    Xml(String),

    /// A required metadata attribute is missing.
    MissingAttribute {
        /// Element name.
        element: &'static str,
        /// Attribute name.
        attribute: &'static str,
    },

    /// A metadata attribute is not a valid number.
    InvalidAttribute {
        /// Element name.
        element: &'static str,
        /// Attribute name.
        attribute: &'static str,
        /// Raw attribute value.
        value: String,
    },

    /// A mapping element appears outside of a `device` element, or
    /// before the `superblock`.
    MappingOutsideDevice,

    /// The same device id appears more than once.
    DuplicateDevice(
        /// Device id.
        u32,
    ),

    /// Converting a block count to bytes overflowed.
    BlockOverflow,

    /// The metadata ended before the closing `superblock` tag.
    UnexpectedEnd,
}

impl Display for MalformedInput {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsorted { index } => write!(
                f,
                "extent {index} overlaps or precedes the previous extent"
            ),
            Self::Overflow { index } => {
                write!(f, "extent {index} extends past the end of the address space")
            }
            Self::Xml(err) => write!(f, "invalid xml: {err}"),
            Self::MissingAttribute { element, attribute } => {
                write!(f, "<{element}> is missing attribute {attribute:?}")
            }
            Self::InvalidAttribute {
                element,
                attribute,
                value,
            } => write!(
                f,
                "<{element}> attribute {attribute:?} has invalid value {value:?}"
            ),
            Self::MappingOutsideDevice => {
                write!(f, "mapping found outside of a device")
            }
            Self::DuplicateDevice(id) => write!(f, "device {id} is defined twice"),
            Self::BlockOverflow => write!(f, "block offset overflows a byte offset"),
            Self::UnexpectedEnd => write!(f, "missing closing superblock tag"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MalformedInput {}

/// Error type used in [`DiffError::InternalInvariantViolation`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum InvariantViolation {
    /// Both extents of an aligned pair are present, but they do not
    /// cover the same logical region.
    MismatchedPair {
        /// Extent from the old mapping.
        from: Extent,
        /// Extent from the new mapping.
        to: Extent,
    },

    /// A head extent was split at a length that does not leave a
    /// non-empty extent on both sides.
    SplitOutOfRange {
        /// Extent being split.
        extent: Extent,
        /// Requested split length.
        at_length: u64,
    },
}

impl Display for InvariantViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MismatchedPair { from, to } => {
                write!(f, "aligned pair {from} / {to} is not co-located")
            }
            Self::SplitOutOfRange { extent, at_length } => {
                write!(f, "cannot split {extent} at length {at_length}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvariantViolation {}

/// Error type used in [`DiffError::CorruptStream`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum CorruptStream {
    /// The stream does not start with the expected magic bytes.
    Magic,

    /// The stream was written by an incompatible format version.
    UnsupportedVersion(
        /// Version found in the header.
        u32,
    ),

    /// The header declares a maximum chunk size of zero.
    ZeroChunkSize,

    /// Unknown record tag.
    UnknownRecord(
        /// Tag byte.
        u8,
    ),

    /// Unknown patch operation.
    UnknownOperation(
        /// Operation byte.
        u8,
    ),

    /// A data chunk appears without a preceding write patch, or
    /// extends past the end of the write.
    UnexpectedChunk {
        /// Logical offset of the current write, if any.
        offset: Option<u64>,
        /// Chunk length.
        len: u32,
    },

    /// A chunk is larger than the maximum declared in the header.
    ChunkTooLarge {
        /// Chunk length.
        len: u32,
        /// Maximum declared in the header.
        max: u32,
    },

    /// A new record started before all data of a write was received.
    MissingChunks {
        /// Logical offset of the write.
        offset: u64,
        /// Number of bytes still expected.
        remaining: u64,
    },

    /// The record count in the end record does not match.
    RecordCount {
        /// Count stored in the stream.
        expected: u64,
        /// Count of records actually read.
        actual: u64,
    },

    /// The checksum in the end record does not match.
    Checksum {
        /// Checksum stored in the stream.
        expected: u32,
        /// Checksum of the data actually read.
        actual: u32,
    },
}

impl Display for CorruptStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Magic => write!(f, "invalid magic"),
            Self::UnsupportedVersion(v) => {
                write!(f, "unsupported format version {v}")
            }
            Self::ZeroChunkSize => write!(f, "maximum chunk size is zero"),
            Self::UnknownRecord(tag) => write!(f, "unknown record tag {tag:#04x}"),
            Self::UnknownOperation(op) => {
                write!(f, "unknown patch operation {op}")
            }
            Self::UnexpectedChunk {
                offset: Some(offset),
                len,
            } => write!(
                f,
                "chunk of {len} bytes overruns the write at offset {offset}"
            ),
            Self::UnexpectedChunk { offset: None, len } => {
                write!(f, "chunk of {len} bytes outside of a write")
            }
            Self::ChunkTooLarge { len, max } => {
                write!(f, "chunk of {len} bytes exceeds maximum of {max}")
            }
            Self::MissingChunks { offset, remaining } => write!(
                f,
                "write at offset {offset} is missing {remaining} bytes of data"
            ),
            Self::RecordCount { expected, actual } => write!(
                f,
                "expected {expected} records, read {actual}"
            ),
            Self::Checksum { expected, actual } => write!(
                f,
                "checksum mismatch: expected {expected:#010x}, got {actual:#010x}"
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CorruptStream {}
