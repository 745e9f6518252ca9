// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! This crate computes the difference between two thin-provisioned
//! block devices that share a data pool, such as an LVM thin volume
//! and one of its snapshots.
//!
//! Each device is described by a sorted list of [`Extent`]s mapping
//! logical offsets to offsets in the shared data store. The
//! [`Aligner`] walks two such lists in parallel, cutting them into
//! [`AlignedPair`]s that cover the same logical region. Each pair
//! becomes a [`Patch`], and [`make_diff`] writes the patches, along
//! with the new data for every write, as a diff stream. The stream can
//! be decoded with [`RecordReader`] and applied to an image of the old
//! device with [`apply_diff`].
//!
//! No data is ever compared: two extents backed by the same physical
//! data are unchanged, and anything else is rewritten.
//!
//! # Example
//!
//! ```
//! use thin_diff::{
//!     DiffOptions, Device, Extent, ExtentSeq, apply_diff, make_diff,
//! };
//!
//! // Data store shared by both devices.
//! let mut store: Vec<u8> = (0..=255).collect();
//!
//! let from = Device {
//!     id: 1,
//!     extents: ExtentSeq::new(vec![Extent::new(0, 0, 16)])?,
//! };
//! let to = Device {
//!     id: 2,
//!     extents: ExtentSeq::new(vec![
//!         Extent::new(0, 0, 8),
//!         Extent::new(8, 100, 8),
//!     ])?,
//! };
//!
//! let mut stream: Vec<u8> = Vec::new();
//! let summary =
//!     make_diff(&from, &to, &mut store, &mut stream, &DiffOptions::default())?;
//! assert_eq!(summary.writes, 1);
//! assert_eq!(summary.bytes_written, 8);
//!
//! let mut image = store[..16].to_vec();
//! apply_diff(&mut stream.as_slice(), &mut image)?;
//! assert_eq!(image[..8], store[..8]);
//! assert_eq!(image[8..], store[100..108]);
//! # Ok::<(), thin_diff::DiffError>(())
//! ```
//!
//! # Crate features
//!
//! * `std`: Enables [`parse_thin_dump`], the I/O trait impls for
//!   [`std::fs::File`], and the [`StdRead`] and [`StdWrite`]
//!   adapters. Also enables `std::error::Error` impls.

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

// This module comes first so that its macro is available in other
// modules.
#[macro_use]
mod iters;

mod align;
mod apply;
mod checksum;
mod device;
mod error;
mod extent;
#[cfg(feature = "std")]
mod metadata;
mod patch;
mod reader;
mod record;
mod stream;
mod util;
mod writer;

#[cfg(test)]
mod test_util;

pub use align::{AlignedPair, Aligner};
pub use apply::{ApplySummary, apply_diff};
pub use device::{Device, ExtentSeq, find_device};
pub use error::{
    BoxedError, CorruptStream, DiffError, InvariantViolation, IoError,
    MalformedInput,
};
pub use extent::Extent;
#[cfg(feature = "std")]
pub use metadata::parse_thin_dump;
pub use patch::{Operation, Patch};
pub use reader::{DataRead, MemIoError, StreamRead};
#[cfg(feature = "std")]
pub use reader::StdRead;
pub use record::{FORMAT_VERSION, Record, RecordReader};
pub use stream::{DiffOptions, DiffSummary, make_diff};
#[cfg(feature = "std")]
pub use writer::StdWrite;
pub use writer::{ImageWrite, PatchWrite};
