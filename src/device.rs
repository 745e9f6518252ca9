// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::{DiffError, MalformedInput};
use crate::extent::Extent;
use alloc::vec::Vec;

/// Ordered list of the extents that make up one device's mapping.
///
/// Extents are ordered by logical offset and do not overlap. There may
/// be unmapped gaps between them. The physical order of the backing
/// data is irrelevant.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExtentSeq(Vec<Extent>);

impl ExtentSeq {
    /// Create an `ExtentSeq`, checking that `extents` is sorted by
    /// logical offset without overlap, and that no extent's end
    /// overflows either address space.
    ///
    /// Zero-length extents are kept; they never appear in a diff.
    pub fn new(extents: Vec<Extent>) -> Result<Self, MalformedInput> {
        let mut prev_end = 0;
        for (index, extent) in extents.iter().enumerate() {
            let origin_end = extent.origin_offset.checked_add(extent.length);
            let data_end = extent.data_offset.checked_add(extent.length);
            let (Some(origin_end), Some(_)) = (origin_end, data_end) else {
                return Err(MalformedInput::Overflow { index });
            };

            if extent.origin_offset < prev_end {
                return Err(MalformedInput::Unsorted { index });
            }
            prev_end = origin_end;
        }
        Ok(Self(extents))
    }

    /// Get the extents as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Extent] {
        &self.0
    }

    /// Number of extents, including zero-length ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the sequence contains no extents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of mapped bytes.
    #[must_use]
    pub fn mapped_bytes(&self) -> u64 {
        // Extents do not overlap and each end fits in a `u64`, so the
        // sum of lengths cannot exceed `u64::MAX`.
        self.0.iter().map(|e| e.length).sum()
    }

    pub(crate) fn to_vec(&self) -> Vec<Extent> {
        self.0.clone()
    }
}

impl TryFrom<Vec<Extent>> for ExtentSeq {
    type Error = MalformedInput;

    fn try_from(extents: Vec<Extent>) -> Result<Self, MalformedInput> {
        Self::new(extents)
    }
}

/// One snapshot or volume of a thin pool.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Device {
    /// Device id within the pool.
    pub id: u32,

    /// Mapping from the device's logical bytes to the pool's data.
    pub extents: ExtentSeq,
}

/// Find the device with `id`.
pub fn find_device(devices: &[Device], id: u32) -> Result<&Device, DiffError> {
    devices
        .iter()
        .find(|dev| dev.id == id)
        .ok_or(DiffError::DeviceNotFound(id))
}
