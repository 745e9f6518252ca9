// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use core::fmt::{self, Display, Formatter};

/// Contiguous range of logical bytes and the physical bytes that
/// currently back them.
///
/// All values are in bytes. An extent with a length of zero carries no
/// data; [`Extent::EMPTY`] is the canonical empty extent.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Extent {
    /// Offset of the region in the device's logical address space.
    pub origin_offset: u64,

    /// Offset of the backing data in the underlying data store.
    pub data_offset: u64,

    /// Number of bytes (both logical and physical).
    pub length: u64,
}

impl Extent {
    /// Extent with all fields set to zero.
    pub const EMPTY: Self = Self::new(0, 0, 0);

    /// Create an `Extent`.
    #[must_use]
    pub const fn new(origin_offset: u64, data_offset: u64, length: u64) -> Self {
        Self {
            origin_offset,
            data_offset,
            length,
        }
    }

    /// Whether the extent carries no data.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Exclusive end of the logical region.
    ///
    /// Extents inside an [`ExtentSeq`] are validated so that this
    /// cannot overflow. For other extents the result saturates.
    ///
    /// [`ExtentSeq`]: crate::ExtentSeq
    #[must_use]
    pub const fn origin_last(&self) -> u64 {
        self.origin_offset.saturating_add(self.length)
    }

    /// Split the extent in two at `at_length` bytes from the start.
    ///
    /// The two halves are adjacent in both address spaces, and
    /// together cover exactly the same bytes as `self`. If `at_length`
    /// is at least `self.length`, the left half is `self` and the right
    /// half is a zero-length extent positioned directly after it.
    #[must_use]
    pub const fn split(self, at_length: u64) -> (Self, Self) {
        let left = if at_length >= self.length {
            self
        } else {
            Self::new(self.origin_offset, self.data_offset, at_length)
        };
        let right = Self::new(
            left.origin_offset.saturating_add(left.length),
            left.data_offset.saturating_add(left.length),
            self.length - left.length,
        );
        (left, right)
    }
}

impl Display for Extent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}..{}) -> {}",
            self.origin_offset,
            self.origin_last(),
            self.data_offset
        )
    }
}
