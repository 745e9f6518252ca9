// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::{CorruptStream, DiffError, InvariantViolation};
use crate::extent::Extent;
use core::fmt::{self, Display, Formatter};

/// What to do with a logical region of the old device.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum Operation {
    /// Region is unchanged (or was never mapped).
    #[default]
    None = 0,

    /// New data for the region follows the patch.
    Write = 1,

    /// Region is no longer mapped.
    Delete = 2,
}

impl Operation {
    pub(crate) const fn to_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Operation {
    type Error = CorruptStream;

    fn try_from(v: u8) -> Result<Self, CorruptStream> {
        match v {
            0 => Ok(Self::None),
            1 => Ok(Self::Write),
            2 => Ok(Self::Delete),
            _ => Err(CorruptStream::UnknownOperation(v)),
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Write => "write",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Instruction describing how one logical region changed between two
/// mappings.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Patch {
    /// Kind of change.
    pub operation: Operation,

    /// Logical offset of the region. Zero for [`Operation::None`].
    pub offset: u64,

    /// Length of the region in bytes. Zero for [`Operation::None`].
    pub length: u64,
}

impl Patch {
    /// Patch that changes nothing.
    pub const NONE: Self = Self {
        operation: Operation::None,
        offset: 0,
        length: 0,
    };

    /// Create a write patch for `extent`'s logical region.
    #[must_use]
    pub const fn write(extent: &Extent) -> Self {
        Self {
            operation: Operation::Write,
            offset: extent.origin_offset,
            length: extent.length,
        }
    }

    /// Create a delete patch for `extent`'s logical region.
    #[must_use]
    pub const fn delete(extent: &Extent) -> Self {
        Self {
            operation: Operation::Delete,
            offset: extent.origin_offset,
            length: extent.length,
        }
    }

    /// Get the patch that turns `from` into `to`.
    ///
    /// `from` and `to` are the two halves of an [`AlignedPair`]. If
    /// both are non-empty they must cover the same logical region,
    /// otherwise [`DiffError::InternalInvariantViolation`] is returned.
    ///
    /// Data is never compared. Two extents backed by the same physical
    /// data are unchanged; two extents backed by different physical
    /// data are treated as changed.
    ///
    /// [`AlignedPair`]: crate::AlignedPair
    pub fn derive(from: &Extent, to: &Extent) -> Result<Self, DiffError> {
        match (from.is_empty(), to.is_empty()) {
            (true, true) => Ok(Self::NONE),
            (true, false) => Ok(Self::write(to)),
            (false, true) => Ok(Self::delete(from)),
            (false, false) => {
                if from.origin_offset != to.origin_offset
                    || from.length != to.length
                {
                    return Err(InvariantViolation::MismatchedPair {
                        from: *from,
                        to: *to,
                    }
                    .into());
                }

                if from.data_offset == to.data_offset {
                    Ok(Self::NONE)
                } else {
                    Ok(Self::write(to))
                }
            }
        }
    }
}

impl Display for Patch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.operation {
            Operation::None => write!(f, "none"),
            op => write!(f, "{op} {}+{}", self.offset, self.length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(operation: Operation, offset: u64, length: u64) -> Patch {
        Patch {
            operation,
            offset,
            length,
        }
    }

    #[test]
    fn test_derive() {
        let e = Extent::new;

        assert_eq!(
            Patch::derive(&Extent::EMPTY, &Extent::EMPTY).unwrap(),
            Patch::NONE
        );
        assert_eq!(
            Patch::derive(&e(100, 200, 50), &Extent::EMPTY).unwrap(),
            patch(Operation::Delete, 100, 50)
        );
        assert_eq!(
            Patch::derive(&Extent::EMPTY, &e(100, 200, 50)).unwrap(),
            patch(Operation::Write, 100, 50)
        );
        assert_eq!(
            Patch::derive(&e(100, 200, 50), &e(100, 200, 50)).unwrap(),
            Patch::NONE
        );
        assert_eq!(
            Patch::derive(&e(100, 500, 50), &e(100, 200, 50)).unwrap(),
            patch(Operation::Write, 100, 50)
        );
    }

    #[test]
    fn test_derive_mismatched() {
        let from = Extent::new(100, 200, 50);
        for to in [Extent::new(101, 200, 50), Extent::new(100, 200, 49)] {
            assert_eq!(
                Patch::derive(&from, &to)
                    .unwrap_err()
                    .as_invariant_violation()
                    .unwrap(),
                &InvariantViolation::MismatchedPair { from, to }
            );
        }
    }

    #[test]
    fn test_operation_from_u8() {
        for op in [Operation::None, Operation::Write, Operation::Delete] {
            assert_eq!(Operation::try_from(op.to_u8()), Ok(op));
        }
        assert_eq!(
            Operation::try_from(3),
            Err(CorruptStream::UnknownOperation(3))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Patch::NONE), "none");
        assert_eq!(
            format!("{}", patch(Operation::Delete, 4096, 512)),
            "delete 4096+512"
        );
    }
}
