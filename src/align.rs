// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::device::ExtentSeq;
use crate::error::{DiffError, InvariantViolation};
use crate::extent::Extent;
use alloc::vec::Vec;

/// Two extents covering the same logical region, one from each
/// mapping.
///
/// Either side may be [`Extent::EMPTY`] if that mapping has no data in
/// the region. If both sides are non-empty, they have the same
/// `origin_offset` and `length`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AlignedPair {
    /// Extent from the old mapping.
    pub from: Extent,

    /// Extent from the new mapping.
    pub to: Extent,
}

impl AlignedPair {
    fn from_only(from: Extent) -> Self {
        Self {
            from,
            to: Extent::EMPTY,
        }
    }

    fn to_only(to: Extent) -> Self {
        Self {
            from: Extent::EMPTY,
            to,
        }
    }
}

/// Read position within one of the two mappings.
///
/// The head extent is replaced in place when it is split, so the
/// cursor never allocates after construction.
struct Cursor {
    extents: Vec<Extent>,
    next: usize,
}

impl Cursor {
    fn new(seq: &ExtentSeq) -> Self {
        Self {
            extents: seq.to_vec(),
            next: 0,
        }
    }

    fn head(&self) -> Option<Extent> {
        self.extents.get(self.next).copied()
    }

    fn advance(&mut self) {
        self.next += 1;
    }

    /// Remove the first `at_length` bytes of the head extent and return
    /// them. The remainder stays at the head.
    ///
    /// Both parts must be non-empty.
    fn split_head(&mut self, at_length: u64) -> Result<Extent, DiffError> {
        let Some(head) = self.extents.get_mut(self.next) else {
            return Err(InvariantViolation::SplitOutOfRange {
                extent: Extent::EMPTY,
                at_length,
            }
            .into());
        };
        if at_length == 0 || at_length >= head.length {
            return Err(InvariantViolation::SplitOutOfRange {
                extent: *head,
                at_length,
            }
            .into());
        }

        let (left, right) = head.split(at_length);
        *head = right;
        Ok(left)
    }
}

/// Position of the `from` head relative to the `to` head. Both heads
/// are non-empty.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Position {
    /// `from` ends at or before the start of `to`.
    FromFirst,
    /// `to` ends at or before the start of `from`.
    ToFirst,
    /// They overlap and `from` starts earlier.
    FromLeads,
    /// They overlap and `to` starts earlier.
    ToLeads,
    /// Same start, `from` is shorter.
    FromShorter,
    /// Same start, `to` is shorter.
    ToShorter,
    /// Same start and length.
    Aligned,
}

impl Position {
    fn classify(from: &Extent, to: &Extent) -> Self {
        use core::cmp::Ordering;

        if from.origin_last() <= to.origin_offset {
            return Self::FromFirst;
        }
        if to.origin_last() <= from.origin_offset {
            return Self::ToFirst;
        }

        match from.origin_offset.cmp(&to.origin_offset) {
            Ordering::Less => Self::FromLeads,
            Ordering::Greater => Self::ToLeads,
            Ordering::Equal => match from.length.cmp(&to.length) {
                Ordering::Less => Self::FromShorter,
                Ordering::Greater => Self::ToShorter,
                Ordering::Equal => Self::Aligned,
            },
        }
    }
}

/// Sweep over two mappings, yielding [`AlignedPair`]s in logical
/// order.
///
/// Each call to [`Aligner::cut`] returns the next logical sub-region
/// in which neither mapping changes. Concatenating the `from` side of
/// every pair reproduces the `from` mapping (minus zero-length
/// extents), and likewise for `to`.
///
/// ```
/// use thin_diff::{Aligner, Extent, ExtentSeq};
///
/// let from = ExtentSeq::new(vec![Extent::new(0, 0, 100)]).unwrap();
/// let to = ExtentSeq::new(vec![Extent::new(40, 500, 100)]).unwrap();
/// let pairs: Vec<_> = Aligner::new(&from, &to)
///     .map(|pair| pair.unwrap())
///     .map(|pair| (pair.from, pair.to))
///     .collect();
/// assert_eq!(
///     pairs,
///     [
///         (Extent::new(0, 0, 40), Extent::EMPTY),
///         (Extent::new(40, 40, 60), Extent::new(40, 500, 60)),
///         (Extent::EMPTY, Extent::new(100, 560, 40)),
///     ]
/// );
/// ```
pub struct Aligner {
    from: Cursor,
    to: Cursor,
    is_done: bool,
}

impl Aligner {
    /// Create an `Aligner`. Both sequences are copied; the originals
    /// are not modified.
    #[must_use]
    pub fn new(from: &ExtentSeq, to: &ExtentSeq) -> Self {
        Self {
            from: Cursor::new(from),
            to: Cursor::new(to),
            is_done: false,
        }
    }

    /// Get the next aligned pair, or `None` when both mappings are
    /// exhausted.
    pub fn cut(&mut self) -> Result<Option<AlignedPair>, DiffError> {
        loop {
            let (from, to) = match (self.from.head(), self.to.head()) {
                (None, None) => return Ok(None),
                (Some(from), None) => {
                    self.from.advance();
                    if from.is_empty() {
                        continue;
                    }
                    return Ok(Some(AlignedPair::from_only(from)));
                }
                (None, Some(to)) => {
                    self.to.advance();
                    if to.is_empty() {
                        continue;
                    }
                    return Ok(Some(AlignedPair::to_only(to)));
                }
                (Some(from), Some(to)) => (from, to),
            };

            if from.is_empty() {
                self.from.advance();
                continue;
            }
            if to.is_empty() {
                self.to.advance();
                continue;
            }

            let pair = match Position::classify(&from, &to) {
                Position::FromFirst => {
                    self.from.advance();
                    AlignedPair::from_only(from)
                }
                Position::ToFirst => {
                    self.to.advance();
                    AlignedPair::to_only(to)
                }
                Position::FromLeads => {
                    let gap = to.origin_offset - from.origin_offset;
                    AlignedPair::from_only(self.from.split_head(gap)?)
                }
                Position::ToLeads => {
                    let gap = from.origin_offset - to.origin_offset;
                    AlignedPair::to_only(self.to.split_head(gap)?)
                }
                Position::FromShorter => {
                    self.from.advance();
                    AlignedPair {
                        from,
                        to: self.to.split_head(from.length)?,
                    }
                }
                Position::ToShorter => {
                    self.to.advance();
                    AlignedPair {
                        from: self.from.split_head(to.length)?,
                        to,
                    }
                }
                Position::Aligned => {
                    self.from.advance();
                    self.to.advance();
                    AlignedPair { from, to }
                }
            };
            return Ok(Some(pair));
        }
    }

    fn next_impl(&mut self) -> Result<Option<AlignedPair>, DiffError> {
        let pair = self.cut()?;
        if pair.is_none() {
            self.is_done = true;
        }
        Ok(pair)
    }
}

impl_result_iter!(Aligner, AlignedPair);
