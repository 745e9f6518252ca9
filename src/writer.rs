// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::BoxedError;
use crate::reader::{MemIoError, box_err};
use crate::util::u64_from_usize;
use alloc::vec::Vec;

#[cfg(feature = "std")]
use {
    std::fs::File,
    std::io::{Seek, SeekFrom, Write},
};

/// Interface used by [`make_diff`] to emit the diff stream.
///
/// [`make_diff`]: crate::make_diff
pub trait PatchWrite {
    /// Append all of `src` to the stream.
    fn emit(&mut self, src: &[u8]) -> Result<(), BoxedError>;
}

impl PatchWrite for Vec<u8> {
    fn emit(&mut self, src: &[u8]) -> Result<(), BoxedError> {
        self.extend_from_slice(src);
        Ok(())
    }
}

/// Adapter implementing [`PatchWrite`] for any [`std::io::Write`].
///
/// The writer is not buffered; wrap it in a [`std::io::BufWriter`] if
/// needed. The stream is not flushed.
#[cfg(feature = "std")]
pub struct StdWrite<W>(pub W);

#[cfg(feature = "std")]
impl<W: Write> PatchWrite for StdWrite<W> {
    fn emit(&mut self, src: &[u8]) -> Result<(), BoxedError> {
        self.0.write_all(src).map_err(box_err)
    }
}

/// Size of the zero buffer used by [`ImageWrite::discard`].
const ZERO_CHUNK: usize = 64 * 1024;

/// Interface used by [`apply_diff`] to modify a device image.
///
/// [`apply_diff`]: crate::apply_diff
pub trait ImageWrite {
    /// Write all of `src` to the image, starting at `start_byte`.
    fn write_at(&mut self, start_byte: u64, src: &[u8]) -> Result<(), BoxedError>;

    /// Mark `len` bytes starting at `start_byte` as unmapped.
    ///
    /// The default implementation overwrites the region with zeros,
    /// which is what an unmapped region of a thin device reads as.
    fn discard(&mut self, start_byte: u64, len: u64) -> Result<(), BoxedError> {
        let zeros = [0; ZERO_CHUNK];
        let mut done = 0;
        while done < len {
            let n = usize::try_from(len - done).map_or(ZERO_CHUNK, |n| n.min(ZERO_CHUNK));
            let offset = start_byte
                .checked_add(done)
                .ok_or_else(|| box_err(MemIoError::new(start_byte, n, 0)))?;
            self.write_at(offset, &zeros[..n])?;
            done += u64_from_usize(n);
        }
        Ok(())
    }
}

impl ImageWrite for Vec<u8> {
    /// Writing past the end grows the vector, filling any gap with
    /// zeros.
    fn write_at(&mut self, start_byte: u64, src: &[u8]) -> Result<(), BoxedError> {
        let err = || box_err(MemIoError::new(start_byte, src.len(), self.len()));

        let start = usize::try_from(start_byte).map_err(|_| err())?;
        let end = start.checked_add(src.len()).ok_or_else(err)?;
        if end > self.len() {
            self.resize(end, 0);
        }
        self[start..end].copy_from_slice(src);
        Ok(())
    }

    /// Only the part of the region inside the vector is zeroed. The
    /// vector does not grow.
    fn discard(&mut self, start_byte: u64, len: u64) -> Result<(), BoxedError> {
        let size = self.len();
        let clamp = |v: u64| usize::try_from(v).map_or(size, |v| v.min(size));

        let start = clamp(start_byte);
        let end = clamp(start_byte.saturating_add(len));
        self[start..end].fill(0);
        Ok(())
    }
}

#[cfg(feature = "std")]
impl ImageWrite for File {
    fn write_at(&mut self, start_byte: u64, src: &[u8]) -> Result<(), BoxedError> {
        self.seek(SeekFrom::Start(start_byte)).map_err(box_err)?;
        self.write_all(src).map_err(box_err)
    }
}
