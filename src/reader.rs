// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::{BoxedError, IoError};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::{self, Display, Formatter};

#[cfg(feature = "std")]
use {
    std::fs::File,
    std::io::{Seek, SeekFrom},
};

#[cfg(feature = "std")]
impl IoError for std::io::Error {}

pub(crate) fn box_err<E: IoError>(err: E) -> BoxedError {
    Box::new(err)
}

/// Interface used by [`make_diff`] to read device data from the
/// pool's data store (a file or block device).
///
/// [`make_diff`]: crate::make_diff
pub trait DataRead {
    /// Read bytes into `dst`, starting at `start_byte`.
    ///
    /// Exactly `dst.len()` bytes will be read; an error will be
    /// returned if there is not enough data to fill `dst`, or if the
    /// data cannot be read for any reason.
    fn read(&mut self, start_byte: u64, dst: &mut [u8]) -> Result<(), BoxedError>;
}

#[cfg(feature = "std")]
impl DataRead for File {
    fn read(&mut self, start_byte: u64, dst: &mut [u8]) -> Result<(), BoxedError> {
        use std::io::Read;

        // `read_exact` keeps reading until `dst` is full, so a short
        // read from the device is either retried or reported.
        self.seek(SeekFrom::Start(start_byte)).map_err(box_err)?;
        self.read_exact(dst).map_err(box_err)?;
        Ok(())
    }
}

/// Error type used by the in-memory impls of [`DataRead`],
/// [`StreamRead`], and [`ImageWrite`].
///
/// [`ImageWrite`]: crate::ImageWrite
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemIoError {
    start: u64,
    read_len: usize,
    src_len: usize,
}

impl MemIoError {
    pub(crate) fn new(start: u64, read_len: usize, src_len: usize) -> Self {
        Self {
            start,
            read_len,
            src_len,
        }
    }
}

impl IoError for MemIoError {}

impl Display for MemIoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to access {} bytes at offset {} in a slice of length {}",
            self.read_len, self.start, self.src_len
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MemIoError {}

impl DataRead for Vec<u8> {
    fn read(&mut self, start_byte: u64, dst: &mut [u8]) -> Result<(), BoxedError> {
        let err = || box_err(MemIoError::new(start_byte, dst.len(), self.len()));

        let start = usize::try_from(start_byte).map_err(|_| err())?;
        let end = start.checked_add(dst.len()).ok_or_else(err)?;
        let src = self.get(start..end).ok_or_else(err)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

/// Interface used by [`RecordReader`] to read a diff stream
/// sequentially.
///
/// [`RecordReader`]: crate::RecordReader
pub trait StreamRead {
    /// Read the next `dst.len()` bytes of the stream into `dst`.
    ///
    /// An error will be returned if the stream ends before `dst` is
    /// full.
    fn read_next(&mut self, dst: &mut [u8]) -> Result<(), BoxedError>;
}

impl StreamRead for &[u8] {
    fn read_next(&mut self, dst: &mut [u8]) -> Result<(), BoxedError> {
        let Some((head, tail)) = self.split_at_checked(dst.len()) else {
            return Err(box_err(MemIoError::new(0, dst.len(), self.len())));
        };
        dst.copy_from_slice(head);
        *self = tail;
        Ok(())
    }
}

/// Adapter implementing [`StreamRead`] for any [`std::io::Read`].
#[cfg(feature = "std")]
pub struct StdRead<R>(pub R);

#[cfg(feature = "std")]
impl<R: std::io::Read> StreamRead for StdRead<R> {
    fn read_next(&mut self, dst: &mut [u8]) -> Result<(), BoxedError> {
        self.0.read_exact(dst).map_err(box_err)
    }
}
