// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Parser for the XML produced by `thin_dump`.
//!
//! Only the parts needed to build extent maps are read:
//!
//! ```xml
//! <superblock data_block_size="128" ...>
//!   <device dev_id="1" ...>
//!     <single_mapping origin_block="0" data_block="7" .../>
//!     <range_mapping origin_begin="8" data_begin="20" length="4" .../>
//!   </device>
//! </superblock>
//! ```
//!
//! Block numbers are converted to byte offsets using the superblock's
//! `data_block_size`, which is given in 512-byte sectors.

use crate::device::{Device, ExtentSeq};
use crate::error::{DiffError, MalformedInput};
use crate::extent::Extent;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::io::BufRead;

const SECTOR_SIZE: u64 = 512;

/// Device currently being parsed.
struct PendingDevice {
    id: u32,
    extents: Vec<Extent>,
}

#[derive(Default)]
struct Parser {
    /// Block size in bytes. Set by the `superblock` element.
    block_size: Option<u64>,
    devices: Vec<Device>,
    current: Option<PendingDevice>,
}

impl Parser {
    fn start(&mut self, e: &BytesStart<'_>) -> Result<(), DiffError> {
        match e.name().as_ref() {
            b"superblock" => {
                let sectors: u64 =
                    parse_attr(e, "superblock", "data_block_size")?;
                if sectors == 0 {
                    return Err(MalformedInput::InvalidAttribute {
                        element: "superblock",
                        attribute: "data_block_size",
                        value: "0".to_string(),
                    }
                    .into());
                }
                let block_size = sectors
                    .checked_mul(SECTOR_SIZE)
                    .ok_or(MalformedInput::BlockOverflow)?;
                tracing::debug!(block_size, "superblock");
                self.block_size = Some(block_size);
            }
            b"device" => {
                self.finish_device()?;
                let id: u32 = parse_attr(e, "device", "dev_id")?;
                self.current = Some(PendingDevice {
                    id,
                    extents: Vec::new(),
                });
            }
            b"single_mapping" => {
                let origin = parse_attr(e, "single_mapping", "origin_block")?;
                let data = parse_attr(e, "single_mapping", "data_block")?;
                self.push_mapping(origin, data, 1)?;
            }
            b"range_mapping" => {
                let origin = parse_attr(e, "range_mapping", "origin_begin")?;
                let data = parse_attr(e, "range_mapping", "data_begin")?;
                let length = parse_attr(e, "range_mapping", "length")?;
                self.push_mapping(origin, data, length)?;
            }
            other => {
                tracing::warn!(
                    element = %String::from_utf8_lossy(other),
                    "ignoring unknown element"
                );
            }
        }
        Ok(())
    }

    /// Add an extent to the current device. All arguments are in
    /// blocks.
    fn push_mapping(
        &mut self,
        origin: u64,
        data: u64,
        length: u64,
    ) -> Result<(), DiffError> {
        let (Some(block_size), Some(device)) =
            (self.block_size, &mut self.current)
        else {
            return Err(MalformedInput::MappingOutsideDevice.into());
        };
        let to_bytes = |blocks: u64| {
            blocks
                .checked_mul(block_size)
                .ok_or(MalformedInput::BlockOverflow)
        };
        device.extents.push(Extent::new(
            to_bytes(origin)?,
            to_bytes(data)?,
            to_bytes(length)?,
        ));
        Ok(())
    }

    fn finish_device(&mut self) -> Result<(), DiffError> {
        let Some(device) = self.current.take() else {
            return Ok(());
        };
        if self.devices.iter().any(|d| d.id == device.id) {
            return Err(MalformedInput::DuplicateDevice(device.id).into());
        }
        tracing::debug!(id = device.id, extents = device.extents.len(), "device");
        self.devices.push(Device {
            id: device.id,
            extents: ExtentSeq::new(device.extents)?,
        });
        Ok(())
    }
}

/// Get a numeric attribute of `e`.
fn parse_attr<T: core::str::FromStr>(
    e: &BytesStart<'_>,
    element: &'static str,
    attribute: &'static str,
) -> Result<T, DiffError> {
    let attr = e
        .try_get_attribute(attribute)
        .map_err(|err| MalformedInput::Xml(err.to_string()))?
        .ok_or(MalformedInput::MissingAttribute { element, attribute })?;
    let value = attr
        .unescape_value()
        .map_err(|err| MalformedInput::Xml(err.to_string()))?;
    value.trim().parse().map_err(|_| {
        MalformedInput::InvalidAttribute {
            element,
            attribute,
            value: value.into_owned(),
        }
        .into()
    })
}

/// Parse the output of `thin_dump` into a list of devices.
///
/// Devices are returned in document order. Each device's mappings must
/// be sorted by origin offset and must not overlap; mappings are not
/// reordered.
///
/// Parsing stops at the closing `superblock` tag. Anything after it is
/// not read.
#[tracing::instrument(skip_all)]
pub fn parse_thin_dump(reader: impl BufRead) -> Result<Vec<Device>, DiffError> {
    let mut reader = Reader::from_reader(reader);
    let mut parser = Parser::default();
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|err| MalformedInput::Xml(err.to_string()))?;
        match event {
            Event::Start(e) => parser.start(&e)?,
            Event::Empty(e) => {
                parser.start(&e)?;
                if e.name().as_ref() == b"device" {
                    parser.finish_device()?;
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"device" => parser.finish_device()?,
                b"superblock" => {
                    parser.finish_device()?;
                    break;
                }
                _ => {}
            },
            Event::Eof => return Err(MalformedInput::UnexpectedEnd.into()),
            _ => {}
        }
        buf.clear();
    }

    tracing::info!(devices = parser.devices.len(), "parsed metadata");
    Ok(parser.devices)
}
