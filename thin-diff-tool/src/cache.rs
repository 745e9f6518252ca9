// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Cache of parsed devices, keyed on the modification time of the
//! metadata file.
//!
//! Parsing the metadata of a large pool is slow, so the parsed devices
//! can be saved next to it and reused as long as the metadata file is
//! unchanged. The file is the `THDCACHE` magic, a bincode-encoded
//! [`CacheFile`], and a CRC32C of everything before it.

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use thin_diff::{Device, Extent, ExtentSeq};

const MAGIC: &[u8; 8] = b"THDCACHE";
const VERSION: u32 = 1;

const CRC32C: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISCSI);

#[derive(Debug, Deserialize, Serialize)]
struct CacheFile {
    version: u32,
    mtime_secs: u64,
    mtime_nanos: u32,
    devices: Vec<CachedDevice>,
}

#[derive(Debug, Deserialize, Serialize)]
struct CachedDevice {
    id: u32,
    /// `(origin_offset, data_offset, length)` of each extent.
    extents: Vec<(u64, u64, u64)>,
}

impl From<&Device> for CachedDevice {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id,
            extents: device
                .extents
                .as_slice()
                .iter()
                .map(|e| (e.origin_offset, e.data_offset, e.length))
                .collect(),
        }
    }
}

impl TryFrom<CachedDevice> for Device {
    type Error = anyhow::Error;

    fn try_from(cached: CachedDevice) -> Result<Self> {
        let extents = cached
            .extents
            .into_iter()
            .map(|(origin, data, length)| Extent::new(origin, data, length))
            .collect();
        Ok(Self {
            id: cached.id,
            extents: ExtentSeq::new(extents).with_context(|| {
                format!("invalid extents for device {}", cached.id)
            })?,
        })
    }
}

fn mtime_key(mtime: SystemTime) -> Result<Duration> {
    mtime
        .duration_since(SystemTime::UNIX_EPOCH)
        .context("modification time is before the epoch")
}

/// Serialize `devices` along with the metadata file's `mtime`.
pub fn encode(mtime: SystemTime, devices: &[Device]) -> Result<Vec<u8>> {
    let key = mtime_key(mtime)?;
    let file = CacheFile {
        version: VERSION,
        mtime_secs: key.as_secs(),
        mtime_nanos: key.subsec_nanos(),
        devices: devices.iter().map(CachedDevice::from).collect(),
    };

    let mut out = MAGIC.to_vec();
    bincode::serialize_into(&mut out, &file)
        .context("failed to encode device cache")?;
    let checksum = CRC32C.checksum(&out);
    out.extend(checksum.to_le_bytes());
    Ok(out)
}

/// Deserialize devices, checking that the cache was created for a
/// metadata file with modification time `mtime`.
pub fn decode(data: &[u8], mtime: SystemTime) -> Result<Vec<Device>> {
    let Some((body, checksum)) = data.split_last_chunk::<4>() else {
        bail!("cache file is truncated");
    };
    ensure!(
        CRC32C.checksum(body) == u32::from_le_bytes(*checksum),
        "cache checksum mismatch"
    );
    let Some(payload) = body.strip_prefix(MAGIC) else {
        bail!("not a cache file");
    };

    let file: CacheFile =
        bincode::deserialize(payload).context("failed to decode device cache")?;
    ensure!(
        file.version == VERSION,
        "unsupported cache version {}",
        file.version
    );

    let key = mtime_key(mtime)?;
    ensure!(
        file.mtime_secs == key.as_secs()
            && file.mtime_nanos == key.subsec_nanos(),
        "cache is stale"
    );

    file.devices.into_iter().map(Device::try_from).collect()
}

/// Load cached devices from `path`.
///
/// Returns `None` if there is no usable cache. Problems with the cache
/// are logged, not returned.
pub fn load(path: &Path, mtime: SystemTime) -> Option<Vec<Device>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "no device cache");
            return None;
        }
    };
    match decode(&data, mtime) {
        Ok(devices) => {
            tracing::info!(path = %path.display(), "using device cache");
            Some(devices)
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), "ignoring device cache: {err:#}");
            None
        }
    }
}

/// Write `devices` to the cache at `path`.
pub fn save(path: &Path, mtime: SystemTime, devices: &[Device]) -> Result<()> {
    let data = encode(mtime, devices)?;
    fs::write(path, data)
        .with_context(|| format!("failed to write {}", path.display()))
}
