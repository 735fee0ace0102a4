// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Bootconfig trailer handling. The bootconfig section is a block of
//! `key=value\n` lines followed by a 20-byte trailer:
//!
//! ```text
//! [size: u32le][checksum: u32le][#BOOTCONFIG\n]
//! ```
//!
//! The size covers the parameter data (rounded up to 4 bytes) and the checksum
//! is the wrapping byte sum of that data. Regions are addressed as offsets into
//! a caller-owned buffer.

use std::{fmt, mem};

use thiserror::Error;
use tracing::debug;
use zerocopy::{FromBytes, IntoBytes, little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::format::padding;

pub const BOOTCONFIG_MAGIC: [u8; 12] = *b"#BOOTCONFIG\n";
pub const TRAILER_SIZE: usize = mem::size_of::<RawTrailer>();

const ALIGNMENT: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("No bootconfig parameters to add")]
    EmptyParams,
    #[error("Bootconfig region is missing")]
    MissingRegion,
    #[error("Bootconfig region is empty")]
    EmptyRegion,
    #[error("Bootconfig trailer is already present")]
    TrailerAlreadyPresent,
    #[error("Bootconfig region needs {needed} bytes, but buffer has {available}")]
    RegionTooSmall { needed: usize, available: usize },
    #[error("Bootconfig size does not fit in the trailer: {0}")]
    SizeTooLarge(usize),
    #[error("No bootconfig trailer ends at offset {0}")]
    MissingTrailer(usize),
    #[error("Bootconfig checksum mismatch: expected {expected:#010x}, but have {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

type Result<T> = std::result::Result<T, Error>;

/// Raw on-disk layout for the bootconfig trailer.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawTrailer {
    size: little_endian::U32,
    checksum: little_endian::U32,
    /// Magic value. This should be equal to [`BOOTCONFIG_MAGIC`].
    magic: [u8; 12],
}

/// A parsed and verified trailer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trailer {
    /// Offset of the parameter data covered by the trailer.
    pub data_offset: usize,
    pub size: u32,
    pub checksum: u32,
}

impl fmt::Display for Trailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bootconfig trailer:")?;
        writeln!(f, "- Data offset: {}", self.data_offset)?;
        writeln!(f, "- Size:        {}", self.size)?;
        write!(f, "- Checksum:    {:#010x}", self.checksum)
    }
}

/// Wrapping byte sum of `data`.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |sum, b| sum.wrapping_add(u32::from(*b)))
}

/// Check if the bootconfig magic immediately precedes `end`.
pub fn trailer_present(buf: &[u8], end: usize) -> bool {
    end.checked_sub(BOOTCONFIG_MAGIC.len())
        .and_then(|start| buf.get(start..end))
        .is_some_and(|m| m == BOOTCONFIG_MAGIC)
}

fn region_end(buf: &[u8], start: usize, size: usize) -> Result<usize> {
    start
        .checked_add(size)
        .filter(|end| *end <= buf.len())
        .ok_or(Error::RegionTooSmall {
            needed: start.saturating_add(size),
            available: buf.len(),
        })
}

/// Append `params` to the bootconfig region `buf[start..start + size]` and
/// rewrite the trailer. If the region already ends with a trailer, it is
/// replaced. Returns the offset just past the new trailer.
pub fn append_parameters(
    buf: &mut [u8],
    start: usize,
    size: usize,
    params: &[u8],
) -> Result<usize> {
    if params.is_empty() {
        return Err(Error::EmptyParams);
    }
    if buf.is_empty() {
        return Err(Error::MissingRegion);
    }

    let mut end = region_end(buf, start, size)?;
    let mut size = size;

    if size >= TRAILER_SIZE && trailer_present(buf, end) {
        debug!("Trailer already present at offset {end}");
        end -= TRAILER_SIZE;
        size -= TRAILER_SIZE;
    }

    let params_end = region_end(buf, end, params.len())?;
    buf[end..params_end].copy_from_slice(params);

    write_trailer(buf, start, size + params.len())
}

/// Write a trailer for the bootconfig data in `buf[start..start + size]`. The
/// data is zero padded to a multiple of 4 bytes and the trailer is written
/// right after. Returns the offset just past the trailer.
pub fn write_trailer(buf: &mut [u8], start: usize, size: usize) -> Result<usize> {
    if buf.is_empty() {
        return Err(Error::MissingRegion);
    }
    if size == 0 {
        return Err(Error::EmptyRegion);
    }

    let end = region_end(buf, start, size)?;
    let aligned_end = padding::round(end, ALIGNMENT).ok_or(Error::SizeTooLarge(end))?;
    let trailer_end = aligned_end
        .checked_add(TRAILER_SIZE)
        .ok_or(Error::SizeTooLarge(aligned_end))?;

    // An existing trailer either ends at the aligned end or directly follows
    // it. Neither is overwritten.
    if trailer_present(buf, aligned_end) || trailer_present(buf, trailer_end) {
        debug!("Trailer already present near offset {aligned_end}");
        return Err(Error::TrailerAlreadyPresent);
    }

    if trailer_end > buf.len() {
        return Err(Error::RegionTooSmall {
            needed: trailer_end,
            available: buf.len(),
        });
    }

    let aligned_size = aligned_end - start;
    let raw_size = u32::try_from(aligned_size).map_err(|_| Error::SizeTooLarge(aligned_size))?;

    buf[end..aligned_end].fill(0);

    let trailer = RawTrailer {
        size: raw_size.into(),
        checksum: checksum(&buf[start..aligned_end]).into(),
        magic: BOOTCONFIG_MAGIC,
    };

    buf[aligned_end..trailer_end].copy_from_slice(trailer.as_bytes());

    Ok(trailer_end)
}

/// Parse the trailer ending at `end` and verify the checksum of the data it
/// covers.
pub fn parse_trailer(buf: &[u8], end: usize) -> Result<Trailer> {
    if end < TRAILER_SIZE || !trailer_present(buf, end) {
        return Err(Error::MissingTrailer(end));
    }

    let trailer_start = end - TRAILER_SIZE;
    let (raw, _) = RawTrailer::read_from_prefix(&buf[trailer_start..])
        .map_err(|_| Error::MissingTrailer(end))?;

    let size = raw.size.get();
    let data_offset = usize::try_from(size)
        .ok()
        .and_then(|s| trailer_start.checked_sub(s))
        .ok_or(Error::RegionTooSmall {
            needed: size as usize,
            available: trailer_start,
        })?;

    let expected = raw.checksum.get();
    let actual = checksum(&buf[data_offset..trailer_start]);
    if expected != actual {
        return Err(Error::ChecksumMismatch { expected, actual });
    }

    Ok(Trailer {
        data_offset,
        size,
        checksum: expected,
    })
}
