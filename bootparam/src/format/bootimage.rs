// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    io::{self, Read, Write},
    mem,
};

use bstr::ByteSlice;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;
use zerocopy::{FromBytes, IntoBytes, little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    format::padding::{self, ZeroPadding},
    stream::{FromReader, ToWriter},
    util::{self, OutOfBoundsError},
};

pub const BOOT_MAGIC: [u8; 8] = *b"ANDROID!";
pub const BOOT_NAME_SIZE: usize = 16;
pub const BOOT_ARGS_SIZE: usize = 512;
pub const BOOT_EXTRA_ARGS_SIZE: usize = 1024;

pub const VENDOR_BOOT_MAGIC: [u8; 8] = *b"VNDRBOOT";
pub const VENDOR_BOOT_ARGS_SIZE: usize = 2048;
pub const VENDOR_BOOT_NAME_SIZE: usize = 16;

pub const VENDOR_RAMDISK_NAME_SIZE: usize = 32;
pub const VENDOR_RAMDISK_TABLE_ENTRY_BOARD_ID_SIZE: usize = 16;

/// Page size implied by v3 and v4 boot images.
pub const PAGE_SIZE: u32 = 4096;

/// `ARM\x64` in the AArch64 `Image` header.
pub const KERNEL64_MAGIC: u32 = 0x644d5241;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown magic: {0:?}")]
    UnknownMagic([u8; 8]),
    #[error("Unknown header version: {0}")]
    UnknownHeaderVersion(u32),
    #[error("Unknown vendor ramdisk type: {0}")]
    UnknownRamdiskType(u32),
    #[error("{0:?} field is out of bounds")]
    IntOutOfBounds(&'static str, #[source] OutOfBoundsError),
    #[error("{0:?} overflowed integer bounds during calculations")]
    IntOverflow(&'static str),
    #[error("Page size must not be zero")]
    PageSizeZero,
    #[error("Vendor ramdisk table requires a vendor v4 header, but found v{0}")]
    NotVendorV4(u32),
    #[error("Region {0} does not exist in a v{1} header")]
    NoSuchRegion(RegionKind, u32),
    #[error("Invalid vendor v4 total ramdisk size: {field_value} != {total_size}")]
    VendorV4InvalidRamdiskSize { field_value: u32, total_size: u32 },
    #[error("Invalid vendor v4 ramdisk table size: {actual} != {expected}")]
    VendorV4InvalidRamdiskTableSize { actual: u32, expected: u32 },
    #[error("Invalid vendor v4 ramdisk entry size: {0}")]
    VendorV4InvalidRamdiskEntrySize(u32),
    #[error("Invalid vendor v4 ramdisk entry [{index}] offset: {field_value} != {expected}")]
    VendorV4InvalidRamdiskEntryOffset {
        index: u32,
        field_value: u32,
        expected: u32,
    },
    #[error("Region {kind} ({offset}+{size}) exceeds image size {image_size}")]
    RegionOutOfBounds {
        kind: RegionKind,
        offset: u64,
        size: u64,
        image_size: usize,
    },
    #[error("Failed to read boot image data: {0}")]
    DataRead(&'static str, #[source] io::Error),
    #[error("Failed to write boot image data: {0}")]
    DataWrite(&'static str, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Leading fields shared by every boot image header version. The header
/// version is at offset 40 in both the v0 and v3 layouts.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawBootPrefix {
    magic: [u8; 8],
    fields: [little_endian::U32; 8],
    header_version: little_endian::U32,
}

/// Leading fields of the vendor boot image header.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawVendorPrefix {
    magic: [u8; 8],
    header_version: little_endian::U32,
}

/// Raw on-disk layout for the v0 image header.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawBootV0 {
    /// Magic value. This should be equal to [`BOOT_MAGIC`].
    magic: [u8; 8],
    kernel_size: little_endian::U32,
    kernel_addr: little_endian::U32,
    ramdisk_size: little_endian::U32,
    ramdisk_addr: little_endian::U32,
    second_size: little_endian::U32,
    second_addr: little_endian::U32,
    tags_addr: little_endian::U32,
    page_size: little_endian::U32,
    header_version: little_endian::U32,
    os_version: little_endian::U32,
    name: [u8; BOOT_NAME_SIZE],
    cmdline: [u8; BOOT_ARGS_SIZE],
    id: [little_endian::U32; 8],
    extra_cmdline: [u8; BOOT_EXTRA_ARGS_SIZE],
}

/// Raw on-disk layout for the extra v1 image header fields.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawBootV1Extra {
    recovery_dtbo_size: little_endian::U32,
    recovery_dtbo_offset: little_endian::U64,
    header_size: little_endian::U32,
}

/// Raw on-disk layout for the extra v2 image header fields.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawBootV2Extra {
    dtb_size: little_endian::U32,
    dtb_addr: little_endian::U64,
}

#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawBootV1 {
    v0: RawBootV0,
    v1: RawBootV1Extra,
}

#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawBootV2 {
    v0: RawBootV0,
    v1: RawBootV1Extra,
    v2: RawBootV2Extra,
}

/// Raw on-disk layout for the v3 image header.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawBootV3 {
    /// Magic value. This should be equal to [`BOOT_MAGIC`].
    magic: [u8; 8],
    kernel_size: little_endian::U32,
    ramdisk_size: little_endian::U32,
    os_version: little_endian::U32,
    header_size: little_endian::U32,
    reserved: [little_endian::U32; 4],
    header_version: little_endian::U32,
    cmdline: [u8; BOOT_ARGS_SIZE + BOOT_EXTRA_ARGS_SIZE],
}

/// Raw on-disk layout for the extra v4 image header fields.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawBootV4Extra {
    signature_size: little_endian::U32,
}

#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawBootV4 {
    v3: RawBootV3,
    v4: RawBootV4Extra,
}

/// Raw on-disk layout for the vendor v3 image header.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawVendorV3 {
    /// Magic value. This should be equal to [`VENDOR_BOOT_MAGIC`].
    magic: [u8; 8],
    header_version: little_endian::U32,
    page_size: little_endian::U32,
    kernel_addr: little_endian::U32,
    ramdisk_addr: little_endian::U32,
    vendor_ramdisk_size: little_endian::U32,
    cmdline: [u8; VENDOR_BOOT_ARGS_SIZE],
    tags_addr: little_endian::U32,
    name: [u8; VENDOR_BOOT_NAME_SIZE],
    header_size: little_endian::U32,
    dtb_size: little_endian::U32,
    dtb_addr: little_endian::U64,
}

/// Raw on-disk layout for the extra vendor v4 image header fields.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawVendorV4Extra {
    vendor_ramdisk_table_size: little_endian::U32,
    vendor_ramdisk_table_entry_num: little_endian::U32,
    vendor_ramdisk_table_entry_size: little_endian::U32,
    bootconfig_size: little_endian::U32,
}

#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawVendorV4 {
    v3: RawVendorV3,
    v4: RawVendorV4Extra,
}

/// Raw on-disk layout for the vendor v4 ramdisk table entry.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawVendorRamdiskTableEntry {
    ramdisk_size: little_endian::U32,
    ramdisk_offset: little_endian::U32,
    ramdisk_type: little_endian::U32,
    ramdisk_name: [u8; VENDOR_RAMDISK_NAME_SIZE],
    board_id: [little_endian::U32; VENDOR_RAMDISK_TABLE_ENTRY_BOARD_ID_SIZE],
}

/// Leading portion of the AArch64 kernel `Image` header.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawKernel64Header {
    code0: little_endian::U32,
    code1: little_endian::U32,
    text_offset: little_endian::U64,
    image_size: little_endian::U64,
    flags: little_endian::U64,
    res2: little_endian::U64,
    res3: little_endian::U64,
    res4: little_endian::U64,
    magic: little_endian::U32,
    res5: little_endian::U32,
}

/// OS version and security patch level packed into a single `u32` as
/// `A[31:25] B[24:18] C[17:11] (Y-2000)[10:4] M[3:0]`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct OsVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub year: u16,
    pub month: u8,
}

impl OsVersion {
    pub fn from_raw(raw: u32) -> Self {
        Self {
            major: (raw >> 25) as u8,
            minor: ((raw >> 18) & 0x7f) as u8,
            patch: ((raw >> 11) & 0x7f) as u8,
            year: 2000 + ((raw >> 4) & 0x7f) as u16,
            month: (raw & 0xf) as u8,
        }
    }

    pub fn to_raw(&self) -> Result<u32> {
        let major = util::check_bounds(self.major, ..=0x7f)
            .map_err(|e| Error::IntOutOfBounds("OsVersion::major", e))?;
        let minor = util::check_bounds(self.minor, ..=0x7f)
            .map_err(|e| Error::IntOutOfBounds("OsVersion::minor", e))?;
        let patch = util::check_bounds(self.patch, ..=0x7f)
            .map_err(|e| Error::IntOutOfBounds("OsVersion::patch", e))?;
        let year = util::check_bounds(self.year, 2000..=2127)
            .map_err(|e| Error::IntOutOfBounds("OsVersion::year", e))?;
        let month = util::check_bounds(self.month, ..=12)
            .map_err(|e| Error::IntOutOfBounds("OsVersion::month", e))?;

        Ok(u32::from(major) << 25
            | u32::from(minor) << 18
            | u32::from(patch) << 11
            | u32::from(year - 2000) << 4
            | u32::from(month))
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{} ({:04}-{:02})",
            self.major, self.minor, self.patch, self.year, self.month,
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct BootHeaderV0 {
    pub kernel_size: u32,
    pub kernel_addr: u32,
    pub ramdisk_size: u32,
    pub ramdisk_addr: u32,
    pub second_size: u32,
    pub second_addr: u32,
    pub tags_addr: u32,
    pub page_size: u32,
    pub os_version: u32,
    #[serde(with = "crate::escape")]
    pub name: [u8; BOOT_NAME_SIZE],
    #[serde(with = "crate::escape")]
    pub cmdline: [u8; BOOT_ARGS_SIZE],
    pub id: [u32; 8],
    #[serde(with = "crate::escape")]
    pub extra_cmdline: [u8; BOOT_EXTRA_ARGS_SIZE],
}

impl BootHeaderV0 {
    fn from_raw(raw: &RawBootV0) -> Self {
        Self {
            kernel_size: raw.kernel_size.get(),
            kernel_addr: raw.kernel_addr.get(),
            ramdisk_size: raw.ramdisk_size.get(),
            ramdisk_addr: raw.ramdisk_addr.get(),
            second_size: raw.second_size.get(),
            second_addr: raw.second_addr.get(),
            tags_addr: raw.tags_addr.get(),
            page_size: raw.page_size.get(),
            os_version: raw.os_version.get(),
            name: raw.name,
            cmdline: raw.cmdline,
            id: raw.id.map(|id| id.get()),
            extra_cmdline: raw.extra_cmdline,
        }
    }

    fn to_raw(&self, header_version: u32) -> RawBootV0 {
        RawBootV0 {
            magic: BOOT_MAGIC,
            kernel_size: self.kernel_size.into(),
            kernel_addr: self.kernel_addr.into(),
            ramdisk_size: self.ramdisk_size.into(),
            ramdisk_addr: self.ramdisk_addr.into(),
            second_size: self.second_size.into(),
            second_addr: self.second_addr.into(),
            tags_addr: self.tags_addr.into(),
            page_size: self.page_size.into(),
            header_version: header_version.into(),
            os_version: self.os_version.into(),
            name: self.name,
            cmdline: self.cmdline,
            id: self.id.map(|id| id.into()),
            extra_cmdline: self.extra_cmdline,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct BootV1Extra {
    pub recovery_dtbo_size: u32,
    pub recovery_dtbo_offset: u64,
    pub header_size: u32,
}

impl BootV1Extra {
    fn from_raw(raw: &RawBootV1Extra) -> Self {
        Self {
            recovery_dtbo_size: raw.recovery_dtbo_size.get(),
            recovery_dtbo_offset: raw.recovery_dtbo_offset.get(),
            header_size: raw.header_size.get(),
        }
    }

    fn to_raw(&self) -> RawBootV1Extra {
        RawBootV1Extra {
            recovery_dtbo_size: self.recovery_dtbo_size.into(),
            recovery_dtbo_offset: self.recovery_dtbo_offset.into(),
            header_size: self.header_size.into(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct BootV2Extra {
    pub dtb_size: u32,
    pub dtb_addr: u64,
}

impl BootV2Extra {
    fn from_raw(raw: &RawBootV2Extra) -> Self {
        Self {
            dtb_size: raw.dtb_size.get(),
            dtb_addr: raw.dtb_addr.get(),
        }
    }

    fn to_raw(&self) -> RawBootV2Extra {
        RawBootV2Extra {
            dtb_size: self.dtb_size.into(),
            dtb_addr: self.dtb_addr.into(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct BootHeaderV3 {
    pub kernel_size: u32,
    pub ramdisk_size: u32,
    pub os_version: u32,
    pub header_size: u32,
    pub reserved: [u32; 4],
    #[serde(with = "crate::escape")]
    pub cmdline: [u8; BOOT_ARGS_SIZE + BOOT_EXTRA_ARGS_SIZE],
}

impl BootHeaderV3 {
    fn from_raw(raw: &RawBootV3) -> Self {
        Self {
            kernel_size: raw.kernel_size.get(),
            ramdisk_size: raw.ramdisk_size.get(),
            os_version: raw.os_version.get(),
            header_size: raw.header_size.get(),
            reserved: raw.reserved.map(|r| r.get()),
            cmdline: raw.cmdline,
        }
    }

    fn to_raw(&self, header_version: u32) -> RawBootV3 {
        RawBootV3 {
            magic: BOOT_MAGIC,
            kernel_size: self.kernel_size.into(),
            ramdisk_size: self.ramdisk_size.into(),
            os_version: self.os_version.into(),
            header_size: self.header_size.into(),
            reserved: self.reserved.map(|r| r.into()),
            header_version: header_version.into(),
            cmdline: self.cmdline,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct BootV4Extra {
    pub signature_size: u32,
}

/// A boot image header. Each variant carries exactly the fields present in
/// that header version.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum BootHeader {
    V0 {
        base: BootHeaderV0,
    },
    V1 {
        base: BootHeaderV0,
        v1: BootV1Extra,
    },
    V2 {
        base: BootHeaderV0,
        v1: BootV1Extra,
        v2: BootV2Extra,
    },
    V3 {
        base: BootHeaderV3,
    },
    V4 {
        base: BootHeaderV3,
        v4: BootV4Extra,
    },
}

impl BootHeader {
    /// Parse a header from the beginning of `data`. Any bytes past the header
    /// are ignored.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::from_reader(data)
    }

    /// Serialize the header to its exact on-disk representation, without page
    /// padding.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::V0 { base } => base.to_raw(0).as_bytes().to_vec(),
            Self::V1 { base, v1 } => RawBootV1 {
                v0: base.to_raw(1),
                v1: v1.to_raw(),
            }
            .as_bytes()
            .to_vec(),
            Self::V2 { base, v1, v2 } => RawBootV2 {
                v0: base.to_raw(2),
                v1: v1.to_raw(),
                v2: v2.to_raw(),
            }
            .as_bytes()
            .to_vec(),
            Self::V3 { base } => base.to_raw(3).as_bytes().to_vec(),
            Self::V4 { base, v4 } => RawBootV4 {
                v3: base.to_raw(4),
                v4: RawBootV4Extra {
                    signature_size: v4.signature_size.into(),
                },
            }
            .as_bytes()
            .to_vec(),
        }
    }

    pub fn header_version(&self) -> u32 {
        match self {
            Self::V0 { .. } => 0,
            Self::V1 { .. } => 1,
            Self::V2 { .. } => 2,
            Self::V3 { .. } => 3,
            Self::V4 { .. } => 4,
        }
    }

    /// Size of the on-disk header structure for this version.
    pub fn raw_header_size(&self) -> usize {
        match self {
            Self::V0 { .. } => mem::size_of::<RawBootV0>(),
            Self::V1 { .. } => mem::size_of::<RawBootV1>(),
            Self::V2 { .. } => mem::size_of::<RawBootV2>(),
            Self::V3 { .. } => mem::size_of::<RawBootV3>(),
            Self::V4 { .. } => mem::size_of::<RawBootV4>(),
        }
    }

    pub fn page_size(&self) -> u32 {
        match self {
            Self::V0 { base } | Self::V1 { base, .. } | Self::V2 { base, .. } => base.page_size,
            Self::V3 { .. } | Self::V4 { .. } => PAGE_SIZE,
        }
    }

    pub fn kernel_size(&self) -> u32 {
        match self {
            Self::V0 { base } | Self::V1 { base, .. } | Self::V2 { base, .. } => base.kernel_size,
            Self::V3 { base } | Self::V4 { base, .. } => base.kernel_size,
        }
    }

    pub fn ramdisk_size(&self) -> u32 {
        match self {
            Self::V0 { base } | Self::V1 { base, .. } | Self::V2 { base, .. } => base.ramdisk_size,
            Self::V3 { base } | Self::V4 { base, .. } => base.ramdisk_size,
        }
    }

    pub fn os_version(&self) -> OsVersion {
        let raw = match self {
            Self::V0 { base } | Self::V1 { base, .. } | Self::V2 { base, .. } => base.os_version,
            Self::V3 { base } | Self::V4 { base, .. } => base.os_version,
        };

        OsVersion::from_raw(raw)
    }

    /// The kernel command line stored in the header. For v0 through v2, the
    /// extra command line field is a direct continuation of the main one.
    pub fn cmdline(&self) -> Vec<u8> {
        match self {
            Self::V0 { base } | Self::V1 { base, .. } | Self::V2 { base, .. } => [
                base.cmdline.trim_end_padding(),
                base.extra_cmdline.trim_end_padding(),
            ]
            .concat(),
            Self::V3 { base } | Self::V4 { base, .. } => base.cmdline.trim_end_padding().to_vec(),
        }
    }

    fn region_sizes(&self) -> Vec<(RegionKind, u32)> {
        match self {
            Self::V0 { base } => vec![
                (RegionKind::Kernel, base.kernel_size),
                (RegionKind::Ramdisk, base.ramdisk_size),
                (RegionKind::Second, base.second_size),
            ],
            Self::V1 { base, v1 } => vec![
                (RegionKind::Kernel, base.kernel_size),
                (RegionKind::Ramdisk, base.ramdisk_size),
                (RegionKind::Second, base.second_size),
                (RegionKind::RecoveryDtbo, v1.recovery_dtbo_size),
            ],
            Self::V2 { base, v1, v2 } => vec![
                (RegionKind::Kernel, base.kernel_size),
                (RegionKind::Ramdisk, base.ramdisk_size),
                (RegionKind::Second, base.second_size),
                (RegionKind::RecoveryDtbo, v1.recovery_dtbo_size),
                (RegionKind::Dtb, v2.dtb_size),
            ],
            Self::V3 { base } => vec![
                (RegionKind::Kernel, base.kernel_size),
                (RegionKind::Ramdisk, base.ramdisk_size),
            ],
            Self::V4 { base, v4 } => vec![
                (RegionKind::Kernel, base.kernel_size),
                (RegionKind::Ramdisk, base.ramdisk_size),
                (RegionKind::Signature, v4.signature_size),
            ],
        }
    }

    /// Regions that this header version can describe, in on-disk order.
    pub fn region_kinds(&self) -> Vec<RegionKind> {
        self.region_sizes().into_iter().map(|(k, _)| k).collect()
    }

    /// Update the size field for a region.
    pub fn set_region_size(&mut self, kind: RegionKind, size: u32) -> Result<()> {
        let version = self.header_version();
        let field = match (self, kind) {
            (
                Self::V0 { base } | Self::V1 { base, .. } | Self::V2 { base, .. },
                RegionKind::Kernel,
            ) => &mut base.kernel_size,
            (
                Self::V0 { base } | Self::V1 { base, .. } | Self::V2 { base, .. },
                RegionKind::Ramdisk,
            ) => &mut base.ramdisk_size,
            (
                Self::V0 { base } | Self::V1 { base, .. } | Self::V2 { base, .. },
                RegionKind::Second,
            ) => &mut base.second_size,
            (Self::V1 { v1, .. } | Self::V2 { v1, .. }, RegionKind::RecoveryDtbo) => {
                &mut v1.recovery_dtbo_size
            }
            (Self::V2 { v2, .. }, RegionKind::Dtb) => &mut v2.dtb_size,
            (Self::V3 { base } | Self::V4 { base, .. }, RegionKind::Kernel) => {
                &mut base.kernel_size
            }
            (Self::V3 { base } | Self::V4 { base, .. }, RegionKind::Ramdisk) => {
                &mut base.ramdisk_size
            }
            (Self::V4 { v4, .. }, RegionKind::Signature) => &mut v4.signature_size,
            _ => return Err(Error::NoSuchRegion(kind, version)),
        };

        *field = size;

        Ok(())
    }

    /// Compute where each non-empty region lives in the image. The header
    /// occupies the first page(s).
    pub fn layout(&self) -> Result<Vec<Region>> {
        compute_layout(self.raw_header_size(), self.page_size(), &self.region_sizes())
    }

    /// Recompute the offset fields from the current region sizes. This must be
    /// called after [`Self::set_region_size`] and before writing the header.
    /// An empty recovery dtbo has an offset of 0.
    pub fn update_offsets(&mut self) -> Result<()> {
        let layout = self.layout()?;

        if let Self::V1 { v1, .. } | Self::V2 { v1, .. } = self {
            v1.recovery_dtbo_offset = layout
                .iter()
                .find(|r| r.kind == RegionKind::RecoveryDtbo)
                .map(|r| r.offset)
                .unwrap_or_default();
        }

        Ok(())
    }
}

impl<R: Read> FromReader<R> for BootHeader {
    type Error = Error;

    fn from_reader(mut reader: R) -> Result<Self> {
        let prefix = RawBootPrefix::read_from_io(&mut reader)
            .map_err(|e| Error::DataRead("Boot::prefix", e))?;

        if prefix.magic != BOOT_MAGIC {
            return Err(Error::UnknownMagic(prefix.magic));
        }

        let header_version = prefix.header_version.get();
        trace!("Boot image header version: {header_version}");

        let mut reader = prefix.as_bytes().chain(reader);

        let header = match header_version {
            0 => {
                let raw = RawBootV0::read_from_io(&mut reader)
                    .map_err(|e| Error::DataRead("Boot::V0::header", e))?;

                Self::V0 {
                    base: BootHeaderV0::from_raw(&raw),
                }
            }
            1 => {
                let raw = RawBootV1::read_from_io(&mut reader)
                    .map_err(|e| Error::DataRead("Boot::V1::header", e))?;

                Self::V1 {
                    base: BootHeaderV0::from_raw(&raw.v0),
                    v1: BootV1Extra::from_raw(&raw.v1),
                }
            }
            2 => {
                let raw = RawBootV2::read_from_io(&mut reader)
                    .map_err(|e| Error::DataRead("Boot::V2::header", e))?;

                Self::V2 {
                    base: BootHeaderV0::from_raw(&raw.v0),
                    v1: BootV1Extra::from_raw(&raw.v1),
                    v2: BootV2Extra::from_raw(&raw.v2),
                }
            }
            3 => {
                let raw = RawBootV3::read_from_io(&mut reader)
                    .map_err(|e| Error::DataRead("Boot::V3::header", e))?;

                Self::V3 {
                    base: BootHeaderV3::from_raw(&raw),
                }
            }
            4 => {
                let raw = RawBootV4::read_from_io(&mut reader)
                    .map_err(|e| Error::DataRead("Boot::V4::header", e))?;

                Self::V4 {
                    base: BootHeaderV3::from_raw(&raw.v3),
                    v4: BootV4Extra {
                        signature_size: raw.v4.signature_size.get(),
                    },
                }
            }
            v => return Err(Error::UnknownHeaderVersion(v)),
        };

        Ok(header)
    }
}

impl<W: Write> ToWriter<W> for BootHeader {
    type Error = Error;

    fn to_writer(&self, mut writer: W) -> Result<()> {
        writer
            .write_all(&self.encode())
            .map_err(|e| Error::DataWrite("Boot::header", e))
    }
}

impl fmt::Display for BootHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Boot image v{} header:", self.header_version())?;

        match self {
            Self::V0 { base } | Self::V1 { base, .. } | Self::V2 { base, .. } => {
                writeln!(f, "- Kernel size:          {}", base.kernel_size)?;
                writeln!(f, "- Kernel address:       {:#x}", base.kernel_addr)?;
                writeln!(f, "- Ramdisk size:         {}", base.ramdisk_size)?;
                writeln!(f, "- Ramdisk address:      {:#x}", base.ramdisk_addr)?;
                writeln!(f, "- Second stage size:    {}", base.second_size)?;
                writeln!(f, "- Second stage address: {:#x}", base.second_addr)?;
                writeln!(f, "- Kernel tags address:  {:#x}", base.tags_addr)?;
                writeln!(f, "- Page size:            {}", base.page_size)?;
                writeln!(f, "- OS version:           {}", self.os_version())?;
                writeln!(
                    f,
                    "- Name:                 {:?}",
                    base.name.trim_end_padding().as_bstr(),
                )?;
                writeln!(
                    f,
                    "- Kernel cmdline:       {:?}",
                    base.cmdline.trim_end_padding().as_bstr(),
                )?;
                writeln!(f, "- ID:                   {:?}", base.id)?;
                write!(
                    f,
                    "- Extra kernel cmdline: {:?}",
                    base.extra_cmdline.trim_end_padding().as_bstr(),
                )?;
            }
            Self::V3 { base } | Self::V4 { base, .. } => {
                writeln!(f, "- Kernel size:          {}", base.kernel_size)?;
                writeln!(f, "- Ramdisk size:         {}", base.ramdisk_size)?;
                writeln!(f, "- OS version:           {}", self.os_version())?;
                writeln!(f, "- Header size:          {}", base.header_size)?;
                writeln!(f, "- Reserved:             {:?}", base.reserved)?;
                write!(
                    f,
                    "- Kernel cmdline:       {:?}",
                    base.cmdline.trim_end_padding().as_bstr(),
                )?;
            }
        }

        if let Self::V1 { v1, .. } | Self::V2 { v1, .. } = self {
            writeln!(f)?;
            writeln!(f, "- Recovery dtbo size:   {}", v1.recovery_dtbo_size)?;
            writeln!(f, "- Recovery dtbo offset: {}", v1.recovery_dtbo_offset)?;
            write!(f, "- Header size:          {}", v1.header_size)?;
        }

        if let Self::V2 { v2, .. } = self {
            writeln!(f)?;
            writeln!(f, "- Device tree size:     {}", v2.dtb_size)?;
            write!(f, "- Device tree address:  {:#x}", v2.dtb_addr)?;
        }

        if let Self::V4 { v4, .. } = self {
            writeln!(f)?;
            write!(f, "- Signature size:       {}", v4.signature_size)?;
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct VendorHeaderV3 {
    pub page_size: u32,
    pub kernel_addr: u32,
    pub ramdisk_addr: u32,
    pub vendor_ramdisk_size: u32,
    #[serde(with = "crate::escape")]
    pub cmdline: [u8; VENDOR_BOOT_ARGS_SIZE],
    pub tags_addr: u32,
    #[serde(with = "crate::escape")]
    pub name: [u8; VENDOR_BOOT_NAME_SIZE],
    pub header_size: u32,
    pub dtb_size: u32,
    pub dtb_addr: u64,
}

impl VendorHeaderV3 {
    fn from_raw(raw: &RawVendorV3) -> Self {
        Self {
            page_size: raw.page_size.get(),
            kernel_addr: raw.kernel_addr.get(),
            ramdisk_addr: raw.ramdisk_addr.get(),
            vendor_ramdisk_size: raw.vendor_ramdisk_size.get(),
            cmdline: raw.cmdline,
            tags_addr: raw.tags_addr.get(),
            name: raw.name,
            header_size: raw.header_size.get(),
            dtb_size: raw.dtb_size.get(),
            dtb_addr: raw.dtb_addr.get(),
        }
    }

    fn to_raw(&self, header_version: u32) -> RawVendorV3 {
        RawVendorV3 {
            magic: VENDOR_BOOT_MAGIC,
            header_version: header_version.into(),
            page_size: self.page_size.into(),
            kernel_addr: self.kernel_addr.into(),
            ramdisk_addr: self.ramdisk_addr.into(),
            vendor_ramdisk_size: self.vendor_ramdisk_size.into(),
            cmdline: self.cmdline,
            tags_addr: self.tags_addr.into(),
            name: self.name,
            header_size: self.header_size.into(),
            dtb_size: self.dtb_size.into(),
            dtb_addr: self.dtb_addr.into(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct VendorV4Extra {
    pub vendor_ramdisk_table_size: u32,
    pub vendor_ramdisk_table_entry_num: u32,
    pub vendor_ramdisk_table_entry_size: u32,
    pub bootconfig_size: u32,
}

impl VendorV4Extra {
    fn from_raw(raw: &RawVendorV4Extra) -> Self {
        Self {
            vendor_ramdisk_table_size: raw.vendor_ramdisk_table_size.get(),
            vendor_ramdisk_table_entry_num: raw.vendor_ramdisk_table_entry_num.get(),
            vendor_ramdisk_table_entry_size: raw.vendor_ramdisk_table_entry_size.get(),
            bootconfig_size: raw.bootconfig_size.get(),
        }
    }

    fn to_raw(&self) -> RawVendorV4Extra {
        RawVendorV4Extra {
            vendor_ramdisk_table_size: self.vendor_ramdisk_table_size.into(),
            vendor_ramdisk_table_entry_num: self.vendor_ramdisk_table_entry_num.into(),
            vendor_ramdisk_table_entry_size: self.vendor_ramdisk_table_entry_size.into(),
            bootconfig_size: self.bootconfig_size.into(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum VendorBootHeader {
    VendorV3 {
        base: VendorHeaderV3,
    },
    VendorV4 {
        base: VendorHeaderV3,
        v4: VendorV4Extra,
    },
}

impl VendorBootHeader {
    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::from_reader(data)
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::VendorV3 { base } => base.to_raw(3).as_bytes().to_vec(),
            Self::VendorV4 { base, v4 } => RawVendorV4 {
                v3: base.to_raw(4),
                v4: v4.to_raw(),
            }
            .as_bytes()
            .to_vec(),
        }
    }

    pub fn header_version(&self) -> u32 {
        match self {
            Self::VendorV3 { .. } => 3,
            Self::VendorV4 { .. } => 4,
        }
    }

    pub fn raw_header_size(&self) -> usize {
        match self {
            Self::VendorV3 { .. } => mem::size_of::<RawVendorV3>(),
            Self::VendorV4 { .. } => mem::size_of::<RawVendorV4>(),
        }
    }

    fn base(&self) -> &VendorHeaderV3 {
        match self {
            Self::VendorV3 { base } | Self::VendorV4 { base, .. } => base,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.base().page_size
    }

    pub fn cmdline(&self) -> &[u8] {
        self.base().cmdline.trim_end_padding()
    }

    pub fn bootconfig_size(&self) -> Option<u32> {
        match self {
            Self::VendorV3 { .. } => None,
            Self::VendorV4 { v4, .. } => Some(v4.bootconfig_size),
        }
    }

    fn region_sizes(&self) -> Vec<(RegionKind, u32)> {
        match self {
            Self::VendorV3 { base } => vec![
                (RegionKind::VendorRamdisk, base.vendor_ramdisk_size),
                (RegionKind::Dtb, base.dtb_size),
            ],
            Self::VendorV4 { base, v4 } => vec![
                (RegionKind::VendorRamdisk, base.vendor_ramdisk_size),
                (RegionKind::Dtb, base.dtb_size),
                (RegionKind::VendorRamdiskTable, v4.vendor_ramdisk_table_size),
                (RegionKind::Bootconfig, v4.bootconfig_size),
            ],
        }
    }

    pub fn region_kinds(&self) -> Vec<RegionKind> {
        self.region_sizes().into_iter().map(|(k, _)| k).collect()
    }

    /// Update the size field for a region. Replacing the ramdisk table also
    /// updates the entry count, assuming entries of the standard size.
    pub fn set_region_size(&mut self, kind: RegionKind, size: u32) -> Result<()> {
        let version = self.header_version();

        match (self, kind) {
            (Self::VendorV3 { base } | Self::VendorV4 { base, .. }, RegionKind::VendorRamdisk) => {
                base.vendor_ramdisk_size = size;
            }
            (Self::VendorV3 { base } | Self::VendorV4 { base, .. }, RegionKind::Dtb) => {
                base.dtb_size = size;
            }
            (Self::VendorV4 { v4, .. }, RegionKind::VendorRamdiskTable) => {
                let entry_size = VendorRamdiskTable::ENTRY_SIZE as u32;

                v4.vendor_ramdisk_table_size = size;
                v4.vendor_ramdisk_table_entry_size = entry_size;
                v4.vendor_ramdisk_table_entry_num = size / entry_size;
            }
            (Self::VendorV4 { v4, .. }, RegionKind::Bootconfig) => {
                v4.bootconfig_size = size;
            }
            _ => return Err(Error::NoSuchRegion(kind, version)),
        }

        Ok(())
    }

    pub fn layout(&self) -> Result<Vec<Region>> {
        compute_layout(self.raw_header_size(), self.page_size(), &self.region_sizes())
    }
}

impl<R: Read> FromReader<R> for VendorBootHeader {
    type Error = Error;

    fn from_reader(mut reader: R) -> Result<Self> {
        let prefix = RawVendorPrefix::read_from_io(&mut reader)
            .map_err(|e| Error::DataRead("Vendor::prefix", e))?;

        if prefix.magic != VENDOR_BOOT_MAGIC {
            return Err(Error::UnknownMagic(prefix.magic));
        }

        let header_version = prefix.header_version.get();
        trace!("Vendor boot image header version: {header_version}");

        let mut reader = prefix.as_bytes().chain(reader);

        let header = match header_version {
            3 => {
                let raw = RawVendorV3::read_from_io(&mut reader)
                    .map_err(|e| Error::DataRead("Vendor::V3::header", e))?;

                Self::VendorV3 {
                    base: VendorHeaderV3::from_raw(&raw),
                }
            }
            4 => {
                let raw = RawVendorV4::read_from_io(&mut reader)
                    .map_err(|e| Error::DataRead("Vendor::V4::header", e))?;

                Self::VendorV4 {
                    base: VendorHeaderV3::from_raw(&raw.v3),
                    v4: VendorV4Extra::from_raw(&raw.v4),
                }
            }
            v => return Err(Error::UnknownHeaderVersion(v)),
        };

        Ok(header)
    }
}

impl<W: Write> ToWriter<W> for VendorBootHeader {
    type Error = Error;

    fn to_writer(&self, mut writer: W) -> Result<()> {
        writer
            .write_all(&self.encode())
            .map_err(|e| Error::DataWrite("Vendor::header", e))
    }
}

impl fmt::Display for VendorBootHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.base();

        writeln!(f, "Vendor boot image v{} header:", self.header_version())?;
        writeln!(f, "- Page size:                  {}", base.page_size)?;
        writeln!(f, "- Kernel address:             {:#x}", base.kernel_addr)?;
        writeln!(f, "- Ramdisk address:            {:#x}", base.ramdisk_addr)?;
        writeln!(f, "- Vendor ramdisk size:        {}", base.vendor_ramdisk_size)?;
        writeln!(
            f,
            "- Vendor cmdline:             {:?}",
            base.cmdline.trim_end_padding().as_bstr(),
        )?;
        writeln!(f, "- Kernel tags address:        {:#x}", base.tags_addr)?;
        writeln!(
            f,
            "- Name:                       {:?}",
            base.name.trim_end_padding().as_bstr(),
        )?;
        writeln!(f, "- Header size:                {}", base.header_size)?;
        writeln!(f, "- Device tree size:           {}", base.dtb_size)?;
        write!(f, "- Device tree address:        {:#x}", base.dtb_addr)?;

        if let Self::VendorV4 { v4, .. } = self {
            writeln!(f)?;
            writeln!(
                f,
                "- Ramdisk table size:         {}",
                v4.vendor_ramdisk_table_size,
            )?;
            writeln!(
                f,
                "- Ramdisk table entries:      {}",
                v4.vendor_ramdisk_table_entry_num,
            )?;
            writeln!(
                f,
                "- Ramdisk table entry size:   {}",
                v4.vendor_ramdisk_table_entry_size,
            )?;
            write!(f, "- Bootconfig size:            {}", v4.bootconfig_size)?;
        }

        Ok(())
    }
}

/// Either kind of header, detected by magic.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ImageHeader {
    Boot(BootHeader),
    Vendor(VendorBootHeader),
}

impl ImageHeader {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Boot(h) => h.encode(),
            Self::Vendor(h) => h.encode(),
        }
    }

    pub fn page_size(&self) -> u32 {
        match self {
            Self::Boot(h) => h.page_size(),
            Self::Vendor(h) => h.page_size(),
        }
    }

    pub fn region_kinds(&self) -> Vec<RegionKind> {
        match self {
            Self::Boot(h) => h.region_kinds(),
            Self::Vendor(h) => h.region_kinds(),
        }
    }

    pub fn set_region_size(&mut self, kind: RegionKind, size: u32) -> Result<()> {
        match self {
            Self::Boot(h) => h.set_region_size(kind, size),
            Self::Vendor(h) => h.set_region_size(kind, size),
        }
    }

    pub fn layout(&self) -> Result<Vec<Region>> {
        match self {
            Self::Boot(h) => h.layout(),
            Self::Vendor(h) => h.layout(),
        }
    }

    /// Recompute offset fields. Vendor boot headers have none.
    pub fn update_offsets(&mut self) -> Result<()> {
        match self {
            Self::Boot(h) => h.update_offsets(),
            Self::Vendor(_) => Ok(()),
        }
    }
}

impl<R: Read> FromReader<R> for ImageHeader {
    type Error = Error;

    fn from_reader(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .map_err(|e| Error::DataRead("Image::magic", e))?;

        let reader = magic.as_slice().chain(reader);

        match magic {
            BOOT_MAGIC => BootHeader::from_reader(reader).map(Self::Boot),
            VENDOR_BOOT_MAGIC => VendorBootHeader::from_reader(reader).map(Self::Vendor),
            m => Err(Error::UnknownMagic(m)),
        }
    }
}

impl<W: Write> ToWriter<W> for ImageHeader {
    type Error = Error;

    fn to_writer(&self, writer: W) -> Result<()> {
        match self {
            Self::Boot(h) => h.to_writer(writer),
            Self::Vendor(h) => h.to_writer(writer),
        }
    }
}

impl fmt::Display for ImageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boot(h) => h.fmt(f),
            Self::Vendor(h) => h.fmt(f),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RegionKind {
    Kernel,
    Ramdisk,
    Second,
    RecoveryDtbo,
    Dtb,
    Signature,
    VendorRamdisk,
    VendorRamdiskTable,
    Bootconfig,
}

impl RegionKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Kernel => "kernel",
            Self::Ramdisk => "ramdisk",
            Self::Second => "second",
            Self::RecoveryDtbo => "recovery_dtbo",
            Self::Dtb => "dtb",
            Self::Signature => "signature",
            Self::VendorRamdisk => "vendor_ramdisk",
            Self::VendorRamdiskTable => "vendor_ramdisk_table",
            Self::Bootconfig => "bootconfig",
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A page-aligned section of an image.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Region {
    pub kind: RegionKind,
    pub offset: u64,
    pub size: u64,
    pub page_count: u64,
}

impl Region {
    /// Get the region's data from a full image.
    pub fn slice<'a>(&self, image: &'a [u8]) -> Result<&'a [u8]> {
        let out_of_bounds = || Error::RegionOutOfBounds {
            kind: self.kind,
            offset: self.offset,
            size: self.size,
            image_size: image.len(),
        };

        let start = self.offset.to_usize().ok_or_else(out_of_bounds)?;
        let end = self
            .offset
            .checked_add(self.size)
            .and_then(|e| e.to_usize())
            .ok_or_else(out_of_bounds)?;

        image.get(start..end).ok_or_else(out_of_bounds)
    }
}

fn compute_layout(
    raw_header_size: usize,
    page_size: u32,
    sizes: &[(RegionKind, u32)],
) -> Result<Vec<Region>> {
    if page_size == 0 {
        return Err(Error::PageSizeZero);
    }

    let page_size = u64::from(page_size);
    let mut offset = padding::round(raw_header_size as u64, page_size)
        .ok_or(Error::IntOverflow("Layout::header"))?;
    let mut regions = vec![];

    for &(kind, size) in sizes {
        if size == 0 {
            continue;
        }

        let size = u64::from(size);
        let page_count = util::div_ceil(size, page_size);

        regions.push(Region {
            kind,
            offset,
            size,
            page_count,
        });

        offset = page_count
            .checked_mul(page_size)
            .and_then(|n| offset.checked_add(n))
            .ok_or(Error::IntOverflow(kind.name()))?;
    }

    Ok(regions)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RamdiskType {
    None,
    Platform,
    Recovery,
    Dlkm,
}

impl TryFrom<u32> for RamdiskType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Platform),
            2 => Ok(Self::Recovery),
            3 => Ok(Self::Dlkm),
            v => Err(Error::UnknownRamdiskType(v)),
        }
    }
}

impl From<RamdiskType> for u32 {
    fn from(value: RamdiskType) -> Self {
        match value {
            RamdiskType::None => 0,
            RamdiskType::Platform => 1,
            RamdiskType::Recovery => 2,
            RamdiskType::Dlkm => 3,
        }
    }
}

impl fmt::Display for RamdiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Platform => "platform",
            Self::Recovery => "recovery",
            Self::Dlkm => "dlkm",
        };

        f.write_str(name)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct VendorRamdiskTableEntry {
    pub ramdisk_size: u32,
    pub ramdisk_offset: u32,
    pub ramdisk_type: RamdiskType,
    #[serde(with = "crate::escape")]
    pub ramdisk_name: [u8; VENDOR_RAMDISK_NAME_SIZE],
    pub board_id: [u32; VENDOR_RAMDISK_TABLE_ENTRY_BOARD_ID_SIZE],
}

/// The vendor v4 ramdisk table. Entries partition the vendor ramdisk section
/// contiguously, in order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct VendorRamdiskTable {
    pub entries: Vec<VendorRamdiskTableEntry>,
}

impl VendorRamdiskTable {
    pub const ENTRY_SIZE: usize = mem::size_of::<RawVendorRamdiskTableEntry>();

    /// Parse the ramdisk table region and validate it against the header.
    pub fn decode(data: &[u8], header: &VendorBootHeader) -> Result<Self> {
        let VendorBootHeader::VendorV4 { base, v4 } = header else {
            return Err(Error::NotVendorV4(header.header_version()));
        };

        if v4.vendor_ramdisk_table_entry_size as usize != Self::ENTRY_SIZE {
            return Err(Error::VendorV4InvalidRamdiskEntrySize(
                v4.vendor_ramdisk_table_entry_size,
            ));
        }

        let expected = v4
            .vendor_ramdisk_table_entry_num
            .checked_mul(v4.vendor_ramdisk_table_entry_size)
            .ok_or(Error::IntOverflow("Vendor::V4::vendor_ramdisk_table_size"))?;
        if v4.vendor_ramdisk_table_size != expected {
            return Err(Error::VendorV4InvalidRamdiskTableSize {
                actual: v4.vendor_ramdisk_table_size,
                expected,
            });
        }

        let mut reader = data;
        let mut entries = vec![];
        let mut total_size = 0u32;

        for index in 0..v4.vendor_ramdisk_table_entry_num {
            let raw = RawVendorRamdiskTableEntry::read_from_io(&mut reader)
                .map_err(|e| Error::DataRead("Vendor::V4::table_entry", e))?;

            let ramdisk_offset = raw.ramdisk_offset.get();
            if ramdisk_offset != total_size {
                return Err(Error::VendorV4InvalidRamdiskEntryOffset {
                    index,
                    field_value: ramdisk_offset,
                    expected: total_size,
                });
            }

            let ramdisk_size = raw.ramdisk_size.get();
            total_size = total_size
                .checked_add(ramdisk_size)
                .ok_or(Error::IntOverflow("Vendor::V4::vendor_ramdisk_size"))?;

            entries.push(VendorRamdiskTableEntry {
                ramdisk_size,
                ramdisk_offset,
                ramdisk_type: raw.ramdisk_type.get().try_into()?,
                ramdisk_name: raw.ramdisk_name,
                board_id: raw.board_id.map(|id| id.get()),
            });
        }

        if total_size != base.vendor_ramdisk_size {
            return Err(Error::VendorV4InvalidRamdiskSize {
                field_value: base.vendor_ramdisk_size,
                total_size,
            });
        }

        Ok(Self { entries })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.entries.len() * Self::ENTRY_SIZE);

        for entry in &self.entries {
            let raw = RawVendorRamdiskTableEntry {
                ramdisk_size: entry.ramdisk_size.into(),
                ramdisk_offset: entry.ramdisk_offset.into(),
                ramdisk_type: u32::from(entry.ramdisk_type).into(),
                ramdisk_name: entry.ramdisk_name,
                board_id: entry.board_id.map(|id| id.into()),
            };

            data.extend_from_slice(raw.as_bytes());
        }

        data
    }

    pub fn by_type(
        &self,
        ramdisk_type: RamdiskType,
    ) -> impl Iterator<Item = &VendorRamdiskTableEntry> {
        self.entries
            .iter()
            .filter(move |e| e.ramdisk_type == ramdisk_type)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KernelArch {
    AArch64,
    Other,
}

impl fmt::Display for KernelArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AArch64 => f.write_str("aarch64"),
            Self::Other => f.write_str("other"),
        }
    }
}

/// Check for the AArch64 `Image` magic. Data too short to hold the header is
/// not an AArch64 kernel.
pub fn probe_kernel_arch(data: &[u8]) -> KernelArch {
    match RawKernel64Header::read_from_prefix(data) {
        Ok((header, _)) if header.magic.get() == KERNEL64_MAGIC => KernelArch::AArch64,
        _ => KernelArch::Other,
    }
}
