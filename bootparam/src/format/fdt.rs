// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Minimal read-only flattened device tree parser. Only property lookups by
//! node path are supported.

use std::mem;

use bstr::ByteSlice;
use thiserror::Error;
use zerocopy::{FromBytes, big_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::format::padding;

pub const FDT_MAGIC: u32 = 0xd00dfeed;

/// Newest layout whose readers can parse this format.
const LAST_COMPATIBLE_VERSION: u32 = 17;
/// First version with the `size_dt_struct` field.
const STRUCT_SIZE_VERSION: u32 = 17;

const TOKEN_BEGIN_NODE: u32 = 0x1;
const TOKEN_END_NODE: u32 = 0x2;
const TOKEN_PROP: u32 = 0x3;
const TOKEN_NOP: u32 = 0x4;
const TOKEN_END: u32 = 0x9;

const TOKEN_ALIGNMENT: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown device tree magic: {0:#010x}")]
    UnknownMagic(u32),
    #[error("Unsupported device tree version: {0}")]
    UnsupportedVersion(u32),
    #[error("Device tree {0} block is out of bounds")]
    BlockOutOfBounds(&'static str),
    #[error("Device tree is truncated while reading {0}")]
    Truncated(&'static str),
    #[error("Unknown device tree token {token:#x} at offset {offset}")]
    UnknownToken { token: u32, offset: usize },
    #[error("Unbalanced node end at offset {0}")]
    UnbalancedNode(usize),
}

type Result<T> = std::result::Result<T, Error>;

/// Raw on-disk layout for the device tree header. All fields are big endian.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawHeader {
    /// Magic value. This should be equal to [`FDT_MAGIC`].
    magic: big_endian::U32,
    total_size: big_endian::U32,
    off_dt_struct: big_endian::U32,
    off_dt_strings: big_endian::U32,
    off_mem_rsvmap: big_endian::U32,
    version: big_endian::U32,
    last_comp_version: big_endian::U32,
    boot_cpuid_phys: big_endian::U32,
    size_dt_strings: big_endian::U32,
    size_dt_struct: big_endian::U32,
}

pub const HEADER_SIZE: usize = mem::size_of::<RawHeader>();

fn block<'a>(data: &'a [u8], offset: u32, size: u32, name: &'static str) -> Result<&'a [u8]> {
    let start = offset as usize;
    let end = start
        .checked_add(size as usize)
        .ok_or(Error::BlockOutOfBounds(name))?;

    data.get(start..end).ok_or(Error::BlockOutOfBounds(name))
}

fn read_u32(data: &[u8], offset: usize, field: &'static str) -> Result<u32> {
    let (value, _) = data
        .get(offset..)
        .and_then(|d| big_endian::U32::read_from_prefix(d).ok())
        .ok_or(Error::Truncated(field))?;

    Ok(value.get())
}

fn read_cstr<'a>(data: &'a [u8], offset: usize, field: &'static str) -> Result<&'a [u8]> {
    let rest = data.get(offset..).ok_or(Error::Truncated(field))?;
    let end = memchr::memchr(0, rest).ok_or(Error::Truncated(field))?;

    Ok(&rest[..end])
}

fn align(offset: usize, field: &'static str) -> Result<usize> {
    padding::round(offset, TOKEN_ALIGNMENT).ok_or(Error::Truncated(field))
}

/// A path component matches a node name exactly or, when the component has no
/// unit address, the part of the name before `@`.
fn name_matches(node: &[u8], component: &[u8]) -> bool {
    if node == component {
        return true;
    }

    !component.contains(&b'@') && node.split_str("@").next() == Some(component)
}

#[derive(Clone, Copy, Debug)]
pub struct DeviceTree<'a> {
    structs: &'a [u8],
    strings: &'a [u8],
    pub version: u32,
}

impl<'a> DeviceTree<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let (header, _) =
            RawHeader::read_from_prefix(data).map_err(|_| Error::Truncated("header"))?;

        if header.magic.get() != FDT_MAGIC {
            return Err(Error::UnknownMagic(header.magic.get()));
        }

        let version = header.version.get();
        if header.last_comp_version.get() > LAST_COMPATIBLE_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let total_size = header.total_size.get();
        let data = block(data, 0, total_size, "total")?;

        let struct_size = if version >= STRUCT_SIZE_VERSION {
            header.size_dt_struct.get()
        } else {
            total_size.saturating_sub(header.off_dt_struct.get())
        };

        Ok(Self {
            structs: block(data, header.off_dt_struct.get(), struct_size, "struct")?,
            strings: block(
                data,
                header.off_dt_strings.get(),
                header.size_dt_strings.get(),
                "strings",
            )?,
            version,
        })
    }

    /// Find the value of property `name` in the node at `path`, like
    /// `/mem-offline`. Returns [`None`] if the node or property does not exist.
    pub fn property(&self, path: &str, name: &str) -> Result<Option<&'a [u8]>> {
        let components = path
            .split('/')
            .filter(|c| !c.is_empty())
            .map(str::as_bytes)
            .collect::<Vec<_>>();

        let mut offset = 0;
        // The root node is at depth 1.
        let mut depth = 0usize;
        let mut matched = 0usize;

        loop {
            let token_offset = offset;
            let token = read_u32(self.structs, offset, "token")?;
            offset += 4;

            match token {
                TOKEN_BEGIN_NODE => {
                    let node_name = read_cstr(self.structs, offset, "node name")?;
                    offset = align(offset + node_name.len() + 1, "node name")?;
                    depth += 1;

                    if depth >= 2
                        && matched == depth - 2
                        && matched < components.len()
                        && name_matches(node_name, components[matched])
                    {
                        matched += 1;
                    }
                }
                TOKEN_END_NODE => {
                    if depth == 0 {
                        return Err(Error::UnbalancedNode(token_offset));
                    }
                    if depth >= 2 && matched == depth - 1 {
                        matched -= 1;
                    }
                    depth -= 1;
                }
                TOKEN_PROP => {
                    let len = read_u32(self.structs, offset, "property length")? as usize;
                    let name_offset = read_u32(self.structs, offset + 4, "property name")?;
                    offset += 8;

                    let value = offset
                        .checked_add(len)
                        .and_then(|end| self.structs.get(offset..end))
                        .ok_or(Error::Truncated("property value"))?;
                    offset = align(offset + len, "property value")?;

                    if matched == components.len() && depth == matched + 1 {
                        let prop_name =
                            read_cstr(self.strings, name_offset as usize, "property name")?;
                        if prop_name == name.as_bytes() {
                            return Ok(Some(value));
                        }
                    }
                }
                TOKEN_NOP => {}
                TOKEN_END => return Ok(None),
                token => {
                    return Err(Error::UnknownToken {
                        token,
                        offset: token_offset,
                    });
                }
            }
        }
    }
}

/// Decode a property value as big endian 64-bit cells. Trailing bytes that do
/// not form a full cell are ignored.
pub fn u64_cells(value: &[u8]) -> Vec<u64> {
    value
        .chunks_exact(8)
        .filter_map(|c| big_endian::U64::read_from_bytes(c).ok())
        .map(|v| v.get())
        .collect()
}
