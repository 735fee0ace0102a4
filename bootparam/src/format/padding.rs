// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::io::{self, Seek, Write};

use num_traits::PrimInt;

use crate::stream::WriteZerosExt;

/// Calculate the amount of padding that needs to be added to align the
/// specified offset to a multiple of `alignment`.
pub fn calc<N: PrimInt>(offset: N, alignment: N) -> N {
    let r = offset % alignment;
    if r == N::zero() {
        N::zero()
    } else {
        alignment - r
    }
}

/// Round to the next multiple of `alignment`.
pub fn round<N: PrimInt>(offset: N, alignment: N) -> Option<N> {
    let remain = calc(offset, alignment);
    offset.checked_add(&remain)
}

/// Write zeros until the next multiple of the page size. [`Seek`] is only used
/// for querying the file position.
pub fn write_zeros(mut writer: impl Write + Seek, page_size: u64) -> io::Result<u64> {
    let pos = writer.stream_position()?;
    let padding = calc(pos, page_size);

    writer.write_zeros_exact(padding)?;

    Ok(padding)
}

pub trait ZeroPadding {
    /// Trim trailing zeros. Intermediate zeros before the last non-zero byte
    /// are kept.
    fn trim_end_padding(&self) -> &[u8];

    /// Return the slice as an array padded with zeros at the end.
    fn to_padded_array<const N: usize>(&self) -> Option<[u8; N]>;
}

impl ZeroPadding for [u8] {
    fn trim_end_padding(&self) -> &[u8] {
        let first_ending_zero = self
            .iter()
            .rposition(|b| *b != 0)
            .map(|pos| pos + 1)
            .unwrap_or_default();

        &self[..first_ending_zero]
    }

    fn to_padded_array<const N: usize>(&self) -> Option<[u8; N]> {
        if self.len() > N {
            return None;
        }

        let mut result = [0u8; N];
        result[..self.len()].copy_from_slice(self);

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment() {
        assert_eq!(calc(0u32, 4), 0);
        assert_eq!(calc(5u32, 4), 3);
        assert_eq!(calc(4096u64, 4096), 0);
        assert_eq!(round(4097u64, 4096), Some(8192));
        assert_eq!(round(u32::MAX, 4), None);
    }

    #[test]
    fn trim_and_pad() {
        assert_eq!(b"ab\0c\0\0".trim_end_padding(), b"ab\0c");
        assert_eq!(b"\0\0".trim_end_padding(), b"");
        assert_eq!(b"ab".to_padded_array::<4>(), Some(*b"ab\0\0"));
        assert_eq!(b"abcde".to_padded_array::<4>(), None);
    }
}
