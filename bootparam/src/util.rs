/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    fmt,
    ops::{Bound, RangeBounds},
};

use num_traits::PrimInt;
use thiserror::Error;

pub const ZEROS: [u8; 16384] = [0u8; 16384];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Value {value} is outside of the range {range}")]
pub struct OutOfBoundsError {
    pub value: String,
    pub range: String,
}

fn bound_str<T: fmt::Display>(bound: Bound<&T>) -> String {
    match bound {
        Bound::Included(v) | Bound::Excluded(v) => v.to_string(),
        Bound::Unbounded => String::new(),
    }
}

/// Ensure that `value` is within `range`. The value is returned unchanged on
/// success so that this can be chained with other conversions.
pub fn check_bounds<T, R>(value: T, range: R) -> Result<T, OutOfBoundsError>
where
    T: PartialOrd + fmt::Display,
    R: RangeBounds<T>,
{
    if range.contains(&value) {
        return Ok(value);
    }

    let start = bound_str(range.start_bound());
    let end = match range.end_bound() {
        Bound::Included(v) => format!("={v}"),
        b => bound_str(b),
    };

    Err(OutOfBoundsError {
        value: value.to_string(),
        range: format!("{start}..{end}"),
    })
}

/// Divide and round up. Used for page counts where a partial page still
/// occupies a full page on disk.
pub fn div_ceil<N: PrimInt>(value: N, divisor: N) -> N {
    let q = value / divisor;
    if value % divisor == N::zero() {
        q
    } else {
        q + N::one()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds() {
        assert_eq!(check_bounds(5u32, ..=5), Ok(5));
        assert_eq!(
            check_bounds(6u32, ..=5),
            Err(OutOfBoundsError {
                value: "6".to_owned(),
                range: "..=5".to_owned(),
            })
        );
        assert_eq!(
            check_bounds(1u32, 2..4).unwrap_err().range,
            "2..4".to_owned(),
        );
    }

    #[test]
    fn rounding_division() {
        assert_eq!(div_ceil(0u64, 4096), 0);
        assert_eq!(div_ceil(1u64, 4096), 1);
        assert_eq!(div_ceil(4096u64, 4096), 1);
        assert_eq!(div_ceil(4097u64, 4096), 2);
    }
}
