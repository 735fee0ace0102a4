// SPDX-FileCopyrightText: 2023 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Serde helpers for fixed-size, NUL-padded header fields (names and command
//! lines). The trailing padding is dropped when serializing and the remaining
//! bytes are written as a bstr-escaped string, so that non-UTF-8 data survives
//! a round trip through TOML.

use std::{fmt, marker::PhantomData};

use bstr::{ByteSlice, ByteVec};
use serde::{Deserializer, Serializer, de::Visitor};
use thiserror::Error;

use crate::format::padding::ZeroPadding;

#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("Decoded field size ({actual}) exceeds maximum size ({max})")]
    TooLong { max: usize, actual: usize },
}

pub fn serialize<S, const N: usize>(data: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = data.trim_end_padding().escape_bytes().to_string();
    serializer.serialize_str(&s)
}

/// Unescape `data` and pad it with zeros to `N` bytes.
pub fn unescape_padded<const N: usize>(data: &str) -> Result<[u8; N], Error> {
    let decoded = Vec::<u8>::unescape_bytes(data);

    decoded.to_padded_array::<N>().ok_or(Error::TooLong {
        max: N,
        actual: decoded.len(),
    })
}

pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
where
    D: Deserializer<'de>,
{
    struct PaddedStrVisitor<const N: usize>(PhantomData<[u8; N]>);

    impl<const N: usize> Visitor<'_> for PaddedStrVisitor<N> {
        type Value = [u8; N];

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "an escaped string of at most {N} bytes")
        }

        fn visit_str<E>(self, data: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            unescape_padded(data).map_err(serde::de::Error::custom)
        }
    }

    deserializer.deserialize_str(PaddedStrVisitor(PhantomData))
}
