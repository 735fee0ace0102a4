// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! The semver versioning covers the CLI only. All Rust APIs can change at any
//! time, even in patch releases.
//!
//! The CLI source files use concrete types wherever possible for simplicity,
//! while the "library"-style source files aim to be generic.

pub mod cli;
pub mod cmdline;
pub mod config;
pub mod escape;
pub mod format;
pub mod stream;
pub mod util;
