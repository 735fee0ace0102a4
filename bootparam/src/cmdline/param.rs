// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use memchr::memmem;

const ANDROIDBOOT_PREFIX: &[u8] = b"androidboot.";

/// Header versions up to this one predate bootconfig.
pub const LAST_LEGACY_HEADER_VERSION: u32 = 3;

/// Check if `text` is an `androidboot.*` parameter that belongs in bootconfig
/// for the given boot image header version.
pub fn is_android_boot_param(text: &str, header_version: u32) -> bool {
    if text.len() < ANDROIDBOOT_PREFIX.len() {
        return false;
    }
    if header_version <= LAST_LEGACY_HEADER_VERSION {
        return false;
    }

    memmem::find(text.as_bytes(), ANDROIDBOOT_PREFIX).is_some()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    CmdLine,
    BootConfig,
}

/// A single piece of either output. Command line fragments carry their own
/// leading space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub destination: Destination,
}

impl Fragment {
    /// A fragment that always goes to the command line.
    pub fn cmdline(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            destination: Destination::CmdLine,
        }
    }

    /// A `key` + `value` fragment, routed by the key.
    pub fn param(key: &str, value: &str, header_version: u32) -> Self {
        Self {
            text: format!("{key}{value}"),
            destination: Self::route(key, header_version),
        }
    }

    /// An opaque fragment, routed by its whole text.
    pub fn classified(text: impl Into<String>, header_version: u32) -> Self {
        let text = text.into();
        let destination = Self::route(&text, header_version);

        Self { text, destination }
    }

    fn route(text: &str, header_version: u32) -> Destination {
        if is_android_boot_param(text, header_version) {
            Destination::BootConfig
        } else {
            Destination::CmdLine
        }
    }

    /// The verified boot command line. On bootconfig-capable headers, it is
    /// moved to bootconfig with one parameter per line. Runs of whitespace
    /// would become empty lines, so they are collapsed.
    pub fn verified_boot(text: &str, header_version: u32) -> Self {
        if is_android_boot_param(text, header_version) {
            Self {
                text: text.split_whitespace().collect::<Vec<_>>().join("\n"),
                destination: Destination::BootConfig,
            }
        } else {
            Self::cmdline(text)
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// One bootconfig entry. Spaces are not allowed in bootconfig, so they are
/// removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootConfigParamNode {
    param: String,
}

impl BootConfigParamNode {
    pub fn new(text: &str) -> Self {
        Self {
            param: text.chars().filter(|c| *c != ' ').collect(),
        }
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    pub fn len(&self) -> usize {
        self.param.len()
    }

    pub fn is_empty(&self) -> bool {
        self.param.is_empty()
    }
}

impl fmt::Display for BootConfigParamNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.param)
    }
}
