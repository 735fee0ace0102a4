// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cmdline::{
    facts::{BootFacts, DeviceFlags},
    memory::MemoryOffline,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read device facts: {0:?}")]
    Read(String, #[source] io::Error),
    #[error("Failed to parse device facts")]
    Parse(#[from] toml_edit::de::Error),
    #[error("Failed to serialize device facts")]
    Serialize(#[from] toml_edit::ser::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Device facts loaded from a TOML file. Missing keys are unavailable facts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceFacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chip_baseband: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_config: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtbo_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtb_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_binary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub le_verity_cmdline: Option<String>,
    pub pause_for_battery_charge: bool,
    pub flags: DeviceFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_offline: Option<MemoryOffline>,
}

impl DeviceFacts {
    pub fn load(path: &Path) -> Result<Self> {
        let data =
            fs::read_to_string(path).map_err(|e| Error::Read(path.display().to_string(), e))?;

        Self::from_toml(&data)
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        let facts = toml_edit::de::from_str(data)?;

        Ok(facts)
    }

    pub fn to_toml(&self) -> Result<String> {
        let data = toml_edit::ser::to_string_pretty(self)?;

        Ok(data)
    }
}

impl BootFacts for DeviceFacts {
    fn serial_number(&self) -> Option<String> {
        self.serial_number.clone()
    }

    fn slot_suffix(&self) -> Option<String> {
        self.slot_suffix.clone()
    }

    fn boot_device(&self) -> Option<String> {
        self.boot_device.clone()
    }

    fn root_device_type(&self) -> Option<String> {
        self.root_device_type.clone()
    }

    fn chip_baseband(&self) -> Option<String> {
        self.chip_baseband.clone()
    }

    fn display_config(&self) -> Option<String> {
        self.display_config.clone()
    }

    /// The DDR sizes come from the `[memory_offline]` table. The offline sizes
    /// table comes from the device tree's `/mem-offline` node if present.
    fn memory_limit(&self, device_tree: Option<&[u8]>) -> Option<u64> {
        if self.flags.contains(DeviceFlags::LE_VARIANT) {
            return None;
        }

        self.memory_offline
            .as_ref()
            .and_then(|m| m.limit_with_device_tree(device_tree))
    }

    fn dtbo_index(&self) -> Option<u32> {
        self.dtbo_index
    }

    fn dtb_index(&self) -> Option<u32> {
        self.dtb_index
    }

    fn le_verity_cmdline(&self, _raw_cmdline: &str) -> Option<String> {
        self.le_verity_cmdline.clone()
    }

    fn pause_for_battery_charge(&self) -> bool {
        self.pause_for_battery_charge
    }

    fn init_binary(&self) -> String {
        self.init_binary
            .clone()
            .unwrap_or_else(|| "/init".to_owned())
    }

    fn flags(&self) -> DeviceFlags {
        self.flags
    }
}
