// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Boolean properties of the device and the build that was booted.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
    pub struct DeviceFlags: u32 {
        /// Mobile device theft protection is active.
        const MDTP_ACTIVE = 1 << 0;
        /// The `super` partition is used.
        const DYNAMIC_PARTITIONS = 1 << 1;
        /// The boot partition has A/B slots.
        const MULTI_SLOT = 1 << 2;
        /// The image was booted directly from a boot device image.
        const BOOT_DEVICE_IMAGE = 1 << 3;
        /// Linux Embedded build instead of Android.
        const LE_VARIANT = 1 << 4;
        const SYSTEM_AS_ROOT = 1 << 5;
        const RECOVERY_AS_BOOT = 1 << 6;
        const RECOVERY_HAS_NO_KERNEL = 1 << 7;
        /// Off-mode charging screen is enabled.
        const CHARGING_SCREEN = 1 << 8;
    }
}

/// Source of everything the command line assembly needs to know about the
/// device. Methods returning [`None`] mean the fact is unavailable. Only the
/// serial number and baseband are required.
pub trait BootFacts {
    fn serial_number(&self) -> Option<String>;

    /// Current slot suffix, like `_a`.
    fn slot_suffix(&self) -> Option<String>;

    /// Boot storage device path, like `1d84000.ufshc`.
    fn boot_device(&self) -> Option<String>;

    /// Root storage type, like `UFS` or `EMMC`.
    fn root_device_type(&self) -> Option<String>;

    fn chip_baseband(&self) -> Option<String>;

    /// Display panel arguments. These are passed through as is.
    fn display_config(&self) -> Option<String>;

    /// Usable memory size after offlining, if memory offlining applies.
    fn memory_limit(&self, device_tree: Option<&[u8]>) -> Option<u64>;

    fn dtbo_index(&self) -> Option<u32>;

    fn dtb_index(&self) -> Option<u32>;

    /// dm-verity arguments derived from the boot image command line on LE
    /// builds.
    fn le_verity_cmdline(&self, raw_cmdline: &str) -> Option<String>;

    /// Whether the battery is low enough or the charger is attached such that
    /// boot should pause for charging.
    fn pause_for_battery_charge(&self) -> bool;

    fn init_binary(&self) -> String {
        "/init".to_owned()
    }

    fn flags(&self) -> DeviceFlags;

    /// Query the MDTP state. [`None`] means the query failed.
    fn mdtp_active(&self) -> Option<bool> {
        Some(self.flags().contains(DeviceFlags::MDTP_ACTIVE))
    }
}
