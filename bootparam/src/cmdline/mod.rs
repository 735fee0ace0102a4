// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Kernel command line and bootconfig assembly. All fragments are generated up
//! front from the device facts, routed either to the command line or to
//! bootconfig depending on the boot image header version, and then written out
//! in two passes through [`budget::ArgBudget`] and [`budget::ArgWriter`].

use std::{collections::TryReserveError, fmt};

use thiserror::Error;
use tracing::{debug, warn};

use crate::cmdline::{
    budget::{ArgBudget, ArgWriter},
    param::Fragment,
};

pub use budget::AssembledArgs;
pub use facts::{BootFacts, DeviceFlags};

pub mod budget;
pub mod facts;
pub mod memory;
pub mod param;

const BOOT_DEVICE: &str = " androidboot.bootdevice=";
const FSTAB_SUFFIX: &str = " androidboot.fstab_suffix=";
const BOOT_DEVICES: &str = " androidboot.boot_devices=soc/";
const SERIAL_NUMBER: &str = " androidboot.serialno=";
const BOOT_MODE: &str = " androidboot.mode=";
const QUIET: &str = " quiet";
const CHARGER_MODE: &str = " androidboot.mode=charger";
const ALARM_BOOT: &str = " androidboot.alarmboot=true";
const BASEBAND: &str = " androidboot.baseband=";
const MDTP: &str = " mdtp";
const SLOT_SUFFIX: &str = " androidboot.slot_suffix=";
const SKIP_INITRAMFS: &str = " skip_initramfs";
const ROOT_INIT: &str = " rootwait ro init=";
const DTBO_INDEX: &str = " androidboot.dtbo_idx=";
const DTB_INDEX: &str = " androidboot.dtb_idx=";
const FORCE_NORMAL_BOOT: &str = " androidboot.force_normal_boot=1";
const MEM_LIMIT: &str = " mem=";
const MEMHP_ONLINE: &str = " memhp_default_state=online";
const MOVABLE_NODE: &str = " movable_node";

const EMMC_DEVICE_TYPE: &str = "emmc";
const DEFAULT_FSTAB_SUFFIX: &str = "default";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to allocate {0} buffer")]
    OutOfResources(&'static str, #[source] TryReserveError),
    #[error("Chip baseband is not available")]
    MissingBaseband,
    #[error("Serial number is not available")]
    MissingSerialNumber,
    #[error("Wrote {written} bytes to {output}, but only measured {measured}")]
    BudgetExceeded {
        output: &'static str,
        written: usize,
        measured: usize,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// The boot mode announced to userspace. At most one is emitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootMode {
    /// Factory/fastboot mode requested through the misc partition.
    Fastboot(String),
    /// Pause boot to show the off-mode charging screen.
    ChargerPause,
    /// Woken up by an RTC alarm.
    AlarmBoot,
    None,
}

impl BootMode {
    /// Pick the mode in priority order.
    pub fn select(args: &AssembleArgs, facts: &dyn BootFacts) -> Self {
        if let Some(ffbm) = args.ffbm.as_ref().filter(|m| !m.is_empty()) {
            Self::Fastboot(ffbm.clone())
        } else if !args.recovery
            && facts.pause_for_battery_charge()
            && facts.flags().contains(DeviceFlags::CHARGING_SCREEN)
        {
            Self::ChargerPause
        } else if args.alarm_boot {
            Self::AlarmBoot
        } else {
            Self::None
        }
    }

    fn fragments(&self, header_version: u32) -> Vec<Fragment> {
        match self {
            Self::Fastboot(mode) => vec![
                Fragment::param(BOOT_MODE, mode, header_version),
                Fragment::cmdline(QUIET),
            ],
            Self::ChargerPause => vec![Fragment::param(CHARGER_MODE, "", header_version)],
            Self::AlarmBoot => vec![Fragment::param(ALARM_BOOT, "", header_version)],
            Self::None => vec![],
        }
    }
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fastboot(mode) => write!(f, "fastboot ({mode})"),
            Self::ChargerPause => f.write_str("charger"),
            Self::AlarmBoot => f.write_str("alarm"),
            Self::None => f.write_str("normal"),
        }
    }
}

/// Per-boot inputs that are not device facts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssembleArgs {
    /// Command line from the boot image header.
    pub raw_cmdline: String,
    /// Factory mode string from the misc partition.
    pub ffbm: Option<String>,
    /// Booting into recovery.
    pub recovery: bool,
    pub alarm_boot: bool,
    /// Command line produced by verified boot.
    pub vb_cmdline: Option<String>,
    pub header_version: u32,
    /// Flattened device tree used for memory offlining.
    pub device_tree: Option<Vec<u8>>,
}

fn fstab_suffix(root_device_type: Option<&str>) -> &'static str {
    match root_device_type {
        Some(t) if t.eq_ignore_ascii_case(EMMC_DEVICE_TYPE) => EMMC_DEVICE_TYPE,
        _ => DEFAULT_FSTAB_SUFFIX,
    }
}

/// Build the complete fragment list in output order.
pub fn fragments(args: &AssembleArgs, facts: &dyn BootFacts) -> Result<Vec<Fragment>> {
    let version = args.header_version;
    let flags = facts.flags();
    let dynamic = flags.contains(DeviceFlags::DYNAMIC_PARTITIONS);
    let multi_slot = flags.contains(DeviceFlags::MULTI_SLOT);
    let boot_dev_image = flags.contains(DeviceFlags::BOOT_DEVICE_IMAGE);
    let le_variant = flags.contains(DeviceFlags::LE_VARIANT);

    let serial = facts.serial_number().ok_or(Error::MissingSerialNumber)?;
    let baseband = facts
        .chip_baseband()
        .ok_or(Error::MissingBaseband)?
        .to_ascii_lowercase();

    let mut result = vec![];

    if !args.raw_cmdline.is_empty() {
        result.push(Fragment::cmdline(args.raw_cmdline.as_str()));
    }

    if let Some(vb) = args.vb_cmdline.as_deref().filter(|c| !c.is_empty()) {
        result.push(Fragment::verified_boot(vb, version));
    }

    match facts.boot_device() {
        Some(device) => {
            let suffix = fstab_suffix(facts.root_device_type().as_deref());

            result.push(Fragment::param(BOOT_DEVICE, &device, version));
            result.push(Fragment::param(FSTAB_SUFFIX, suffix, version));

            if dynamic {
                result.push(Fragment::param(BOOT_DEVICES, &device, version));
            }
        }
        None => warn!("Boot device is not available"),
    }

    result.push(Fragment::param(SERIAL_NUMBER, &serial, version));

    let mode = BootMode::select(args, facts);
    debug!("Boot mode: {mode}");
    result.extend(mode.fragments(version));

    result.push(Fragment::param(BASEBAND, &baseband, version));

    match facts.display_config() {
        Some(c) if !c.is_empty() => {
            let c = if c.starts_with(' ') { c } else { format!(" {c}") };
            result.push(Fragment::classified(c, version));
        }
        _ => debug!("Display configuration is not available"),
    }

    let mdtp_active = facts.mdtp_active().unwrap_or_else(|| {
        warn!("Failed to query MDTP state; assuming active");
        true
    });
    if mdtp_active {
        result.push(Fragment::cmdline(MDTP));
    }

    if multi_slot && !boot_dev_image {
        match facts.slot_suffix() {
            Some(suffix) => result.push(Fragment::param(SLOT_SUFFIX, &suffix, version)),
            None => warn!("Slot suffix is not available"),
        }
    }

    if (flags.contains(DeviceFlags::SYSTEM_AS_ROOT) && !multi_slot)
        || (multi_slot && !boot_dev_image)
    {
        if !dynamic && !args.recovery {
            result.push(Fragment::cmdline(SKIP_INITRAMFS));
        }

        result.push(Fragment::cmdline(format!(
            "{ROOT_INIT}{}",
            facts.init_binary(),
        )));
    }

    if !le_variant {
        if let Some(index) = facts.dtbo_index() {
            result.push(Fragment::param(DTBO_INDEX, &index.to_string(), version));
        }
        if let Some(index) = facts.dtb_index() {
            result.push(Fragment::param(DTB_INDEX, &index.to_string(), version));
        }
    }

    let recovery_as_boot = flags.contains(DeviceFlags::RECOVERY_AS_BOOT);
    if ((recovery_as_boot || flags.contains(DeviceFlags::RECOVERY_HAS_NO_KERNEL))
        && dynamic
        && !args.recovery)
        || (!multi_slot && !recovery_as_boot)
    {
        result.push(Fragment::param(FORCE_NORMAL_BOOT, "", version));
    }

    if le_variant {
        match facts.le_verity_cmdline(&args.raw_cmdline) {
            Some(c) if !c.is_empty() => result.push(Fragment::cmdline(c)),
            _ => debug!("No dm-verity arguments for LE build"),
        }
    }

    if args.raw_cmdline.contains(MEM_LIMIT.trim_start()) {
        debug!("Memory limit already present in command line");
    } else if let Some(limit) = facts.memory_limit(args.device_tree.as_deref()) {
        result.push(Fragment::cmdline(format!("{MEM_LIMIT}{limit}B")));
        result.push(Fragment::cmdline(MEMHP_ONLINE));
        result.push(Fragment::cmdline(MOVABLE_NODE));
    }

    Ok(result)
}

/// Assemble the final kernel command line and, for bootconfig-capable header
/// versions, the bootconfig parameters.
pub fn assemble(args: &AssembleArgs, facts: &dyn BootFacts) -> Result<AssembledArgs> {
    let fragments = fragments(args, facts)?;

    let mut budget = ArgBudget::new();
    for fragment in &fragments {
        budget.measure(fragment);
    }

    debug!(
        "Measured {} command line bytes and {} bootconfig bytes",
        budget.cmdline(),
        budget.bootconfig(),
    );

    let mut writer = ArgWriter::new(budget)?;
    for fragment in &fragments {
        writer.commit(fragment)?;
    }

    let result = writer.finish();

    debug!("Final command line: {:?}", result.cmdline);
    if let Some(bootconfig) = &result.bootconfig {
        debug!("Final bootconfig: {bootconfig:?}");
    }

    Ok(result)
}
