// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use assert_matches::assert_matches;
use bootparam::cmdline::{
    self, AssembleArgs, BootMode, Error,
    budget::ArgBudget,
    facts::{BootFacts, DeviceFlags},
    param::{self, Destination},
};

#[derive(Clone, Debug)]
struct TestFacts {
    serial_number: Option<String>,
    slot_suffix: Option<String>,
    boot_device: Option<String>,
    root_device_type: Option<String>,
    chip_baseband: Option<String>,
    display_config: Option<String>,
    memory_limit: Option<u64>,
    dtbo_index: Option<u32>,
    dtb_index: Option<u32>,
    le_verity_cmdline: Option<String>,
    pause_for_battery_charge: bool,
    flags: DeviceFlags,
    mdtp_active: Option<bool>,
}

impl Default for TestFacts {
    fn default() -> Self {
        Self {
            serial_number: Some("1a2b3c4d".to_owned()),
            slot_suffix: Some("_a".to_owned()),
            boot_device: None,
            root_device_type: None,
            chip_baseband: Some("MSM".to_owned()),
            display_config: None,
            memory_limit: None,
            dtbo_index: None,
            dtb_index: None,
            le_verity_cmdline: None,
            pause_for_battery_charge: false,
            flags: DeviceFlags::MULTI_SLOT,
            mdtp_active: Some(false),
        }
    }
}

impl BootFacts for TestFacts {
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

    fn memory_limit(&self, _device_tree: Option<&[u8]>) -> Option<u64> {
        self.memory_limit
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

    fn flags(&self) -> DeviceFlags {
        self.flags
    }

    fn mdtp_active(&self) -> Option<bool> {
        self.mdtp_active
    }
}

fn bootconfig_lines(bootconfig: &str) -> Vec<&str> {
    assert!(bootconfig.starts_with('\n'));
    assert!(bootconfig.ends_with('\n'));

    bootconfig[1..bootconfig.len() - 1].split('\n').collect()
}

#[test]
fn classifier() {
    for s in ["androidboot.mode=charger", "short", " androidboot.serialno=1"] {
        assert!(!param::is_android_boot_param(s, 3));
        assert!(!param::is_android_boot_param(s, 0));
    }

    assert!(param::is_android_boot_param("androidboot.mode=charger", 4));
    assert!(!param::is_android_boot_param("short", 4));
    assert!(!param::is_android_boot_param("console=ttyMSM0", 4));
}

#[test]
fn header_v4_redirects_to_bootconfig() {
    let args = AssembleArgs {
        ffbm: Some(String::new()),
        vb_cmdline: Some("androidboot.verifiedbootstate=green".to_owned()),
        header_version: 4,
        ..Default::default()
    };
    let facts = TestFacts::default();

    let result = cmdline::assemble(&args, &facts).unwrap();
    let bootconfig = result.bootconfig.as_deref().unwrap();
    let lines = bootconfig_lines(bootconfig);

    assert!(lines.contains(&"androidboot.verifiedbootstate=green"));
    assert!(lines.contains(&"androidboot.slot_suffix=_a"));
    assert!(lines.contains(&"androidboot.serialno=1a2b3c4d"));
    assert!(lines.contains(&"androidboot.baseband=msm"));

    assert!(!result.cmdline.contains("verifiedbootstate"));
    assert!(!result.cmdline.contains("slot_suffix"));
    assert!(!result.cmdline.contains("androidboot."));
    assert!(result.cmdline.contains(" rootwait ro init=/init"));

    assert_eq!(result.bootconfig_len(), bootconfig.len() + 1);
    assert_eq!(result.bootconfig_bytes().last(), Some(&0));
}

#[test]
fn header_v2_keeps_cmdline() {
    let args = AssembleArgs {
        vb_cmdline: Some("androidboot.verifiedbootstate=green".to_owned()),
        header_version: 2,
        ..Default::default()
    };
    let facts = TestFacts::default();

    let result = cmdline::assemble(&args, &facts).unwrap();

    assert!(result.cmdline.starts_with("androidboot.verifiedbootstate=green"));
    assert!(result.cmdline.contains(" androidboot.slot_suffix=_a"));
    assert_eq!(result.bootconfig, None);
    assert_eq!(result.bootconfig_len(), 0);
}

#[test]
fn fragment_order() {
    let args = AssembleArgs {
        raw_cmdline: "console=ttyMSM0".to_owned(),
        header_version: 2,
        ..Default::default()
    };
    let facts = TestFacts {
        boot_device: Some("1d84000.ufshc".to_owned()),
        root_device_type: Some("UFS".to_owned()),
        display_config: Some("msm_drm.dsi_display0=panel".to_owned()),
        dtbo_index: Some(3),
        dtb_index: Some(0),
        mdtp_active: Some(true),
        flags: DeviceFlags::MULTI_SLOT | DeviceFlags::DYNAMIC_PARTITIONS,
        ..Default::default()
    };

    let result = cmdline::assemble(&args, &facts).unwrap();

    assert_eq!(
        result.cmdline,
        "console=ttyMSM0\
         \x20androidboot.bootdevice=1d84000.ufshc\
         \x20androidboot.fstab_suffix=default\
         \x20androidboot.boot_devices=soc/1d84000.ufshc\
         \x20androidboot.serialno=1a2b3c4d\
         \x20androidboot.baseband=msm\
         \x20msm_drm.dsi_display0=panel\
         \x20mdtp\
         \x20androidboot.slot_suffix=_a\
         \x20rootwait ro init=/init\
         \x20androidboot.dtbo_idx=3\
         \x20androidboot.dtb_idx=0",
    );
}

#[test]
fn fstab_suffix_emmc() {
    let args = AssembleArgs {
        header_version: 4,
        ..Default::default()
    };
    let facts = TestFacts {
        boot_device: Some("7824900.sdhci".to_owned()),
        root_device_type: Some("EMMC".to_owned()),
        ..Default::default()
    };

    let result = cmdline::assemble(&args, &facts).unwrap();
    let lines = bootconfig_lines(result.bootconfig.as_deref().unwrap());

    assert!(lines.contains(&"androidboot.bootdevice=7824900.sdhci"));
    assert!(lines.contains(&"androidboot.fstab_suffix=emmc"));
    assert!(!lines.iter().any(|l| l.starts_with("androidboot.boot_devices=")));
}

#[test]
fn mode_is_exclusive() {
    let facts = TestFacts {
        pause_for_battery_charge: true,
        flags: DeviceFlags::MULTI_SLOT | DeviceFlags::CHARGING_SCREEN,
        ..Default::default()
    };
    let mut args = AssembleArgs {
        ffbm: Some("ffbm-01".to_owned()),
        alarm_boot: true,
        header_version: 2,
        ..Default::default()
    };

    assert_eq!(
        BootMode::select(&args, &facts),
        BootMode::Fastboot("ffbm-01".to_owned())
    );
    let result = cmdline::assemble(&args, &facts).unwrap();
    assert!(result.cmdline.contains(" androidboot.mode=ffbm-01 quiet"));
    assert!(!result.cmdline.contains("charger"));
    assert!(!result.cmdline.contains("alarmboot"));

    args.ffbm = None;
    assert_eq!(BootMode::select(&args, &facts), BootMode::ChargerPause);
    let result = cmdline::assemble(&args, &facts).unwrap();
    assert!(result.cmdline.contains(" androidboot.mode=charger"));
    assert!(!result.cmdline.contains("alarmboot"));

    args.recovery = true;
    assert_eq!(BootMode::select(&args, &facts), BootMode::AlarmBoot);
    let result = cmdline::assemble(&args, &facts).unwrap();
    assert!(result.cmdline.contains(" androidboot.alarmboot=true"));
    assert!(!result.cmdline.contains("androidboot.mode="));

    args.alarm_boot = false;
    assert_eq!(BootMode::select(&args, &facts), BootMode::None);
}

#[test]
fn missing_required_facts() {
    let args = AssembleArgs {
        header_version: 4,
        ..Default::default()
    };

    let facts = TestFacts {
        chip_baseband: None,
        ..Default::default()
    };
    assert_matches!(
        cmdline::assemble(&args, &facts),
        Err(Error::MissingBaseband)
    );

    let facts = TestFacts {
        serial_number: None,
        ..Default::default()
    };
    assert_matches!(
        cmdline::assemble(&args, &facts),
        Err(Error::MissingSerialNumber)
    );
}

#[test]
fn optional_facts_dropped() {
    let args = AssembleArgs {
        header_version: 2,
        ..Default::default()
    };
    let facts = TestFacts {
        slot_suffix: None,
        mdtp_active: None,
        ..Default::default()
    };

    let result = cmdline::assemble(&args, &facts).unwrap();

    assert!(!result.cmdline.contains("slot_suffix"));
    assert!(!result.cmdline.contains("bootdevice"));
    // A failed MDTP query is treated as active.
    assert!(result.cmdline.contains(" mdtp"));
}

#[test]
fn root_and_force_normal_boot() {
    let args = AssembleArgs {
        header_version: 2,
        ..Default::default()
    };

    // Single slot without recovery as boot.
    let facts = TestFacts {
        flags: DeviceFlags::SYSTEM_AS_ROOT,
        ..Default::default()
    };
    let result = cmdline::assemble(&args, &facts).unwrap();
    assert!(
        result
            .cmdline
            .ends_with(" skip_initramfs rootwait ro init=/init androidboot.force_normal_boot=1")
    );

    // Boot device image builds have neither.
    let facts = TestFacts {
        flags: DeviceFlags::MULTI_SLOT | DeviceFlags::BOOT_DEVICE_IMAGE,
        ..Default::default()
    };
    let result = cmdline::assemble(&args, &facts).unwrap();
    assert!(!result.cmdline.contains("init="));
    assert!(!result.cmdline.contains("force_normal_boot"));
    assert!(!result.cmdline.contains("slot_suffix"));

    // Recovery as boot with dynamic partitions, outside of recovery.
    let facts = TestFacts {
        flags: DeviceFlags::MULTI_SLOT
            | DeviceFlags::DYNAMIC_PARTITIONS
            | DeviceFlags::RECOVERY_AS_BOOT,
        ..Default::default()
    };
    let result = cmdline::assemble(&args, &facts).unwrap();
    assert!(result.cmdline.contains(" androidboot.force_normal_boot=1"));
    assert!(!result.cmdline.contains("skip_initramfs"));

    let args = AssembleArgs {
        recovery: true,
        ..args
    };
    let result = cmdline::assemble(&args, &facts).unwrap();
    assert!(!result.cmdline.contains("force_normal_boot"));
}

#[test]
fn le_variant() {
    let args = AssembleArgs {
        raw_cmdline: "console=ttyMSM0".to_owned(),
        header_version: 2,
        ..Default::default()
    };
    let facts = TestFacts {
        dtbo_index: Some(1),
        dtb_index: Some(2),
        le_verity_cmdline: Some(" dm-mod.create=system".to_owned()),
        flags: DeviceFlags::MULTI_SLOT | DeviceFlags::LE_VARIANT,
        ..Default::default()
    };

    let result = cmdline::assemble(&args, &facts).unwrap();
    assert!(!result.cmdline.contains("dtbo_idx"));
    assert!(!result.cmdline.contains("dtb_idx"));
    assert!(result.cmdline.ends_with(" dm-mod.create=system"));
}

#[test]
fn memory_offline() {
    let mut args = AssembleArgs {
        header_version: 4,
        ..Default::default()
    };
    let facts = TestFacts {
        memory_limit: Some(8 << 30),
        ..Default::default()
    };

    let result = cmdline::assemble(&args, &facts).unwrap();
    assert!(
        result
            .cmdline
            .ends_with(" mem=8589934592B memhp_default_state=online movable_node")
    );

    args.raw_cmdline = "console=ttyMSM0 mem=4G".to_owned();
    let result = cmdline::assemble(&args, &facts).unwrap();
    assert!(result.cmdline.starts_with("console=ttyMSM0 mem=4G"));
    assert!(!result.cmdline.contains("movable_node"));
    assert!(!result.cmdline.contains("mem=8589934592B"));
}

#[test]
fn budget_invariant() {
    let facts = TestFacts {
        boot_device: Some("1d84000.ufshc".to_owned()),
        display_config: Some(" msm_drm.dsi_display0=panel".to_owned()),
        memory_limit: Some(1 << 30),
        dtbo_index: Some(1),
        flags: DeviceFlags::MULTI_SLOT | DeviceFlags::DYNAMIC_PARTITIONS,
        ..Default::default()
    };

    for header_version in 0..=4 {
        let args = AssembleArgs {
            raw_cmdline: "console=ttyMSM0 androidboot.hardware=qcom".to_owned(),
            ffbm: Some("ffbm-00".to_owned()),
            vb_cmdline: Some(
                " androidboot.verifiedbootstate=orange androidboot.veritymode=enforcing"
                    .to_owned(),
            ),
            header_version,
            ..Default::default()
        };

        let fragments = cmdline::fragments(&args, &facts).unwrap();
        let mut budget = ArgBudget::new();
        for fragment in &fragments {
            budget.measure(fragment);
        }

        let result = cmdline::assemble(&args, &facts).unwrap();

        assert!(result.cmdline.len() <= budget.cmdline());
        assert!(result.bootconfig_len() <= budget.bootconfig() + 4);

        let has_bootconfig = fragments
            .iter()
            .any(|f| f.destination == Destination::BootConfig);
        assert_eq!(has_bootconfig, header_version >= 4);
        assert_eq!(result.bootconfig.is_some(), has_bootconfig);
    }
}

#[test]
fn verified_boot_lines_v4() {
    let args = AssembleArgs {
        vb_cmdline: Some(
            " androidboot.verifiedbootstate=orange androidboot.veritymode=enforcing".to_owned(),
        ),
        header_version: 4,
        ..Default::default()
    };

    let result = cmdline::assemble(&args, &TestFacts::default()).unwrap();
    let lines = bootconfig_lines(result.bootconfig.as_deref().unwrap());

    assert_eq!(
        &lines[..2],
        [
            "androidboot.verifiedbootstate=orange",
            "androidboot.veritymode=enforcing",
        ]
    );
}

#[test]
fn verified_boot_repeated_spaces_v4() {
    let args = AssembleArgs {
        vb_cmdline: Some(
            "androidboot.verifiedbootstate=green  androidboot.veritymode=enforcing ".to_owned(),
        ),
        header_version: 4,
        ..Default::default()
    };

    let result = cmdline::assemble(&args, &TestFacts::default()).unwrap();
    let lines = bootconfig_lines(result.bootconfig.as_deref().unwrap());

    assert_eq!(
        &lines[..2],
        [
            "androidboot.verifiedbootstate=green",
            "androidboot.veritymode=enforcing",
        ]
    );
    assert!(lines.iter().all(|l| !l.is_empty()));
}

#[test]
fn display_config_routing() {
    let facts = TestFacts {
        display_config: Some("androidboot.panel=qcom,mdss_dsi_panel".to_owned()),
        ..Default::default()
    };

    let args = AssembleArgs {
        header_version: 4,
        ..Default::default()
    };
    let result = cmdline::assemble(&args, &facts).unwrap();
    let lines = bootconfig_lines(result.bootconfig.as_deref().unwrap());

    assert!(lines.contains(&"androidboot.panel=qcom,mdss_dsi_panel"));
    assert!(!result.cmdline.contains("androidboot.panel"));

    let args = AssembleArgs {
        header_version: 2,
        ..Default::default()
    };
    let result = cmdline::assemble(&args, &facts).unwrap();

    assert!(
        result
            .cmdline
            .contains(" androidboot.panel=qcom,mdss_dsi_panel")
    );
    assert_eq!(result.bootconfig, None);
}
