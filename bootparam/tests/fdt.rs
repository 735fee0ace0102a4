// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use assert_matches::assert_matches;
use bootparam::{
    cmdline::{self, AssembleArgs, BootFacts, DeviceFlags, memory},
    config::DeviceFacts,
    format::fdt::{self, DeviceTree, Error},
};

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Default)]
struct TreeBuilder {
    structs: Vec<u8>,
    strings: Vec<u8>,
}

impl TreeBuilder {
    fn push_u32(&mut self, value: u32) {
        self.structs.extend_from_slice(&value.to_be_bytes());
    }

    fn pad(&mut self) {
        while self.structs.len() % 4 != 0 {
            self.structs.push(0);
        }
    }

    fn begin_node(&mut self, name: &str) -> &mut Self {
        self.push_u32(1);
        self.structs.extend_from_slice(name.as_bytes());
        self.structs.push(0);
        self.pad();
        self
    }

    fn end_node(&mut self) -> &mut Self {
        self.push_u32(2);
        self
    }

    fn prop(&mut self, name: &str, value: &[u8]) -> &mut Self {
        let name_offset = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);

        self.push_u32(3);
        self.push_u32(value.len() as u32);
        self.push_u32(name_offset);
        self.structs.extend_from_slice(value);
        self.pad();
        self
    }

    fn nop(&mut self) -> &mut Self {
        self.push_u32(4);
        self
    }

    fn finish(&mut self) -> Vec<u8> {
        self.push_u32(9);

        let rsvmap_offset = 40u32;
        let struct_offset = rsvmap_offset + 16;
        let strings_offset = struct_offset + self.structs.len() as u32;
        let total_size = strings_offset + self.strings.len() as u32;

        let header = [
            fdt::FDT_MAGIC,
            total_size,
            struct_offset,
            strings_offset,
            rsvmap_offset,
            17,
            16,
            0,
            self.strings.len() as u32,
            self.structs.len() as u32,
        ];

        let mut data = header
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect::<Vec<_>>();
        data.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(&self.structs);
        data.extend_from_slice(&self.strings);
        data
    }
}

fn cells(values: &[u64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn mem_offline_tree(table: &[u64]) -> Vec<u8> {
    TreeBuilder::default()
        .begin_node("")
        .prop("model", b"Test\0")
        .begin_node("memory@80000000")
        .prop("device_type", b"memory\0")
        .prop("offline-sizes", &cells(&[1, 1]))
        .end_node()
        .begin_node("soc")
        .begin_node("mem-offline")
        .prop("offline-sizes", &cells(&[2, 2]))
        .end_node()
        .end_node()
        .nop()
        .begin_node("mem-offline")
        .prop("granule", &512u32.to_be_bytes())
        .begin_node("child")
        .prop("offline-sizes", &cells(&[3, 3]))
        .end_node()
        .prop("offline-sizes", &cells(table))
        .end_node()
        .end_node()
        .finish()
}

#[test]
fn property_lookup() {
    let data = mem_offline_tree(&[8 * GIB, GIB]);
    let tree = DeviceTree::new(&data).unwrap();

    assert_eq!(tree.version, 17);
    assert_eq!(
        tree.property("/mem-offline", "offline-sizes").unwrap(),
        Some(cells(&[8 * GIB, GIB]).as_slice())
    );
    assert_eq!(
        tree.property("/soc/mem-offline", "offline-sizes").unwrap(),
        Some(cells(&[2, 2]).as_slice())
    );
    assert_eq!(
        tree.property("/mem-offline/child", "offline-sizes").unwrap(),
        Some(cells(&[3, 3]).as_slice())
    );
    assert_eq!(
        tree.property("/memory", "device_type").unwrap(),
        Some(b"memory\0".as_slice())
    );
    assert_eq!(tree.property("/", "model").unwrap(), Some(b"Test\0".as_slice()));
    assert_eq!(tree.property("/", "offline-sizes").unwrap(), None);
    assert_eq!(tree.property("/missing", "offline-sizes").unwrap(), None);
    assert_eq!(tree.property("/mem-offline", "missing").unwrap(), None);
}

#[test]
fn invalid_tree() {
    let mut data = mem_offline_tree(&[]);

    assert_matches!(
        DeviceTree::new(&data[..20]),
        Err(Error::Truncated("header"))
    );
    assert_matches!(
        DeviceTree::new(&data[..data.len() - 1]),
        Err(Error::BlockOutOfBounds("total"))
    );

    data[0] = 0;
    assert_matches!(DeviceTree::new(&data), Err(Error::UnknownMagic(0x000dfeed)));

    let mut data = TreeBuilder::default().begin_node("").finish();
    let end = data.len() - 4;
    data[end..].copy_from_slice(&7u32.to_be_bytes());
    let tree = DeviceTree::new(&data).unwrap();
    assert_matches!(
        tree.property("/", "model"),
        Err(Error::UnknownToken { token: 7, .. })
    );
}

#[test]
fn offline_sizes_table() {
    let data = mem_offline_tree(&[8 * GIB, 2 * GIB, 12 * GIB, 4 * GIB, 16 * GIB]);

    assert_eq!(
        memory::offline_sizes(&data).unwrap(),
        Some(vec![(8 * GIB, 2 * GIB), (12 * GIB, 4 * GIB)])
    );

    let data = TreeBuilder::default().begin_node("").end_node().finish();
    assert_eq!(memory::offline_sizes(&data).unwrap(), None);
}

fn facts() -> DeviceFacts {
    DeviceFacts {
        serial_number: Some("1a2b3c4d".to_owned()),
        chip_baseband: Some("MSM".to_owned()),
        memory_offline: Some(memory::MemoryOffline {
            ddr_size: 12 * GIB,
            min_ddr_size: 8 * GIB,
            offline_sizes: vec![(8 * GIB, 2 * GIB), (12 * GIB, 4 * GIB)],
        }),
        ..Default::default()
    }
}

#[test]
fn memory_limit_from_device_tree() {
    let facts = facts();
    let tree = mem_offline_tree(&[8 * GIB, GIB, 12 * GIB, 2 * GIB]);
    let empty_tree = TreeBuilder::default().begin_node("").end_node().finish();

    assert_eq!(facts.memory_limit(None), Some(8 * GIB));
    assert_eq!(facts.memory_limit(Some(tree.as_slice())), Some(10 * GIB));
    assert_eq!(facts.memory_limit(Some(empty_tree.as_slice())), Some(8 * GIB));
    assert_eq!(facts.memory_limit(Some(b"garbage".as_slice())), Some(8 * GIB));

    let le_facts = DeviceFacts {
        flags: DeviceFlags::LE_VARIANT,
        ..facts.clone()
    };
    assert_eq!(le_facts.memory_limit(Some(tree.as_slice())), None);

    let no_table = DeviceFacts {
        memory_offline: None,
        ..facts
    };
    assert_eq!(no_table.memory_limit(Some(tree.as_slice())), None);
}

#[test]
fn assemble_with_device_tree() {
    let args = AssembleArgs {
        header_version: 2,
        device_tree: Some(mem_offline_tree(&[8 * GIB, GIB, 12 * GIB, 2 * GIB])),
        ..Default::default()
    };

    let result = cmdline::assemble(&args, &facts()).unwrap();

    assert!(result.cmdline.ends_with(
        " mem=10737418240B memhp_default_state=online movable_node"
    ));
}
