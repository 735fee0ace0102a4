// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::format::fdt::{self, DeviceTree};

/// Device tree node describing how much memory to offline.
pub const MEM_OFFLINE_NODE: &str = "/mem-offline";
/// `(ddr_threshold, offline_amount)` pairs as 64-bit cells.
pub const OFFLINE_SIZES_PROP: &str = "offline-sizes";

/// Memory offlining parameters, mirroring the `/mem-offline` device tree node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MemoryOffline {
    /// Total DDR size in bytes.
    pub ddr_size: u64,
    /// Devices with less memory than this never offline memory.
    pub min_ddr_size: u64,
    /// `(ddr_threshold, offline_amount)` pairs in ascending threshold order.
    pub offline_sizes: Vec<(u64, u64)>,
}

impl MemoryOffline {
    pub fn limit(&self) -> Option<u64> {
        offline_limit(self.ddr_size, self.min_ddr_size, &self.offline_sizes)
    }

    /// Like [`Self::limit`], but the offline sizes table comes from the
    /// device tree's `/mem-offline` node when it has one.
    pub fn limit_with_device_tree(&self, device_tree: Option<&[u8]>) -> Option<u64> {
        let Some(data) = device_tree else {
            return self.limit();
        };

        match offline_sizes(data) {
            Ok(Some(table)) => offline_limit(self.ddr_size, self.min_ddr_size, &table),
            Ok(None) => {
                debug!("No {MEM_OFFLINE_NODE} node in device tree; using configured table");
                self.limit()
            }
            Err(e) => {
                warn!("Failed to read {MEM_OFFLINE_NODE} from device tree: {e}");
                self.limit()
            }
        }
    }
}

/// Read the offline sizes table from a flattened device tree. Returns [`None`]
/// if the node or property does not exist.
pub fn offline_sizes(device_tree: &[u8]) -> Result<Option<Vec<(u64, u64)>>, fdt::Error> {
    let tree = DeviceTree::new(device_tree)?;
    let Some(value) = tree.property(MEM_OFFLINE_NODE, OFFLINE_SIZES_PROP)? else {
        return Ok(None);
    };

    let table = fdt::u64_cells(value)
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .collect();

    Ok(Some(table))
}

/// Compute the usable memory limit. The amount to offline comes from the entry
/// with the largest threshold that does not exceed `ddr_size`. If `ddr_size`
/// is below every threshold, nothing is offlined. Returns [`None`] if
/// offlining is not supported for this configuration.
pub fn offline_limit(
    ddr_size: u64,
    min_ddr_size: u64,
    offline_sizes: &[(u64, u64)],
) -> Option<u64> {
    if ddr_size < min_ddr_size || offline_sizes.is_empty() {
        debug!("Offlining memory not supported");
        return None;
    }

    let amount = offline_sizes
        .iter()
        .rev()
        .find(|(threshold, _)| ddr_size >= *threshold)
        .map(|(_, amount)| *amount)
        .unwrap_or_default();

    Some(ddr_size.saturating_sub(amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn largest_matching_threshold() {
        let table = [(8 * GIB, 2 * GIB), (12 * GIB, 4 * GIB)];

        assert_eq!(offline_limit(12 * GIB, 4 * GIB, &table), Some(8 * GIB));
        assert_eq!(offline_limit(16 * GIB, 4 * GIB, &table), Some(12 * GIB));
        assert_eq!(offline_limit(10 * GIB, 4 * GIB, &table), Some(8 * GIB));
    }

    #[test]
    fn below_first_threshold() {
        let table = [(8 * GIB, 2 * GIB)];

        assert_eq!(offline_limit(6 * GIB, 4 * GIB, &table), Some(6 * GIB));
    }

    #[test]
    fn unsupported() {
        let table = [(8 * GIB, 2 * GIB)];

        assert_eq!(offline_limit(2 * GIB, 4 * GIB, &table), None);
        assert_eq!(offline_limit(12 * GIB, 4 * GIB, &[]), None);
    }
}
