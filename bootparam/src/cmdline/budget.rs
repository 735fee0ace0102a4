// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Two-pass output sizing. Every fragment is measured first, both outputs are
//! allocated once, and then the same fragments are committed. Committing checks
//! that the measured totals are never exceeded.

use super::{
    Error, Result,
    param::{BootConfigParamNode, Destination, Fragment},
};

/// Per-node overhead reserved in the bootconfig total for the delimiter.
pub const DELIMITER_SIZE: usize = 2;

/// Extra bootconfig space for the leading newline and the terminator.
const BOOTCONFIG_OVERHEAD: usize = 2 * DELIMITER_SIZE;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArgBudget {
    cmdline: usize,
    bootconfig: usize,
}

impl ArgBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for `fragment`. The command line total always grows, even for
    /// fragments that end up in bootconfig.
    pub fn measure(&mut self, fragment: &Fragment) {
        self.cmdline += fragment.len();

        if fragment.destination == Destination::BootConfig {
            self.bootconfig += fragment.len() + DELIMITER_SIZE;
        }
    }

    pub fn cmdline(&self) -> usize {
        self.cmdline
    }

    pub fn bootconfig(&self) -> usize {
        self.bootconfig
    }
}

/// Final outputs. Both strings exclude the NUL terminator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssembledArgs {
    pub cmdline: String,
    pub bootconfig: Option<String>,
}

impl AssembledArgs {
    /// Command line with the NUL terminator.
    pub fn cmdline_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.cmdline.len() + 1);
        data.extend_from_slice(self.cmdline.as_bytes());
        data.push(0);
        data
    }

    /// Bootconfig with the NUL terminator, or an empty buffer if there is no
    /// bootconfig.
    pub fn bootconfig_bytes(&self) -> Vec<u8> {
        let Some(bootconfig) = &self.bootconfig else {
            return vec![];
        };

        let mut data = Vec::with_capacity(bootconfig.len() + 1);
        data.extend_from_slice(bootconfig.as_bytes());
        data.push(0);
        data
    }

    /// Bootconfig length including the NUL terminator.
    pub fn bootconfig_len(&self) -> usize {
        self.bootconfig.as_ref().map_or(0, |b| b.len() + 1)
    }
}

/// Second pass writer, bound to the totals from the first pass.
#[derive(Debug)]
pub struct ArgWriter {
    budget: ArgBudget,
    cmdline: String,
    bootconfig: String,
    nodes: Vec<BootConfigParamNode>,
    bootconfig_written: usize,
}

impl ArgWriter {
    /// Allocate both outputs. Allocation failure is reported rather than
    /// aborting.
    pub fn new(budget: ArgBudget) -> Result<Self> {
        let mut cmdline = String::new();
        cmdline
            .try_reserve_exact(budget.cmdline + 1)
            .map_err(|e| Error::OutOfResources("cmdline", e))?;

        let mut bootconfig = String::new();
        if budget.bootconfig > 0 {
            bootconfig
                .try_reserve_exact(budget.bootconfig + BOOTCONFIG_OVERHEAD)
                .map_err(|e| Error::OutOfResources("bootconfig", e))?;
        }

        Ok(Self {
            budget,
            cmdline,
            bootconfig,
            nodes: vec![],
            bootconfig_written: 0,
        })
    }

    pub fn commit(&mut self, fragment: &Fragment) -> Result<()> {
        match fragment.destination {
            Destination::CmdLine => {
                let written = self.cmdline.len() + fragment.len();
                if written > self.budget.cmdline {
                    return Err(Error::BudgetExceeded {
                        output: "cmdline",
                        written,
                        measured: self.budget.cmdline,
                    });
                }

                self.cmdline.push_str(&fragment.text);
            }
            Destination::BootConfig => {
                let node = BootConfigParamNode::new(&fragment.text);
                let written = self.bootconfig_written + node.len() + 1;
                if written > self.budget.bootconfig {
                    return Err(Error::BudgetExceeded {
                        output: "bootconfig",
                        written,
                        measured: self.budget.bootconfig,
                    });
                }

                self.bootconfig_written = written;
                self.nodes.push(node);
            }
        }

        Ok(())
    }

    pub fn nodes(&self) -> &[BootConfigParamNode] {
        &self.nodes
    }

    /// Materialize the outputs. Bootconfig is a leading newline followed by
    /// one node per line.
    pub fn finish(mut self) -> AssembledArgs {
        let bootconfig = if self.nodes.is_empty() {
            None
        } else {
            self.bootconfig.push('\n');

            for node in &self.nodes {
                self.bootconfig.push_str(node.param());
                self.bootconfig.push('\n');
            }

            Some(self.bootconfig)
        };

        AssembledArgs {
            cmdline: self.cmdline,
            bootconfig,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn fragments() -> Vec<Fragment> {
        vec![
            Fragment::cmdline("console=ttyMSM0"),
            Fragment::param(" androidboot.serialno=", "1234", 4),
            Fragment::cmdline(" quiet"),
            Fragment::param(" androidboot.slot_suffix=", "_a", 4),
        ]
    }

    #[test]
    fn measure_counts_both_outputs() {
        let mut budget = ArgBudget::new();
        for f in fragments() {
            budget.measure(&f);
        }

        // 15 + 26 + 6 + 27
        assert_eq!(budget.cmdline(), 74);
        assert_eq!(budget.bootconfig(), 26 + 2 + 27 + 2);
    }

    #[test]
    fn commit_within_budget() {
        let fragments = fragments();
        let mut budget = ArgBudget::new();
        for f in &fragments {
            budget.measure(f);
        }

        let mut writer = ArgWriter::new(budget).unwrap();
        for f in &fragments {
            writer.commit(f).unwrap();
        }
        assert_eq!(writer.nodes().len(), 2);

        let args = writer.finish();
        assert_eq!(args.cmdline, "console=ttyMSM0 quiet");
        assert_eq!(
            args.bootconfig.as_deref(),
            Some("\nandroidboot.serialno=1234\nandroidboot.slot_suffix=_a\n"),
        );
        assert!(args.cmdline.len() <= budget.cmdline());
        assert!(args.bootconfig_len() <= budget.bootconfig() + BOOTCONFIG_OVERHEAD);
        assert_eq!(args.cmdline_bytes().last(), Some(&0));
        assert_eq!(args.bootconfig_bytes().len(), args.bootconfig_len());
    }

    #[test]
    fn commit_unmeasured_fragment() {
        let mut writer = ArgWriter::new(ArgBudget::new()).unwrap();

        assert_matches!(
            writer.commit(&Fragment::cmdline(" quiet")),
            Err(Error::BudgetExceeded {
                output: "cmdline",
                written: 6,
                measured: 0,
            })
        );
        assert_matches!(
            writer.commit(&Fragment::param(" androidboot.mode=", "charger", 4)),
            Err(Error::BudgetExceeded {
                output: "bootconfig",
                ..
            })
        );
    }

    #[test]
    fn no_nodes_no_bootconfig() {
        let mut budget = ArgBudget::new();
        let fragment = Fragment::cmdline(" mdtp");
        budget.measure(&fragment);

        let mut writer = ArgWriter::new(budget).unwrap();
        writer.commit(&fragment).unwrap();

        let args = writer.finish();
        assert_eq!(args.bootconfig, None);
        assert_eq!(args.bootconfig_len(), 0);
        assert!(args.bootconfig_bytes().is_empty());
    }
}
