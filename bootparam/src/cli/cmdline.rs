// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{fs, io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::{
    cmdline::{self, AssembleArgs},
    config::DeviceFacts,
};

fn assemble_subcommand(cli: &AssembleCli) -> Result<()> {
    let facts = DeviceFacts::load(&cli.facts)
        .with_context(|| format!("Failed to load device facts: {:?}", cli.facts))?;

    let device_tree = cli
        .device_tree
        .as_ref()
        .map(|p| fs::read(p).with_context(|| format!("Failed to read device tree: {p:?}")))
        .transpose()?;

    let args = AssembleArgs {
        raw_cmdline: cli.raw_cmdline.clone(),
        ffbm: cli.ffbm.clone(),
        recovery: cli.recovery,
        alarm_boot: cli.alarm_boot,
        vb_cmdline: cli.vb_cmdline.clone(),
        header_version: cli.header_version,
        device_tree,
    };

    let result = cmdline::assemble(&args, &facts).context("Failed to assemble command line")?;

    println!("cmdline: {}", result.cmdline);
    if let Some(bootconfig) = &result.bootconfig {
        println!("bootconfig ({} bytes):", result.bootconfig_len());
        print!("{}", bootconfig.trim_start_matches('\n'));
    }

    if let Some(path) = &cli.output_bootconfig {
        let mut file = fs::File::create(path)
            .with_context(|| format!("Failed to open for writing: {path:?}"))?;
        file.write_all(&result.bootconfig_bytes())
            .with_context(|| format!("Failed to write bootconfig: {path:?}"))?;
    }

    Ok(())
}

pub fn cmdline_main(cli: &CmdlineCli) -> Result<()> {
    match &cli.command {
        CmdlineCommand::Assemble(c) => assemble_subcommand(c),
    }
}

/// Assemble the kernel command line and bootconfig from device facts.
#[derive(Debug, Parser)]
struct AssembleCli {
    /// Path to device facts TOML.
    #[arg(short, long, value_name = "FILE", value_parser)]
    facts: PathBuf,

    /// Boot image header version.
    #[arg(long, value_name = "VERSION")]
    header_version: u32,

    /// Command line from the boot image header.
    #[arg(long, value_name = "CMDLINE", default_value = "")]
    raw_cmdline: String,

    /// Command line produced by verified boot.
    #[arg(long, value_name = "CMDLINE")]
    vb_cmdline: Option<String>,

    /// Factory mode string from the misc partition.
    #[arg(long, value_name = "MODE")]
    ffbm: Option<String>,

    /// Boot into recovery.
    #[arg(long)]
    recovery: bool,

    /// The device was woken up by an RTC alarm.
    #[arg(long)]
    alarm_boot: bool,

    /// Path to the flattened device tree.
    #[arg(long, value_name = "FILE", value_parser)]
    device_tree: Option<PathBuf>,

    /// Write the NUL-terminated bootconfig to a file.
    #[arg(long, value_name = "FILE", value_parser)]
    output_bootconfig: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum CmdlineCommand {
    Assemble(AssembleCli),
}

/// Build kernel command lines.
#[derive(Debug, Parser)]
pub struct CmdlineCli {
    #[command(subcommand)]
    command: CmdlineCommand,
}
