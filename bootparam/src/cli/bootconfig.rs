// SPDX-FileCopyrightText: 2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::format::bootconfig::{self, TRAILER_SIZE};

/// Worst case growth of a region when a trailer is written after `extra`
/// bytes of new data.
fn grow_size(extra: usize) -> usize {
    extra + 3 + TRAILER_SIZE
}

/// Load `path` with enough trailing space for the operation. The returned
/// length is the original file size.
fn read_region(path: &Path, region: &RegionArgs, extra: usize) -> Result<(Vec<u8>, usize)> {
    let mut data = fs::read(path).with_context(|| format!("Failed to read data: {path:?}"))?;
    let orig_len = data.len();

    let needed = region
        .start
        .checked_add(region.size)
        .and_then(|n| n.checked_add(grow_size(extra)))
        .context("Region bounds overflow")?;
    if needed > data.len() {
        data.resize(needed, 0);
    }

    Ok((data, orig_len))
}

fn write_region(path: &Path, mut data: Vec<u8>, orig_len: usize, end: usize) -> Result<()> {
    data.truncate(orig_len.max(end));

    fs::write(path, &data).with_context(|| format!("Failed to write data: {path:?}"))?;

    Ok(())
}

fn append_subcommand(cli: &AppendCli) -> Result<()> {
    let params = cli
        .params
        .iter()
        .flat_map(|p| [p.as_bytes(), b"\n".as_slice()])
        .flatten()
        .copied()
        .collect::<Vec<_>>();

    let (mut data, orig_len) = read_region(&cli.input, &cli.region, params.len())?;

    let end = bootconfig::append_parameters(&mut data, cli.region.start, cli.region.size, &params)
        .with_context(|| format!("Failed to append parameters: {:?}", cli.input))?;

    info!("Bootconfig now ends at offset {end}");

    let output = cli.output.as_ref().unwrap_or(&cli.input);
    write_region(output, data, orig_len, end)
}

fn trailer_subcommand(cli: &TrailerCli) -> Result<()> {
    let (mut data, orig_len) = read_region(&cli.input, &cli.region, 0)?;

    let end = bootconfig::write_trailer(&mut data, cli.region.start, cli.region.size)
        .with_context(|| format!("Failed to write trailer: {:?}", cli.input))?;

    info!("Bootconfig now ends at offset {end}");

    let output = cli.output.as_ref().unwrap_or(&cli.input);
    write_region(output, data, orig_len, end)
}

fn check_subcommand(cli: &CheckCli) -> Result<()> {
    let data =
        fs::read(&cli.input).with_context(|| format!("Failed to read data: {:?}", cli.input))?;
    let end = cli.end.unwrap_or(data.len());

    let trailer = bootconfig::parse_trailer(&data, end)
        .with_context(|| format!("Failed to verify trailer: {:?}", cli.input))?;

    println!("{trailer}");

    Ok(())
}

pub fn bootconfig_main(cli: &BootconfigCli) -> Result<()> {
    match &cli.command {
        BootconfigCommand::Append(c) => append_subcommand(c),
        BootconfigCommand::Trailer(c) => trailer_subcommand(c),
        BootconfigCommand::Check(c) => check_subcommand(c),
    }
}

#[derive(Debug, Args)]
struct RegionArgs {
    /// Offset of the bootconfig region in the file.
    #[arg(long, value_name = "BYTES", default_value_t = 0)]
    start: usize,

    /// Size of the existing bootconfig data, including any trailer.
    #[arg(long, value_name = "BYTES")]
    size: usize,
}

/// Append parameters and rewrite the trailer.
#[derive(Debug, Parser)]
struct AppendCli {
    /// Path to input file.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output file. Defaults to modifying the input in place.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: Option<PathBuf>,

    #[command(flatten)]
    region: RegionArgs,

    /// Parameters to append, like `androidboot.mode=charger`.
    #[arg(value_name = "PARAM", required = true)]
    params: Vec<String>,
}

/// Write a trailer after existing bootconfig data.
#[derive(Debug, Parser)]
struct TrailerCli {
    /// Path to input file.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output file. Defaults to modifying the input in place.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: Option<PathBuf>,

    #[command(flatten)]
    region: RegionArgs,
}

/// Verify the trailer checksum.
#[derive(Debug, Parser)]
struct CheckCli {
    /// Path to input file.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Offset where the trailer ends. Defaults to the end of the file.
    #[arg(long, value_name = "BYTES")]
    end: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum BootconfigCommand {
    Append(AppendCli),
    Trailer(TrailerCli),
    Check(CheckCli),
}

/// Append bootconfig parameters or manage the trailer.
#[derive(Debug, Parser)]
pub struct BootconfigCli {
    #[command(subcommand)]
    command: BootconfigCommand,
}
