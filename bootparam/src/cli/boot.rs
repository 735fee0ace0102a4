/*
 * SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use crate::{
    format::{
        bootimage::{self, ImageHeader, RegionKind},
        padding,
    },
    stream::{CountingWriter, FromReader, ToWriter},
};

fn read_image_header(path: &Path) -> Result<ImageHeader> {
    let file = File::open(path).with_context(|| format!("Failed to open for reading: {path:?}"))?;
    let reader = BufReader::new(file);
    let header = ImageHeader::from_reader(reader)
        .with_context(|| format!("Failed to read boot image header: {path:?}"))?;

    Ok(header)
}

fn read_header(path: &Path) -> Result<ImageHeader> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read header TOML: {path:?}"))?;
    let header = toml_edit::de::from_str(&data)
        .with_context(|| format!("Failed to parse header TOML: {path:?}"))?;

    Ok(header)
}

fn write_header(path: &Path, header: &ImageHeader) -> Result<()> {
    let data = toml_edit::ser::to_string_pretty(header)
        .with_context(|| format!("Failed to serialize header TOML: {path:?}"))?;
    fs::write(path, data).with_context(|| format!("Failed to write header TOML: {path:?}"))?;

    Ok(())
}

fn read_data_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    let data = match fs::read(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read data: {path:?}"))?,
    };

    Ok(Some(data))
}

fn region_path(dir: &Path, kind: RegionKind) -> PathBuf {
    dir.join(format!("{}.img", kind.name()))
}

fn display_info(cli: &BootCli, header: &ImageHeader) {
    if !cli.quiet {
        if cli.debug {
            println!("{header:#?}");
        } else {
            println!("{header}");
        }
    }
}

fn unpack_subcommand(boot_cli: &BootCli, cli: &UnpackCli) -> Result<()> {
    let image =
        fs::read(&cli.input).with_context(|| format!("Failed to read image: {:?}", cli.input))?;
    let header = ImageHeader::from_reader(image.as_slice())
        .with_context(|| format!("Failed to read boot image header: {:?}", cli.input))?;
    display_info(boot_cli, &header);

    fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("Failed to create directory: {:?}", cli.output_dir))?;

    write_header(&cli.output_dir.join("header.toml"), &header)?;

    for region in header.layout()? {
        let data = region
            .slice(&image)
            .with_context(|| format!("Failed to extract {} region", region.kind))?;
        let path = region_path(&cli.output_dir, region.kind);

        debug!("Writing {} bytes to {path:?}", data.len());

        fs::write(&path, data).with_context(|| format!("Failed to write data: {path:?}"))?;
    }

    Ok(())
}

fn pack_subcommand(boot_cli: &BootCli, cli: &PackCli) -> Result<()> {
    let mut header = read_header(&cli.input_dir.join("header.toml"))?;
    let mut regions = HashMap::new();

    for kind in header.region_kinds() {
        let path = region_path(&cli.input_dir, kind);
        let data = read_data_if_exists(&path)?.unwrap_or_default();
        let size = u32::try_from(data.len())
            .with_context(|| format!("Region is too large: {path:?}"))?;

        header
            .set_region_size(kind, size)
            .with_context(|| format!("Failed to set {kind} size"))?;
        regions.insert(kind, data);
    }

    header
        .update_offsets()
        .context("Failed to update region offsets")?;

    display_info(boot_cli, &header);

    let page_size = u64::from(header.page_size());
    let layout = header.layout()?;

    let file = File::create(&cli.output)
        .with_context(|| format!("Failed to open for writing: {:?}", cli.output))?;
    let mut writer = CountingWriter::new(BufWriter::new(file));

    header
        .to_writer(&mut writer)
        .with_context(|| format!("Failed to write header: {:?}", cli.output))?;
    padding::write_zeros(&mut writer, page_size)?;

    for region in layout {
        let Some(data) = regions.get(&region.kind) else {
            bail!("No data for {} region", region.kind);
        };

        writer
            .write_all(data)
            .with_context(|| format!("Failed to write {} region", region.kind))?;
        padding::write_zeros(&mut writer, page_size)?;
    }

    let (mut writer, size) = writer.finish();
    writer
        .flush()
        .with_context(|| format!("Failed to flush image: {:?}", cli.output))?;

    info!("Wrote {size} bytes to {:?}", cli.output);

    Ok(())
}

fn info_subcommand(boot_cli: &BootCli, cli: &InfoCli) -> Result<()> {
    let header = read_image_header(&cli.input)?;
    display_info(boot_cli, &header);

    Ok(())
}

fn layout_subcommand(cli: &LayoutCli) -> Result<()> {
    let header = read_image_header(&cli.input)?;

    println!("Page size: {}", header.page_size());

    for region in header.layout()? {
        println!(
            "{:<22} offset={:<10} size={:<10} pages={}",
            region.kind, region.offset, region.size, region.page_count,
        );
    }

    Ok(())
}

fn probe_kernel_subcommand(cli: &ProbeKernelCli) -> Result<()> {
    let data =
        fs::read(&cli.input).with_context(|| format!("Failed to read kernel: {:?}", cli.input))?;

    println!("{}", bootimage::probe_kernel_arch(&data));

    Ok(())
}

pub fn boot_main(cli: &BootCli) -> Result<()> {
    match &cli.command {
        BootCommand::Unpack(c) => unpack_subcommand(cli, c),
        BootCommand::Pack(c) => pack_subcommand(cli, c),
        BootCommand::Info(c) => info_subcommand(cli, c),
        BootCommand::Layout(c) => layout_subcommand(c),
        BootCommand::ProbeKernel(c) => probe_kernel_subcommand(c),
    }
}

/// Unpack a boot image header and its regions.
#[derive(Debug, Parser)]
struct UnpackCli {
    /// Path to input boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Directory for the header TOML and region images.
    #[arg(short, long, value_name = "DIR", value_parser, default_value = ".")]
    output_dir: PathBuf,
}

/// Pack a boot image from a header TOML and region images.
#[derive(Debug, Parser)]
struct PackCli {
    /// Path to output boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,

    /// Directory containing the header TOML and region images.
    #[arg(short, long, value_name = "DIR", value_parser, default_value = ".")]
    input_dir: PathBuf,
}

/// Display boot image header information.
#[derive(Debug, Parser)]
struct InfoCli {
    /// Path to input boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,
}

/// Display the page-aligned regions of a boot image.
#[derive(Debug, Parser)]
struct LayoutCli {
    /// Path to input boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,
}

/// Detect the architecture of a kernel image.
#[derive(Debug, Parser)]
struct ProbeKernelCli {
    /// Path to input kernel image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,
}

#[derive(Debug, Subcommand)]
enum BootCommand {
    Unpack(UnpackCli),
    Pack(PackCli),
    Info(InfoCli),
    Layout(LayoutCli),
    ProbeKernel(ProbeKernelCli),
}

/// Pack, unpack, or inspect boot images.
#[derive(Debug, Parser)]
pub struct BootCli {
    #[command(subcommand)]
    command: BootCommand,

    /// Don't print boot image header information.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print boot image header information in debug format.
    #[arg(short, long, global = true)]
    debug: bool,
}
