/*
 * SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    io::{self, IsTerminal},
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

use crate::cli::{boot, bootconfig, cmdline, completion};

#[derive(Debug, Subcommand)]
pub enum Command {
    Boot(boot::BootCli),
    Bootconfig(bootconfig::BootconfigCli),
    Cmdline(cmdline::CmdlineCli),
    Completion(completion::CompletionCli),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_level(self) -> Level {
        match self {
            Self::Trace => Level::TRACE,
            Self::Debug => Level::DEBUG,
            Self::Info => Level::INFO,
            Self::Warn => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Level and message only.
    #[default]
    Short,
    /// Timestamp, level, and message.
    Medium,
    /// Timestamp, level, target, and message.
    Long,
}

#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Lowest log message severity to output.
    #[arg(long, global = true, value_name = "LEVEL", default_value_t, value_enum)]
    pub log_level: LogLevel,

    /// Output format for log messages.
    #[arg(long, global = true, value_name = "FORMAT", default_value_t, value_enum)]
    pub log_format: LogFormat,
}

pub fn init_logging(log_level: LogLevel, log_format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_max_level(log_level.as_level());

    match log_format {
        LogFormat::Short => builder.without_time().with_target(false).init(),
        LogFormat::Medium => builder.with_target(false).init(),
        LogFormat::Long => builder.init(),
    }
}

pub fn main(logging_initialized: &AtomicBool) -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_level, cli.log_format);
    logging_initialized.store(true, Ordering::SeqCst);

    match cli.command {
        Command::Boot(c) => boot::boot_main(&c),
        Command::Bootconfig(c) => bootconfig::bootconfig_main(&c),
        Command::Cmdline(c) => cmdline::cmdline_main(&c),
        Command::Completion(c) => completion::completion_main(&c),
    }
}
