// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use crate::commands::{self, EraseTarget};
use crate::transport::Transport;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "openbl-upload")]
#[command(about = "Host tool for the STM32 Open Bootloader (USART)")]
pub struct Cli {
    /// Serial port (e.g., /dev/ttyUSB0)
    #[arg(short, long)]
    pub port: String,

    /// Baud rate; the bootloader detects it from the sync byte
    #[arg(short, long, default_value = "115200")]
    pub baud: u32,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show protocol version, product ID and supported commands
    Info,

    /// Read memory
    Read {
        /// Start address in hex
        #[arg(value_parser = parse_hex_u32)]
        address: u32,

        /// Number of bytes
        length: usize,

        /// Write the data to this file instead of dumping it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a binary file to memory
    Write {
        /// Firmware binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Start address in hex (default: start of flash)
        #[arg(short, long, default_value = "0x08000000", value_parser = parse_hex_u32)]
        address: u32,

        /// Read the data back and compare
        #[arg(long)]
        verify: bool,
    },

    /// Erase flash
    Erase {
        /// Erase the whole flash
        #[arg(long, conflicts_with_all = ["bank", "pages"])]
        mass: bool,

        /// Erase one bank (1 or 2)
        #[arg(long, conflicts_with = "pages")]
        bank: Option<u8>,

        /// Erase a comma-separated page list
        #[arg(long, value_delimiter = ',')]
        pages: Vec<u16>,
    },

    /// Start the image at an address
    Go {
        /// Vector table address in hex
        #[arg(value_parser = parse_hex_u32)]
        address: u32,
    },

    /// Enable readout protection
    Protect,

    /// Disable readout protection (erases flash)
    Unprotect,

    /// Remove write protection from every area
    WriteUnprotect,

    /// Compute the CRC of a memory range on the device
    Checksum {
        /// Start address in hex
        #[arg(value_parser = parse_hex_u32)]
        address: u32,

        /// Length in bytes, a multiple of 4
        length: u32,

        /// Compare with the CRC of this file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Parse a hex string (with or without 0x prefix) into a u32.
pub fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(s, 16).map_err(|e| format!("invalid hex value: {e}"))
}

fn erase_target(mass: bool, bank: Option<u8>, pages: Vec<u16>) -> Result<EraseTarget> {
    match (mass, bank) {
        (true, _) => Ok(EraseTarget::Mass),
        (false, Some(bank)) => Ok(EraseTarget::Bank(bank)),
        (false, None) if !pages.is_empty() => Ok(EraseTarget::Pages(pages)),
        (false, None) => bail!("One of --mass, --bank or --pages is required"),
    }
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    let mut transport = Transport::new(&cli.port, cli.baud)?;

    match cli.command {
        Commands::Info => commands::info(&mut transport),
        Commands::Read {
            address,
            length,
            output,
        } => commands::read(&mut transport, address, length, output.as_deref()),
        Commands::Write {
            file,
            address,
            verify,
        } => commands::write(&mut transport, &file, address, verify),
        Commands::Erase { mass, bank, pages } => {
            let target = erase_target(mass, bank, pages)?;
            commands::erase(&mut transport, &target)
        }
        Commands::Go { address } => commands::go(&mut transport, address),
        Commands::Protect => commands::protect(&mut transport),
        Commands::Unprotect => commands::unprotect(&mut transport),
        Commands::WriteUnprotect => commands::write_unprotect(&mut transport),
        Commands::Checksum {
            address,
            length,
            file,
        } => commands::checksum(&mut transport, address, length, file.as_deref()),
    }
}
