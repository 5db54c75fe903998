// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations for bootloader operations.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use openbl_core::protocol::{opcode, xor_fold, CHECKSUM_CRC, ERASE_ALL, ERASE_BANK1, ERASE_BANK2};

use crate::transport::Transport;

/// Largest ReadMemory/WriteMemory payload.
pub const CHUNK_SIZE: usize = 256;

/// Erase can take tens of seconds on a full bank.
const ERASE_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_TIMEOUT_MS: u64 = 1_000;

/// What an erase request covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EraseTarget {
    Mass,
    Bank(u8),
    Pages(Vec<u16>),
}

impl EraseTarget {
    /// Extended erase payload, trailing XOR included.
    pub fn frame(&self) -> Result<Vec<u8>> {
        let mut frame = Vec::new();
        match self {
            Self::Mass => frame.extend_from_slice(&ERASE_ALL.to_be_bytes()),
            Self::Bank(1) => frame.extend_from_slice(&ERASE_BANK1.to_be_bytes()),
            Self::Bank(2) => frame.extend_from_slice(&ERASE_BANK2.to_be_bytes()),
            Self::Bank(bank) => bail!("Invalid bank {bank}: must be 1 or 2"),
            Self::Pages(pages) => {
                if pages.is_empty() {
                    bail!("No page to erase");
                }
                let count = u16::try_from(pages.len() - 1).context("Too many pages")?;
                if count & 0xFFF0 == 0xFFF0 {
                    bail!("Too many pages");
                }
                frame.extend_from_slice(&count.to_be_bytes());
                for page in pages {
                    frame.extend_from_slice(&page.to_be_bytes());
                }
            }
        }
        frame.push(xor_fold(0, &frame));
        Ok(frame)
    }
}

/// Payload of a `WriteMemory` chunk: `N`, data, XOR.
pub fn write_frame(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() > CHUNK_SIZE {
        bail!("Chunk of {} bytes out of range", data.len());
    }
    let count = (data.len() - 1) as u8;
    let mut frame = Vec::with_capacity(data.len() + 2);
    frame.push(count);
    frame.extend_from_slice(data);
    frame.push(xor_fold(count, data));
    Ok(frame)
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Display the verb list, protocol version and product ID.
pub fn info(transport: &mut Transport) -> Result<()> {
    transport.command(opcode::GET_COMMAND)?;
    let count = transport.read_byte()?;
    let version = transport.read_byte()?;
    let mut opcodes = vec![0u8; usize::from(count)];
    transport.read_exact(&mut opcodes)?;
    transport.expect_ack("GetCommand")?;

    transport.command(opcode::GET_VERSION)?;
    let mut reply = [0u8; 3];
    transport.read_exact(&mut reply)?;
    transport.expect_ack("GetVersion")?;

    transport.command(opcode::GET_ID)?;
    let length = transport.read_byte()?;
    let mut id = vec![0u8; usize::from(length) + 1];
    transport.read_exact(&mut id)?;
    transport.expect_ack("GetID")?;

    println!("Bootloader:");
    println!("  Protocol:   {}.{}", version >> 4, version & 0x0F);
    println!("  Product ID: 0x{}", id.iter().map(|b| format!("{b:02x}")).collect::<String>());
    println!(
        "  Commands:   {}",
        opcodes
            .iter()
            .map(|op| format!("0x{op:02x}"))
            .collect::<Vec<_>>()
            .join(" ")
    );
    if reply[0] != version {
        println!("  (GetVersion reported 0x{:02x})", reply[0]);
    }
    Ok(())
}

fn read_chunk(transport: &mut Transport, address: u32, buf: &mut [u8]) -> Result<()> {
    transport.command(opcode::READ_MEMORY)?;
    transport.address(address)?;
    let count = (buf.len() - 1) as u8;
    transport.write_all(&[count, !count])?;
    transport.expect_ack("ReadMemory length")?;
    transport.read_exact(buf)
}

fn read_range(transport: &mut Transport, address: u32, len: usize, pb: &ProgressBar) -> Result<Vec<u8>> {
    let mut data = vec![0u8; len];
    for (i, chunk) in data.chunks_mut(CHUNK_SIZE).enumerate() {
        let offset = i * CHUNK_SIZE;
        let target = address + offset as u32;
        read_chunk(transport, target, chunk)
            .with_context(|| format!("Read failed at 0x{target:08x}"))?;
        pb.set_position((offset + chunk.len()) as u64);
    }
    Ok(data)
}

/// Read `len` bytes at `address`, to a file or as a hex dump.
pub fn read(transport: &mut Transport, address: u32, len: usize, output: Option<&Path>) -> Result<()> {
    if len == 0 {
        bail!("Nothing to read");
    }
    let pb = progress_bar(len as u64)?;
    let data = read_range(transport, address, len, &pb)?;
    pb.finish_and_clear();

    match output {
        Some(path) => {
            fs::write(path, &data).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Read {} bytes from 0x{:08x} into {}", len, address, path.display());
        }
        None => {
            for (i, line) in data.chunks(16).enumerate() {
                let hex: Vec<String> = line.iter().map(|b| format!("{b:02x}")).collect();
                println!("{:08x}: {}", address as usize + i * 16, hex.join(" "));
            }
        }
    }
    Ok(())
}

/// Program a binary file at `address`, optionally reading it back.
pub fn write(transport: &mut Transport, file: &Path, address: u32, verify: bool) -> Result<()> {
    let firmware = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    if firmware.is_empty() {
        bail!("{} is empty", file.display());
    }
    println!(
        "Firmware: {} ({} bytes, CRC32/MPEG-2: 0x{:08x})",
        file.display(),
        firmware.len(),
        CHECKSUM_CRC.checksum(&firmware)
    );
    println!("Target:   0x{address:08x}");
    println!();

    let pb = progress_bar(firmware.len() as u64)?;
    for (i, chunk) in firmware.chunks(CHUNK_SIZE).enumerate() {
        let offset = i * CHUNK_SIZE;
        let target = address + offset as u32;
        let result = transport
            .command(opcode::WRITE_MEMORY)
            .and_then(|()| transport.address(target))
            .and_then(|()| write_frame(chunk))
            .and_then(|frame| transport.write_all(&frame))
            .and_then(|()| transport.expect_ack("WriteMemory"));
        if let Err(e) = result {
            pb.abandon();
            return Err(e.context(format!("Write failed at 0x{target:08x}")));
        }
        pb.set_position((offset + chunk.len()) as u64);
    }
    pb.finish_with_message("Write complete");

    if verify {
        print!("Verifying... ");
        std::io::stdout().flush()?;
        let pb = ProgressBar::hidden();
        let readback = read_range(transport, address, firmware.len(), &pb)?;
        if let Some(offset) = firmware.iter().zip(&readback).position(|(a, b)| a != b) {
            bail!("Verify failed at 0x{:08x}", address as usize + offset);
        }
        println!("OK");
    }

    println!();
    println!("Firmware written successfully!");
    println!(
        "Use 'openbl-upload --port {} go 0x{:08x}' to start it.",
        transport.port_name(),
        address
    );
    Ok(())
}

/// Extended erase: whole flash, one bank, or a page list.
pub fn erase(transport: &mut Transport, target: &EraseTarget) -> Result<()> {
    let frame = target.frame()?;
    print!("Erasing... ");
    std::io::stdout().flush()?;

    transport.command(opcode::EXT_ERASE)?;
    transport.set_timeout(ERASE_TIMEOUT_MS)?;
    transport.write_all(&frame)?;
    let result = transport.expect_ack("Erase");
    transport.set_timeout(DEFAULT_TIMEOUT_MS)?;
    result?;

    println!("OK");
    Ok(())
}

/// Start the image at `address`.
pub fn go(transport: &mut Transport, address: u32) -> Result<()> {
    transport.command(opcode::GO)?;
    transport.address(address)?;
    println!("Jumped to 0x{address:08x}");
    Ok(())
}

/// Enable readout protection. The device resets afterwards.
pub fn protect(transport: &mut Transport) -> Result<()> {
    transport.command(opcode::READ_PROTECT)?;
    transport.expect_ack("ReadoutProtect")?;
    println!("Readout protection enabled, device is resetting.");
    Ok(())
}

/// Disable readout protection. Flash is mass-erased by the device.
pub fn unprotect(transport: &mut Transport) -> Result<()> {
    transport.command(opcode::READ_UNPROTECT)?;
    transport.expect_ack("ReadoutUnprotect")?;
    println!("Readout protection removed, device is resetting.");
    Ok(())
}

/// Remove write protection from every area.
pub fn write_unprotect(transport: &mut Transport) -> Result<()> {
    transport.command(opcode::WRITE_UNPROTECT)?;
    transport.expect_ack("WriteUnprotect")?;
    println!("Write protection removed, device is resetting.");
    Ok(())
}

/// CRC of a device range, optionally compared with a local file.
pub fn checksum(transport: &mut Transport, address: u32, len: u32, file: Option<&Path>) -> Result<()> {
    if len == 0 || len % 4 != 0 {
        bail!("Length must be a non-zero multiple of 4");
    }

    transport.command(opcode::CHECKSUM)?;
    transport.address(address)?;
    let bytes = len.to_be_bytes();
    transport.write_all(&bytes)?;
    transport.write_all(&[xor_fold(0, &bytes)])?;
    transport.expect_ack("Checksum length")?;

    let mut reply = [0u8; 5];
    transport.read_exact(&mut reply)?;
    transport.expect_ack("Checksum")?;
    if xor_fold(0, &reply[..4]) != reply[4] {
        bail!("Checksum reply corrupted");
    }
    let device = u32::from_be_bytes([reply[0], reply[1], reply[2], reply[3]]);
    println!("CRC32/MPEG-2 0x{address:08x}+0x{len:x}: 0x{device:08x}");

    if let Some(path) = file {
        let mut data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        // Bytes past the end of the file read as erased flash.
        data.resize(len as usize, 0xFF);
        let local = CHECKSUM_CRC.checksum(&data);
        if local != device {
            bail!("Mismatch: {} gives 0x{:08x}", path.display(), local);
        }
        println!("Matches {}", path.display());
    }
    Ok(())
}
