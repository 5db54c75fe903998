// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! USART dialect of the bootloader protocol, host side.

use std::io::{Read, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serialport::{DataBits, Parity, SerialPort, StopBits};

use openbl_core::protocol::{address_frame, ACK_BYTE, NACK_BYTE, USART_SYNC_BYTE};

const DEFAULT_TIMEOUT_MS: u64 = 1_000;

/// Serial link to a bootloader in USART mode.
pub struct Transport {
    port: Box<dyn SerialPort>,
    port_name: String,
}

impl Transport {
    /// Open the port (8E1) and run the auto-baud handshake.
    pub fn new(port_name: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::Even)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()
            .with_context(|| format!("Failed to open {port_name}"))?;

        let mut transport = Self {
            port,
            port_name: port_name.to_string(),
        };
        transport.sync()?;
        Ok(transport)
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn sync(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::Input)?;
        self.write_all(&[USART_SYNC_BYTE])?;
        self.expect_ack("Sync")
    }

    pub fn set_timeout(&mut self, timeout_ms: u64) -> Result<()> {
        self.port
            .set_timeout(Duration::from_millis(timeout_ms))
            .context("Failed to set serial timeout")
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data).context("Serial write failed")?;
        self.port.flush().context("Serial flush failed")
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.port
            .read_exact(buf)
            .context("Timed out waiting for the bootloader")
    }

    /// Read one ACK/NACK byte. `what` names the step for the error message.
    pub fn expect_ack(&mut self, what: &str) -> Result<()> {
        match self.read_byte()? {
            ACK_BYTE => Ok(()),
            NACK_BYTE => bail!("{what}: NACK"),
            other => bail!("{what}: unexpected byte 0x{other:02x}"),
        }
    }

    /// Send `opcode, !opcode` and wait for the ACK.
    pub fn command(&mut self, opcode: u8) -> Result<()> {
        self.write_all(&[opcode, !opcode])?;
        self.expect_ack(&format!("Command 0x{opcode:02x}"))
    }

    /// Send a checksummed address and wait for the ACK.
    pub fn address(&mut self, address: u32) -> Result<()> {
        self.write_all(&address_frame(address))?;
        self.expect_ack(&format!("Address 0x{address:08x}"))
    }
}
