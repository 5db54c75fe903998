// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! SPI target transport, phased framing.
//!
//! Commands start with the 0x5A start-of-frame byte. Acknowledges are a dummy
//! 0xA5 byte, the ACK/NACK byte, then the host's ACK confirmation. The host
//! cannot be stretched, so busy bytes are clocked out during erases.

use super::{spin, Framing, ProtocolInfo, Transport, DEFAULT_TIMEOUT_POLLS};
use crate::command::{CommandTable, SPI_COMMANDS};
use crate::interface::{Interface, InterfaceKind};
use crate::platform::Watchdog;
use crate::protocol::{ACK_BYTE, BUSY_BYTE, ERROR_COMMAND, SPI_SYNC_BYTE, SYNC_BYTE};

pub const SPI_BUFFER_SIZE: usize = 1164;

pub const SPI_PROTOCOL: ProtocolInfo = ProtocolInfo {
    version: 0x11,
    framing: Framing::Phased,
    id_length: 0x01,
    version_padding: false,
    buffer_size: SPI_BUFFER_SIZE,
    busy_on_erase: true,
};

/// Non-blocking access to the SPI peripheral in target mode.
pub trait SpiTarget {
    fn init(&mut self);

    fn deinit(&mut self);

    fn try_read(&mut self) -> Option<u8>;

    /// `false` while the transmit FIFO is full.
    fn try_write(&mut self, byte: u8) -> bool;
}

pub struct SpiTransport<T, W> {
    target: T,
    watchdog: W,
    timeout: u32,
    busy: bool,
}

impl<T: SpiTarget, W: Watchdog> SpiTransport<T, W> {
    pub const fn new(target: T, watchdog: W) -> Self {
        Self {
            target,
            watchdog,
            timeout: DEFAULT_TIMEOUT_POLLS,
            busy: false,
        }
    }

    pub fn with_timeout(mut self, polls: u32) -> Self {
        self.timeout = polls;
        self
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }
}

impl<T: SpiTarget, W: Watchdog> Transport for SpiTransport<T, W> {
    fn protocol(&self) -> &ProtocolInfo {
        &SPI_PROTOCOL
    }

    fn set_timeout(&mut self, polls: u32) {
        self.timeout = polls;
    }

    fn get_opcode(&mut self) -> u8 {
        while self.read_byte() != SPI_SYNC_BYTE {}
        let opcode = self.read_byte();
        let complement = self.read_byte();
        if opcode ^ complement == 0xFF {
            opcode
        } else {
            ERROR_COMMAND
        }
    }

    fn read_byte(&mut self) -> u8 {
        spin(&self.watchdog, Some(self.timeout), || self.target.try_read())
    }

    fn send_byte(&mut self, byte: u8) {
        spin(&self.watchdog, Some(self.timeout), || {
            self.target.try_write(byte).then_some(())
        })
    }

    fn send_ack(&mut self, byte: u8) {
        self.send_byte(SYNC_BYTE);
        self.send_byte(byte);
        let confirmation = self.read_byte();
        if confirmation != ACK_BYTE {
            warn!("SPI host confirmed with 0x{:02x}", confirmation);
        }
    }

    fn set_busy_state(&mut self, enabled: bool) {
        self.busy = enabled;
    }

    fn on_wait(&mut self) {
        self.watchdog.refresh();
        if self.busy {
            // Dropped when the FIFO is full; the host keeps polling anyway.
            let _ = self.target.try_write(BUSY_BYTE);
        }
    }
}

impl<T: SpiTarget, W: Watchdog> Interface for SpiTransport<T, W> {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::Spi
    }

    fn init(&mut self) {
        self.target.init();
    }

    fn deinit(&mut self) {
        self.busy = false;
        self.target.deinit();
    }

    /// The host announces itself with a lone 0x5A, answered by an ACK.
    fn detect(&mut self) -> bool {
        if self.target.try_read() != Some(SPI_SYNC_BYTE) {
            return false;
        }
        self.send_ack(ACK_BYTE);
        true
    }

    fn commands(&self) -> CommandTable {
        SPI_COMMANDS
    }

    fn transport(&mut self) -> Option<&mut dyn Transport> {
        Some(self)
    }
}
