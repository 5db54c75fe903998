// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! I3C target transport, block framing.
//!
//! Data moves through private read/write transfers. Acknowledges are raised
//! as in-band interrupts carrying the ACK/NACK byte as payload.

use super::{spin, Framing, ProtocolInfo, Transport, DEFAULT_TIMEOUT_POLLS};
use crate::command::{CommandTable, I3C_COMMANDS};
use crate::interface::{Interface, InterfaceKind};
use crate::platform::Watchdog;
use crate::protocol::{ERROR_COMMAND, I3C_SYNC_BYTE};

pub const I3C_BUFFER_SIZE: usize = 2049;

pub const I3C_PROTOCOL: ProtocolInfo = ProtocolInfo {
    version: 0x10,
    framing: Framing::Block,
    id_length: 0x02,
    version_padding: false,
    buffer_size: I3C_BUFFER_SIZE,
    busy_on_erase: false,
};

/// Non-blocking access to the I3C peripheral in target mode.
pub trait I3cTarget {
    fn init(&mut self);

    fn deinit(&mut self);

    /// True once the controller assigned a dynamic address.
    fn dynamic_address_assigned(&mut self) -> bool;

    fn try_read(&mut self) -> Option<u8>;

    fn try_write(&mut self, byte: u8) -> bool;

    /// Raise an in-band interrupt with a one-byte payload; `false` until the
    /// controller accepted it.
    fn try_send_ibi(&mut self, payload: u8) -> bool;
}

pub struct I3cTransport<T, W> {
    target: T,
    watchdog: W,
    timeout: u32,
}

impl<T: I3cTarget, W: Watchdog> I3cTransport<T, W> {
    pub const fn new(target: T, watchdog: W) -> Self {
        Self {
            target,
            watchdog,
            timeout: DEFAULT_TIMEOUT_POLLS,
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

impl<T: I3cTarget, W: Watchdog> Transport for I3cTransport<T, W> {
    fn protocol(&self) -> &ProtocolInfo {
        &I3C_PROTOCOL
    }

    fn set_timeout(&mut self, polls: u32) {
        self.timeout = polls;
    }

    fn get_opcode(&mut self) -> u8 {
        let mut frame = [0u8; 2];
        self.read_bytes(&mut frame);
        if frame[0] ^ frame[1] == 0xFF {
            frame[0]
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
        spin(&self.watchdog, Some(self.timeout), || {
            self.target.try_send_ibi(byte).then_some(())
        })
    }

    fn on_wait(&mut self) {
        self.watchdog.refresh();
    }
}

impl<T: I3cTarget, W: Watchdog> Interface for I3cTransport<T, W> {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::I3c
    }

    fn init(&mut self) {
        self.target.init();
    }

    fn deinit(&mut self) {
        self.target.deinit();
    }

    /// Dynamic address assigned, then the 0x5A synchronization byte.
    fn detect(&mut self) -> bool {
        if !self.target.dynamic_address_assigned() {
            return false;
        }
        self.target.try_read() == Some(I3C_SYNC_BYTE)
    }

    fn commands(&self) -> CommandTable {
        I3C_COMMANDS
    }

    fn transport(&mut self) -> Option<&mut dyn Transport> {
        Some(self)
    }
}
