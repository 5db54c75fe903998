// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! I2C target transport, phased framing.
//!
//! Every host write phase starts with an address match and ends with a STOP.
//! Every host read phase starts with an address match and ends with the
//! host's NACK followed by a STOP. Acknowledges travel in their own read
//! phase. All waits are bounded; a silent host resets the MCU.

use super::{spin, Framing, ProtocolInfo, Transport, DEFAULT_TIMEOUT_POLLS};
use crate::command::{CommandTable, I2C_COMMANDS};
use crate::interface::{Interface, InterfaceKind};
use crate::platform::Watchdog;
use crate::protocol::{BUSY_BYTE, ERROR_COMMAND};

pub const I2C_BUFFER_SIZE: usize = 1164;

pub const I2C_PROTOCOL: ProtocolInfo = ProtocolInfo {
    version: 0x12,
    framing: Framing::Phased,
    id_length: 0x01,
    version_padding: false,
    buffer_size: I2C_BUFFER_SIZE,
    busy_on_erase: false,
};

/// Non-blocking access to the I2C peripheral in target mode.
pub trait I2cTarget {
    fn init(&mut self);

    fn deinit(&mut self);

    /// Address-match flag, left set.
    fn address_pending(&mut self) -> bool;

    /// Address-match flag, cleared when set.
    fn take_address_match(&mut self) -> bool;

    fn try_read(&mut self) -> Option<u8>;

    fn try_write(&mut self, byte: u8) -> bool;

    /// Host NACK flag, cleared when set.
    fn take_nack(&mut self) -> bool;

    /// STOP condition flag, cleared when set.
    fn take_stop(&mut self) -> bool;
}

pub struct I2cTransport<T, W> {
    target: T,
    watchdog: W,
    timeout: u32,
    busy: bool,
}

impl<T: I2cTarget, W: Watchdog> I2cTransport<T, W> {
    pub const fn new(target: T, watchdog: W) -> Self {
        Self {
            target,
            watchdog,
            timeout: DEFAULT_TIMEOUT_POLLS,
            busy: false,
        }
    }

    /// Polls allowed per wait before the recovery reset.
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

    fn wait_address(&mut self) {
        spin(&self.watchdog, Some(self.timeout), || {
            self.target.take_address_match().then_some(())
        })
    }

    fn wait_nack(&mut self) {
        spin(&self.watchdog, Some(self.timeout), || {
            self.target.take_nack().then_some(())
        })
    }

    fn wait_stop(&mut self) {
        spin(&self.watchdog, Some(self.timeout), || {
            self.target.take_stop().then_some(())
        })
    }
}

impl<T: I2cTarget, W: Watchdog> Transport for I2cTransport<T, W> {
    fn protocol(&self) -> &ProtocolInfo {
        &I2C_PROTOCOL
    }

    fn set_timeout(&mut self, polls: u32) {
        self.timeout = polls;
    }

    fn get_opcode(&mut self) -> u8 {
        self.wait_address();
        let opcode = self.read_byte();
        let complement = self.read_byte();
        self.wait_stop();
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
        self.wait_address();
        self.send_byte(byte);
        self.wait_nack();
        self.wait_stop();
    }

    fn begin_receive(&mut self) {
        self.wait_address();
    }

    fn end_receive(&mut self) {
        self.wait_stop();
    }

    fn begin_send(&mut self) {
        self.wait_address();
    }

    fn end_send(&mut self) {
        self.wait_nack();
        self.wait_stop();
    }

    fn set_busy_state(&mut self, enabled: bool) {
        self.busy = enabled;
    }

    /// A host polling while a memory operation runs reads one busy byte.
    fn on_wait(&mut self) {
        self.watchdog.refresh();
        if self.busy && self.target.take_address_match() {
            self.send_byte(BUSY_BYTE);
            self.wait_nack();
            self.wait_stop();
        }
    }
}

impl<T: I2cTarget, W: Watchdog> Interface for I2cTransport<T, W> {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::I2c
    }

    fn init(&mut self) {
        self.target.init();
    }

    fn deinit(&mut self) {
        self.busy = false;
        self.target.deinit();
    }

    /// The address match is left pending for the first opcode read.
    fn detect(&mut self) -> bool {
        self.target.address_pending()
    }

    fn commands(&self) -> CommandTable {
        I2C_COMMANDS
    }

    fn transport(&mut self) -> Option<&mut dyn Transport> {
        Some(self)
    }
}
