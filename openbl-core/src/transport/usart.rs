// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! USART transport: 8E1 link, auto-baud on the 0x7F frame, inline framing.

use super::{spin, Framing, ProtocolInfo, Transport};
use crate::command::{CommandTable, USART_COMMANDS};
use crate::interface::{Interface, InterfaceKind};
use crate::platform::Watchdog;
use crate::protocol::{ACK_BYTE, ERROR_COMMAND, USART_SYNC_BYTE};

/// Scratch bytes needed by the largest USART frame.
pub const USART_BUFFER_SIZE: usize = 1164;

pub const USART_PROTOCOL: ProtocolInfo = ProtocolInfo {
    version: 0x31,
    framing: Framing::Inline,
    id_length: 0x01,
    version_padding: true,
    buffer_size: USART_BUFFER_SIZE,
    busy_on_erase: false,
};

/// Non-blocking access to the USART peripheral.
pub trait UsartPort {
    fn init(&mut self);

    fn deinit(&mut self);

    fn try_read(&mut self) -> Option<u8>;

    /// `false` while the transmit register is still full.
    fn try_write(&mut self, byte: u8) -> bool;
}

pub struct UsartTransport<P, W> {
    port: P,
    watchdog: W,
}

impl<P: UsartPort, W: Watchdog> UsartTransport<P, W> {
    pub const fn new(port: P, watchdog: W) -> Self {
        Self { port, watchdog }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}

impl<P: UsartPort, W: Watchdog> Transport for UsartTransport<P, W> {
    fn protocol(&self) -> &ProtocolInfo {
        &USART_PROTOCOL
    }

    fn get_opcode(&mut self) -> u8 {
        let opcode = self.read_byte();
        let complement = self.read_byte();
        if opcode ^ complement == 0xFF {
            opcode
        } else {
            ERROR_COMMAND
        }
    }

    fn read_byte(&mut self) -> u8 {
        spin(&self.watchdog, None, || self.port.try_read())
    }

    fn send_byte(&mut self, byte: u8) {
        spin(&self.watchdog, None, || self.port.try_write(byte).then_some(()))
    }

    fn on_wait(&mut self) {
        self.watchdog.refresh();
    }
}

impl<P: UsartPort, W: Watchdog> Interface for UsartTransport<P, W> {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::Usart
    }

    fn init(&mut self) {
        self.port.init();
    }

    fn deinit(&mut self) {
        self.port.deinit();
    }

    /// The host opens the session with a single 0x7F, answered by an ACK.
    fn detect(&mut self) -> bool {
        if self.port.try_read() != Some(USART_SYNC_BYTE) {
            return false;
        }
        self.send_byte(ACK_BYTE);
        true
    }

    fn commands(&self) -> CommandTable {
        USART_COMMANDS
    }

    fn transport(&mut self) -> Option<&mut dyn Transport> {
        Some(self)
    }
}
