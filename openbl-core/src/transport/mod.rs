// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Byte transports the command engine talks through.
//!
//! A [`Transport`] offers byte primitives plus a handful of framing hooks.
//! The command handlers are written once against these hooks; each bus fills
//! them in according to its dialect:
//!
//! | Dialect  | Buses      | Shape                                            |
//! |----------|------------|--------------------------------------------------|
//! | Inline   | USART, CAN | fields and checksums in one run                  |
//! | Phased   | I2C, SPI   | every host write phase acknowledged separately   |
//! | Block    | I3C        | fixed-size headers, chunked memory transfers     |

pub mod can;
pub mod i2c;
pub mod i3c;
pub mod spi;
pub mod usart;
pub mod usb;

use crate::platform::Watchdog;

/// Command framing family of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Framing {
    Inline,
    Phased,
    Block,
}

/// Static protocol facts a transport advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProtocolInfo {
    /// Protocol version byte reported by GetCommand/GetVersion.
    pub version: u8,
    pub framing: Framing,
    /// Byte preceding the device ID in a GetID reply.
    pub id_length: u8,
    /// GetVersion appends two option bytes (0x00, 0x00).
    pub version_padding: bool,
    /// Largest frame the transport accepts in one command.
    pub buffer_size: usize,
    /// Send busy bytes while an erase runs, whatever the opcode.
    pub busy_on_erase: bool,
}

/// Byte-level link to the host.
pub trait Transport {
    fn protocol(&self) -> &ProtocolInfo;

    /// Next command opcode, or [`ERROR_COMMAND`](crate::protocol::ERROR_COMMAND)
    /// when its complement does not match.
    fn get_opcode(&mut self) -> u8;

    fn read_byte(&mut self) -> u8;

    fn read_bytes(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = self.read_byte();
        }
    }

    fn send_byte(&mut self, byte: u8);

    fn send_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.send_byte(byte);
        }
    }

    /// Send an ACK or NACK with the bus-specific handshake.
    fn send_ack(&mut self, byte: u8) {
        self.send_byte(byte);
    }

    /// Before reading a host write phase.
    fn begin_receive(&mut self) {}

    /// After the last byte of a host write phase.
    fn end_receive(&mut self) {}

    /// Before streaming a data reply.
    fn begin_send(&mut self) {}

    /// After the last byte of a data reply.
    fn end_send(&mut self) {}

    /// Read a checksum byte and compare it with `expected`. Links that carry
    /// their own integrity check accept without reading.
    fn check(&mut self, expected: u8) -> bool {
        self.read_byte() == expected
    }

    /// Enable or disable busy-byte sending during slow memory operations.
    fn set_busy_state(&mut self, _enabled: bool) {}

    /// Called on every iteration of a memory completion wait.
    fn on_wait(&mut self);

    /// Polls allowed per wait before the recovery reset. Links that never
    /// time out ignore it.
    fn set_timeout(&mut self, _polls: u32) {}

    fn speed_supported(&self, _code: u8) -> bool {
        false
    }

    fn set_speed(&mut self, _code: u8) {}
}

/// Spin until `poll` yields a value, refreshing the watchdog on every
/// iteration. With a budget, running out of iterations resets the MCU.
pub(crate) fn spin<W: Watchdog, T>(
    watchdog: &W,
    budget: Option<u32>,
    mut poll: impl FnMut() -> Option<T>,
) -> T {
    let mut remaining = budget;
    loop {
        watchdog.refresh();
        if let Some(value) = poll() {
            return value;
        }
        if let Some(left) = remaining.as_mut() {
            if *left == 0 {
                warn!("Transport wait expired, resetting");
                watchdog.trigger_watchdog_recovery_reset();
            }
            *left -= 1;
        }
    }
}

/// Default wait budget for buses that reset on a silent host.
pub const DEFAULT_TIMEOUT_POLLS: u32 = 0x0020_0000;
