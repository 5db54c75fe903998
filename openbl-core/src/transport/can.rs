// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! CAN and FDCAN transports, inline framing.
//!
//! The opcode travels in the frame identifier and every reply frame reuses
//! it. Field bytes are drained from received payloads in order and reply
//! bytes are packed into frames of up to `MTU` bytes. The bus protects each
//! frame with its own CRC, so checksum bytes are neither sent nor expected.

use heapless::Vec;

use super::{spin, Framing, ProtocolInfo, Transport};
use crate::command::{CommandTable, CAN_COMMANDS};
use crate::interface::{Interface, InterfaceKind};
use crate::platform::Watchdog;
use crate::protocol::{ACK_BYTE, CAN_SYNC_ID, ERROR_COMMAND};

/// Largest payload of an FDCAN frame.
pub const MAX_PAYLOAD: usize = 64;

pub const CAN_BUFFER_SIZE: usize = 1164;

pub const CAN_PROTOCOL: ProtocolInfo = ProtocolInfo {
    version: 0x20,
    framing: Framing::Inline,
    id_length: 0x01,
    version_padding: false,
    buffer_size: CAN_BUFFER_SIZE,
    busy_on_erase: false,
};

pub const FDCAN_PROTOCOL: ProtocolInfo = ProtocolInfo {
    version: 0x10,
    ..CAN_PROTOCOL
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanFrame {
    pub id: u16,
    pub len: u8,
    pub data: [u8; MAX_PAYLOAD],
}

impl CanFrame {
    pub const EMPTY: Self = Self {
        id: 0,
        len: 0,
        data: [0; MAX_PAYLOAD],
    };

    /// Frame carrying `payload`, cut to [`MAX_PAYLOAD`] bytes.
    pub fn new(id: u16, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_PAYLOAD);
        let mut data = [0u8; MAX_PAYLOAD];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            id,
            len: len as u8,
            data,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.len).min(MAX_PAYLOAD)]
    }
}

/// Non-blocking access to a CAN or FDCAN controller.
pub trait CanBus {
    fn init(&mut self);

    fn deinit(&mut self);

    fn try_receive(&mut self) -> Option<CanFrame>;

    /// `false` while every transmit mailbox is busy.
    fn try_transmit(&mut self, frame: &CanFrame) -> bool;

    fn bitrate_supported(&self, code: u8) -> bool;

    fn set_bitrate(&mut self, code: u8);
}

pub struct CanTransport<B, W, const MTU: usize> {
    bus: B,
    watchdog: W,
    opcode: u8,
    rx: CanFrame,
    rx_pos: usize,
    tx: Vec<u8, MTU>,
}

/// Classic CAN, 8-byte frames.
pub type ClassicCanTransport<B, W> = CanTransport<B, W, 8>;

/// FDCAN, 64-byte frames.
pub type FdCanTransport<B, W> = CanTransport<B, W, MAX_PAYLOAD>;

impl<B: CanBus, W: Watchdog, const MTU: usize> CanTransport<B, W, MTU> {
    pub const fn new(bus: B, watchdog: W) -> Self {
        Self {
            bus,
            watchdog,
            opcode: 0,
            rx: CanFrame::EMPTY,
            rx_pos: 0,
            tx: Vec::new(),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    fn receive(&mut self) -> CanFrame {
        spin(&self.watchdog, None, || self.bus.try_receive())
    }

    fn transmit(&mut self, frame: CanFrame) {
        spin(&self.watchdog, None, || {
            self.bus.try_transmit(&frame).then_some(())
        })
    }

    fn flush(&mut self) {
        if self.tx.is_empty() {
            return;
        }
        let frame = CanFrame::new(u16::from(self.opcode), &self.tx);
        self.tx.clear();
        self.transmit(frame);
    }
}

impl<B: CanBus, W: Watchdog, const MTU: usize> Transport for CanTransport<B, W, MTU> {
    fn protocol(&self) -> &ProtocolInfo {
        if MTU > 8 {
            &FDCAN_PROTOCOL
        } else {
            &CAN_PROTOCOL
        }
    }

    fn get_opcode(&mut self) -> u8 {
        self.tx.clear();
        let frame = self.receive();
        self.rx = frame;
        self.rx_pos = 0;
        match u8::try_from(frame.id) {
            Ok(opcode) => {
                self.opcode = opcode;
                opcode
            }
            Err(_) => {
                self.opcode = ERROR_COMMAND;
                ERROR_COMMAND
            }
        }
    }

    fn read_byte(&mut self) -> u8 {
        loop {
            if let Some(&byte) = self.rx.payload().get(self.rx_pos) {
                self.rx_pos += 1;
                return byte;
            }
            self.rx = self.receive();
            self.rx_pos = 0;
        }
    }

    fn send_byte(&mut self, byte: u8) {
        if self.tx.push(byte).is_err() {
            self.flush();
            let _ = self.tx.push(byte);
        }
        if self.tx.is_full() {
            self.flush();
        }
    }

    fn send_ack(&mut self, byte: u8) {
        self.flush();
        self.transmit(CanFrame::new(u16::from(self.opcode), &[byte]));
    }

    fn end_send(&mut self) {
        self.flush();
    }

    fn check(&mut self, _expected: u8) -> bool {
        true
    }

    fn on_wait(&mut self) {
        self.watchdog.refresh();
    }

    fn speed_supported(&self, code: u8) -> bool {
        self.bus.bitrate_supported(code)
    }

    fn set_speed(&mut self, code: u8) {
        self.flush();
        self.bus.set_bitrate(code);
    }
}

impl<B: CanBus, W: Watchdog, const MTU: usize> Interface for CanTransport<B, W, MTU> {
    fn kind(&self) -> InterfaceKind {
        if MTU > 8 {
            InterfaceKind::FdCan
        } else {
            InterfaceKind::Can
        }
    }

    fn init(&mut self) {
        self.bus.init();
    }

    fn deinit(&mut self) {
        self.tx.clear();
        self.bus.deinit();
    }

    /// A frame with the synchronization identifier, answered by an ACK frame.
    fn detect(&mut self) -> bool {
        match self.bus.try_receive() {
            Some(frame) if frame.id == CAN_SYNC_ID => {
                self.transmit(CanFrame::new(CAN_SYNC_ID, &[ACK_BYTE]));
                true
            }
            _ => false,
        }
    }

    fn commands(&self) -> CommandTable {
        CAN_COMMANDS
    }

    fn transport(&mut self) -> Option<&mut dyn Transport> {
        Some(self)
    }
}
