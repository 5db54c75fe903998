// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! USB DFU bridge.
//!
//! USB has no byte-level command loop: the DFU class stack decodes host
//! requests and the session serves them against the memory registry. Start
//! of frame traffic binds the interface and shuts every other one down.

use crate::command::CommandTable;
use crate::interface::{Interface, InterfaceKind};

/// Memory request decoded by the DFU class stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuRequest {
    /// Host reads `length` bytes at `address`.
    Upload { address: u32, length: usize },
    /// Host wrote `length` bytes, already copied to the front of the buffer.
    Download { address: u32, length: usize },
    Erase { page: u16 },
    MassErase,
    /// Leave DFU mode and start the image at `address`.
    Leave { address: u32 },
}

/// Outcome reported back to the DFU state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuStatus {
    Ok,
    ErrTarget,
    ErrAddress,
    ErrWrite,
    ErrErase,
}

/// Request/response side of a DFU device.
pub trait DfuLink {
    /// Next pending request. Download payloads land in `buf`.
    fn poll(&mut self, buf: &mut [u8]) -> Option<DfuRequest>;

    /// Complete the current request; `data` answers an upload.
    fn respond(&mut self, status: DfuStatus, data: &[u8]);
}

/// USB device controller running the DFU class.
pub trait UsbDfuDevice: DfuLink {
    fn init(&mut self);

    fn deinit(&mut self);

    fn sof_detected(&mut self) -> bool;
}

pub struct UsbInterface<D> {
    device: D,
}

impl<D: UsbDfuDevice> UsbInterface<D> {
    pub const fn new(device: D) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: UsbDfuDevice> Interface for UsbInterface<D> {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::Usb
    }

    fn init(&mut self) {
        self.device.init();
    }

    fn deinit(&mut self) {
        self.device.deinit();
    }

    fn detect(&mut self) -> bool {
        self.device.sof_detected()
    }

    fn exclusive(&self) -> bool {
        true
    }

    fn commands(&self) -> CommandTable {
        CommandTable::EMPTY
    }

    fn dfu(&mut self) -> Option<&mut dyn DfuLink> {
        Some(&mut self.device)
    }
}
