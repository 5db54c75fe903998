// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! SRAM left to the host: readable, writable, and a valid jump target.

use super::bus::Bus;
use super::{AreaType, MemoryHooks, MemoryRegion, RegionInfo};
use crate::error::MemoryError;

pub struct Ram<B> {
    bus: B,
    start: u32,
    end: u32,
}

impl<B: Bus> Ram<B> {
    /// `start` must lie above the RAM the bootloader itself uses.
    pub const fn new(bus: B, start: u32, end: u32) -> Self {
        Self { bus, start, end }
    }
}

impl<B: Bus> MemoryRegion for Ram<B> {
    fn info(&self) -> RegionInfo {
        RegionInfo::new(self.start, self.end, AreaType::Ram)
    }

    fn read(&self, address: u32) -> Option<u8> {
        Some(self.bus.read(address))
    }

    fn write(
        &self,
        address: u32,
        data: &[u8],
        hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        for (target, &byte) in (address..).zip(data) {
            self.bus.write(target, byte);
        }
        hooks.poll();
        Ok(())
    }

    fn jump_capable(&self) -> bool {
        true
    }
}
