// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Read-only areas: system memory and engineering bytes.

use super::bus::Bus;
use super::{AreaType, MemoryRegion, RegionInfo};

pub struct Rom<B> {
    bus: B,
    info: RegionInfo,
}

impl<B: Bus> Rom<B> {
    pub const fn system_memory(bus: B, start: u32, end: u32) -> Self {
        Self {
            bus,
            info: RegionInfo::new(start, end, AreaType::SystemMemory),
        }
    }

    pub const fn engi_bytes(bus: B, start: u32, end: u32) -> Self {
        Self {
            bus,
            info: RegionInfo::new(start, end, AreaType::EngiBytes),
        }
    }
}

impl<B: Bus> MemoryRegion for Rom<B> {
    fn info(&self) -> RegionInfo {
        self.info
    }

    fn read(&self, address: u32) -> Option<u8> {
        Some(self.bus.read(address))
    }
}
