// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! One-time-programmable area, programmed through the flash controller.

use super::flash::{FlashDriver, FlashRegisters};
use super::{AreaType, MemoryHooks, MemoryRegion, RegionInfo};
use crate::error::MemoryError;

pub struct Otp<'a, R> {
    flash: &'a FlashDriver<R>,
    start: u32,
    end: u32,
}

impl<'a, R: FlashRegisters> Otp<'a, R> {
    pub const fn new(flash: &'a FlashDriver<R>, start: u32, end: u32) -> Self {
        Self { flash, start, end }
    }
}

impl<R: FlashRegisters> MemoryRegion for Otp<'_, R> {
    fn info(&self) -> RegionInfo {
        RegionInfo::new(self.start, self.end, AreaType::Otp)
    }

    fn read(&self, address: u32) -> Option<u8> {
        Some(self.flash.read_byte(address))
    }

    fn write(
        &self,
        address: u32,
        data: &[u8],
        hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        Ok(self.flash.program(address, data, hooks)?)
    }
}
