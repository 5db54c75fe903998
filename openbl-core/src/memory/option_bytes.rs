// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Option-byte area. Writes are staged word by word, committed, and take
//! effect through an option-byte reload after the response is sent.

use super::flash::{FlashDriver, FlashRegisters};
use super::{AreaType, MemoryHooks, MemoryRegion, RegionInfo};
use crate::error::MemoryError;

pub struct OptionBytes<'a, R> {
    flash: &'a FlashDriver<R>,
    start: u32,
    end: u32,
}

impl<'a, R: FlashRegisters> OptionBytes<'a, R> {
    pub const fn new(flash: &'a FlashDriver<R>, start: u32, end: u32) -> Self {
        Self { flash, start, end }
    }
}

impl<R: FlashRegisters> MemoryRegion for OptionBytes<'_, R> {
    fn info(&self) -> RegionInfo {
        RegionInfo::new(self.start, self.end, AreaType::OptionBytes)
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
        let offset = address
            .checked_sub(self.start)
            .ok_or(MemoryError::OutOfRange)?;
        self.flash.program_option_bytes(offset, data, hooks)
    }
}
