// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Memory map and identity of the reference target (STM32H5, 2 MB flash).
//!
//! Ranges are half-open: `start..end`.

use crate::memory::flash::FlashGeometry;

/// Product ID reported by GetID.
pub const DEVICE_ID: u16 = 0x0484;

pub const FLASH_START: u32 = 0x0800_0000;
pub const FLASH_BANK_SIZE: u32 = 0x0010_0000;
pub const FLASH_PAGE_SIZE: u32 = 0x2000;
pub const FLASH_END: u32 = FLASH_START + 2 * FLASH_BANK_SIZE;

pub const FLASH_GEOMETRY: FlashGeometry = FlashGeometry {
    base: FLASH_START,
    bank_size: FLASH_BANK_SIZE,
    page_size: FLASH_PAGE_SIZE,
    banks: 2,
};

/// SRAM handed to the host. The first 16 KB belong to the bootloader.
pub const RAM_START: u32 = 0x2000_4000;
pub const RAM_END: u32 = 0x200A_0000;

pub const OTP_START: u32 = 0x08FF_F000;
pub const OTP_END: u32 = 0x08FF_F800;

pub const ENGI_BYTES_START: u32 = 0x08FF_F800;
pub const ENGI_BYTES_END: u32 = 0x08FF_FA00;

pub const OPTION_BYTES_START: u32 = 0x4002_2040;
pub const OPTION_BYTES_END: u32 = 0x4002_2100;

pub const SYSTEM_MEMORY_START: u32 = 0x0BF8_0000;
pub const SYSTEM_MEMORY_END: u32 = 0x0BF9_0000;

/// Build-time settings of one bootloader image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub device_id: u16,
    /// Wait budget for I2C, SPI and I3C flag polling before a recovery reset,
    /// applied to every interface at registration. `None` keeps the budget
    /// each transport was built with.
    pub transport_timeout: Option<u32>,
}

impl Config {
    pub const fn new(device_id: u16) -> Self {
        Self {
            device_id,
            transport_timeout: None,
        }
    }

    pub const fn with_transport_timeout(mut self, polls: u32) -> Self {
        self.transport_timeout = Some(polls);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEVICE_ID)
    }
}
