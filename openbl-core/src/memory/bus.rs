// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Byte access to memory-mapped storage.

pub trait Bus {
    fn read(&self, address: u32) -> u8;

    fn write(&self, address: u32, byte: u8);
}

/// Direct volatile access to the MCU address space.
pub struct Volatile {
    _private: (),
}

impl Volatile {
    /// # Safety
    /// Every address later passed to [`Bus`] methods must be a valid,
    /// mapped location on the running MCU.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Bus for Volatile {
    fn read(&self, address: u32) -> u8 {
        // SAFETY: guaranteed by the constructor contract.
        unsafe { (address as *const u8).read_volatile() }
    }

    fn write(&self, address: u32, byte: u8) {
        // SAFETY: guaranteed by the constructor contract.
        unsafe { (address as *mut u8).write_volatile(byte) }
    }
}
