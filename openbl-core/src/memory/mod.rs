// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Memory regions and the registry that routes address-based operations to
//! them.
//!
//! Every physical memory (flash, RAM, OTP, option bytes, ...) implements
//! [`MemoryRegion`]. Capabilities a region lacks keep their default method,
//! which reports [`MemoryError::Unsupported`]. The registry is filled once at
//! boot and resolves an address to the first region whose range contains it.

pub mod bus;
pub mod flash;
pub mod option_bytes;
pub mod otp;
pub mod ram;
pub mod rom;

use core::convert::Infallible;

use heapless::Vec;

use crate::error::{MemoryError, RegistryError};
use crate::platform::{Platform, VectorTable};
use crate::post::PostAction;

/// Maximum number of regions a registry holds.
pub const MEMORY_CAPACITY: usize = 8;

/// Kind of memory behind an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AreaType {
    Flash,
    Ram,
    Otp,
    OptionBytes,
    EngiBytes,
    SystemMemory,
}

/// Address range `[start, end)` and kind of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegionInfo {
    pub start: u32,
    pub end: u32,
    pub area: AreaType,
}

impl RegionInfo {
    pub const fn new(start: u32, end: u32, area: AreaType) -> Self {
        Self { start, end, area }
    }

    pub const fn size(&self) -> u32 {
        self.end - self.start
    }

    pub fn contains(&self, address: u32) -> bool {
        (self.start..self.end).contains(&address)
    }

    /// True when the `len` bytes starting at `address` stay inside the region.
    pub fn contains_range(&self, address: u32, len: usize) -> bool {
        let Ok(len) = u32::try_from(len) else {
            return false;
        };
        self.contains(address) && len <= self.end - address
    }

    fn overlaps(&self, other: &RegionInfo) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Readout protection level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RdpLevel {
    Level0,
    Level1,
}

/// Write protection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProtection<'d> {
    /// Protect the areas described by the payload.
    Enable(&'d [u8]),
    /// Remove protection from every area.
    Disable,
}

/// Target of a mass erase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MassErase {
    All,
    Bank1,
    Bank2,
}

impl MassErase {
    /// Decodes an extended-erase sentinel.
    pub fn from_sentinel(count: u16) -> Option<Self> {
        match count {
            crate::protocol::ERASE_ALL => Some(Self::All),
            crate::protocol::ERASE_BANK1 => Some(Self::Bank1),
            crate::protocol::ERASE_BANK2 => Some(Self::Bank2),
            _ => None,
        }
    }
}

/// Page numbers as big-endian byte pairs, the way hosts send them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageList<'d> {
    bytes: &'d [u8],
}

impl<'d> PageList<'d> {
    /// A trailing odd byte is ignored.
    pub fn new(bytes: &'d [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + 'd {
        self.bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
    }
}

/// Callbacks available to a memory operation while it runs.
pub trait MemoryHooks {
    /// Called on every iteration of a completion wait.
    fn poll(&mut self);

    /// Schedule `action` for after the response has been sent.
    fn defer(&mut self, action: PostAction);
}

/// A physical memory reachable through the bootloader.
pub trait MemoryRegion {
    fn info(&self) -> RegionInfo;

    /// `None` when the region cannot be read.
    fn read(&self, _address: u32) -> Option<u8> {
        None
    }

    fn write(
        &self,
        _address: u32,
        _data: &[u8],
        _hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        Err(MemoryError::Unsupported)
    }

    fn set_readout_protection(
        &self,
        _level: RdpLevel,
        _hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        Err(MemoryError::Unsupported)
    }

    fn set_write_protection(
        &self,
        _request: WriteProtection<'_>,
        _hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        Err(MemoryError::Unsupported)
    }

    fn mass_erase(
        &self,
        _target: MassErase,
        _hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        Err(MemoryError::Unsupported)
    }

    fn erase(&self, _pages: PageList<'_>, _hooks: &mut dyn MemoryHooks) -> Result<(), MemoryError> {
        Err(MemoryError::Unsupported)
    }

    /// True when code may be started from this region.
    fn jump_capable(&self) -> bool {
        false
    }
}

/// Ordered, fixed-capacity table of memory regions.
pub struct MemoryRegistry<'a> {
    regions: Vec<&'a dyn MemoryRegion, MEMORY_CAPACITY>,
}

impl<'a> MemoryRegistry<'a> {
    pub const fn new() -> Self {
        Self { regions: Vec::new() }
    }

    /// Append a region. Ranges must not intersect already registered ones.
    pub fn register(&mut self, region: &'a dyn MemoryRegion) -> Result<(), RegistryError> {
        let info = region.info();
        if self.regions.iter().any(|r| r.info().overlaps(&info)) {
            warn!("Memory range 0x{:08x}..0x{:08x} overlaps", info.start, info.end);
            return Err(RegistryError::Overlap);
        }
        self.regions.push(region).map_err(|_| RegistryError::Full)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Index of the first region containing `address`.
    pub fn index_of(&self, address: u32) -> Option<usize> {
        self.regions.iter().position(|r| r.info().contains(address))
    }

    /// Kind of memory at `address`; `None` stands for the area error.
    pub fn area_of(&self, address: u32) -> Option<AreaType> {
        self.region(address).map(|r| r.info().area)
    }

    /// Start address of the first flash region, the target of erase and
    /// protection commands.
    pub fn default_address(&self) -> Option<u32> {
        self.regions
            .iter()
            .map(|r| r.info())
            .find(|i| i.area == AreaType::Flash)
            .map(|i| i.start)
    }

    /// Read one byte through the region at `index`; unreadable or unknown
    /// locations read as 0.
    pub fn read(&self, address: u32, index: Option<usize>) -> u8 {
        index
            .and_then(|i| self.regions.get(i))
            .and_then(|r| r.read(address))
            .unwrap_or(0)
    }

    pub fn try_read(&self, address: u32) -> Result<u8, MemoryError> {
        self.region(address)
            .ok_or(MemoryError::NotFound)?
            .read(address)
            .ok_or(MemoryError::Unsupported)
    }

    pub fn write(
        &self,
        address: u32,
        data: &[u8],
        hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        let region = self.region(address).ok_or(MemoryError::NotFound)?;
        if !region.info().contains_range(address, data.len()) {
            return Err(MemoryError::OutOfRange);
        }
        region.write(address, data, hooks)
    }

    pub fn set_readout_protection(
        &self,
        address: u32,
        enable: bool,
        hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        let level = if enable { RdpLevel::Level1 } else { RdpLevel::Level0 };
        self.region(address)
            .ok_or(MemoryError::NotFound)?
            .set_readout_protection(level, hooks)
    }

    pub fn set_write_protection(
        &self,
        address: u32,
        request: WriteProtection<'_>,
        hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        self.region(address)
            .ok_or(MemoryError::NotFound)?
            .set_write_protection(request, hooks)
    }

    pub fn mass_erase(
        &self,
        address: u32,
        target: MassErase,
        hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        self.region(address)
            .ok_or(MemoryError::NotFound)?
            .mass_erase(target, hooks)
    }

    pub fn erase(
        &self,
        address: u32,
        pages: PageList<'_>,
        hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        self.region(address)
            .ok_or(MemoryError::NotFound)?
            .erase(pages, hooks)
    }

    /// True iff the region containing `address` can be jumped into.
    pub fn check_jump_address(&self, address: u32) -> bool {
        self.region(address).is_some_and(|r| r.jump_capable())
    }

    /// Vector table at `address`, read through its region.
    pub fn vector_table(&self, address: u32) -> Result<VectorTable, MemoryError> {
        let region = self.region(address).ok_or(MemoryError::NotFound)?;
        if !region.jump_capable() {
            return Err(MemoryError::Unsupported);
        }
        if !region.info().contains_range(address, 8) {
            return Err(MemoryError::OutOfRange);
        }
        let mut bytes = [0u8; 8];
        for (offset, byte) in (0u32..).zip(bytes.iter_mut()) {
            *byte = region.read(address + offset).ok_or(MemoryError::Unsupported)?;
        }
        Ok(VectorTable::from_bytes(address, bytes))
    }

    /// Transfer control to the image at `address`. Only returns on failure.
    pub fn jump_to_address(
        &self,
        address: u32,
        platform: &mut dyn Platform,
    ) -> Result<Infallible, MemoryError> {
        let target = self.vector_table(address)?;
        info!(
            "Jumping to 0x{:08x} (sp 0x{:08x}, reset 0x{:08x})",
            target.base,
            target.initial_sp,
            target.reset_vector
        );
        platform.jump(target)
    }

    fn region(&self, address: u32) -> Option<&'a dyn MemoryRegion> {
        self.index_of(address).and_then(|i| self.regions.get(i)).copied()
    }
}

impl Default for MemoryRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}
