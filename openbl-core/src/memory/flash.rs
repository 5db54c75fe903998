// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Embedded flash driver.
//!
//! Every program, erase or option-byte change follows the same sequence:
//!   1. unlock the control register with the two-key sequence
//!      (option bytes need a second key pair on top)
//!   2. start the operation, one quad-word or page at a time
//!   3. poll the busy flag with a bounded budget, calling the memory hooks on
//!      every iteration (watchdog refresh, optional busy byte)
//!   4. capture and clear error flags
//!   5. lock again
//!
//! Step 5 is owned by the unlock guards and runs on every exit path.

use core::cell::{Ref, RefCell, RefMut};
use core::ops::{Deref, DerefMut};

use bitflags::bitflags;

use super::{
    MassErase, MemoryHooks, MemoryRegion, PageList, RdpLevel, RegionInfo, WriteProtection,
};
use crate::error::{FlashError, MemoryError};
use crate::memory::AreaType;
use crate::post::PostAction;

pub const FLASH_KEY1: u32 = 0x4567_0123;
pub const FLASH_KEY2: u32 = 0xCDEF_89AB;
pub const OPTION_KEY1: u32 = 0x0819_2A3B;
pub const OPTION_KEY2: u32 = 0x4C5D_6E7F;

/// Programming granularity in bytes.
pub const QUAD_WORD: usize = 16;

/// Number of write-protection areas (two per bank).
pub const WRP_AREAS: usize = 4;

/// Busy-flag polls before an operation is declared timed out.
pub const DEFAULT_TIMEOUT_POLLS: u32 = 0x0010_0000;

bitflags! {
    /// Error flags of the flash status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FlashErrors: u32 {
        const WRITE_PROTECTION = 1 << 17;
        const PROGRAMMING_SEQUENCE = 1 << 18;
        const STROBE = 1 << 19;
        const INCONSISTENCY = 1 << 20;
        const OPTION_CHANGE = 1 << 23;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FlashErrors {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "FlashErrors({=u32:#x})", self.bits())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bank {
    Bank1,
    Bank2,
}

/// Write-protected page span inside one bank, as page offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WrpArea {
    pub start: u8,
    pub end: u8,
}

impl WrpArea {
    /// Start above end: the area protects nothing.
    pub const DISABLED: Self = Self {
        start: 0xFF,
        end: 0x00,
    };
}

/// Register-level primitives of the flash controller.
pub trait FlashRegisters {
    fn write_key(&mut self, key: u32);
    fn is_locked(&self) -> bool;
    fn lock(&mut self);

    fn write_option_key(&mut self, key: u32);
    fn is_option_locked(&self) -> bool;
    fn lock_option(&mut self);

    fn is_busy(&self) -> bool;
    fn errors(&self) -> FlashErrors;
    fn clear_errors(&mut self, errors: FlashErrors);

    /// Start programming 16 bytes at a quad-word aligned address.
    fn program_quad_word(&mut self, address: u32, data: &[u8; QUAD_WORD]);
    fn erase_page(&mut self, bank: Bank, page: u16);
    fn erase_bank(&mut self, target: MassErase);
    fn read(&self, address: u32) -> u8;

    fn set_rdp_level(&mut self, level: RdpLevel);
    fn set_wrp_area(&mut self, index: usize, area: WrpArea);
    /// Stage one option-byte word; `offset` is relative to the option area.
    fn program_option_word(&mut self, offset: u32, value: u32);
    /// Commit staged option bytes.
    fn start_option_change(&mut self);
}

/// Physical layout of the main flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashGeometry {
    pub base: u32,
    pub bank_size: u32,
    pub page_size: u32,
    pub banks: u8,
}

impl FlashGeometry {
    pub const fn pages_per_bank(&self) -> u32 {
        self.bank_size / self.page_size
    }

    pub const fn end(&self) -> u32 {
        self.base + self.bank_size * self.banks as u32
    }

    /// Bank and in-bank index of a global page number.
    pub fn locate(&self, page: u16) -> Result<(Bank, u16), FlashError> {
        let per_bank = self.pages_per_bank();
        let page32 = u32::from(page);
        if page32 < per_bank {
            Ok((Bank::Bank1, page))
        } else if self.banks > 1 && page32 < 2 * per_bank {
            let local = u16::try_from(page32 - per_bank).map_err(|_| FlashError::InvalidPage)?;
            Ok((Bank::Bank2, local))
        } else {
            Err(FlashError::InvalidPage)
        }
    }
}

/// Flash controller unlocked for program/erase. Locks on drop.
pub struct UnlockedFlash<'a, R: FlashRegisters> {
    regs: RefMut<'a, R>,
}

impl<R: FlashRegisters> Deref for UnlockedFlash<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.regs
    }
}

impl<R: FlashRegisters> DerefMut for UnlockedFlash<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.regs
    }
}

impl<R: FlashRegisters> Drop for UnlockedFlash<'_, R> {
    fn drop(&mut self) {
        self.regs.lock();
    }
}

/// Flash and option bytes unlocked. Locks both on drop.
pub struct UnlockedOptions<'a, R: FlashRegisters> {
    flash: UnlockedFlash<'a, R>,
}

impl<R: FlashRegisters> Deref for UnlockedOptions<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.flash
    }
}

impl<R: FlashRegisters> DerefMut for UnlockedOptions<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.flash
    }
}

impl<R: FlashRegisters> Drop for UnlockedOptions<'_, R> {
    fn drop(&mut self) {
        self.flash.lock_option();
    }
}

pub struct FlashDriver<R> {
    regs: RefCell<R>,
    geometry: FlashGeometry,
    timeout_polls: u32,
}

impl<R: FlashRegisters> FlashDriver<R> {
    pub const fn new(regs: R, geometry: FlashGeometry) -> Self {
        Self {
            regs: RefCell::new(regs),
            geometry,
            timeout_polls: DEFAULT_TIMEOUT_POLLS,
        }
    }

    pub fn with_timeout(mut self, polls: u32) -> Self {
        self.timeout_polls = polls;
        self
    }

    pub fn geometry(&self) -> &FlashGeometry {
        &self.geometry
    }

    /// Shared view of the controller.
    pub fn registers(&self) -> Ref<'_, R> {
        self.regs.borrow()
    }

    pub fn read_byte(&self, address: u32) -> u8 {
        self.regs.borrow().read(address)
    }

    pub fn unlock(&self) -> Result<UnlockedFlash<'_, R>, FlashError> {
        let regs = self.regs.try_borrow_mut().map_err(|_| FlashError::Locked)?;
        let mut flash = UnlockedFlash { regs };
        if flash.is_locked() {
            flash.write_key(FLASH_KEY1);
            flash.write_key(FLASH_KEY2);
        }
        if flash.is_locked() {
            error!("Flash key sequence rejected");
            return Err(FlashError::Locked);
        }
        Ok(flash)
    }

    pub fn unlock_options(&self) -> Result<UnlockedOptions<'_, R>, FlashError> {
        let mut options = UnlockedOptions {
            flash: self.unlock()?,
        };
        if options.is_option_locked() {
            options.write_option_key(OPTION_KEY1);
            options.write_option_key(OPTION_KEY2);
        }
        if options.is_option_locked() {
            error!("Option byte key sequence rejected");
            return Err(FlashError::Locked);
        }
        Ok(options)
    }

    /// Program `data` at a quad-word aligned `address`. A trailing partial
    /// quad-word is padded with 0xFF.
    pub fn program(
        &self,
        address: u32,
        data: &[u8],
        hooks: &mut dyn MemoryHooks,
    ) -> Result<(), FlashError> {
        if address as usize % QUAD_WORD != 0 {
            return Err(FlashError::Misaligned);
        }

        let mut flash = self.unlock()?;
        let mut target = address;
        for chunk in data.chunks(QUAD_WORD) {
            let mut quad_word = [0xFFu8; QUAD_WORD];
            quad_word[..chunk.len()].copy_from_slice(chunk);
            flash.program_quad_word(target, &quad_word);
            self.wait(&mut flash, hooks)?;
            target += QUAD_WORD as u32;
        }
        Ok(())
    }

    /// Erase a list of global page numbers; the bank follows from the number.
    pub fn erase_pages(
        &self,
        pages: PageList<'_>,
        hooks: &mut dyn MemoryHooks,
    ) -> Result<(), FlashError> {
        for page in pages.iter() {
            self.geometry.locate(page)?;
        }

        let mut flash = self.unlock()?;
        for page in pages.iter() {
            let (bank, local) = self.geometry.locate(page)?;
            trace!("Erasing page {} of {:?}", local, bank);
            flash.erase_page(bank, local);
            self.wait(&mut flash, hooks)?;
        }
        Ok(())
    }

    pub fn erase_banks(&self, target: MassErase, hooks: &mut dyn MemoryHooks) -> Result<(), FlashError> {
        if target == MassErase::Bank2 && self.geometry.banks < 2 {
            return Err(FlashError::InvalidPage);
        }
        let mut flash = self.unlock()?;
        info!("Mass erase {:?}", target);
        flash.erase_bank(target);
        self.wait(&mut flash, hooks)
    }

    pub fn set_rdp(&self, level: RdpLevel, hooks: &mut dyn MemoryHooks) -> Result<(), FlashError> {
        let mut options = self.unlock_options()?;
        options.set_rdp_level(level);
        options.start_option_change();
        self.wait(&mut options, hooks)?;
        hooks.defer(PostAction::OptionBytesLaunch);
        Ok(())
    }

    /// Apply a write-protection request. An enable payload is a list of up to
    /// four `(start, end)` page-offset pairs, filling bank 1 area A, bank 1
    /// area B, bank 2 area A, bank 2 area B in that order.
    pub fn set_wrp(
        &self,
        request: WriteProtection<'_>,
        hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        let mut areas = [None; WRP_AREAS];
        match request {
            WriteProtection::Disable => areas = [Some(WrpArea::DISABLED); WRP_AREAS],
            WriteProtection::Enable(payload) => {
                if payload.is_empty() || payload.len() % 2 != 0 || payload.len() > 2 * WRP_AREAS {
                    return Err(MemoryError::InvalidRequest);
                }
                let last_page = self.geometry.pages_per_bank().saturating_sub(1);
                for (slot, pair) in areas.iter_mut().zip(payload.chunks_exact(2)) {
                    let area = WrpArea {
                        start: pair[0],
                        end: pair[1],
                    };
                    if area.start > area.end || u32::from(area.end) > last_page {
                        return Err(MemoryError::InvalidRequest);
                    }
                    *slot = Some(area);
                }
            }
        }

        let mut options = self.unlock_options()?;
        for (index, area) in areas.iter().enumerate() {
            if let Some(area) = area {
                options.set_wrp_area(index, *area);
            }
        }
        options.start_option_change();
        self.wait(&mut options, hooks)?;
        hooks.defer(PostAction::OptionBytesLaunch);
        Ok(())
    }

    /// Stage and commit option-byte words starting at `offset`.
    pub fn program_option_bytes(
        &self,
        offset: u32,
        data: &[u8],
        hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        if offset % 4 != 0 || data.is_empty() || data.len() % 4 != 0 {
            return Err(MemoryError::InvalidRequest);
        }
        let mut options = self.unlock_options()?;
        for (word_offset, word) in (offset..).step_by(4).zip(data.chunks_exact(4)) {
            let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            options.program_option_word(word_offset, value);
        }
        options.start_option_change();
        self.wait(&mut options, hooks)?;
        hooks.defer(PostAction::OptionBytesLaunch);
        Ok(())
    }

    fn wait(&self, regs: &mut R, hooks: &mut dyn MemoryHooks) -> Result<(), FlashError> {
        for _ in 0..self.timeout_polls {
            hooks.poll();
            if !regs.is_busy() {
                let errors = regs.errors();
                if errors.is_empty() {
                    return Ok(());
                }
                regs.clear_errors(errors);
                error!("Flash operation failed: {:?}", errors);
                return Err(FlashError::Hardware(errors));
            }
        }
        error!("Flash operation timed out");
        Err(FlashError::Timeout)
    }
}

impl<R: FlashRegisters> MemoryRegion for FlashDriver<R> {
    fn info(&self) -> RegionInfo {
        RegionInfo::new(self.geometry.base, self.geometry.end(), AreaType::Flash)
    }

    fn read(&self, address: u32) -> Option<u8> {
        Some(self.read_byte(address))
    }

    fn write(
        &self,
        address: u32,
        data: &[u8],
        hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        Ok(self.program(address, data, hooks)?)
    }

    fn set_readout_protection(
        &self,
        level: RdpLevel,
        hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        Ok(self.set_rdp(level, hooks)?)
    }

    fn set_write_protection(
        &self,
        request: WriteProtection<'_>,
        hooks: &mut dyn MemoryHooks,
    ) -> Result<(), MemoryError> {
        self.set_wrp(request, hooks)
    }

    fn mass_erase(&self, target: MassErase, hooks: &mut dyn MemoryHooks) -> Result<(), MemoryError> {
        Ok(self.erase_banks(target, hooks)?)
    }

    fn erase(&self, pages: PageList<'_>, hooks: &mut dyn MemoryHooks) -> Result<(), MemoryError> {
        Ok(self.erase_pages(pages, hooks)?)
    }

    fn jump_capable(&self) -> bool {
        true
    }
}
