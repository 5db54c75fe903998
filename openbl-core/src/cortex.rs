// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Cortex-M building blocks for a [`Platform`](crate::platform::Platform)
//! implementation.

use crate::platform::VectorTable;

const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;

pub fn disable_irq() {
    cortex_m::interrupt::disable();
}

pub fn enable_irq() {
    // SAFETY: the bootloader holds no critical section across this call.
    unsafe { cortex_m::interrupt::enable() };
}

pub fn system_reset() -> ! {
    cortex_m::peripheral::SCB::sys_reset()
}

/// Point VTOR at `target`, load its stack pointer and branch to its reset
/// handler.
///
/// # Safety
/// `target` must describe a valid vector table and image, and every
/// interrupt source the bootloader enabled must be shut down.
pub unsafe fn jump(target: VectorTable) -> ! {
    SCB_VTOR.write_volatile(target.base);
    cortex_m::asm::dsb();
    cortex_m::asm::isb();

    core::arch::asm!(
        "msr msp, {sp}",
        "bx {reset}",
        sp = in(reg) target.initial_sp,
        reset = in(reg) target.reset_vector,
        options(noreturn)
    );
}
