// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Services the core consumes from the surrounding firmware.

/// First two words of a Cortex-M vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VectorTable {
    /// Base address the table was read from.
    pub base: u32,
    pub initial_sp: u32,
    pub reset_vector: u32,
}

impl VectorTable {
    /// Builds the table from the 8 little-endian bytes at `base`.
    pub fn from_bytes(base: u32, bytes: [u8; 8]) -> Self {
        Self {
            base,
            initial_sp: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            reset_vector: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

/// Independent watchdog as seen by transports.
///
/// Every busy-wait loop calls [`Watchdog::refresh`] on each iteration. When a
/// bounded wait expires the transport gives up on the host and calls
/// [`Watchdog::trigger_watchdog_recovery_reset`].
pub trait Watchdog {
    fn refresh(&self);

    /// Resets the MCU after a host went silent mid-frame.
    fn trigger_watchdog_recovery_reset(&self) -> !;
}

impl<W: Watchdog + ?Sized> Watchdog for &W {
    fn refresh(&self) {
        (**self).refresh()
    }

    fn trigger_watchdog_recovery_reset(&self) -> ! {
        (**self).trigger_watchdog_recovery_reset()
    }
}

/// System-level collaborator services.
pub trait Platform {
    /// True when global readout protection forbids memory access.
    fn protection_active(&self) -> bool;

    fn refresh_watchdog(&self);

    fn enable_irq(&mut self);

    fn disable_irq(&mut self);

    fn system_reset(&mut self) -> !;

    /// Reloads the option bytes, which resets the MCU.
    fn launch_option_bytes(&mut self) -> !;

    /// Installs `target` and branches to its reset vector.
    fn jump(&mut self, target: VectorTable) -> !;
}
