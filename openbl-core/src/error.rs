// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

use core::fmt;

use crate::memory::flash::FlashErrors;

/// Failure of a flash controller sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// The key sequence did not unlock the controller.
    Locked,
    /// The operation did not complete within the polling budget.
    Timeout,
    /// The controller raised error flags (already cleared).
    Hardware(FlashErrors),
    /// Page number outside every bank.
    InvalidPage,
    /// Program address not aligned on the programming granularity.
    Misaligned,
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => f.write_str("flash controller stayed locked"),
            Self::Timeout => f.write_str("flash operation timed out"),
            Self::Hardware(flags) => write!(f, "flash error flags {:#x}", flags.bits()),
            Self::InvalidPage => f.write_str("page outside flash banks"),
            Self::Misaligned => f.write_str("misaligned program address"),
        }
    }
}

/// Failure of a memory registry or memory driver operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MemoryError {
    /// No registered region contains the address.
    NotFound,
    /// The region does not offer this capability.
    Unsupported,
    /// The access runs past the end of its region.
    OutOfRange,
    /// Malformed request payload.
    InvalidRequest,
    Flash(FlashError),
}

impl From<FlashError> for MemoryError {
    fn from(e: FlashError) -> Self {
        Self::Flash(e)
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("address not mapped"),
            Self::Unsupported => f.write_str("operation not supported by region"),
            Self::OutOfRange => f.write_str("access crosses region end"),
            Self::InvalidRequest => f.write_str("malformed request"),
            Self::Flash(e) => write!(f, "{e}"),
        }
    }
}

/// Failure to add an entry to a fixed-capacity registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    Full,
    /// The new memory range intersects an already registered one.
    Overlap,
    /// The session scratch buffer is smaller than the interface's largest
    /// frame.
    ScratchTooSmall,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("registry full"),
            Self::Overlap => f.write_str("overlapping memory range"),
            Self::ScratchTooSmall => f.write_str("scratch buffer smaller than frame"),
        }
    }
}
