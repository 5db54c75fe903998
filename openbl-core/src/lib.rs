// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Transport-agnostic core of the STM32 Open Bootloader.
//!
//! The crate is `no_std` by default:
//! - `std` feature: host builds (tests, simulators)
//! - `defmt` / `log` features: route the internal log macros to a backend
//! - `embedded` feature: Cortex-M glue for reset, IRQ masking and the jump
//!
//! A firmware image registers its memories and interfaces in a
//! [`Bootloader`], then calls [`Bootloader::run`].

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

pub mod command;
pub mod config;
pub mod error;
pub mod interface;
pub mod memory;
pub mod platform;
pub mod post;
pub mod protocol;
pub mod session;
pub mod transport;

#[cfg(all(feature = "embedded", target_arch = "arm"))]
pub mod cortex;

pub use command::{CommandTable, NoSpecialCommands, Outcome, SpecialCommands};
pub use config::Config;
pub use error::{FlashError, MemoryError, RegistryError};
pub use interface::{Interface, InterfaceKind, InterfaceRegistry};
pub use memory::{MemoryHooks, MemoryRegion, MemoryRegistry};
pub use platform::{Platform, VectorTable, Watchdog};
pub use post::{PostAction, PostProcessing};
pub use session::Bootloader;
