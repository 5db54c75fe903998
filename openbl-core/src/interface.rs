// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Interface registry and activity detection.

use heapless::Vec;

use crate::command::CommandTable;
use crate::error::RegistryError;
use crate::transport::usb::DfuLink;
use crate::transport::Transport;

/// Maximum number of interfaces a bootloader can register.
pub const INTERFACE_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterfaceKind {
    Usart,
    I2c,
    Spi,
    I3c,
    Can,
    FdCan,
    Usb,
}

/// A host link the bootloader can be reached through.
pub trait Interface {
    fn kind(&self) -> InterfaceKind;

    fn init(&mut self);

    fn deinit(&mut self);

    /// True once host activity was seen. May consume and answer the sync
    /// sequence.
    fn detect(&mut self) -> bool;

    /// Binding this interface shuts every other one down.
    fn exclusive(&self) -> bool {
        false
    }

    /// Verbs served once the interface is bound.
    fn commands(&self) -> CommandTable;

    /// Byte transport for the command loop. `None` for interfaces that are
    /// not driven opcode by opcode.
    fn transport(&mut self) -> Option<&mut dyn Transport> {
        None
    }

    /// DFU request stream, for interfaces with their own class stack.
    fn dfu(&mut self) -> Option<&mut dyn DfuLink> {
        None
    }
}

/// Fixed-capacity, append-only table of interfaces. Registration order is
/// detection order.
pub struct InterfaceRegistry<'a> {
    interfaces: Vec<&'a mut dyn Interface, INTERFACE_CAPACITY>,
}

impl<'a> InterfaceRegistry<'a> {
    pub const fn new() -> Self {
        Self {
            interfaces: Vec::new(),
        }
    }

    pub fn register(&mut self, interface: &'a mut dyn Interface) -> Result<(), RegistryError> {
        let kind = interface.kind();
        self.interfaces.push(interface).map_err(|_| {
            warn!("Interface registry full, {:?} dropped", kind);
            RegistryError::Full
        })
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    pub fn init_all(&mut self) {
        for interface in self.interfaces.iter_mut() {
            interface.init();
        }
    }

    pub fn deinit_all(&mut self) {
        for interface in self.interfaces.iter_mut() {
            interface.deinit();
        }
    }

    /// De-initialize every interface except the one at `keep`.
    pub fn deinit_others(&mut self, keep: usize) {
        for (index, interface) in self.interfaces.iter_mut().enumerate() {
            if index != keep {
                interface.deinit();
            }
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn Interface + 'a)> {
        self.interfaces.get_mut(index).map(|interface| &mut **interface)
    }

    /// Poll every interface once and return the index of the first one that
    /// saw activity. Exclusive interfaces are polled first, the rest in
    /// registration order.
    pub fn detect(&mut self) -> Option<usize> {
        let exclusive = self
            .interfaces
            .iter_mut()
            .position(|interface| interface.exclusive() && interface.detect());
        exclusive.or_else(|| {
            self.interfaces
                .iter_mut()
                .position(|interface| !interface.exclusive() && interface.detect())
        })
    }
}

impl Default for InterfaceRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}
