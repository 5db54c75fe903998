// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command engine.
//!
//! A [`CommandTable`] maps opcodes to handlers. Each interface hands one to
//! the session, which dispatches every received opcode through it. Handlers
//! are written once against the [`Transport`] hooks and branch on the framing
//! dialect only where the wire shapes really differ.

mod checksum;
mod erase;
mod info;
mod memory;
mod protect;
pub mod special;
mod speed;

use heapless::Vec;

use crate::error::MemoryError;
use crate::memory::{MemoryHooks, MemoryRegistry};
use crate::post::{PostAction, PostProcessing};
use crate::protocol::{opcode, xor_fold, ACK_BYTE, NACK_BYTE};
use crate::transport::Transport;

pub use special::{NoSpecialCommands, SpecialCommands, SpecialFrame, SpecialKind, SpecialReply};

/// Upper bound on the number of verbs a table can expose.
pub const MAX_COMMANDS: usize = 24;

pub type Handler = fn(&mut CommandContext<'_, '_>) -> Outcome;

/// What the session must do once a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    Done,
    /// The host was acknowledged; start the image at this address.
    Jump(u32),
}

/// Verb set of one interface. `None` marks a verb the interface lacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandTable {
    pub get_command: Option<Handler>,
    pub get_version: Option<Handler>,
    pub get_id: Option<Handler>,
    pub speed: Option<Handler>,
    pub legacy_erase: Option<Handler>,
    pub read_memory: Option<Handler>,
    pub go: Option<Handler>,
    pub write_memory: Option<Handler>,
    pub erase: Option<Handler>,
    pub write_protect: Option<Handler>,
    pub write_unprotect: Option<Handler>,
    pub readout_protect: Option<Handler>,
    pub readout_unprotect: Option<Handler>,
    pub ns_write_memory: Option<Handler>,
    pub ns_erase: Option<Handler>,
    pub ns_write_protect: Option<Handler>,
    pub ns_write_unprotect: Option<Handler>,
    pub ns_readout_protect: Option<Handler>,
    pub ns_readout_unprotect: Option<Handler>,
    pub checksum: Option<Handler>,
    pub special: Option<Handler>,
    pub extended_special: Option<Handler>,
}

impl CommandTable {
    pub const EMPTY: Self = Self {
        get_command: None,
        get_version: None,
        get_id: None,
        speed: None,
        legacy_erase: None,
        read_memory: None,
        go: None,
        write_memory: None,
        erase: None,
        write_protect: None,
        write_unprotect: None,
        readout_protect: None,
        readout_unprotect: None,
        ns_write_memory: None,
        ns_erase: None,
        ns_write_protect: None,
        ns_write_unprotect: None,
        ns_readout_protect: None,
        ns_readout_unprotect: None,
        checksum: None,
        special: None,
        extended_special: None,
    };

    /// Same table with the one-byte-count erase (0x43) enabled.
    pub const fn with_legacy_erase(mut self) -> Self {
        self.legacy_erase = Some(erase::handle_legacy_erase);
        self
    }

    pub fn handler(&self, op: u8) -> Option<Handler> {
        match op {
            opcode::GET_COMMAND => self.get_command,
            opcode::GET_VERSION => self.get_version,
            opcode::GET_ID => self.get_id,
            opcode::SPEED => self.speed,
            opcode::READ_MEMORY => self.read_memory,
            opcode::GO => self.go,
            opcode::WRITE_MEMORY => self.write_memory,
            opcode::NS_WRITE_MEMORY => self.ns_write_memory,
            opcode::LEGACY_ERASE => self.legacy_erase,
            opcode::EXT_ERASE => self.erase,
            opcode::NS_ERASE => self.ns_erase,
            opcode::SPECIAL_COMMAND => self.special,
            opcode::EXTENDED_SPECIAL_COMMAND => self.extended_special,
            opcode::WRITE_PROTECT => self.write_protect,
            opcode::NS_WRITE_PROTECT => self.ns_write_protect,
            opcode::WRITE_UNPROTECT => self.write_unprotect,
            opcode::NS_WRITE_UNPROTECT => self.ns_write_unprotect,
            opcode::READ_PROTECT => self.readout_protect,
            opcode::NS_READ_PROTECT => self.ns_readout_protect,
            opcode::READ_UNPROTECT => self.readout_unprotect,
            opcode::NS_READ_UNPROTECT => self.ns_readout_unprotect,
            opcode::CHECKSUM => self.checksum,
            _ => None,
        }
    }

    /// Opcodes reported by GetCommand, in a fixed order.
    pub fn opcodes(&self) -> Vec<u8, MAX_COMMANDS> {
        let slots = [
            (self.get_command, opcode::GET_COMMAND),
            (self.get_version, opcode::GET_VERSION),
            (self.get_id, opcode::GET_ID),
            (self.speed, opcode::SPEED),
            (self.legacy_erase, opcode::LEGACY_ERASE),
            (self.read_memory, opcode::READ_MEMORY),
            (self.go, opcode::GO),
            (self.write_memory, opcode::WRITE_MEMORY),
            (self.erase, opcode::EXT_ERASE),
            (self.write_protect, opcode::WRITE_PROTECT),
            (self.write_unprotect, opcode::WRITE_UNPROTECT),
            (self.readout_protect, opcode::READ_PROTECT),
            (self.readout_unprotect, opcode::READ_UNPROTECT),
            (self.ns_write_memory, opcode::NS_WRITE_MEMORY),
            (self.ns_erase, opcode::NS_ERASE),
            (self.ns_write_protect, opcode::NS_WRITE_PROTECT),
            (self.ns_write_unprotect, opcode::NS_WRITE_UNPROTECT),
            (self.ns_readout_protect, opcode::NS_READ_PROTECT),
            (self.ns_readout_unprotect, opcode::NS_READ_UNPROTECT),
            (self.checksum, opcode::CHECKSUM),
            (self.special, opcode::SPECIAL_COMMAND),
            (self.extended_special, opcode::EXTENDED_SPECIAL_COMMAND),
        ];
        let mut opcodes = Vec::new();
        for (_, op) in slots.iter().filter(|(handler, _)| handler.is_some()) {
            // 22 slots always fit.
            let _ = opcodes.push(*op);
        }
        opcodes
    }

    pub fn len(&self) -> usize {
        self.opcodes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The eleven verbs every byte transport serves.
pub const BASE_COMMANDS: CommandTable = CommandTable {
    get_command: Some(info::handle_get_command),
    get_version: Some(info::handle_get_version),
    get_id: Some(info::handle_get_id),
    read_memory: Some(memory::handle_read_memory),
    go: Some(memory::handle_go),
    write_memory: Some(memory::handle_write_memory),
    erase: Some(erase::handle_erase),
    write_protect: Some(protect::handle_write_protect),
    write_unprotect: Some(protect::handle_write_unprotect),
    readout_protect: Some(protect::handle_readout_protect),
    readout_unprotect: Some(protect::handle_readout_unprotect),
    ..CommandTable::EMPTY
};

pub const USART_COMMANDS: CommandTable = CommandTable {
    checksum: Some(checksum::handle_checksum),
    special: Some(special::handle_special),
    extended_special: Some(special::handle_extended_special),
    ..BASE_COMMANDS
};

pub const I2C_COMMANDS: CommandTable = CommandTable {
    ns_write_memory: Some(memory::handle_ns_write_memory),
    ns_erase: Some(erase::handle_ns_erase),
    ns_write_protect: Some(protect::handle_ns_write_protect),
    ns_write_unprotect: Some(protect::handle_ns_write_unprotect),
    ns_readout_protect: Some(protect::handle_ns_readout_protect),
    ns_readout_unprotect: Some(protect::handle_ns_readout_unprotect),
    checksum: Some(checksum::handle_checksum),
    special: Some(special::handle_special),
    extended_special: Some(special::handle_extended_special),
    ..BASE_COMMANDS
};

pub const SPI_COMMANDS: CommandTable = USART_COMMANDS;

/// I3C has no readout protection verbs.
pub const I3C_COMMANDS: CommandTable = CommandTable {
    readout_protect: None,
    readout_unprotect: None,
    special: Some(special::handle_special),
    extended_special: Some(special::handle_extended_special),
    ..BASE_COMMANDS
};

pub const CAN_COMMANDS: CommandTable = CommandTable {
    speed: Some(speed::handle_speed),
    ..BASE_COMMANDS
};

/// Everything a handler may touch while serving one command.
pub struct CommandContext<'s, 'm> {
    pub transport: &'s mut dyn Transport,
    pub memory: &'s MemoryRegistry<'m>,
    pub post: &'s PostProcessing,
    pub special: &'s mut dyn SpecialCommands,
    /// Frame buffer, sized to the transport's largest frame.
    pub scratch: &'s mut [u8],
    /// Readout protection was active when the command arrived.
    pub protected: bool,
    pub commands: &'s CommandTable,
    pub device_id: u16,
}

impl<'m> CommandContext<'_, 'm> {
    pub(crate) fn ack(&mut self) {
        self.transport.send_ack(ACK_BYTE);
    }

    pub(crate) fn nack(&mut self) {
        self.transport.send_ack(NACK_BYTE);
    }

    /// NACK and return `false` while readout protection is active, ACK
    /// otherwise.
    pub(crate) fn check_protection(&mut self) -> bool {
        if self.protected {
            warn!("Readout protection active, command refused");
            self.nack();
            return false;
        }
        self.ack();
        true
    }

    /// Receive a checksummed big-endian address and resolve it. `None` on a
    /// bad checksum or an unmapped address; nothing is sent.
    pub(crate) fn receive_address(&mut self) -> Option<u32> {
        let mut bytes = [0u8; 4];
        self.transport.begin_receive();
        self.transport.read_bytes(&mut bytes);
        let valid = self.transport.check(xor_fold(0, &bytes));
        self.transport.end_receive();

        if !valid {
            warn!("Address checksum mismatch");
            return None;
        }
        let address = u32::from_be_bytes(bytes);
        if self.memory.area_of(address).is_none() {
            warn!("Address 0x{:08x} not mapped", address);
            return None;
        }
        Some(address)
    }

    /// Read and drop `len` bytes the scratch buffer cannot hold, then the
    /// checksum that follows them. The frame is refused either way.
    pub(crate) fn discard(&mut self, len: usize) {
        warn!("{} byte frame exceeds the {} byte buffer", len, self.scratch.len());
        for _ in 0..len {
            self.transport.read_byte();
        }
        let _ = self.transport.check(0);
    }

    /// Run a memory operation with the transport's wait hooks, optionally
    /// sending busy bytes while it runs.
    pub(crate) fn memory_op<T>(
        &mut self,
        busy: bool,
        op: impl FnOnce(&MemoryRegistry<'m>, &[u8], &mut dyn MemoryHooks) -> T,
    ) -> T {
        if busy {
            self.transport.set_busy_state(true);
        }
        let mut hooks = OpHooks::new(&mut *self.transport, self.post);
        let result = op(self.memory, &*self.scratch, &mut hooks);
        if busy {
            self.transport.set_busy_state(false);
        }
        result
    }

    /// Address of the memory erase and protection verbs act on.
    pub(crate) fn default_address(&self) -> Result<u32, MemoryError> {
        self.memory.default_address().ok_or(MemoryError::NotFound)
    }
}

/// Memory hooks backed by the bound transport and the post-processing queue.
pub struct OpHooks<'h> {
    transport: &'h mut dyn Transport,
    post: &'h PostProcessing,
}

impl<'h> OpHooks<'h> {
    pub fn new(transport: &'h mut dyn Transport, post: &'h PostProcessing) -> Self {
        Self { transport, post }
    }
}

impl MemoryHooks for OpHooks<'_> {
    fn poll(&mut self) {
        self.transport.on_wait();
    }

    fn defer(&mut self, action: PostAction) {
        debug!("Deferring {:?}", action);
        self.post.arm(action);
    }
}

/// Run the handler registered for `op`, or NACK when there is none.
pub fn dispatch(ctx: &mut CommandContext<'_, '_>, op: u8) -> Outcome {
    match ctx.commands.handler(op) {
        Some(handler) => {
            debug!("Command 0x{:02x}", op);
            handler(ctx)
        }
        None => {
            warn!("No handler for opcode 0x{:02x}", op);
            ctx.nack();
            Outcome::Done
        }
    }
}
