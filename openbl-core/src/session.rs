// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Bootloader session: interface detection, then the command loop.
//!
//! The session owns every piece of state the protocol needs. Its phase only
//! moves through [`transition`], so the control flow can be checked without
//! any hardware:
//!
//! ```text
//! Idle --Init--> Detecting --Activity(i)--> Bound(i) --Tick--> serve command
//!   ^                                          |
//!   +------------------- Deinit ---------------+
//! ```

use crate::command::{self, CommandContext, CommandTable, NoSpecialCommands, Outcome, SpecialCommands};
use crate::config::Config;
use crate::error::{MemoryError, RegistryError};
use crate::interface::{Interface, InterfaceRegistry};
use crate::memory::{MassErase, MemoryHooks, MemoryRegion, MemoryRegistry, PageList};
use crate::platform::Platform;
use crate::post::{PostAction, PostProcessing};
use crate::transport::usb::{DfuRequest, DfuStatus};

/// Where the session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Idle,
    Detecting,
    /// The interface at this registry index carries the session.
    Bound(usize),
}

/// Input of one [`transition`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionEvent {
    Init,
    Deinit,
    /// The interface at this index saw host activity.
    Activity(usize),
    Tick,
}

/// Side effect to run after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionAction {
    None,
    InitInterfaces,
    DeinitInterfaces,
    Detect,
    Bind(usize),
    Serve(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStep {
    pub next: Phase,
    pub action: SessionAction,
}

/// Pure phase transition.
pub fn transition(phase: Phase, event: SessionEvent) -> SessionStep {
    let (next, action) = match (phase, event) {
        (_, SessionEvent::Init) => (Phase::Detecting, SessionAction::InitInterfaces),
        (_, SessionEvent::Deinit) => (Phase::Idle, SessionAction::DeinitInterfaces),
        (Phase::Idle, _) => (Phase::Idle, SessionAction::None),
        (Phase::Detecting, SessionEvent::Tick) => (Phase::Detecting, SessionAction::Detect),
        (Phase::Detecting, SessionEvent::Activity(index)) => {
            (Phase::Bound(index), SessionAction::Bind(index))
        }
        // Binding is write-once; later activity elsewhere is ignored.
        (Phase::Bound(index), SessionEvent::Activity(_)) => (Phase::Bound(index), SessionAction::None),
        (Phase::Bound(index), SessionEvent::Tick) => (Phase::Bound(index), SessionAction::Serve(index)),
    };
    SessionStep { next, action }
}

/// Memory hooks for requests that do not come through a byte transport.
struct DfuHooks<'h, P> {
    platform: &'h P,
    post: &'h PostProcessing,
}

impl<P: Platform> MemoryHooks for DfuHooks<'_, P> {
    fn poll(&mut self) {
        self.platform.refresh_watchdog();
    }

    fn defer(&mut self, action: PostAction) {
        debug!("Deferring {:?}", action);
        self.post.arm(action);
    }
}

pub struct Bootloader<'a, P, S = NoSpecialCommands> {
    platform: P,
    config: Config,
    memory: MemoryRegistry<'a>,
    interfaces: InterfaceRegistry<'a>,
    special: S,
    scratch: &'a mut [u8],
    post: PostProcessing,
    phase: Phase,
    commands: CommandTable,
}

impl<'a, P: Platform> Bootloader<'a, P> {
    pub fn new(platform: P, config: Config, scratch: &'a mut [u8]) -> Self {
        Self::with_special_commands(platform, config, scratch, NoSpecialCommands)
    }
}

impl<'a, P: Platform, S: SpecialCommands> Bootloader<'a, P, S> {
    /// `scratch` must hold the largest frame of every transport registered
    /// later.
    pub fn with_special_commands(platform: P, config: Config, scratch: &'a mut [u8], special: S) -> Self {
        Self {
            platform,
            config,
            memory: MemoryRegistry::new(),
            interfaces: InterfaceRegistry::new(),
            special,
            scratch,
            post: PostProcessing::new(),
            phase: Phase::Idle,
            commands: CommandTable::EMPTY,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn memory(&self) -> &MemoryRegistry<'a> {
        &self.memory
    }

    pub fn post_processing(&self) -> &PostProcessing {
        &self.post
    }

    pub fn special_commands(&self) -> &S {
        &self.special
    }

    pub fn register_memory(&mut self, region: &'a dyn MemoryRegion) -> Result<(), RegistryError> {
        self.memory.register(region)
    }

    /// Refuses a byte transport whose largest frame does not fit the scratch
    /// buffer, and applies the configured transport timeout.
    pub fn register_interface(&mut self, interface: &'a mut dyn Interface) -> Result<(), RegistryError> {
        let kind = interface.kind();
        if let Some(transport) = interface.transport() {
            let needed = transport.protocol().buffer_size;
            if needed > self.scratch.len() {
                warn!(
                    "{:?} needs {} scratch bytes, {} available",
                    kind,
                    needed,
                    self.scratch.len()
                );
                return Err(RegistryError::ScratchTooSmall);
            }
            if let Some(polls) = self.config.transport_timeout {
                transport.set_timeout(polls);
            }
        }
        self.interfaces.register(interface)
    }

    /// Initialize every registered interface and start detection.
    pub fn init(&mut self) {
        self.apply(SessionEvent::Init);
    }

    /// De-initialize every interface and drop the binding.
    pub fn deinit(&mut self) {
        self.apply(SessionEvent::Deinit);
    }

    /// De-initialize every interface, keeping the phase.
    pub fn interfaces_deinit(&mut self) {
        self.interfaces.deinit_all();
    }

    /// Poll the interfaces once. True once an interface is bound.
    pub fn interface_detection(&mut self) -> bool {
        if self.phase == Phase::Detecting {
            self.apply(SessionEvent::Tick);
        }
        matches!(self.phase, Phase::Bound(_))
    }

    /// Serve one request on the bound interface. Does nothing before
    /// detection succeeded.
    pub fn command_process(&mut self) {
        if matches!(self.phase, Phase::Bound(_)) {
            self.apply(SessionEvent::Tick);
        }
    }

    /// Detection, then the command loop, forever.
    pub fn run(&mut self) -> ! {
        self.init();
        loop {
            if self.interface_detection() {
                self.command_process();
            }
        }
    }

    fn apply(&mut self, event: SessionEvent) {
        let step = transition(self.phase, event);
        self.phase = step.next;
        match step.action {
            SessionAction::None => {}
            SessionAction::InitInterfaces => {
                info!("Initializing {} interfaces", self.interfaces.len());
                self.interfaces.init_all();
            }
            SessionAction::DeinitInterfaces => self.interfaces.deinit_all(),
            SessionAction::Detect => {
                if let Some(index) = self.interfaces.detect() {
                    self.apply(SessionEvent::Activity(index));
                }
            }
            SessionAction::Bind(index) => self.bind(index),
            SessionAction::Serve(index) => self.serve(index),
        }
    }

    fn bind(&mut self, index: usize) {
        self.interfaces.deinit_others(index);
        if let Some(interface) = self.interfaces.get_mut(index) {
            info!("Interface {:?} bound", interface.kind());
            self.commands = interface.commands();
        }
    }

    fn serve(&mut self, index: usize) {
        let Some(interface) = self.interfaces.get_mut(index) else {
            return;
        };
        let jump = if interface.dfu().is_some() {
            self.serve_dfu(index)
        } else {
            self.serve_command(index)
        };
        if let Some(action) = self.post.take_due() {
            self.run_post_action(action);
        }
        if let Some(address) = jump {
            self.jump(address);
        }
    }

    fn serve_command(&mut self, index: usize) -> Option<u32> {
        let transport = self.interfaces.get_mut(index)?.transport()?;
        let opcode = transport.get_opcode();
        let size = transport.protocol().buffer_size.min(self.scratch.len());

        let mut ctx = CommandContext {
            transport,
            memory: &self.memory,
            post: &self.post,
            special: &mut self.special,
            scratch: &mut self.scratch[..size],
            protected: self.platform.protection_active(),
            commands: &self.commands,
            device_id: self.config.device_id,
        };
        match command::dispatch(&mut ctx, opcode) {
            Outcome::Done => None,
            Outcome::Jump(address) => Some(address),
        }
    }

    fn serve_dfu(&mut self, index: usize) -> Option<u32> {
        let link = self.interfaces.get_mut(index)?.dfu()?;
        let request = link.poll(self.scratch)?;
        let mut hooks = DfuHooks {
            platform: &self.platform,
            post: &self.post,
        };
        let flash = self.memory.default_address();

        match request {
            DfuRequest::Upload { address, length } => {
                let length = length.min(self.scratch.len());
                let mut status = DfuStatus::Ok;
                for (target, slot) in (address..).zip(self.scratch[..length].iter_mut()) {
                    match self.memory.try_read(target) {
                        Ok(byte) => *slot = byte,
                        Err(_) => {
                            status = DfuStatus::ErrAddress;
                            break;
                        }
                    }
                }
                match status {
                    DfuStatus::Ok => link.respond(status, &self.scratch[..length]),
                    _ => link.respond(status, &[]),
                }
            }
            DfuRequest::Download { address, length } => {
                let length = length.min(self.scratch.len());
                match self.memory.write(address, &self.scratch[..length], &mut hooks) {
                    Ok(()) => {
                        link.respond(DfuStatus::Ok, &[]);
                        self.post.start();
                    }
                    Err(e) => {
                        warn!("DFU download at 0x{:08x} failed: {}", address, e);
                        link.respond(DfuStatus::ErrWrite, &[]);
                    }
                }
            }
            DfuRequest::Erase { page } => {
                let bytes = page.to_be_bytes();
                let result = flash
                    .ok_or(MemoryError::NotFound)
                    .and_then(|base| self.memory.erase(base, PageList::new(&bytes), &mut hooks));
                let status = match result {
                    Ok(()) => DfuStatus::Ok,
                    Err(e) => {
                        warn!("DFU erase of page {} failed: {}", page, e);
                        DfuStatus::ErrErase
                    }
                };
                link.respond(status, &[]);
            }
            DfuRequest::MassErase => {
                let result = flash
                    .ok_or(MemoryError::NotFound)
                    .and_then(|base| self.memory.mass_erase(base, MassErase::All, &mut hooks));
                let status = match result {
                    Ok(()) => DfuStatus::Ok,
                    Err(e) => {
                        warn!("DFU mass erase failed: {}", e);
                        DfuStatus::ErrErase
                    }
                };
                link.respond(status, &[]);
            }
            DfuRequest::Leave { address } => {
                if self.memory.check_jump_address(address) {
                    link.respond(DfuStatus::Ok, &[]);
                    return Some(address);
                }
                warn!("DFU leave: 0x{:08x} is not a jump target", address);
                link.respond(DfuStatus::ErrTarget, &[]);
            }
        }
        None
    }

    fn run_post_action(&mut self, action: PostAction) -> ! {
        info!("Post-processing {:?}", action);
        match action {
            PostAction::OptionBytesLaunch => self.platform.launch_option_bytes(),
            PostAction::SystemReset => self.platform.system_reset(),
        }
    }

    /// Interrupts stay masked while the interfaces shut down; the image
    /// starts with them enabled.
    fn jump(&mut self, address: u32) -> ! {
        self.platform.disable_irq();
        self.interfaces.deinit_all();
        self.platform.enable_irq();
        match self.memory.jump_to_address(address, &mut self.platform) {
            Ok(never) => match never {},
            Err(e) => {
                error!("Jump to 0x{:08x} failed: {}, resetting", address, e);
                self.platform.system_reset()
            }
        }
    }
}
