// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host-side doubles for the peripherals, memories and platform services
//! the bootloader core talks to.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use openbl_core::command::{
    dispatch, CommandContext, CommandTable, Outcome, SpecialFrame, SpecialKind, SpecialReply,
};
use openbl_core::config::{DEVICE_ID, RAM_START, SYSTEM_MEMORY_START};
use openbl_core::memory::bus::Bus;
use openbl_core::memory::flash::{
    Bank, FlashDriver, FlashErrors, FlashGeometry, FlashRegisters, WrpArea, FLASH_KEY1,
    FLASH_KEY2, OPTION_KEY1, OPTION_KEY2, QUAD_WORD, WRP_AREAS,
};
use openbl_core::memory::ram::Ram;
use openbl_core::memory::rom::Rom;
use openbl_core::memory::{MassErase, MemoryHooks, MemoryRegistry, RdpLevel};
use openbl_core::platform::{Platform, VectorTable, Watchdog};
use openbl_core::post::{PostAction, PostProcessing};
use openbl_core::transport::can::{CanBus, CanFrame};
use openbl_core::transport::i2c::I2cTarget;
use openbl_core::transport::i3c::I3cTarget;
use openbl_core::transport::spi::SpiTarget;
use openbl_core::transport::usart::UsartPort;
use openbl_core::transport::usb::{DfuLink, DfuRequest, DfuStatus, UsbDfuDevice};
use openbl_core::transport::Transport;
use openbl_core::SpecialCommands;

/// Empty polls tolerated before a script is declared exhausted.
const IDLE_LIMIT: u32 = 100_000;

pub const FLASH_BASE: u32 = 0x0800_0000;
pub const FLASH_BANK_SIZE: u32 = 0x4000;
pub const FLASH_PAGE_SIZE: u32 = 0x1000;

/// Two banks of four pages.
pub const TEST_GEOMETRY: FlashGeometry = FlashGeometry {
    base: FLASH_BASE,
    bank_size: FLASH_BANK_SIZE,
    page_size: FLASH_PAGE_SIZE,
    banks: 2,
};

pub const RAM_SIZE: u32 = 0x1000;
pub const RAM_END: u32 = RAM_START + RAM_SIZE;
pub const SYSTEM_MEMORY_SIZE: u32 = 0x100;

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct NullWatchdog {
    refreshes: Cell<u32>,
}

impl NullWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes.get()
    }
}

impl Watchdog for NullWatchdog {
    fn refresh(&self) {
        self.refreshes.set(self.refreshes.get() + 1);
    }

    fn trigger_watchdog_recovery_reset(&self) -> ! {
        panic!("watchdog recovery reset")
    }
}

/// Records IRQ masking; every diverging service panics with a recognizable
/// message.
#[derive(Default)]
pub struct MockPlatform {
    pub protected: bool,
    pub irq_log: Vec<&'static str>,
    refreshes: Cell<u32>,
}

impl MockPlatform {
    pub fn protected() -> Self {
        Self {
            protected: true,
            ..Self::default()
        }
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes.get()
    }
}

impl Platform for MockPlatform {
    fn protection_active(&self) -> bool {
        self.protected
    }

    fn refresh_watchdog(&self) {
        self.refreshes.set(self.refreshes.get() + 1);
    }

    fn enable_irq(&mut self) {
        self.irq_log.push("enable");
    }

    fn disable_irq(&mut self) {
        self.irq_log.push("disable");
    }

    fn system_reset(&mut self) -> ! {
        panic!("system reset")
    }

    fn launch_option_bytes(&mut self) -> ! {
        panic!("option bytes launch")
    }

    fn jump(&mut self, target: VectorTable) -> ! {
        panic!(
            "jump to 0x{:08x} sp 0x{:08x} reset 0x{:08x}",
            target.base, target.initial_sp, target.reset_vector
        )
    }
}

/// Run `f`, which must panic, and return the panic message.
pub fn panic_message(f: impl FnOnce()) -> String {
    let payload = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => panic!("expected a panic"),
        Err(payload) => payload,
    };
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        String::new()
    }
}

// ---------------------------------------------------------------------------
// Byte links
// ---------------------------------------------------------------------------

#[derive(Default)]
struct WireState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    ibi: Vec<u8>,
    idle: u32,
    inits: u32,
    deinits: u32,
}

/// Both ends of a byte link: the test plays the host, a mock peripheral the
/// device side.
#[derive(Clone, Default)]
pub struct Wire(Rc<RefCell<WireState>>);

impl Wire {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host_sends(&self, bytes: &[u8]) {
        self.0.borrow_mut().rx.extend(bytes.iter().copied());
    }

    /// Everything the device sent since the last call.
    pub fn take_tx(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.borrow_mut().tx)
    }

    /// In-band interrupt payloads raised since the last call.
    pub fn take_ibi(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.borrow_mut().ibi)
    }

    pub fn pending(&self) -> usize {
        self.0.borrow().rx.len()
    }

    pub fn inits(&self) -> u32 {
        self.0.borrow().inits
    }

    pub fn deinits(&self) -> u32 {
        self.0.borrow().deinits
    }

    fn read(&self) -> Option<u8> {
        let mut state = self.0.borrow_mut();
        match state.rx.pop_front() {
            Some(byte) => {
                state.idle = 0;
                Some(byte)
            }
            None => {
                state.idle += 1;
                assert!(state.idle < IDLE_LIMIT, "host script exhausted");
                None
            }
        }
    }

    fn write(&self, byte: u8) {
        self.0.borrow_mut().tx.push(byte);
    }

    fn init(&self) {
        self.0.borrow_mut().inits += 1;
    }

    fn deinit(&self) {
        self.0.borrow_mut().deinits += 1;
    }
}

pub struct MockUsart(Wire);

impl MockUsart {
    pub fn new(wire: &Wire) -> Self {
        Self(wire.clone())
    }
}

impl UsartPort for MockUsart {
    fn init(&mut self) {
        self.0.init();
    }

    fn deinit(&mut self) {
        self.0.deinit();
    }

    fn try_read(&mut self) -> Option<u8> {
        self.0.read()
    }

    fn try_write(&mut self, byte: u8) -> bool {
        self.0.write(byte);
        true
    }
}

/// I2C target whose host addresses it, NACKs and stops immediately.
pub struct MockI2c(Wire);

impl MockI2c {
    pub fn new(wire: &Wire) -> Self {
        Self(wire.clone())
    }
}

impl I2cTarget for MockI2c {
    fn init(&mut self) {
        self.0.init();
    }

    fn deinit(&mut self) {
        self.0.deinit();
    }

    fn address_pending(&mut self) -> bool {
        self.0.pending() > 0
    }

    fn take_address_match(&mut self) -> bool {
        true
    }

    fn try_read(&mut self) -> Option<u8> {
        self.0.read()
    }

    fn try_write(&mut self, byte: u8) -> bool {
        self.0.write(byte);
        true
    }

    fn take_nack(&mut self) -> bool {
        true
    }

    fn take_stop(&mut self) -> bool {
        true
    }
}

pub struct MockSpi(Wire);

impl MockSpi {
    pub fn new(wire: &Wire) -> Self {
        Self(wire.clone())
    }
}

impl SpiTarget for MockSpi {
    fn init(&mut self) {
        self.0.init();
    }

    fn deinit(&mut self) {
        self.0.deinit();
    }

    fn try_read(&mut self) -> Option<u8> {
        self.0.read()
    }

    fn try_write(&mut self, byte: u8) -> bool {
        self.0.write(byte);
        true
    }
}

pub struct MockI3c {
    wire: Wire,
    pub assigned: bool,
}

impl MockI3c {
    pub fn new(wire: &Wire) -> Self {
        Self {
            wire: wire.clone(),
            assigned: true,
        }
    }
}

impl I3cTarget for MockI3c {
    fn init(&mut self) {
        self.wire.init();
    }

    fn deinit(&mut self) {
        self.wire.deinit();
    }

    fn dynamic_address_assigned(&mut self) -> bool {
        self.assigned
    }

    fn try_read(&mut self) -> Option<u8> {
        self.wire.read()
    }

    fn try_write(&mut self, byte: u8) -> bool {
        self.wire.write(byte);
        true
    }

    fn try_send_ibi(&mut self, payload: u8) -> bool {
        self.wire.0.borrow_mut().ibi.push(payload);
        true
    }
}

// ---------------------------------------------------------------------------
// CAN
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CanState {
    rx: VecDeque<CanFrame>,
    tx: Vec<CanFrame>,
    bitrate: Option<u8>,
    idle: u32,
}

#[derive(Clone, Default)]
pub struct CanWire(Rc<RefCell<CanState>>);

impl CanWire {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host_sends(&self, id: u16, payload: &[u8]) {
        self.0.borrow_mut().rx.push_back(CanFrame::new(id, payload));
    }

    /// `(id, payload)` of every frame sent since the last call.
    pub fn take_tx(&self) -> Vec<(u16, Vec<u8>)> {
        std::mem::take(&mut self.0.borrow_mut().tx)
            .iter()
            .map(|frame| (frame.id, frame.payload().to_vec()))
            .collect()
    }

    pub fn bitrate(&self) -> Option<u8> {
        self.0.borrow().bitrate
    }
}

pub struct MockCan(CanWire);

impl MockCan {
    pub fn new(wire: &CanWire) -> Self {
        Self(wire.clone())
    }
}

impl CanBus for MockCan {
    fn init(&mut self) {}

    fn deinit(&mut self) {}

    fn try_receive(&mut self) -> Option<CanFrame> {
        let mut state = self.0 .0.borrow_mut();
        let frame = state.rx.pop_front();
        if frame.is_none() {
            state.idle += 1;
            assert!(state.idle < IDLE_LIMIT, "host script exhausted");
        }
        frame
    }

    fn try_transmit(&mut self, frame: &CanFrame) -> bool {
        self.0 .0.borrow_mut().tx.push(*frame);
        true
    }

    /// Codes 0 to 3 select 125, 250, 500 and 1000 kbit/s.
    fn bitrate_supported(&self, code: u8) -> bool {
        code <= 3
    }

    fn set_bitrate(&mut self, code: u8) {
        self.0 .0.borrow_mut().bitrate = Some(code);
    }
}

// ---------------------------------------------------------------------------
// USB DFU
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DfuState {
    requests: VecDeque<(DfuRequest, Vec<u8>)>,
    responses: Vec<(DfuStatus, Vec<u8>)>,
    sof: bool,
    deinits: u32,
}

#[derive(Clone, Default)]
pub struct DfuWire(Rc<RefCell<DfuState>>);

impl DfuWire {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_of_frame(&self) {
        self.0.borrow_mut().sof = true;
    }

    pub fn request(&self, request: DfuRequest, payload: &[u8]) {
        self.0
            .borrow_mut()
            .requests
            .push_back((request, payload.to_vec()));
    }

    pub fn take_responses(&self) -> Vec<(DfuStatus, Vec<u8>)> {
        std::mem::take(&mut self.0.borrow_mut().responses)
    }

    pub fn deinits(&self) -> u32 {
        self.0.borrow().deinits
    }
}

pub struct MockDfu(DfuWire);

impl MockDfu {
    pub fn new(wire: &DfuWire) -> Self {
        Self(wire.clone())
    }
}

impl DfuLink for MockDfu {
    fn poll(&mut self, buf: &mut [u8]) -> Option<DfuRequest> {
        let (request, payload) = self.0 .0.borrow_mut().requests.pop_front()?;
        buf[..payload.len()].copy_from_slice(&payload);
        Some(request)
    }

    fn respond(&mut self, status: DfuStatus, data: &[u8]) {
        self.0 .0.borrow_mut().responses.push((status, data.to_vec()));
    }
}

impl UsbDfuDevice for MockDfu {
    fn init(&mut self) {}

    fn deinit(&mut self) {
        self.0 .0.borrow_mut().deinits += 1;
    }

    fn sof_detected(&mut self) -> bool {
        self.0 .0.borrow().sof
    }
}

// ---------------------------------------------------------------------------
// Memories
// ---------------------------------------------------------------------------

/// Flash controller over a byte array: programming ANDs, erasing sets 0xFF.
pub struct SimFlash {
    pub memory: Vec<u8>,
    locked: bool,
    option_locked: bool,
    key_stage: bool,
    option_key_stage: bool,
    /// Raised by the next started operation.
    pub fail_next: Option<FlashErrors>,
    pending: FlashErrors,
    pub stuck_busy: bool,
    pub rdp: Option<RdpLevel>,
    pub wrp: [Option<WrpArea>; WRP_AREAS],
    pub option_words: Vec<(u32, u32)>,
    pub option_changes: u32,
    pub erased_pages: Vec<(Bank, u16)>,
    pub bank_erases: Vec<MassErase>,
}

impl SimFlash {
    pub fn new() -> Self {
        let size = (TEST_GEOMETRY.bank_size * u32::from(TEST_GEOMETRY.banks)) as usize;
        Self {
            memory: vec![0xFF; size],
            locked: true,
            option_locked: true,
            key_stage: false,
            option_key_stage: false,
            fail_next: None,
            pending: FlashErrors::empty(),
            stuck_busy: false,
            rdp: None,
            wrp: [None; WRP_AREAS],
            option_words: Vec::new(),
            option_changes: 0,
            erased_pages: Vec::new(),
            bank_erases: Vec::new(),
        }
    }

    fn start(&mut self) {
        if let Some(errors) = self.fail_next.take() {
            self.pending |= errors;
        }
    }

    fn fill(&mut self, offset: u32, len: u32) {
        let start = offset as usize;
        self.memory[start..start + len as usize].fill(0xFF);
    }
}

impl Default for SimFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashRegisters for SimFlash {
    fn write_key(&mut self, key: u32) {
        if key == FLASH_KEY2 && self.key_stage {
            self.locked = false;
        }
        self.key_stage = key == FLASH_KEY1;
    }

    fn is_locked(&self) -> bool {
        self.locked
    }

    fn lock(&mut self) {
        self.locked = true;
    }

    fn write_option_key(&mut self, key: u32) {
        if key == OPTION_KEY2 && self.option_key_stage && !self.locked {
            self.option_locked = false;
        }
        self.option_key_stage = key == OPTION_KEY1;
    }

    fn is_option_locked(&self) -> bool {
        self.option_locked
    }

    fn lock_option(&mut self) {
        self.option_locked = true;
    }

    fn is_busy(&self) -> bool {
        self.stuck_busy
    }

    fn errors(&self) -> FlashErrors {
        self.pending
    }

    fn clear_errors(&mut self, errors: FlashErrors) {
        self.pending.remove(errors);
    }

    fn program_quad_word(&mut self, address: u32, data: &[u8; QUAD_WORD]) {
        self.start();
        let offset = (address - FLASH_BASE) as usize;
        for (cell, byte) in self.memory[offset..offset + QUAD_WORD].iter_mut().zip(data) {
            *cell &= byte;
        }
    }

    fn erase_page(&mut self, bank: Bank, page: u16) {
        self.start();
        let bank_offset = match bank {
            Bank::Bank1 => 0,
            Bank::Bank2 => FLASH_BANK_SIZE,
        };
        self.fill(bank_offset + u32::from(page) * FLASH_PAGE_SIZE, FLASH_PAGE_SIZE);
        self.erased_pages.push((bank, page));
    }

    fn erase_bank(&mut self, target: MassErase) {
        self.start();
        match target {
            MassErase::All => self.fill(0, 2 * FLASH_BANK_SIZE),
            MassErase::Bank1 => self.fill(0, FLASH_BANK_SIZE),
            MassErase::Bank2 => self.fill(FLASH_BANK_SIZE, FLASH_BANK_SIZE),
        }
        self.bank_erases.push(target);
    }

    fn read(&self, address: u32) -> u8 {
        address
            .checked_sub(FLASH_BASE)
            .and_then(|offset| self.memory.get(offset as usize))
            .copied()
            .unwrap_or(0xFF)
    }

    fn set_rdp_level(&mut self, level: RdpLevel) {
        self.rdp = Some(level);
    }

    fn set_wrp_area(&mut self, index: usize, area: WrpArea) {
        self.wrp[index] = Some(area);
    }

    fn program_option_word(&mut self, offset: u32, value: u32) {
        self.option_words.push((offset, value));
    }

    fn start_option_change(&mut self) {
        self.start();
        self.option_changes += 1;
    }
}

/// Byte-addressed storage shared between a region and the test.
#[derive(Clone)]
pub struct SimBus {
    base: u32,
    data: Rc<RefCell<Vec<u8>>>,
}

impl SimBus {
    pub fn new(base: u32, size: u32) -> Self {
        Self {
            base,
            data: Rc::new(RefCell::new(vec![0; size as usize])),
        }
    }

    pub fn load(&self, address: u32, bytes: &[u8]) {
        let offset = (address - self.base) as usize;
        self.data.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn dump(&self, address: u32, len: usize) -> Vec<u8> {
        let offset = (address - self.base) as usize;
        self.data.borrow()[offset..offset + len].to_vec()
    }
}

impl Bus for SimBus {
    fn read(&self, address: u32) -> u8 {
        address
            .checked_sub(self.base)
            .and_then(|offset| self.data.borrow().get(offset as usize).copied())
            .unwrap_or(0)
    }

    fn write(&self, address: u32, byte: u8) {
        if let Some(offset) = address.checked_sub(self.base) {
            if let Some(cell) = self.data.borrow_mut().get_mut(offset as usize) {
                *cell = byte;
            }
        }
    }
}

/// Flash, host RAM and system memory of a test device.
pub struct Memories {
    pub flash: FlashDriver<SimFlash>,
    pub ram_bus: SimBus,
    pub ram: Ram<SimBus>,
    pub system: Rom<SimBus>,
}

impl Memories {
    pub fn new() -> Self {
        Self::with_flash(SimFlash::new())
    }

    pub fn with_flash(flash: SimFlash) -> Self {
        let ram_bus = SimBus::new(RAM_START, RAM_SIZE);
        let system_bus = SimBus::new(SYSTEM_MEMORY_START, SYSTEM_MEMORY_SIZE);
        Self {
            flash: FlashDriver::new(flash, TEST_GEOMETRY).with_timeout(64),
            ram: Ram::new(ram_bus.clone(), RAM_START, RAM_END),
            ram_bus,
            system: Rom::system_memory(
                system_bus,
                SYSTEM_MEMORY_START,
                SYSTEM_MEMORY_START + SYSTEM_MEMORY_SIZE,
            ),
        }
    }

    pub fn registry(&self) -> MemoryRegistry<'_> {
        let mut registry = MemoryRegistry::new();
        registry.register(&self.flash).unwrap();
        registry.register(&self.ram).unwrap();
        registry.register(&self.system).unwrap();
        registry
    }

    /// Flash contents, `len` bytes at `address`.
    pub fn flash_bytes(&self, address: u32, len: usize) -> Vec<u8> {
        let offset = (address - FLASH_BASE) as usize;
        self.flash.registers().memory[offset..offset + len].to_vec()
    }
}

impl Default for Memories {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct RecordingHooks {
    pub polls: u32,
    pub deferred: Vec<PostAction>,
}

impl MemoryHooks for RecordingHooks {
    fn poll(&mut self) {
        self.polls += 1;
    }

    fn defer(&mut self, action: PostAction) {
        self.deferred.push(action);
    }
}

// ---------------------------------------------------------------------------
// Special commands
// ---------------------------------------------------------------------------

/// Accepts special opcode 0x0001 and extended opcode 0x0002. A special
/// reply echoes buffer 1 reversed with a single 0x00 status byte.
#[derive(Default)]
pub struct RecordingSpecial {
    pub frames: Vec<(SpecialKind, u16, Vec<u8>, Vec<u8>)>,
}

impl SpecialCommands for RecordingSpecial {
    fn special_opcodes(&self) -> &[u16] {
        &[0x0001]
    }

    fn extended_opcodes(&self) -> &[u16] {
        &[0x0002]
    }

    fn process(&mut self, frame: &SpecialFrame<'_>, reply: &mut SpecialReply) {
        self.frames.push((
            frame.kind,
            frame.opcode,
            frame.buffer1.to_vec(),
            frame.buffer2.to_vec(),
        ));
        for &byte in frame.buffer1.iter().rev() {
            let _ = reply.data.push(byte);
        }
        let _ = reply.status.push(0x00);
    }
}

// ---------------------------------------------------------------------------
// Command harness
// ---------------------------------------------------------------------------

/// Device-side state a handler runs against, without a session.
pub struct Device<'m> {
    pub memory: MemoryRegistry<'m>,
    pub post: PostProcessing,
    pub special: RecordingSpecial,
    pub protected: bool,
    scratch: Vec<u8>,
}

impl<'m> Device<'m> {
    pub fn new(memories: &'m Memories) -> Self {
        Self::with_scratch(memories, 4096)
    }

    /// A device whose frame buffer holds only `size` bytes.
    pub fn with_scratch(memories: &'m Memories, size: usize) -> Self {
        Self {
            memory: memories.registry(),
            post: PostProcessing::new(),
            special: RecordingSpecial::default(),
            protected: false,
            scratch: vec![0; size],
        }
    }

    /// Receive one opcode and dispatch it.
    pub fn serve(&mut self, transport: &mut dyn Transport, commands: &CommandTable) -> Outcome {
        let opcode = transport.get_opcode();
        let size = transport.protocol().buffer_size.min(self.scratch.len());
        let mut ctx = CommandContext {
            transport,
            memory: &self.memory,
            post: &self.post,
            special: &mut self.special,
            scratch: &mut self.scratch[..size],
            protected: self.protected,
            commands,
            device_id: DEVICE_ID,
        };
        dispatch(&mut ctx, opcode)
    }
}

/// Opcode followed by its complement.
pub fn command(opcode: u8) -> [u8; 2] {
    [opcode, !opcode]
}

pub fn xor(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}
