// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for address resolution and routing in the memory registry.

mod common;

use common::{
    panic_message, Memories, MockPlatform, RecordingHooks, SimBus, FLASH_BASE, RAM_END, RAM_SIZE,
};
use openbl_core::config::{OTP_END, OTP_START, RAM_START, SYSTEM_MEMORY_START};
use openbl_core::memory::otp::Otp;
use openbl_core::memory::ram::Ram;
use openbl_core::memory::{AreaType, MemoryRegistry, PageList, WriteProtection, MEMORY_CAPACITY};
use openbl_core::{MemoryError, RegistryError};

#[test]
fn test_area_lookup() {
    let memories = Memories::new();
    let registry = memories.registry();

    assert_eq!(registry.len(), 3);
    assert_eq!(registry.index_of(FLASH_BASE), Some(0));
    assert_eq!(registry.index_of(RAM_START + 0x10), Some(1));
    assert_eq!(registry.index_of(SYSTEM_MEMORY_START), Some(2));
    assert_eq!(registry.area_of(FLASH_BASE + 0x7FFF), Some(AreaType::Flash));
    assert_eq!(registry.area_of(RAM_START), Some(AreaType::Ram));
    assert_eq!(registry.area_of(SYSTEM_MEMORY_START), Some(AreaType::SystemMemory));
}

#[test]
fn test_region_end_is_exclusive() {
    let memories = Memories::new();
    let registry = memories.registry();

    assert_eq!(registry.index_of(RAM_END - 1), Some(1));
    assert_eq!(registry.index_of(RAM_END), None);
    assert_eq!(registry.area_of(FLASH_BASE + 0x8000), None);
}

#[test]
fn test_overlapping_region_rejected() {
    let memories = Memories::new();
    let alias = Ram::new(SimBus::new(RAM_START, RAM_SIZE), RAM_END - 0x10, RAM_END + 0x10);
    let mut registry = memories.registry();

    assert_eq!(registry.register(&alias), Err(RegistryError::Overlap));
    assert_eq!(registry.len(), 3);
}

#[test]
fn test_registry_capacity() {
    let bus = SimBus::new(0x3000_0000, 0x100);
    let regions: Vec<Ram<SimBus>> = (0..=MEMORY_CAPACITY as u32)
        .map(|i| Ram::new(bus.clone(), 0x3000_0000 + i * 0x10, 0x3000_0010 + i * 0x10))
        .collect();

    let mut registry = MemoryRegistry::new();
    for region in &regions[..MEMORY_CAPACITY] {
        registry.register(region).unwrap();
    }
    assert_eq!(registry.register(&regions[MEMORY_CAPACITY]), Err(RegistryError::Full));
    assert_eq!(registry.len(), MEMORY_CAPACITY);
}

#[test]
fn test_default_address_is_first_flash() {
    let memories = Memories::new();
    assert_eq!(memories.registry().default_address(), Some(FLASH_BASE));
    assert_eq!(MemoryRegistry::new().default_address(), None);
}

#[test]
fn test_read_through_region() {
    let memories = Memories::new();
    memories.ram_bus.load(RAM_START, &[0xDE, 0xAD]);
    let registry = memories.registry();

    let index = registry.index_of(RAM_START);
    assert_eq!(registry.read(RAM_START, index), 0xDE);
    assert_eq!(registry.read(RAM_START + 1, index), 0xAD);
    assert_eq!(registry.try_read(RAM_START + 1), Ok(0xAD));
    assert_eq!(registry.read(FLASH_BASE, registry.index_of(FLASH_BASE)), 0xFF);
}

#[test]
fn test_read_unmapped() {
    let memories = Memories::new();
    let registry = memories.registry();

    assert_eq!(registry.read(0x1000_0000, None), 0);
    assert_eq!(registry.try_read(0x1000_0000), Err(MemoryError::NotFound));
}

#[test]
fn test_write_routes_to_ram() {
    let memories = Memories::new();
    let registry = memories.registry();
    let mut hooks = RecordingHooks::default();

    registry.write(RAM_START + 4, &[1, 2, 3], &mut hooks).unwrap();
    assert_eq!(memories.ram_bus.dump(RAM_START + 4, 3), vec![1, 2, 3]);
    assert_eq!(hooks.polls, 1);
}

#[test]
fn test_write_crossing_region_end() {
    let memories = Memories::new();
    let registry = memories.registry();
    let mut hooks = RecordingHooks::default();

    let result = registry.write(RAM_END - 2, &[1, 2, 3], &mut hooks);
    assert_eq!(result, Err(MemoryError::OutOfRange));
    assert_eq!(memories.ram_bus.dump(RAM_END - 2, 2), vec![0, 0]);
}

#[test]
fn test_write_unmapped() {
    let memories = Memories::new();
    let registry = memories.registry();
    let mut hooks = RecordingHooks::default();

    assert_eq!(
        registry.write(0x1000_0000, &[0], &mut hooks),
        Err(MemoryError::NotFound)
    );
}

#[test]
fn test_unsupported_capabilities() {
    let memories = Memories::new();
    let registry = memories.registry();
    let mut hooks = RecordingHooks::default();

    assert_eq!(
        registry.write(SYSTEM_MEMORY_START, &[0], &mut hooks),
        Err(MemoryError::Unsupported)
    );
    assert_eq!(
        registry.erase(RAM_START, PageList::new(&[0, 1]), &mut hooks),
        Err(MemoryError::Unsupported)
    );
    assert_eq!(
        registry.set_write_protection(RAM_START, WriteProtection::Disable, &mut hooks),
        Err(MemoryError::Unsupported)
    );
    assert_eq!(
        registry.set_readout_protection(SYSTEM_MEMORY_START, true, &mut hooks),
        Err(MemoryError::Unsupported)
    );
}

#[test]
fn test_jump_capability() {
    let memories = Memories::new();
    let otp = Otp::new(&memories.flash, OTP_START, OTP_END);
    let mut registry = memories.registry();
    registry.register(&otp).unwrap();

    assert!(registry.check_jump_address(FLASH_BASE));
    assert!(registry.check_jump_address(RAM_START));
    assert!(!registry.check_jump_address(SYSTEM_MEMORY_START));
    assert!(!registry.check_jump_address(OTP_START));
    assert!(!registry.check_jump_address(0x1000_0000));
}

#[test]
fn test_vector_table() {
    let memories = Memories::new();
    memories.ram_bus.load(
        RAM_START,
        &[0x00, 0x80, 0x00, 0x20, 0x01, 0x41, 0x00, 0x20],
    );
    let registry = memories.registry();

    let table = registry.vector_table(RAM_START).unwrap();
    assert_eq!(table.base, RAM_START);
    assert_eq!(table.initial_sp, 0x2000_8000);
    assert_eq!(table.reset_vector, 0x2000_4101);

    assert_eq!(registry.vector_table(RAM_END - 4), Err(MemoryError::OutOfRange));
    assert_eq!(
        registry.vector_table(SYSTEM_MEMORY_START),
        Err(MemoryError::Unsupported)
    );
}

#[test]
fn test_jump_to_address() {
    let memories = Memories::new();
    memories.ram_bus.load(
        RAM_START,
        &[0x00, 0x80, 0x00, 0x20, 0x01, 0x41, 0x00, 0x20],
    );
    let registry = memories.registry();
    let mut platform = MockPlatform::default();

    let message = panic_message(|| {
        let _ = registry.jump_to_address(RAM_START, &mut platform);
    });
    assert_eq!(message, "jump to 0x20004000 sp 0x20008000 reset 0x20004101");
}

#[test]
fn test_jump_to_unmapped_address_fails() {
    let memories = Memories::new();
    let registry = memories.registry();
    let mut platform = MockPlatform::default();

    assert!(matches!(
        registry.jump_to_address(0x1000_0000, &mut platform),
        Err(MemoryError::NotFound)
    ));
}
