// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Wire-level constants and integrity helpers shared by the device core and
//! host tools.

/// Positive acknowledge.
pub const ACK_BYTE: u8 = 0x79;
/// Negative acknowledge.
pub const NACK_BYTE: u8 = 0x1F;
/// Sent by stretch-less transports while a slow memory operation runs.
pub const BUSY_BYTE: u8 = 0x76;
/// SPI dummy byte preceding every acknowledge.
pub const SYNC_BYTE: u8 = 0xA5;
/// Pseudo-opcode reported when the opcode complement check fails.
pub const ERROR_COMMAND: u8 = 0xEC;

/// USART auto-baud frame byte.
pub const USART_SYNC_BYTE: u8 = 0x7F;
/// SPI start-of-frame / synchronization byte.
pub const SPI_SYNC_BYTE: u8 = 0x5A;
/// I3C synchronization byte.
pub const I3C_SYNC_BYTE: u8 = 0x5A;
/// CAN identifier the host uses to synchronize.
pub const CAN_SYNC_ID: u16 = 0x79;

/// Protocol opcodes.
pub mod opcode {
    pub const GET_COMMAND: u8 = 0x00;
    pub const GET_VERSION: u8 = 0x01;
    pub const GET_ID: u8 = 0x02;
    pub const SPEED: u8 = 0x03;
    pub const READ_MEMORY: u8 = 0x11;
    pub const GO: u8 = 0x21;
    pub const WRITE_MEMORY: u8 = 0x31;
    pub const NS_WRITE_MEMORY: u8 = 0x32;
    pub const LEGACY_ERASE: u8 = 0x43;
    pub const EXT_ERASE: u8 = 0x44;
    pub const NS_ERASE: u8 = 0x45;
    pub const SPECIAL_COMMAND: u8 = 0x50;
    pub const EXTENDED_SPECIAL_COMMAND: u8 = 0x51;
    pub const WRITE_PROTECT: u8 = 0x63;
    pub const NS_WRITE_PROTECT: u8 = 0x64;
    pub const WRITE_UNPROTECT: u8 = 0x73;
    pub const NS_WRITE_UNPROTECT: u8 = 0x74;
    pub const READ_PROTECT: u8 = 0x82;
    pub const NS_READ_PROTECT: u8 = 0x83;
    pub const READ_UNPROTECT: u8 = 0x92;
    pub const NS_READ_UNPROTECT: u8 = 0x93;
    pub const CHECKSUM: u8 = 0xA1;
}

/// Reserved extended-erase counts.
pub const ERASE_ALL: u16 = 0xFFFF;
pub const ERASE_BANK1: u16 = 0xFFFE;
pub const ERASE_BANK2: u16 = 0xFFFD;
/// Any count in `0xFFF0..=0xFFFF` selects a special erase.
pub const ERASE_SPECIAL_MASK: u16 = 0xFFF0;
/// Legacy erase count requesting a global erase.
pub const LEGACY_ERASE_ALL: u8 = 0xFF;

/// Maximum payload of a special command's first buffer.
pub const SPECIAL_CMD_SIZE_BUFFER1: usize = 128;
/// Maximum payload of an extended special command's second buffer.
pub const SPECIAL_CMD_SIZE_BUFFER2: usize = 1024;

/// XOR of every byte in `data`, starting from `seed`.
pub fn xor_fold(seed: u8, data: &[u8]) -> u8 {
    data.iter().fold(seed, |acc, b| acc ^ b)
}

/// Address followed by its XOR, the way hosts send it.
pub fn address_frame(address: u32) -> [u8; 5] {
    let b = address.to_be_bytes();
    [b[0], b[1], b[2], b[3], xor_fold(0, &b)]
}

/// CRC used by the CHECKSUM command (CRC-32/MPEG-2, the STM32 CRC unit default).
pub const CHECKSUM_CRC: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_MPEG_2);

/// True when `count` is one of the reserved extended-erase values.
pub fn is_special_erase(count: u16) -> bool {
    count & ERASE_SPECIAL_MASK == ERASE_SPECIAL_MASK
}
