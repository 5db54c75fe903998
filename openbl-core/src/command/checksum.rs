// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

use super::{CommandContext, Outcome};
use crate::protocol::{xor_fold, CHECKSUM_CRC};

/// Handle `Checksum`: CRC-32/MPEG-2 of a word-aligned length of memory.
///
/// Address + XOR, then length (4 bytes, big-endian) + XOR. The length must
/// be a non-zero multiple of 4 and the range must stay inside one region.
/// The reply is the CRC big-endian followed by its XOR, then ACK.
pub(super) fn handle_checksum(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    if !ctx.check_protection() {
        return Outcome::Done;
    }
    let Some(address) = ctx.receive_address() else {
        ctx.nack();
        return Outcome::Done;
    };
    ctx.ack();

    let mut bytes = [0u8; 4];
    ctx.transport.begin_receive();
    ctx.transport.read_bytes(&mut bytes);
    let valid = ctx.transport.check(xor_fold(0, &bytes));
    ctx.transport.end_receive();
    let length = u32::from_be_bytes(bytes);

    let index = ctx.memory.index_of(address);
    let in_region = length
        .checked_sub(1)
        .and_then(|last| address.checked_add(last))
        .is_some_and(|end| index.is_some() && ctx.memory.index_of(end) == index);
    if !valid || length % 4 != 0 || !in_region || ctx.scratch.is_empty() {
        warn!("Checksum: length 0x{:08x} at 0x{:08x} refused", length, address);
        ctx.nack();
        return Outcome::Done;
    }
    ctx.ack();

    let mut digest = CHECKSUM_CRC.digest();
    let mut cursor = address;
    let mut remaining = length as usize;
    while remaining > 0 {
        let chunk = remaining.min(ctx.scratch.len());
        for slot in ctx.scratch[..chunk].iter_mut() {
            *slot = ctx.memory.read(cursor, index);
            cursor = cursor.wrapping_add(1);
        }
        digest.update(&ctx.scratch[..chunk]);
        remaining -= chunk;
        ctx.transport.on_wait();
    }
    let value = digest.finalize();
    debug!("Checksum 0x{:08x}+0x{:x}: 0x{:08x}", address, length, value);
    let crc = value.to_be_bytes();

    ctx.transport.begin_send();
    ctx.transport.send_bytes(&crc);
    ctx.transport.send_byte(xor_fold(0, &crc));
    ctx.transport.end_send();
    ctx.ack();
    Outcome::Done
}
