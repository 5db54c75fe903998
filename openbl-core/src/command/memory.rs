// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

use super::{CommandContext, Outcome};
use crate::protocol::xor_fold;
use crate::transport::Framing;

/// Block-framing chunk header: 15-bit size, "more chunks" flag, XOR.
struct ChunkHeader {
    size: usize,
    more: bool,
    valid: bool,
}

fn receive_chunk_header(ctx: &mut CommandContext<'_, '_>) -> ChunkHeader {
    let mut header = [0u8; 3];
    ctx.transport.read_bytes(&mut header);
    let raw = u16::from_be_bytes([header[0], header[1]]);
    ChunkHeader {
        size: usize::from(raw >> 1),
        more: raw & 1 != 0,
        valid: header[0] ^ header[1] == header[2],
    }
}

/// True when the chunk may be served: checksum good, size in `1..=limit`,
/// last byte mapped.
fn chunk_acceptable(ctx: &CommandContext<'_, '_>, header: &ChunkHeader, address: u32, limit: usize) -> bool {
    if !header.valid || header.size == 0 || header.size > limit {
        return false;
    }
    let last = address.wrapping_add(header.size as u32 - 1);
    ctx.memory.area_of(last).is_some()
}

/// Handle `ReadMemory`: address, `N, !N`, then `N + 1` bytes back.
pub(super) fn handle_read_memory(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    if !ctx.check_protection() {
        return Outcome::Done;
    }
    let Some(address) = ctx.receive_address() else {
        ctx.nack();
        return Outcome::Done;
    };
    ctx.ack();

    if ctx.transport.protocol().framing == Framing::Block {
        read_chunks(ctx, address);
        return Outcome::Done;
    }

    ctx.transport.begin_receive();
    let count = ctx.transport.read_byte();
    let valid = ctx.transport.check(!count);
    ctx.transport.end_receive();
    if !valid {
        warn!("ReadMemory: count complement mismatch");
        ctx.nack();
        return Outcome::Done;
    }
    ctx.ack();

    let index = ctx.memory.index_of(address);
    ctx.transport.begin_send();
    for offset in 0..=u32::from(count) {
        let byte = ctx.memory.read(address.wrapping_add(offset), index);
        ctx.transport.send_byte(byte);
    }
    ctx.transport.end_send();
    Outcome::Done
}

fn read_chunks(ctx: &mut CommandContext<'_, '_>, mut address: u32) {
    loop {
        let header = receive_chunk_header(ctx);
        if !chunk_acceptable(ctx, &header, address, ctx.scratch.len()) {
            warn!("ReadMemory: chunk rejected at 0x{:08x}", address);
            ctx.nack();
            return;
        }

        let index = ctx.memory.index_of(address);
        for (offset, slot) in (0u32..).zip(ctx.scratch[..header.size].iter_mut()) {
            *slot = ctx.memory.read(address.wrapping_add(offset), index);
        }
        address = address.wrapping_add(header.size as u32);

        ctx.ack();
        ctx.transport.send_bytes(&ctx.scratch[..header.size]);
        if !header.more {
            return;
        }
    }
}

/// Handle `WriteMemory`: address, `N`, `N + 1` bytes, XOR of both.
pub(super) fn handle_write_memory(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    write_memory(ctx, false)
}

/// Handle the no-stretch `WriteMemory`: busy bytes while programming.
pub(super) fn handle_ns_write_memory(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    write_memory(ctx, true)
}

fn write_memory(ctx: &mut CommandContext<'_, '_>, busy: bool) -> Outcome {
    if !ctx.check_protection() {
        return Outcome::Done;
    }
    let Some(address) = ctx.receive_address() else {
        ctx.nack();
        return Outcome::Done;
    };
    ctx.ack();

    if ctx.transport.protocol().framing == Framing::Block {
        write_chunks(ctx, address);
        return Outcome::Done;
    }

    ctx.transport.begin_receive();
    let count = ctx.transport.read_byte();
    let length = usize::from(count) + 1;
    if length > ctx.scratch.len() {
        ctx.discard(length);
        ctx.transport.end_receive();
        ctx.nack();
        return Outcome::Done;
    }
    let data = &mut ctx.scratch[..length];
    ctx.transport.read_bytes(data);
    let valid = ctx.transport.check(xor_fold(count, data));
    ctx.transport.end_receive();
    if !valid {
        warn!("WriteMemory: checksum mismatch");
        ctx.nack();
        return Outcome::Done;
    }

    let result = ctx.memory_op(busy, |memory, scratch, hooks| {
        memory.write(address, &scratch[..length], hooks)
    });
    match result {
        Ok(()) => {
            ctx.ack();
            ctx.post.start();
        }
        Err(e) => {
            warn!("WriteMemory at 0x{:08x} failed: {}", address, e);
            ctx.nack();
        }
    }
    Outcome::Done
}

fn write_chunks(ctx: &mut CommandContext<'_, '_>, mut address: u32) {
    loop {
        let header = receive_chunk_header(ctx);
        // One byte stays free for the trailing XOR.
        let limit = ctx.scratch.len().saturating_sub(1);
        if !chunk_acceptable(ctx, &header, address, limit) {
            warn!("WriteMemory: chunk rejected at 0x{:08x}", address);
            ctx.nack();
            return;
        }
        ctx.ack();

        let size = header.size;
        ctx.transport.read_bytes(&mut ctx.scratch[..=size]);
        if xor_fold(0, &ctx.scratch[..size]) != ctx.scratch[size] {
            warn!("WriteMemory: chunk checksum mismatch");
            ctx.nack();
        } else {
            let result = ctx.memory_op(false, |memory, scratch, hooks| {
                memory.write(address, &scratch[..size], hooks)
            });
            match result {
                Ok(()) => {
                    address = address.wrapping_add(size as u32);
                    ctx.ack();
                    ctx.post.start();
                }
                Err(e) => {
                    warn!("WriteMemory at 0x{:08x} failed: {}", address, e);
                    ctx.nack();
                }
            }
        }

        if !header.more {
            return;
        }
    }
}

/// Handle `Go`: validate the target, acknowledge, then hand over to the
/// session for the jump.
pub(super) fn handle_go(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    if !ctx.check_protection() {
        return Outcome::Done;
    }
    let Some(address) = ctx.receive_address() else {
        ctx.nack();
        return Outcome::Done;
    };
    if !ctx.memory.check_jump_address(address) {
        warn!("Go: 0x{:08x} is not a jump target", address);
        ctx.nack();
        return Outcome::Done;
    }
    ctx.ack();
    Outcome::Jump(address)
}
