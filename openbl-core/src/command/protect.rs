// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Readout and write protection verbs.
//!
//! Changing RDP reloads the option bytes, which wipes RAM and resets the
//! part. Both RDP verbs therefore send their two ACKs before touching the
//! protection level, and the reload itself only runs as post-processing.

use super::{CommandContext, Outcome};
use crate::error::MemoryError;
use crate::memory::WriteProtection;
use crate::protocol::xor_fold;
use crate::transport::Framing;

/// Handle `ReadoutProtect`.
pub(super) fn handle_readout_protect(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    readout_protect(ctx, false)
}

/// Handle the no-stretch `ReadoutProtect`.
pub(super) fn handle_ns_readout_protect(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    readout_protect(ctx, true)
}

/// Handle `ReadoutUnprotect`. Accepted whatever the current level.
pub(super) fn handle_readout_unprotect(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    readout_unprotect(ctx, false)
}

/// Handle the no-stretch `ReadoutUnprotect`.
pub(super) fn handle_ns_readout_unprotect(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    readout_unprotect(ctx, true)
}

fn readout_protect(ctx: &mut CommandContext<'_, '_>, busy: bool) -> Outcome {
    if !ctx.check_protection() {
        return Outcome::Done;
    }
    ctx.ack();
    set_readout(ctx, true, busy);
    Outcome::Done
}

fn readout_unprotect(ctx: &mut CommandContext<'_, '_>, busy: bool) -> Outcome {
    ctx.ack();
    ctx.ack();
    set_readout(ctx, false, busy);
    Outcome::Done
}

fn set_readout(ctx: &mut CommandContext<'_, '_>, enable: bool, busy: bool) {
    let result = ctx.default_address().and_then(|base| {
        ctx.memory_op(busy, |memory, _, hooks| {
            memory.set_readout_protection(base, enable, hooks)
        })
    });
    match result {
        Ok(()) => {
            info!("Readout protection {}", if enable { "enabled" } else { "disabled" });
            ctx.post.start();
        }
        Err(e) => warn!("Readout protection change failed: {}", e),
    }
}

/// Handle `WriteProtect`: a list of sector codes to protect.
pub(super) fn handle_write_protect(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    write_protect(ctx, false)
}

/// Handle the no-stretch `WriteProtect`.
pub(super) fn handle_ns_write_protect(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    write_protect(ctx, true)
}

fn write_protect(ctx: &mut CommandContext<'_, '_>, busy: bool) -> Outcome {
    if !ctx.check_protection() {
        return Outcome::Done;
    }
    let length = match ctx.transport.protocol().framing {
        Framing::Inline => receive_inline_sectors(ctx),
        Framing::Phased => receive_phased_sectors(ctx),
        Framing::Block => receive_block_sectors(ctx),
    };
    let Some(length) = length else {
        ctx.nack();
        return Outcome::Done;
    };

    let result = ctx.default_address().and_then(|base| {
        ctx.memory_op(busy, |memory, scratch, hooks| {
            memory.set_write_protection(base, WriteProtection::Enable(&scratch[..length]), hooks)
        })
    });
    finish_write_protection(ctx, result);
    Outcome::Done
}

/// `N`, `N + 1` codes, XOR seeded with `N`.
fn receive_inline_sectors(ctx: &mut CommandContext<'_, '_>) -> Option<usize> {
    let count = ctx.transport.read_byte();
    let length = usize::from(count) + 1;
    if length > ctx.scratch.len() {
        ctx.discard(length);
        return None;
    }
    ctx.transport.read_bytes(&mut ctx.scratch[..length]);
    if !ctx.transport.check(xor_fold(count, &ctx.scratch[..length])) {
        warn!("WriteProtect: checksum mismatch");
        return None;
    }
    Some(length)
}

/// `N, !N`, ACK, then `N + 1` codes and their XOR in a second phase.
fn receive_phased_sectors(ctx: &mut CommandContext<'_, '_>) -> Option<usize> {
    ctx.transport.begin_receive();
    let count = ctx.transport.read_byte();
    let valid = ctx.transport.check(!count);
    ctx.transport.end_receive();
    if !valid {
        warn!("WriteProtect: count complement mismatch");
        return None;
    }
    ctx.ack();

    let length = usize::from(count) + 1;
    ctx.transport.begin_receive();
    if length > ctx.scratch.len() {
        ctx.discard(length);
        ctx.transport.end_receive();
        return None;
    }
    ctx.transport.read_bytes(&mut ctx.scratch[..length]);
    let valid = ctx.transport.check(xor_fold(0, &ctx.scratch[..length]));
    ctx.transport.end_receive();
    if !valid {
        warn!("WriteProtect: checksum mismatch");
        return None;
    }
    Some(length)
}

/// `u16` count and XOR, ACK, then `2 * count` bytes and their XOR.
fn receive_block_sectors(ctx: &mut CommandContext<'_, '_>) -> Option<usize> {
    let mut header = [0u8; 3];
    ctx.transport.read_bytes(&mut header);
    let length = 2 * usize::from(u16::from_be_bytes([header[0], header[1]]));
    if header[0] ^ header[1] != header[2] || length == 0 || length >= ctx.scratch.len() {
        warn!("WriteProtect: {} byte list refused", length);
        return None;
    }
    ctx.ack();

    ctx.transport.read_bytes(&mut ctx.scratch[..=length]);
    if xor_fold(0, &ctx.scratch[..length]) != ctx.scratch[length] {
        warn!("WriteProtect: checksum mismatch");
        return None;
    }
    Some(length)
}

/// Handle `WriteUnprotect`: clear every protected area.
pub(super) fn handle_write_unprotect(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    write_unprotect(ctx, false)
}

/// Handle the no-stretch `WriteUnprotect`.
pub(super) fn handle_ns_write_unprotect(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    write_unprotect(ctx, true)
}

fn write_unprotect(ctx: &mut CommandContext<'_, '_>, busy: bool) -> Outcome {
    if !ctx.check_protection() {
        return Outcome::Done;
    }
    let result = ctx.default_address().and_then(|base| {
        ctx.memory_op(busy, |memory, _, hooks| {
            memory.set_write_protection(base, WriteProtection::Disable, hooks)
        })
    });
    finish_write_protection(ctx, result);
    Outcome::Done
}

fn finish_write_protection(ctx: &mut CommandContext<'_, '_>, result: Result<(), MemoryError>) {
    match result {
        Ok(()) => {
            ctx.ack();
            ctx.post.start();
        }
        Err(e) => {
            warn!("Write protection change failed: {}", e);
            ctx.nack();
        }
    }
}
