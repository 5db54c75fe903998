// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Special and extended special commands.
//!
//! These verbs are an envelope: the core validates the 16-bit opcode against
//! the application's allow-list, receives the length-prefixed buffers, and
//! hands the frame to a [`SpecialCommands`] implementation.
//!
//! Wire shape, after the command ACK:
//!
//! ```text
//! opcode[2] xor                 -> ACK | NACK
//! size1[2] buffer1[size1] xor   -> ACK | NACK
//! size2[2] buffer2[size2] xor   -> ACK | NACK   (extended only)
//! reply (special only), ACK
//! ```
//!
//! A special reply is `len[2] data len[2] status`, both sections empty when
//! the handler does not know the opcode.

use heapless::Vec;

use super::{CommandContext, Outcome};
use crate::protocol::{xor_fold, SPECIAL_CMD_SIZE_BUFFER1, SPECIAL_CMD_SIZE_BUFFER2};

pub const SPECIAL_REPLY_DATA_SIZE: usize = 256;
pub const SPECIAL_REPLY_STATUS_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpecialKind {
    Special,
    Extended,
}

/// One received special command. Borrowed from the session scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialFrame<'a> {
    pub kind: SpecialKind,
    pub opcode: u16,
    /// At most 128 bytes.
    pub buffer1: &'a [u8],
    /// At most 1024 bytes; always empty for [`SpecialKind::Special`].
    pub buffer2: &'a [u8],
}

/// Answer to a [`SpecialKind::Special`] frame.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SpecialReply {
    pub data: Vec<u8, SPECIAL_REPLY_DATA_SIZE>,
    pub status: Vec<u8, SPECIAL_REPLY_STATUS_SIZE>,
}

/// Application side of the special command envelope.
pub trait SpecialCommands {
    /// Opcodes accepted by `Special` (0x50).
    fn special_opcodes(&self) -> &[u16] {
        &[]
    }

    /// Opcodes accepted by `ExtendedSpecial` (0x51).
    fn extended_opcodes(&self) -> &[u16] {
        &[]
    }

    /// Interpret `frame`. `reply` starts empty and is only sent back for
    /// [`SpecialKind::Special`].
    fn process(&mut self, frame: &SpecialFrame<'_>, reply: &mut SpecialReply);
}

/// Handler with empty allow-lists: every special opcode is refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpecialCommands;

impl SpecialCommands for NoSpecialCommands {
    fn process(&mut self, _frame: &SpecialFrame<'_>, _reply: &mut SpecialReply) {}
}

/// Handle `Special` (0x50).
pub(super) fn handle_special(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    run_special(ctx, SpecialKind::Special);
    Outcome::Done
}

/// Handle `ExtendedSpecial` (0x51).
pub(super) fn handle_extended_special(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    run_special(ctx, SpecialKind::Extended);
    Outcome::Done
}

fn run_special(ctx: &mut CommandContext<'_, '_>, kind: SpecialKind) {
    ctx.ack();

    let Some(opcode) = receive_opcode(ctx, kind) else {
        ctx.nack();
        return;
    };
    ctx.ack();

    if ctx.scratch.len() < SPECIAL_CMD_SIZE_BUFFER1 + SPECIAL_CMD_SIZE_BUFFER2 + 2 {
        warn!("Special: scratch buffer too small");
        ctx.nack();
        return;
    }

    let Some(size1) = receive_buffer(ctx, 0, SPECIAL_CMD_SIZE_BUFFER1) else {
        ctx.nack();
        return;
    };
    ctx.ack();

    let offset2 = SPECIAL_CMD_SIZE_BUFFER1 + 1;
    let size2 = match kind {
        SpecialKind::Special => 0,
        SpecialKind::Extended => {
            let Some(size2) = receive_buffer(ctx, offset2, SPECIAL_CMD_SIZE_BUFFER2) else {
                ctx.nack();
                return;
            };
            ctx.ack();
            size2
        }
    };

    let frame = SpecialFrame {
        kind,
        opcode,
        buffer1: &ctx.scratch[..size1],
        buffer2: &ctx.scratch[offset2..offset2 + size2],
    };
    debug!("Special {:?} 0x{:04x}: {} + {} bytes", kind, opcode, size1, size2);
    let mut reply = SpecialReply::default();
    ctx.special.process(&frame, &mut reply);

    if kind == SpecialKind::Special {
        send_reply(ctx, &reply);
    }
    ctx.ack();
}

/// Opcode and XOR, then the allow-list lookup.
fn receive_opcode(ctx: &mut CommandContext<'_, '_>, kind: SpecialKind) -> Option<u16> {
    let mut bytes = [0u8; 2];
    ctx.transport.begin_receive();
    ctx.transport.read_bytes(&mut bytes);
    let valid = ctx.transport.check(bytes[0] ^ bytes[1]);
    ctx.transport.end_receive();
    if !valid {
        warn!("Special: opcode checksum mismatch");
        return None;
    }

    let opcode = u16::from_be_bytes(bytes);
    let allowed = match kind {
        SpecialKind::Special => ctx.special.special_opcodes(),
        SpecialKind::Extended => ctx.special.extended_opcodes(),
    };
    if !allowed.contains(&opcode) {
        warn!("Special: opcode 0x{:04x} not allowed", opcode);
        return None;
    }
    Some(opcode)
}

/// Size, payload and XOR into `scratch[offset..]`. The XOR covers the size
/// bytes too and is read even for an empty payload.
fn receive_buffer(ctx: &mut CommandContext<'_, '_>, offset: usize, limit: usize) -> Option<usize> {
    ctx.transport.begin_receive();
    let mut header = [0u8; 2];
    ctx.transport.read_bytes(&mut header);
    let size = usize::from(u16::from_be_bytes(header));
    if size > limit {
        ctx.transport.end_receive();
        warn!("Special: {} byte buffer exceeds {}", size, limit);
        return None;
    }

    let payload = &mut ctx.scratch[offset..offset + size];
    ctx.transport.read_bytes(payload);
    let valid = ctx.transport.check(xor_fold(header[0] ^ header[1], payload));
    ctx.transport.end_receive();
    if !valid {
        warn!("Special: buffer checksum mismatch");
        return None;
    }
    Some(size)
}

fn send_reply(ctx: &mut CommandContext<'_, '_>, reply: &SpecialReply) {
    ctx.transport.begin_send();
    ctx.transport.send_bytes(&(reply.data.len() as u16).to_be_bytes());
    ctx.transport.send_bytes(&reply.data);
    ctx.transport.send_bytes(&(reply.status.len() as u16).to_be_bytes());
    ctx.transport.send_bytes(&reply.status);
    ctx.transport.end_send();
}
