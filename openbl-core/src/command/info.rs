// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

use super::{CommandContext, Outcome};

/// Handle `GetCommand`: protocol version and the supported opcodes.
pub(super) fn handle_get_command(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    let opcodes = ctx.commands.opcodes();
    let version = ctx.transport.protocol().version;

    ctx.ack();
    ctx.transport.begin_send();
    ctx.transport.send_byte(opcodes.len() as u8);
    ctx.transport.send_byte(version);
    ctx.transport.send_bytes(&opcodes);
    ctx.transport.end_send();
    ctx.ack();
    Outcome::Done
}

/// Handle `GetVersion`: protocol version, plus two option bytes on links
/// that carry them.
pub(super) fn handle_get_version(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    let protocol = *ctx.transport.protocol();

    ctx.ack();
    ctx.transport.begin_send();
    ctx.transport.send_byte(protocol.version);
    if protocol.version_padding {
        ctx.transport.send_bytes(&[0x00, 0x00]);
    }
    ctx.transport.end_send();
    ctx.ack();
    Outcome::Done
}

/// Handle `GetID`: length byte, then the product ID, MSB first.
pub(super) fn handle_get_id(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    let id_length = ctx.transport.protocol().id_length;
    let [msb, lsb] = ctx.device_id.to_be_bytes();

    ctx.ack();
    ctx.transport.begin_send();
    ctx.transport.send_bytes(&[id_length, msb, lsb]);
    ctx.transport.end_send();
    ctx.ack();
    Outcome::Done
}
