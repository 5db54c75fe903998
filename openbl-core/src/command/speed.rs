// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

use super::{CommandContext, Outcome};

/// Handle `Speed`: switch the bus bitrate. The first ACK goes out at the old
/// rate, the second at the new one.
pub(super) fn handle_speed(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    let code = ctx.transport.read_byte();
    if !ctx.transport.speed_supported(code) {
        warn!("Speed: unsupported baud code {}", code);
        ctx.nack();
        return Outcome::Done;
    }
    ctx.ack();
    ctx.transport.set_speed(code);
    info!("Bitrate switched to code {}", code);
    ctx.ack();
    Outcome::Done
}
