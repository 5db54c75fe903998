// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Erase verbs.
//!
//! The extended erase count is a big-endian `u16`. Counts in
//! `0xFFF0..=0xFFFF` are reserved: three of them select a mass erase, the
//! rest are refused. Any other count announces `count + 1` two-byte page
//! numbers (block framing: exactly `count` pages).
//!
//! Page erase failures are still acknowledged on inline and phased links;
//! the host re-reads memory to find out. Block framing reports them.

use super::{CommandContext, Outcome};
use crate::memory::{MassErase, PageList};
use crate::protocol::{is_special_erase, xor_fold, ACK_BYTE, LEGACY_ERASE_ALL, NACK_BYTE};
use crate::transport::Framing;

/// Handle `ExtendedErase` (0x44).
pub(super) fn handle_erase(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    let protocol = *ctx.transport.protocol();
    match protocol.framing {
        Framing::Block => erase_blocks(ctx),
        Framing::Inline | Framing::Phased => extended_erase(ctx, protocol.busy_on_erase),
    }
}

/// Handle the no-stretch erase (0x45): busy bytes while erasing.
pub(super) fn handle_ns_erase(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    extended_erase(ctx, true)
}

fn mass_erase(ctx: &mut CommandContext<'_, '_>, count: u16, busy: bool) -> u8 {
    let Some(target) = MassErase::from_sentinel(count) else {
        warn!("Erase: reserved count 0x{:04x} refused", count);
        return NACK_BYTE;
    };
    let result = ctx.default_address().and_then(|base| {
        ctx.memory_op(busy, |memory, _, hooks| memory.mass_erase(base, target, hooks))
    });
    match result {
        Ok(()) => ACK_BYTE,
        Err(e) => {
            warn!("Mass erase {:?} failed: {}", target, e);
            NACK_BYTE
        }
    }
}

/// Erase the page list stored as byte pairs at the front of the scratch
/// buffer. `failure` is what the host hears when the erase fails.
fn erase_pages(ctx: &mut CommandContext<'_, '_>, pages: usize, busy: bool, failure: u8) -> u8 {
    let result = ctx.default_address().and_then(|base| {
        ctx.memory_op(busy, |memory, scratch, hooks| {
            memory.erase(base, PageList::new(&scratch[..2 * pages]), hooks)
        })
    });
    match result {
        Ok(()) => ACK_BYTE,
        Err(e) => {
            warn!("Page erase failed: {}", e);
            failure
        }
    }
}

fn extended_erase(ctx: &mut CommandContext<'_, '_>, busy: bool) -> Outcome {
    if !ctx.check_protection() {
        return Outcome::Done;
    }
    let phased = ctx.transport.protocol().framing == Framing::Phased;

    ctx.transport.begin_receive();
    let mut header = [0u8; 2];
    ctx.transport.read_bytes(&mut header);
    let count = u16::from_be_bytes(header);
    let mut xor = header[0] ^ header[1];

    if is_special_erase(count) {
        let valid = ctx.transport.check(xor);
        ctx.transport.end_receive();
        let status = if valid {
            mass_erase(ctx, count, busy)
        } else {
            warn!("Erase: count checksum mismatch");
            NACK_BYTE
        };
        ctx.transport.send_ack(status);
        return Outcome::Done;
    }

    if phased {
        let valid = ctx.transport.check(xor);
        ctx.transport.end_receive();
        if !valid {
            warn!("Erase: count checksum mismatch");
            ctx.nack();
            return Outcome::Done;
        }
        ctx.ack();
        ctx.transport.begin_receive();
        xor = 0;
    }

    // The whole list is consumed even when it does not fit.
    let pages = usize::from(count) + 1;
    let capacity = ctx.scratch.len() / 2;
    for index in 0..pages {
        let mut page = [0u8; 2];
        ctx.transport.read_bytes(&mut page);
        xor ^= page[0] ^ page[1];
        if index < capacity {
            ctx.scratch[2 * index..2 * index + 2].copy_from_slice(&page);
        }
    }
    let valid = ctx.transport.check(xor);
    ctx.transport.end_receive();

    let status = if !valid {
        warn!("Erase: page list checksum mismatch");
        NACK_BYTE
    } else if pages > capacity {
        warn!("Erase: {} pages exceed the buffer", pages);
        NACK_BYTE
    } else {
        erase_pages(ctx, pages, busy, ACK_BYTE)
    };
    ctx.transport.send_ack(status);
    Outcome::Done
}

fn erase_blocks(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    if !ctx.check_protection() {
        return Outcome::Done;
    }

    let mut header = [0u8; 2];
    ctx.transport.read_bytes(&mut header);
    let count = u16::from_be_bytes(header);
    let valid = ctx.transport.check(header[0] ^ header[1]);

    if is_special_erase(count) {
        let status = if valid { mass_erase(ctx, count, false) } else { NACK_BYTE };
        ctx.transport.send_ack(status);
        return Outcome::Done;
    }

    let pages = usize::from(count);
    if !valid || pages == 0 || pages >= ctx.scratch.len() / 2 {
        warn!("Erase: {} pages refused", pages);
        ctx.nack();
        return Outcome::Done;
    }
    ctx.ack();

    let length = 2 * pages;
    ctx.transport.read_bytes(&mut ctx.scratch[..=length]);
    let status = if xor_fold(0, &ctx.scratch[..length]) != ctx.scratch[length] {
        warn!("Erase: page list checksum mismatch");
        NACK_BYTE
    } else {
        erase_pages(ctx, pages, false, NACK_BYTE)
    };
    ctx.transport.send_ack(status);
    Outcome::Done
}

/// Handle the legacy erase (0x43): one-byte count and page numbers.
pub(super) fn handle_legacy_erase(ctx: &mut CommandContext<'_, '_>) -> Outcome {
    if !ctx.check_protection() {
        return Outcome::Done;
    }
    let busy = ctx.transport.protocol().busy_on_erase;

    ctx.transport.begin_receive();
    let count = ctx.transport.read_byte();
    if count == LEGACY_ERASE_ALL {
        let valid = ctx.transport.check(0x00);
        ctx.transport.end_receive();
        let status = if valid {
            mass_erase(ctx, crate::protocol::ERASE_ALL, busy)
        } else {
            NACK_BYTE
        };
        ctx.transport.send_ack(status);
        return Outcome::Done;
    }

    let pages = usize::from(count) + 1;
    let capacity = ctx.scratch.len() / 2;
    let mut xor = count;
    for index in 0..pages {
        let page = ctx.transport.read_byte();
        xor ^= page;
        if index < capacity {
            ctx.scratch[2 * index] = 0;
            ctx.scratch[2 * index + 1] = page;
        }
    }
    let valid = ctx.transport.check(xor);
    ctx.transport.end_receive();

    let status = if !valid {
        warn!("Legacy erase: checksum mismatch");
        NACK_BYTE
    } else if pages > capacity {
        warn!("Legacy erase: {} pages exceed the buffer", pages);
        NACK_BYTE
    } else {
        erase_pages(ctx, pages, busy, ACK_BYTE)
    };
    ctx.transport.send_ack(status);
    Outcome::Done
}
