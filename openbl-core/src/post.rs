// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Deferred actions that must run only after a response has left the wire.

use core::cell::{Cell, RefCell};
use heapless::Vec;

const QUEUE_DEPTH: usize = 4;

/// Work a memory driver schedules for after the current command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PostAction {
    /// Reload option bytes (resets the MCU).
    OptionBytesLaunch,
    SystemReset,
}

/// One-shot post-processing queue.
///
/// Drivers [`arm`](Self::arm) actions while they mutate protection or flash
/// state; handlers call [`start`](Self::start) after their final ACK; the
/// session drains started actions once the handler has returned.
pub struct PostProcessing {
    actions: RefCell<Vec<PostAction, QUEUE_DEPTH>>,
    started: Cell<bool>,
}

impl PostProcessing {
    pub const fn new() -> Self {
        Self {
            actions: RefCell::new(Vec::new()),
            started: Cell::new(false),
        }
    }

    /// Register an action; duplicates collapse.
    pub fn arm(&self, action: PostAction) {
        let mut actions = self.actions.borrow_mut();
        if actions.contains(&action) {
            return;
        }
        if actions.push(action).is_err() {
            warn!("Post-processing queue full, dropping {:?}", action);
        }
    }

    /// Mark armed actions as due once the handler returns.
    pub fn start(&self) {
        if !self.actions.borrow().is_empty() {
            self.started.set(true);
        }
    }

    pub fn is_armed(&self) -> bool {
        !self.actions.borrow().is_empty()
    }

    /// Take the first due action, if the queue was started.
    pub fn take_due(&self) -> Option<PostAction> {
        if !self.started.get() {
            return None;
        }
        let mut actions = self.actions.borrow_mut();
        if actions.is_empty() {
            self.started.set(false);
            return None;
        }
        let action = actions.remove(0);
        if actions.is_empty() {
            self.started.set(false);
        }
        Some(action)
    }
}

impl Default for PostProcessing {
    fn default() -> Self {
        Self::new()
    }
}
