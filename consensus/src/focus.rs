//! Focus: the standalone β-consecutive-success counter.
//!
//! Wave embeds the same "β consecutive successes finalizes" logic directly
//! in its own per-level confidence vector, since a level's counter is
//! always read and reset in lockstep with Wave's own finalized flag. Focus
//! is the factored-out, freestanding version of that law for callers that
//! want it without the rest of Wave's preference machinery — e.g. a
//! driver that only needs "did the last β rounds all succeed" and has
//! nothing resembling a Photon preference to track alongside it.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// A single β-consecutive-success accumulator.
///
/// Plain `u32` fields are enough for sequential callers (Wave embeds its
/// own counters directly); [`AtomicFocus`] below is the concurrent-safe
/// sibling for call sites driven from multiple tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Focus {
    beta: u32,
    consecutive: u32,
    finalized: bool,
}

impl Focus {
    pub fn new(beta: u32) -> Self {
        assert!(beta >= 1, "beta must be >= 1");
        Self {
            beta,
            consecutive: 0,
            finalized: false,
        }
    }

    /// Records one round's outcome. Returns `true` the round this call
    /// reaches β consecutive successes; once finalized, further calls are
    /// no-ops — the same never-unfinalize safety property Wave holds.
    pub fn record(&mut self, success: bool) -> bool {
        if self.finalized {
            return false;
        }
        if success {
            self.consecutive += 1;
            if self.consecutive >= self.beta {
                self.finalized = true;
                return true;
            }
        } else {
            self.consecutive = 0;
        }
        false
    }

    pub fn reset(&mut self) {
        if !self.finalized {
            self.consecutive = 0;
        }
    }

    pub fn finalized(&self) -> bool {
        self.finalized
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

/// Lock-free Focus counter for call sites where many tasks may race to
/// record an outcome for the same item. A `false` record still needs
/// exclusive ordering against concurrent `true` records, so this uses a
/// compare-and-swap loop rather than a plain `fetch_add`.
#[derive(Debug)]
pub struct AtomicFocus {
    beta: u32,
    consecutive: AtomicU32,
    finalized: std::sync::atomic::AtomicBool,
}

impl AtomicFocus {
    pub fn new(beta: u32) -> Self {
        assert!(beta >= 1, "beta must be >= 1");
        Self {
            beta,
            consecutive: AtomicU32::new(0),
            finalized: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn record(&self, success: bool) -> bool {
        if self.finalized.load(Ordering::Acquire) {
            return false;
        }
        loop {
            let current = self.consecutive.load(Ordering::Acquire);
            let next = if success { current + 1 } else { 0 };
            if self
                .consecutive
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if success && next >= self.beta {
                    self.finalized.store(true, Ordering::Release);
                    return true;
                }
                return false;
            }
        }
    }

    pub fn finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive.load(Ordering::Acquire)
    }
}
