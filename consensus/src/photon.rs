//! Photon: per-item preference state and the slush/majority update.
//!
//! Three variants share one behavioral contract — record a successful poll,
//! read back the current preference — but differ in how they represent
//! preference strength: monadic and dyadic photons track a
//! fixed-size strength array, polyadic photons track an open-ended map.
//! [`PhotonState`] is the seam the rest of the crate (Wave, the engines)
//! programs against so they don't care which variant backs a given slot.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::item::Item;

/// Common contract every Photon variant implements.
pub trait PhotonState: Clone + std::fmt::Debug {
    /// The choice type this photon decides over (`bool`, `u8`, or a
    /// caller-supplied `Item`).
    type Choice: Clone + std::fmt::Debug + PartialEq;

    /// Increments `choice`'s strength and updates preference to `choice`
    /// only when its strength becomes *strictly* greater than the current
    /// preference's strength — first-seen wins until strictly beaten.
    fn record_successful_poll(&mut self, choice: Self::Choice);

    /// A no-op on preference strength; callers clear confidence elsewhere
    /// (Wave owns that). Kept as an explicit method since it's part of
    /// Photon's contract.
    fn record_unsuccessful_poll(&mut self) {}

    fn preference(&self) -> Self::Choice;

    /// Current strength backing `choice`, for tests and diagnostics.
    fn strength_of(&self, choice: &Self::Choice) -> u64;
}

/// Monadic photon: accept/reject preference on a single fixed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonadicPhoton {
    preference: bool,
    strength_reject: u64,
    strength_accept: u64,
}

impl MonadicPhoton {
    /// A freshly observed item starts preferring reject with zero strength
    /// on both sides; the first successful poll breaks the tie.
    pub fn new() -> Self {
        Self {
            preference: false,
            strength_reject: 0,
            strength_accept: 0,
        }
    }

    fn strength(&self, choice: bool) -> u64 {
        if choice {
            self.strength_accept
        } else {
            self.strength_reject
        }
    }

    /// Converts to a dyadic photon over `{0, 1}`, preserving this photon's
    /// strength for `choice` under the corresponding index and leaving the
    /// other index at zero.
    pub fn extend(&self, choice: bool) -> DyadicPhoton {
        let idx = choice as u8;
        let mut strength = [0u64; 2];
        strength[idx as usize] = self.strength(choice);
        DyadicPhoton {
            preference: idx,
            strength,
        }
    }
}

impl Default for MonadicPhoton {
    fn default() -> Self {
        Self::new()
    }
}

impl PhotonState for MonadicPhoton {
    type Choice = bool;

    fn record_successful_poll(&mut self, choice: bool) {
        if choice {
            self.strength_accept += 1;
        } else {
            self.strength_reject += 1;
        }
        if self.strength(choice) > self.strength(self.preference) {
            self.preference = choice;
        }
    }

    fn preference(&self) -> bool {
        self.preference
    }

    fn strength_of(&self, choice: &bool) -> u64 {
        self.strength(*choice)
    }
}

/// Dyadic photon: preference between two choices `{0, 1}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DyadicPhoton {
    preference: u8,
    strength: [u64; 2],
}

impl DyadicPhoton {
    pub fn new() -> Self {
        Self {
            preference: 0,
            strength: [0, 0],
        }
    }
}

impl Default for DyadicPhoton {
    fn default() -> Self {
        Self::new()
    }
}

impl PhotonState for DyadicPhoton {
    type Choice = u8;

    fn record_successful_poll(&mut self, choice: u8) {
        debug_assert!(choice < 2, "dyadic choice must be 0 or 1");
        self.strength[choice as usize] += 1;
        if self.strength[choice as usize] > self.strength[self.preference as usize] {
            self.preference = choice;
        }
    }

    fn preference(&self) -> u8 {
        self.preference
    }

    fn strength_of(&self, choice: &u8) -> u64 {
        self.strength[*choice as usize]
    }
}

/// Polyadic photon: preference over an extensible set of items, e.g. DAG
/// vertex candidates. Backed by an `IndexMap` so iteration (used by
/// `Clone` snapshots and tests) reflects insertion order, which is the
/// order ties were first seen in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolyadicPhoton<T: Item> {
    preference: T,
    strength: IndexMap<T, u64>,
}

impl<T: Item> PolyadicPhoton<T> {
    /// Creates a polyadic photon whose initial preference is `initial`,
    /// observed with zero strength.
    pub fn new(initial: T) -> Self {
        let mut strength = IndexMap::new();
        strength.insert(initial.clone(), 0);
        Self {
            preference: initial,
            strength,
        }
    }
}

impl<T: Item> PhotonState for PolyadicPhoton<T> {
    type Choice = T;

    fn record_successful_poll(&mut self, choice: T) {
        let new_strength = {
            let entry = self.strength.entry(choice.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        let current_strength = *self.strength.get(&self.preference).unwrap_or(&0);
        if new_strength > current_strength {
            self.preference = choice;
        }
    }

    fn preference(&self) -> T {
        self.preference.clone()
    }

    fn strength_of(&self, choice: &T) -> u64 {
        *self.strength.get(choice).unwrap_or(&0)
    }
}
