//! Flare: per-vertex DAG fast-path vote tally and status machine.
//!
//! `record_vote` is driven from outside the engine's own `tick` loop: it
//! needs the individual `(voter, weight)` pairs behind a round's vote
//! tally so it can dedup per voter, and `DagEngine::tick` only ever sees
//! the already-aggregated `(accept, reject)` counts its `votes_for`
//! closure returns. A caller that wants the fast path should call
//! [`DagEngine::record_flare_vote`](crate::engines::dag::DagEngine::record_flare_vote)
//! directly as it observes each peer's vote over the transport, and read
//! the result back with `flare_status`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ids::NodeId;

/// Monotonic vertex status; transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Executable,
    Final,
}

/// Per-vertex vote bookkeeping: distinct voters and their weight.
#[derive(Debug, Clone, Default)]
struct VertexTally {
    voters: HashMap<NodeId, u64>,
    weighted_total: u64,
    status: Option<Status>,
}

/// Tracks fast-path votes for every vertex in the active window and
/// exposes an O(1) status lookup. Backed by a [`DashMap`] so concurrent
/// ticks over a wide frontier can record votes for distinct vertices
/// without a single lock serializing them. An epoch fence freezes all
/// upgrades during validator-set transitions — global, not per-item — so
/// it's a plain atomic rather than part of any per-vertex entry.
#[derive(Debug)]
pub struct Flare<V: Eq + Hash + Clone> {
    tallies: DashMap<V, VertexTally>,
    quorum: AtomicU64,
    epoch_fenced: AtomicBool,
}

impl<V: Eq + Hash + Clone> Flare<V> {
    /// `quorum` is the weighted `2f+1` threshold for this validator set.
    pub fn new(quorum: u64) -> Self {
        Self {
            tallies: DashMap::new(),
            quorum: AtomicU64::new(quorum),
            epoch_fenced: AtomicBool::new(false),
        }
    }

    pub fn set_quorum(&self, quorum: u64) {
        self.quorum.store(quorum, Ordering::SeqCst);
    }

    /// Raises or lowers the epoch fence. While fenced, `record_vote`
    /// still tallies votes but `status` upgrades are suppressed.
    pub fn set_epoch_fenced(&self, fenced: bool) {
        self.epoch_fenced.store(fenced, Ordering::SeqCst);
    }

    /// Records a vote from `voter` (weight `weight`) for `vertex`. Repeat
    /// votes from the same voter are deduplicated — only the first counts.
    pub fn record_vote(&self, vertex: V, voter: NodeId, weight: u64) {
        let mut tally = self.tallies.entry(vertex).or_default();
        if tally.voters.contains_key(&voter) {
            return;
        }
        tally.voters.insert(voter, weight);
        tally.weighted_total += weight;
        let fenced = self.epoch_fenced.load(Ordering::SeqCst);
        let quorum = self.quorum.load(Ordering::SeqCst);
        if !fenced
            && tally.status.unwrap_or(Status::Pending) == Status::Pending
            && tally.weighted_total >= quorum
        {
            tally.status = Some(Status::Executable);
            debug!(weighted_total = tally.weighted_total, "vertex became executable");
        }
    }

    /// Marks `vertex` Final — called once the block that transitively
    /// commits it is itself finalized. A no-op under the epoch fence;
    /// never downgrades.
    pub fn mark_final(&self, vertex: V) {
        if self.epoch_fenced.load(Ordering::SeqCst) {
            return;
        }
        let mut tally = self.tallies.entry(vertex).or_default();
        tally.status = Some(Status::Final);
    }

    /// O(1) status lookup. Unknown vertices read as `Pending`.
    pub fn status(&self, vertex: &V) -> Status {
        self.tallies
            .get(vertex)
            .and_then(|t| t.status)
            .unwrap_or(Status::Pending)
    }

    pub fn weighted_total(&self, vertex: &V) -> u64 {
        self.tallies.get(vertex).map(|t| t.weighted_total).unwrap_or(0)
    }
}
