//! Linear chain engine: one dyadic Photon + Wave + Focus per slot.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Parameters;
use crate::error::NovaResult;
use crate::external::Transport;
use crate::photon::DyadicPhoton;
use crate::wave::{ConstantSelector, FpcSelector, Selector, TerminationCondition, Wave};

/// The outcome of a tick. `Pending` until Wave finalizes: a decision is
/// either Decided(accept), Decided(reject), or Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Pending,
    Accept,
    Reject,
}

struct SlotState {
    wave: Wave<DyadicPhoton>,
    unchanged_rounds: u32,
    last_preference: u8,
    using_fpc: bool,
}

/// Drives a single linear-chain item through repeated `Tick` calls until
/// Wave finalizes it.
pub struct LinearEngine<T> {
    item: T,
    params: Parameters,
    transport: Arc<dyn Transport<T>>,
    constant: ConstantSelector,
    fpc: FpcSelector,
    slot: RwLock<SlotState>,
    phase: std::sync::atomic::AtomicU64,
}

impl<T: Clone + Send + Sync + std::fmt::Debug + 'static> LinearEngine<T> {
    pub fn new(item: T, params: Parameters, transport: Arc<dyn Transport<T>>) -> NovaResult<Self> {
        params.validate()?;
        let conditions = vec![TerminationCondition {
            alpha_conf: params.alpha_conf,
            beta: params.beta,
        }];
        Ok(Self {
            item,
            constant: ConstantSelector::new(params.alpha_pref),
            fpc: FpcSelector::new(params.fpc.theta_min, params.fpc.theta_max),
            slot: RwLock::new(SlotState {
                wave: Wave::new(DyadicPhoton::new(), &conditions),
                unchanged_rounds: 0,
                last_preference: 0,
                using_fpc: params.fpc.enable,
            }),
            phase: std::sync::atomic::AtomicU64::new(0),
            params,
            transport,
        })
    }

    pub async fn finalized(&self) -> bool {
        self.slot.read().await.wave.finalized()
    }

    pub async fn decision(&self) -> Decision {
        let slot = self.slot.read().await;
        if !slot.wave.finalized() {
            return Decision::Pending;
        }
        if slot.wave.preference() == 1 {
            Decision::Accept
        } else {
            Decision::Reject
        }
    }

    /// Runs one round. Returns the decision reached this tick (or
    /// `Pending` if still undecided). Cancellation-safe: if the vote
    /// stream yields nothing before the deadline, the tick returns without
    /// mutating Wave or Photon state.
    ///
    /// `n`/`choice` are derived from this round's *dominant* vote (whichever
    /// side reaches `alpha_pref`), not frozen to the prior Photon
    /// preference — a poll whose votes never disagree with the existing
    /// preference could otherwise never let Wave observe a swing, which
    /// would make preference flips unreachable. See DESIGN.md's Open
    /// Question note on the preference-flip step.
    pub async fn tick(&self, peers: &[crate::ids::NodeId]) -> NovaResult<Decision> {
        if self.finalized().await {
            return Ok(self.decision().await);
        }

        let votes = self
            .transport
            .request_votes(peers, &self.item, self.params.round_timeout)
            .await;

        if votes.is_empty() {
            warn!("no votes arrived before deadline; leaving state unchanged");
            return Ok(Decision::Pending);
        }

        let n_true = votes.iter().filter(|v| v.prefer).count();
        let n_false = votes.len() - n_true;

        let phase = self.phase.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut slot = self.slot.write().await;

        let (alpha_pref, alpha_confs) = if slot.using_fpc {
            self.fpc.select(phase, self.params.k, self.params.majority(), &[self.params.alpha_conf])
        } else {
            self.constant.select(phase, self.params.k, self.params.majority(), &[self.params.alpha_conf])
        };

        // At most one side can reach alpha_pref since alpha_pref > k/2.
        let dominant = if n_true >= alpha_pref {
            Some((1u8, n_true))
        } else if n_false >= alpha_pref {
            Some((0u8, n_false))
        } else {
            None
        };

        let Some((choice, n)) = dominant else {
            slot.wave.record_unsuccessful_poll();
            slot.unchanged_rounds += 1;
            return Ok(Decision::Pending);
        };

        let preference_before = slot.wave.preference();
        let finalized = slot.wave.record_poll(n, choice, alpha_pref, &alpha_confs);

        // Confidence-inconclusive escalation (optional): switch from
        // constant to FPC after gamma rounds with no preference movement.
        if slot.wave.preference() == preference_before {
            slot.unchanged_rounds += 1;
        } else {
            slot.unchanged_rounds = 0;
            slot.last_preference = slot.wave.preference();
        }
        if !slot.using_fpc && slot.unchanged_rounds >= self.params.fpc.gamma {
            info!(item = ?self.item, "escalating to FPC selector after stalled rounds");
            slot.using_fpc = true;
        }

        if finalized {
            let decided = if slot.wave.preference() == 1 {
                Decision::Accept
            } else {
                Decision::Reject
            };
            info!(item = ?self.item, ?decided, "linear engine finalized");
            return Ok(decided);
        }
        Ok(Decision::Pending)
    }
}
