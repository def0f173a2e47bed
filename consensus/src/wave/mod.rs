//! Wave: per-round threshold tally and confidence accumulation.

pub mod selector;

pub use selector::{alpha_from_theta, fpc_theta, ConstantSelector, FpcSelector, Selector};

use serde::{Deserialize, Serialize};

use crate::photon::PhotonState;

/// One `{α_conf, β}` termination level. `alpha_conf` values across the
/// list must be strictly increasing and `beta` weakly decreasing; this is
/// validated once, at construction, since it never changes for the life of
/// the item (only the *resolved* per-round α_conf values may move under
/// FPC — see `selector`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminationCondition {
    pub alpha_conf: usize,
    pub beta: u32,
}

/// Per-item Wave state: an embedded Photon plus one confidence counter per
/// termination level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wave<P: PhotonState> {
    photon: P,
    betas: Vec<u32>,
    confidence: Vec<u32>,
    finalized: bool,
}

impl<P: PhotonState> Wave<P> {
    /// Builds a Wave over `photon` with the given termination schedule.
    /// Panics if `conditions` violates the ordering invariant — this
    /// is a construction-time programmer error, not a runtime condition.
    pub fn new(photon: P, conditions: &[TerminationCondition]) -> Self {
        for pair in conditions.windows(2) {
            assert!(
                pair[0].alpha_conf < pair[1].alpha_conf,
                "termination condition alpha_conf must be strictly increasing"
            );
            assert!(
                pair[0].beta >= pair[1].beta,
                "termination condition beta must be weakly decreasing"
            );
        }
        let betas = conditions.iter().map(|c| c.beta).collect::<Vec<_>>();
        let n = betas.len();
        Self {
            photon,
            betas,
            confidence: vec![0; n],
            finalized: false,
        }
    }

    /// Processes one round's tally. `alpha_pref` and `alpha_confs` (aligned
    /// with the termination schedule) come from whichever [`Selector`] the
    /// caller is using this round.
    ///
    /// Returns `true` if this call finalized the item.
    pub fn record_poll(
        &mut self,
        n: usize,
        choice: P::Choice,
        alpha_pref: usize,
        alpha_confs: &[usize],
    ) -> bool {
        assert_eq!(
            alpha_confs.len(),
            self.betas.len(),
            "alpha_confs must align with the termination schedule"
        );
        if self.finalized {
            return false;
        }
        if n < alpha_pref {
            self.record_unsuccessful_poll();
            return false;
        }
        if choice != self.photon.preference() {
            self.clear_confidence_from(0);
        }
        self.photon.record_successful_poll(choice);
        for i in 0..self.betas.len() {
            if n < alpha_confs[i] {
                self.clear_confidence_from(i);
                return false;
            }
            self.confidence[i] += 1;
            if self.confidence[i] >= self.betas[i] {
                self.finalized = true;
                return true;
            }
        }
        false
    }

    /// Clears all confidence counters without touching Photon strength.
    pub fn record_unsuccessful_poll(&mut self) {
        if self.finalized {
            return;
        }
        self.photon.record_unsuccessful_poll();
        self.clear_confidence_from(0);
    }

    fn clear_confidence_from(&mut self, from: usize) {
        for c in &mut self.confidence[from..] {
            *c = 0;
        }
    }

    pub fn finalized(&self) -> bool {
        self.finalized
    }

    pub fn preference(&self) -> P::Choice {
        self.photon.preference()
    }

    pub fn confidence(&self) -> &[u32] {
        &self.confidence
    }

    pub fn photon(&self) -> &P {
        &self.photon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photon::DyadicPhoton;

    fn single_level(alpha_conf: usize, beta: u32) -> Vec<TerminationCondition> {
        vec![TerminationCondition { alpha_conf, beta }]
    }

    /// Scenario A: K=20, AlphaPref=15, AlphaConf=15, Beta=20, unanimous
    /// accept every round — finalizes on the 20th successful round with
    /// preference = 1 (accept).
    #[test]
    fn scenario_a_unanimous_accept_finalizes_after_beta_rounds() {
        let mut wave = Wave::new(DyadicPhoton::new(), &single_level(15, 20));
        for round in 1..=20 {
            let finalized = wave.record_poll(20, 1, 15, &[15]);
            if round < 20 {
                assert!(!finalized, "must not finalize before beta rounds");
            } else {
                assert!(finalized, "must finalize on the 20th unanimous round");
            }
        }
        assert!(wave.finalized());
        assert_eq!(wave.preference(), 1);
    }

    /// Scenario B: 4 contested-but-decided rounds, then one round with no
    /// side reaching AlphaPref (PollIncomplete resets confidence to zero
    /// without touching the Photon), then 20 more unanimous reject rounds
    /// finalize on round 25.
    #[test]
    fn scenario_b_flip_then_finalize_reject() {
        let mut wave = Wave::new(DyadicPhoton::new(), &single_level(15, 20));
        // Rounds 1-4: 18 of 20 vote false -> n=18 counted against reject,
        // confidence climbs toward beta without ever reaching it alone.
        for _ in 1..=4 {
            let finalized = wave.record_poll(18, 0, 15, &[15]);
            assert!(!finalized);
        }
        // Round 5: a contested round where neither side reaches AlphaPref
        // (15) resets confidence back to zero — PollIncomplete, per
        // `poll_incomplete_is_treated_as_unsuccessful` above.
        let finalized = wave.record_poll(9, 0, 15, &[15]);
        assert!(!finalized);
        assert_eq!(wave.confidence()[0], 0, "contested round resets confidence");
        assert_eq!(wave.preference(), 0);
        // Rounds 6-25: 20 of 20 vote false, confidence climbs 1..=20 clean.
        let mut finalized_round = None;
        for round in 6..=25 {
            if wave.record_poll(20, 0, 15, &[15]) {
                finalized_round = Some(round);
                break;
            }
        }
        assert_eq!(finalized_round, Some(25));
        assert_eq!(wave.preference(), 0);
    }

    #[test]
    fn poll_incomplete_is_treated_as_unsuccessful() {
        let mut wave = Wave::new(DyadicPhoton::new(), &single_level(15, 3));
        wave.record_poll(20, 1, 15, &[15]);
        wave.record_poll(20, 1, 15, &[15]);
        assert_eq!(wave.confidence()[0], 2);
        // n=10 < alpha_pref=15: PollIncomplete, confidence resets.
        wave.record_poll(10, 1, 15, &[15]);
        assert_eq!(wave.confidence()[0], 0);
    }

    /// Once finalized, no poll changes preference or the finalized flag.
    #[test]
    fn finalized_wave_is_frozen() {
        let mut wave = Wave::new(DyadicPhoton::new(), &single_level(2, 2));
        wave.record_poll(20, 1, 2, &[2]);
        assert!(wave.record_poll(20, 1, 2, &[2]));
        assert!(wave.finalized());
        let pref_before = wave.preference();
        wave.record_poll(20, 0, 2, &[2]);
        assert_eq!(wave.preference(), pref_before, "finalized preference is immutable");
        assert!(wave.finalized());
    }

    #[test]
    fn multi_level_schedule_tracks_confidence_independently() {
        let conditions = vec![
            TerminationCondition { alpha_conf: 11, beta: 10 },
            TerminationCondition { alpha_conf: 15, beta: 5 },
        ];
        let mut wave = Wave::new(DyadicPhoton::new(), &conditions);
        // n=12 clears level clears: meets level 0 (11) but not level 1 (15).
        wave.record_poll(12, 1, 11, &[11, 15]);
        assert_eq!(wave.confidence(), &[1, 0]);
        wave.record_poll(12, 1, 11, &[11, 15]);
        assert_eq!(wave.confidence(), &[2, 0]);
    }

    #[test]
    #[should_panic]
    fn construction_rejects_non_increasing_alpha_conf() {
        let conditions = vec![
            TerminationCondition { alpha_conf: 15, beta: 10 },
            TerminationCondition { alpha_conf: 15, beta: 5 },
        ];
        let _ = Wave::new(DyadicPhoton::new(), &conditions);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        // Safety: once finalized, no further poll (successful or not, for
        // either choice) changes the preference or un-finalizes the item.
        proptest! {
            #[test]
            fn finalized_preference_never_moves(
                rounds in proptest::collection::vec((0usize..25, any::<u8>()), 1..60),
            ) {
                let mut wave = Wave::new(DyadicPhoton::new(), &single_level(15, 5));
                let mut frozen_preference = None;
                for (n, choice_byte) in rounds {
                    let choice = choice_byte % 2;
                    if wave.finalized() {
                        frozen_preference = frozen_preference.or(Some(wave.preference()));
                    }
                    wave.record_poll(n, choice, 15, &[15]);
                    if let Some(p) = frozen_preference {
                        prop_assert_eq!(wave.preference(), p);
                        prop_assert!(wave.finalized());
                    }
                }
            }
        }
    }
}
