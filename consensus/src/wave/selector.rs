//! Threshold selectors: constant vs. FPC-adaptive.

use crate::ids::hash_segments;

/// Chooses the α_pref / per-level α_conf values to use for a given round
/// ("phase"). The engine recomputes these every tick and hands them to
/// [`super::Wave::record_poll`] — Wave itself only owns the β schedule and
/// the running confidence counters, so it can be driven by either selector
/// without any change to its own state.
pub trait Selector: Send + Sync {
    /// `base_alpha_conf` is the configured α_conf for each termination
    /// level (ascending). Returns `(alpha_pref, alpha_conf_per_level)`.
    fn select(&self, phase: u64, k: usize, majority: usize, base_alpha_conf: &[usize])
        -> (usize, Vec<usize>);
}

/// Fixed α_pref / α_conf thresholds.
#[derive(Debug, Clone)]
pub struct ConstantSelector {
    pub alpha_pref: usize,
}

impl ConstantSelector {
    pub fn new(alpha_pref: usize) -> Self {
        Self { alpha_pref }
    }
}

impl Selector for ConstantSelector {
    fn select(
        &self,
        _phase: u64,
        _k: usize,
        _majority: usize,
        base_alpha_conf: &[usize],
    ) -> (usize, Vec<usize>) {
        (self.alpha_pref, base_alpha_conf.to_vec())
    }
}

/// Fast Probabilistic Consensus selector: redraws θ from a PRF keyed by the
/// round/phase number each time, clamping α_pref to at least the majority
/// floor.
#[derive(Debug, Clone)]
pub struct FpcSelector {
    pub theta_min: f64,
    pub theta_max: f64,
}

impl FpcSelector {
    pub fn new(theta_min: f64, theta_max: f64) -> Self {
        Self { theta_min, theta_max }
    }
}

/// Reduces a BLAKE3 digest of `phase` to a value in `[0, 1)` using the top
/// 53 mantissa bits, then maps it into `[theta_min, theta_max]`. This is an
/// engineering resolution of "θ drawn reproducibly from a PRF keyed by
/// phase"; see DESIGN.md for the Open Question note.
pub fn fpc_theta(phase: u64, theta_min: f64, theta_max: f64) -> f64 {
    let digest = hash_segments("nova.fpc.theta.v1", &[&phase.to_be_bytes()]);
    let raw = u64::from_be_bytes(digest.as_bytes()[..8].try_into().unwrap());
    let unit = (raw >> 11) as f64 / (1u64 << 53) as f64;
    theta_min + unit * (theta_max - theta_min)
}

/// `α = max(⌈θ·k⌉, majority)`: α_pref must always clamp to at least
/// ⌈(k+1)/2⌉.
pub fn alpha_from_theta(theta: f64, k: usize, majority: usize) -> usize {
    let raw = (theta * k as f64).ceil() as usize;
    raw.max(majority)
}

impl Selector for FpcSelector {
    fn select(
        &self,
        phase: u64,
        k: usize,
        majority: usize,
        base_alpha_conf: &[usize],
    ) -> (usize, Vec<usize>) {
        let theta = fpc_theta(phase, self.theta_min, self.theta_max);
        let alpha = alpha_from_theta(theta, k, majority);
        (alpha, vec![alpha; base_alpha_conf.len()])
    }
}
