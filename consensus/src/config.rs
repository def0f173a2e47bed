//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{NovaError, NovaResult};

/// FPC selector bounds and escalation knob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FpcConfig {
    /// Use the FPC selector instead of the constant selector.
    pub enable: bool,
    /// θ_min, the smallest adaptive threshold fraction.
    pub theta_min: f64,
    /// θ_max, the largest adaptive threshold fraction.
    pub theta_max: f64,
    /// Consecutive unchanged-preference rounds before escalating from the
    /// constant selector to FPC (see DESIGN.md's Open Question
    /// resolution: default constant, escalate after `gamma` rounds).
    pub gamma: u32,
}

impl Default for FpcConfig {
    fn default() -> Self {
        Self {
            enable: false,
            theta_min: 0.7,
            theta_max: 0.9,
            gamma: 4,
        }
    }
}

/// The single validated configuration record for an engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    /// K: sample size per round.
    pub k: usize,
    /// α_pref: preference-advancement threshold.
    pub alpha_pref: usize,
    /// α_conf: confidence-advancement threshold.
    pub alpha_conf: usize,
    /// β: consecutive successful rounds required to finalize.
    pub beta: u32,
    /// Per-round vote collection deadline.
    pub round_timeout: Duration,
    /// FPC selector configuration.
    pub fpc: FpcConfig,
    /// Maximum parents a proposed DAG vertex may cite.
    pub max_parents: usize,
    /// Checkpoint bundle length for the finalized log.
    pub bundle_size: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            k: 20,
            alpha_pref: 15,
            alpha_conf: 15,
            beta: 20,
            round_timeout: Duration::from_millis(500),
            fpc: FpcConfig::default(),
            max_parents: 8,
            bundle_size: 100,
        }
    }
}

impl Parameters {
    /// Validates the parameter constraints. Called at every engine
    /// constructor as up-front validation, before any state is built from
    /// these values.
    pub fn validate(&self) -> NovaResult<()> {
        if self.k == 0 {
            return Err(NovaError::InvalidParameters("K must be >= 1".into()));
        }
        let majority = self.k / 2 + 1;
        if self.alpha_pref < majority {
            return Err(NovaError::InvalidParameters(format!(
                "AlphaPref ({}) must be >= ceil((K+1)/2) ({})",
                self.alpha_pref, majority
            )));
        }
        if self.alpha_pref > self.alpha_conf {
            return Err(NovaError::InvalidParameters(
                "AlphaPref must be <= AlphaConf".into(),
            ));
        }
        if self.alpha_conf > self.k {
            return Err(NovaError::InvalidParameters(
                "AlphaConf must be <= K".into(),
            ));
        }
        if self.beta == 0 {
            return Err(NovaError::InvalidParameters("Beta must be >= 1".into()));
        }
        if self.round_timeout.is_zero() {
            return Err(NovaError::InvalidParameters(
                "RoundTO must be > 0".into(),
            ));
        }
        if !(0.5..=1.0).contains(&self.fpc.theta_min)
            || !(0.5..=1.0).contains(&self.fpc.theta_max)
            || self.fpc.theta_min > self.fpc.theta_max
        {
            return Err(NovaError::InvalidParameters(
                "FPC theta bounds must satisfy 0.5 <= theta_min <= theta_max <= 1.0".into(),
            ));
        }
        if self.fpc.gamma == 0 {
            return Err(NovaError::InvalidParameters(
                "FPC.Gamma must be >= 1".into(),
            ));
        }
        if self.max_parents == 0 {
            return Err(NovaError::InvalidParameters(
                "MaxParents must be >= 1".into(),
            ));
        }
        if self.bundle_size == 0 {
            return Err(NovaError::InvalidParameters(
                "BundleSize must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Computes ⌈(k+1)/2⌉, the majority clamp floor for α_pref.
    pub fn majority(&self) -> usize {
        self.k / 2 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters_validate() {
        assert!(Parameters::default().validate().is_ok());
    }

    #[test]
    fn alpha_pref_below_majority_is_rejected() {
        let mut p = Parameters::default();
        p.alpha_pref = p.majority() - 1;
        assert!(p.validate().is_err());
    }

    #[test]
    fn alpha_conf_above_k_is_rejected() {
        let mut p = Parameters::default();
        p.alpha_conf = p.k + 1;
        assert!(p.validate().is_err());
    }
}
