//! Loss configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OcError;

/// Upper clip applied to beta before `artanh` in the stabilized modes.
pub const BETA_CLIP_MAX: f32 = 1.0 - 1e-4;

/// How beta is turned into the charge `q = artanh(..)² + q_min`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetaStabilizing {
    /// `q = artanh(beta)² + q_min`, no clipping.
    Paper,
    /// `q = artanh(clip(beta))² + q_min`.
    Clip,
    /// `q = artanh(clip(beta) / 1.002)² + q_min`.
    SoftQScaling,
}

impl BetaStabilizing {
    #[inline]
    pub fn charge(&self, beta: f32, q_min: f32) -> f32 {
        let a = match self {
            BetaStabilizing::Paper => beta.atanh(),
            BetaStabilizing::Clip => beta.clamp(0.0, BETA_CLIP_MAX).atanh(),
            BetaStabilizing::SoftQScaling => (beta.clamp(0.0, BETA_CLIP_MAX) / 1.002).atanh(),
        };
        a * a + q_min
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BetaStabilizing::Paper => "paper",
            BetaStabilizing::Clip => "clip",
            BetaStabilizing::SoftQScaling => "soft_q_scaling",
        }
    }
}

impl FromStr for BetaStabilizing {
    type Err = OcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paper" => Ok(BetaStabilizing::Paper),
            "clip" => Ok(BetaStabilizing::Clip),
            "soft_q_scaling" => Ok(BetaStabilizing::SoftQScaling),
            other => Err(OcError::UnknownStabilizingMode(other.to_string())),
        }
    }
}

impl fmt::Display for BetaStabilizing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of [`calc_lv_lbeta`](crate::loss::condensation::calc_lv_lbeta).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CondensationConfig {
    /// Minimal charge added to every hit.
    pub q_min: f32,
    /// Scale of the beta-noise term.
    pub s_b: f32,
    pub beta_stabilizing: BetaStabilizing,
    /// Blend factor in [0, 1] between the max-charge hit and the
    /// charge-weighted mean as condensation point. 0 disables blending.
    pub use_average_cc_pos: f32,
    /// Log the per-term component breakdown at debug level.
    pub trace_components: bool,
}

impl Default for CondensationConfig {
    fn default() -> Self {
        Self {
            q_min: 0.1,
            s_b: 1.0,
            beta_stabilizing: BetaStabilizing::SoftQScaling,
            use_average_cc_pos: 0.0,
            trace_components: false,
        }
    }
}

impl CondensationConfig {
    /// Settings of the original object condensation paper.
    pub fn paper() -> Self {
        Self {
            beta_stabilizing: BetaStabilizing::Paper,
            ..Self::default()
        }
    }

    /// Condensation points pulled towards the charge-weighted centre by the given fraction.
    pub fn averaged(use_average_cc_pos: f32) -> Self {
        Self {
            use_average_cc_pos,
            ..Self::default()
        }
    }
}

/// Parameters of [`calc_simple_clus_space_loss`](crate::loss::simple::calc_simple_clus_space_loss).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleClusSpaceConfig {
    /// Huberize the attractive norms (`delta = 4`) instead of squaring them.
    pub huberize_norm_for_v_attractive: bool,
}

impl Default for SimpleClusSpaceConfig {
    fn default() -> Self {
        Self {
            huberize_norm_for_v_attractive: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("paper".parse::<BetaStabilizing>().unwrap(), BetaStabilizing::Paper);
        assert_eq!("clip".parse::<BetaStabilizing>().unwrap(), BetaStabilizing::Clip);
        assert_eq!(
            "soft_q_scaling".parse::<BetaStabilizing>().unwrap(),
            BetaStabilizing::SoftQScaling
        );
        let err = "softq".parse::<BetaStabilizing>().unwrap_err();
        assert!(matches!(err, OcError::UnknownStabilizingMode(ref m) if m == "softq"));
    }

    #[test]
    fn test_unknown_mode_in_config_file_is_rejected() {
        let bad = r#"{"beta_stabilizing": "hinge"}"#;
        assert!(serde_json::from_str::<CondensationConfig>(bad).is_err());

        let good = r#"{"beta_stabilizing": "clip", "q_min": 0.5}"#;
        let cfg: CondensationConfig = serde_json::from_str(good).unwrap();
        assert_eq!(cfg.beta_stabilizing, BetaStabilizing::Clip);
        assert_abs_diff_eq!(cfg.q_min, 0.5);
        assert_abs_diff_eq!(cfg.s_b, 1.0);
    }

    #[test]
    fn test_charge_modes() {
        assert_abs_diff_eq!(BetaStabilizing::Paper.charge(0.0, 0.1), 0.1);
        let b = 0.5f32;
        assert_abs_diff_eq!(
            BetaStabilizing::Clip.charge(b, 0.1),
            b.atanh().powi(2) + 0.1,
            epsilon = 1e-6
        );
        // clipping keeps beta == 1 finite
        assert!(BetaStabilizing::Clip.charge(1.0, 0.1).is_finite());
        assert!(BetaStabilizing::SoftQScaling.charge(1.0, 0.1).is_finite());
        assert!(BetaStabilizing::Paper.charge(1.0, 0.1).is_infinite());
        assert!(BetaStabilizing::SoftQScaling.charge(b, 0.1) < BetaStabilizing::Clip.charge(b, 0.1));
    }

    #[test]
    fn test_default_config() {
        let cfg = CondensationConfig::default();
        assert_eq!(cfg.beta_stabilizing, BetaStabilizing::SoftQScaling);
        assert!(!cfg.trace_components);
        assert!(SimpleClusSpaceConfig::default().huberize_norm_for_v_attractive);
    }
}
