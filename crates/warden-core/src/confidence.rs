//! Confidence arithmetic and the time windows derived from it.
//!
//! Confidence is a bounded `[0, 1]` estimate built from counted evidence.
//! Scores are accumulated in integer tenths and converted once, so bucket
//! boundaries such as `0.9` are hit exactly instead of `0.8999999999999999`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Increment applied to a pattern's confidence on each repeat occurrence.
pub const CONFIDENCE_STEP: f64 = 0.1;

const CONFIDENCE_PRECISION: f64 = 1e9;

/// Convert an integer count of tenths into a confidence-scale value.
pub fn tenths(count: u32) -> f64 {
    f64::from(count) / 10.0
}

/// Clamp to `[0, 1]` and drop float noise below nine decimal places.
pub fn round_confidence(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    ((value * CONFIDENCE_PRECISION).round() / CONFIDENCE_PRECISION).clamp(0.0, 1.0)
}

/// Raise a confidence by one step, capped at `1.0`.
pub fn reinforce(confidence: f64) -> f64 {
    round_confidence((confidence + CONFIDENCE_STEP).min(1.0))
}

/// Human time window before a predicted violation is expected to manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeToViolation {
    Immediate,
    VerySoon,
    Soon,
    Eventually,
}

impl TimeToViolation {
    /// Same thresholds as [`crate::Severity::from_confidence`].
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            TimeToViolation::Immediate
        } else if confidence >= 0.7 {
            TimeToViolation::VerySoon
        } else if confidence >= 0.5 {
            TimeToViolation::Soon
        } else {
            TimeToViolation::Eventually
        }
    }

    pub fn window(self) -> &'static str {
        match self {
            TimeToViolation::Immediate => "immediate (within the hour)",
            TimeToViolation::VerySoon => "very soon (within a day)",
            TimeToViolation::Soon => "soon (within a week)",
            TimeToViolation::Eventually => "eventually",
        }
    }
}

impl Display for TimeToViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.window())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenths_are_exact_at_boundaries() {
        assert_eq!(tenths(9), 0.9);
        assert_eq!(tenths(7), 0.7);
        assert_eq!(tenths(10), 1.0);
    }

    #[test]
    fn reinforce_steps_and_caps() {
        assert_eq!(reinforce(0.3), 0.4);
        assert_eq!(reinforce(0.7), 0.8);
        assert_eq!(reinforce(0.95), 1.0);
        assert_eq!(reinforce(1.0), 1.0);
    }

    #[test]
    fn round_confidence_clamps_and_handles_nan() {
        assert_eq!(round_confidence(1.7), 1.0);
        assert_eq!(round_confidence(-0.2), 0.0);
        assert_eq!(round_confidence(f64::NAN), 0.0);
        assert_eq!(round_confidence(0.1 + 0.2), 0.3);
    }

    #[test]
    fn time_windows_follow_risk_thresholds() {
        assert_eq!(TimeToViolation::from_confidence(0.9), TimeToViolation::Immediate);
        assert_eq!(TimeToViolation::from_confidence(0.75), TimeToViolation::VerySoon);
        assert_eq!(TimeToViolation::from_confidence(0.5), TimeToViolation::Soon);
        assert_eq!(TimeToViolation::from_confidence(0.31), TimeToViolation::Eventually);
    }
}
