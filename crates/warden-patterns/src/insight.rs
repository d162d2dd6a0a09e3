use crate::pattern::Pattern;
use serde::{Deserialize, Serialize};

/// Confidence below which a pattern is reported as weakly supported.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightKind {
    RecurringViolations,
    LowConfidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub kind: InsightKind,
    pub message: String,
    pub pattern_ids: Vec<String>,
}

/// `recurring-violations` when more than one pattern has recurred;
/// `low-confidence` when any pattern is below the confidence threshold.
pub fn insights<'a>(patterns: impl IntoIterator<Item = &'a Pattern>) -> Vec<Insight> {
    let mut recurring = Vec::new();
    let mut weak = Vec::new();
    for pattern in patterns {
        if pattern.is_recurring() {
            recurring.push(pattern.id.clone());
        }
        if pattern.confidence < LOW_CONFIDENCE_THRESHOLD {
            weak.push(pattern.id.clone());
        }
    }

    let mut out = Vec::new();
    if recurring.len() > 1 {
        out.push(Insight {
            kind: InsightKind::RecurringViolations,
            message: format!(
                "{} violation patterns recur; prioritise prevention for them",
                recurring.len()
            ),
            pattern_ids: recurring,
        });
    }
    if !weak.is_empty() {
        out.push(Insight {
            kind: InsightKind::LowConfidence,
            message: format!(
                "{} pattern(s) below {LOW_CONFIDENCE_THRESHOLD} confidence; collect more evidence before acting on them",
                weak.len()
            ),
            pattern_ids: weak,
        });
    }
    out
}
