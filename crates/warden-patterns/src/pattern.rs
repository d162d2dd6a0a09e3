use crate::event::HistoricalEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{Severity, reinforce, round_confidence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternType {
    /// Learned from an agent action (`agent-*`).
    AgentBehavior,
    /// Learned from a system event type (`system-*`).
    SystemDrift,
}

/// A learned, frequency/confidence-weighted class of historical events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub id: String,
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub frequency: u32,
    pub severity: Severity,
    pub confidence: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl Pattern {
    /// Seed a pattern from its first occurrence. `None` when the event has
    /// no action or type to derive an id from.
    pub fn from_event(event: &HistoricalEvent) -> Option<Self> {
        let id = event.pattern_id()?;
        let pattern_type = if event.is_agent_action() {
            PatternType::AgentBehavior
        } else {
            PatternType::SystemDrift
        };
        let mut pattern = Self {
            id,
            pattern_type,
            frequency: 1,
            severity: event.severity,
            confidence: round_confidence(event.likelihood()),
            first_seen: event.timestamp,
            last_seen: event.timestamp,
            evidence: Vec::new(),
        };
        pattern.push_evidence(event.evidence_lines());
        Some(pattern)
    }

    /// Fold a repeat occurrence in: one more sighting, one confidence step.
    pub fn merge(&mut self, event: &HistoricalEvent) {
        self.frequency = self.frequency.saturating_add(1);
        self.confidence = reinforce(self.confidence);
        self.severity = self.severity.max(event.severity);
        self.first_seen = self.first_seen.min(event.timestamp);
        self.last_seen = self.last_seen.max(event.timestamp);
        self.push_evidence(event.evidence_lines());
    }

    pub fn is_recurring(&self) -> bool {
        self.frequency > 1
    }

    /// Evidence only grows: new distinct lines are appended, none removed.
    fn push_evidence(&mut self, lines: Vec<String>) {
        for line in lines {
            if !self.evidence.contains(&line) {
                self.evidence.push(line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn occurrence(hour: u32, severity: Severity) -> HistoricalEvent {
        let mut event = HistoricalEvent::new(at(hour), severity);
        event.action = Some("bypass-validation".to_string());
        event.description = Some(format!("seen at {hour}h"));
        event
    }

    #[test]
    fn merge_adds_one_sighting_and_one_step() {
        let first = occurrence(9, Severity::Low);
        let mut pattern = Pattern::from_event(&first).expect("pattern");
        assert_eq!(pattern.pattern_type, PatternType::AgentBehavior);
        assert_eq!((pattern.frequency, pattern.confidence), (1, 0.3));

        pattern.merge(&occurrence(7, Severity::High));
        assert_eq!(pattern.frequency, 2);
        assert_eq!(pattern.confidence, 0.4);
        assert_eq!(pattern.severity, Severity::High);
        assert_eq!(pattern.first_seen, at(7));
        assert_eq!(pattern.last_seen, at(9));
        assert_eq!(pattern.evidence, vec!["seen at 9h", "seen at 7h"]);
    }

    #[test]
    fn confidence_caps_at_one() {
        let mut event = occurrence(1, Severity::Medium);
        event.drift_type = Some("schema".to_string());
        event.compliance_score = Some(10.0);
        let mut pattern = Pattern::from_event(&event).expect("pattern");
        assert_eq!(pattern.confidence, 0.9);
        pattern.merge(&event);
        pattern.merge(&event);
        assert_eq!(pattern.confidence, 1.0);
        assert_eq!(pattern.frequency, 3);
    }

    #[test]
    fn evidence_accumulates_across_many_merges() {
        let mut pattern = Pattern::from_event(&occurrence(0, Severity::Low)).expect("pattern");
        for hour in 1..23 {
            pattern.merge(&occurrence(hour, Severity::Low));
        }
        pattern.merge(&occurrence(5, Severity::Low));
        assert_eq!(pattern.frequency, 24);
        assert_eq!(pattern.evidence.len(), 23);
        assert_eq!(pattern.evidence.first().map(String::as_str), Some("seen at 0h"));
        assert_eq!(pattern.evidence.last().map(String::as_str), Some("seen at 22h"));
    }
}
