//! # warden-patterns
//!
//! Learns recurring violation classes from historical event logs.
//!
//! Every record maps to one pattern id (`agent-<action>` or
//! `system-<type>`). The first occurrence seeds the pattern with a
//! likelihood computed from the record's evidence; each repeat adds one to
//! `frequency` and one confidence step, capped at `1.0`. Records are merged
//! in timestamp order, so the result does not depend on file order.

pub mod event;
pub mod insight;
pub mod pattern;
pub mod store;

pub use event::{EventLoad, EventLogError, HistoricalEvent, load_events_dir};
pub use insight::{Insight, InsightKind, insights};
pub use pattern::{Pattern, PatternType};
pub use store::{IngestStats, PatternStore};
