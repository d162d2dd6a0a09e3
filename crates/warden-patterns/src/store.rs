//! Pattern store: the in-memory view of everything learned so far.

use crate::event::{EventLoad, EventLogError, HistoricalEvent, load_events_dir};
use crate::insight::{Insight, insights};
use crate::pattern::Pattern;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStats {
    pub records: usize,
    pub created: usize,
    pub merged: usize,
    /// Records with neither an action nor a type.
    pub rejected: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PatternStore {
    patterns: BTreeMap<String, Pattern>,
    stats: IngestStats,
    load_errors: Vec<EventLogError>,
}

impl PatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from every event log under `dir`.
    pub fn from_events_dir(dir: &Path) -> Self {
        let EventLoad {
            events,
            rejected,
            errors,
            files,
        } = load_events_dir(dir);
        let mut store = Self::new();
        store.stats.rejected += rejected;
        store.stats.records += rejected;
        store.load_errors = errors;
        store.ingest(events);
        info!(
            files = files.len(),
            patterns = store.patterns.len(),
            rejected = store.stats.rejected,
            load_errors = store.load_errors.len(),
            "ingested event logs"
        );
        store
    }

    /// Merge events into the store in timestamp order. The sort is stable,
    /// so events sharing a timestamp keep their input order.
    pub fn ingest(&mut self, mut events: Vec<HistoricalEvent>) -> Vec<Pattern> {
        events.sort_by_key(|event| event.timestamp);
        for event in &events {
            self.record(event);
        }
        self.patterns()
    }

    /// Merge one event. Returns the affected pattern, or `None` when the
    /// event was rejected.
    pub fn record(&mut self, event: &HistoricalEvent) -> Option<&Pattern> {
        self.stats.records += 1;
        let Some(id) = event.pattern_id() else {
            self.stats.rejected += 1;
            debug!(timestamp = %event.timestamp, "event has neither action nor type");
            return None;
        };
        if self.patterns.contains_key(&id) {
            self.stats.merged += 1;
            let pattern = self.patterns.get_mut(&id)?;
            pattern.merge(event);
            return Some(pattern);
        }
        let pattern = Pattern::from_event(event)?;
        self.stats.created += 1;
        Some(self.patterns.entry(id).or_insert(pattern))
    }

    /// All patterns ordered by id.
    pub fn patterns(&self) -> Vec<Pattern> {
        self.patterns.values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Pattern> {
        self.patterns.get(id)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn load_errors(&self) -> &[EventLogError] {
        &self.load_errors
    }

    pub fn insights(&self) -> Vec<Insight> {
        insights(self.patterns.values())
    }
}
