//! Handlers keyed by implementation reference.

use crate::catalog::MechanismError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Facts a handler observed while running one scenario.
pub type Observation = Map<String, Value>;

/// One mechanism's real entry point, driven with a scenario fixture.
pub trait MechanismHandler: Send + Sync {
    fn run(&self, fixture: &Value) -> Result<Observation, MechanismError>;
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn MechanismHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `reference`, replacing any previous one.
    pub fn register(
        &mut self,
        reference: impl Into<String>,
        handler: Arc<dyn MechanismHandler>,
    ) -> &mut Self {
        self.handlers.insert(reference.into(), handler);
        self
    }

    pub fn resolve(&self, reference: &str) -> Option<&dyn MechanismHandler> {
        self.handlers.get(reference).map(|handler| handler.as_ref())
    }

    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("references", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Build an observation from `(key, value)` pairs.
pub fn observation<const N: usize>(pairs: [(&str, Value); N]) -> Observation {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
