//! Shared step results map
//!
//! Keyed by step instance id. Step tasks are the only writers of their own
//! key; readers are later steps whose dependencies completed, so the
//! happens-before edge is the dispatch loop observing the completion signal
//! before making dependents eligible. The mutex only guards the map
//! structure itself.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Concurrent map of step key -> output text
#[derive(Clone, Default)]
pub struct AgentResults {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl AgentResults {
    /// Empty results map
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from persisted executions (resume path)
    pub fn seeded(outputs: HashMap<String, String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(outputs)),
        }
    }

    /// Record a step's output
    pub fn insert(&self, key: &str, output: impl Into<String>) {
        self.inner.lock().insert(key.to_string(), output.into());
    }

    /// Read a step's output
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().get(key).cloned()
    }

    /// Keys with recorded outputs
    pub fn keys(&self) -> HashSet<String> {
        self.inner.lock().keys().cloned().collect()
    }

    /// Number of recorded outputs
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let results = AgentResults::new();
        results.insert("research", "findings");
        assert_eq!(results.get("research").as_deref(), Some("findings"));
        assert!(results.get("architect").is_none());
    }

    #[test]
    fn test_seeded() {
        let mut outputs = HashMap::new();
        outputs.insert("research".to_string(), "prior".to_string());
        let results = AgentResults::seeded(outputs);
        assert_eq!(results.len(), 1);
        assert!(results.keys().contains("research"));
    }
}
