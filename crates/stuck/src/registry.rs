// SPDX-License-Identifier: MIT

//! Per-task-type heartbeat-timeout thresholds.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

/// Concurrent-safe `task_type -> threshold` map, seeded with the defaults
/// from the detector's specification. A threshold of zero disables
/// heartbeat-based detection for that task type (used for `endless`).
pub struct ThresholdRegistry {
    thresholds: RwLock<HashMap<String, Duration>>,
}

impl ThresholdRegistry {
    pub fn new() -> Self {
        let mut thresholds = HashMap::new();
        thresholds.insert("default".to_string(), Duration::from_secs(5 * 60));
        thresholds.insert("command".to_string(), Duration::from_secs(3 * 60));
        thresholds.insert("llm_call".to_string(), Duration::from_secs(3 * 60));
        thresholds.insert("debate".to_string(), Duration::from_secs(10 * 60));
        thresholds.insert("embedding".to_string(), Duration::from_secs(2 * 60));
        thresholds.insert("endless".to_string(), Duration::from_secs(0));
        Self { thresholds: RwLock::new(thresholds) }
    }

    /// The configured threshold for `task_type`, falling back to `default`.
    pub fn threshold(&self, task_type: &str) -> Duration {
        let thresholds = self.thresholds.read();
        thresholds
            .get(task_type)
            .or_else(|| thresholds.get("default"))
            .copied()
            .unwrap_or(Duration::from_secs(5 * 60))
    }

    pub fn set_threshold(&self, task_type: impl Into<String>, threshold: Duration) {
        self.thresholds.write().insert(task_type.into(), threshold);
    }
}

impl Default for ThresholdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_task_type_falls_back_to_default() {
        let registry = ThresholdRegistry::new();
        assert_eq!(registry.threshold("something-custom"), Duration::from_secs(300));
    }

    #[test]
    fn set_threshold_overrides_default() {
        let registry = ThresholdRegistry::new();
        registry.set_threshold("command", Duration::from_secs(90));
        assert_eq!(registry.threshold("command"), Duration::from_secs(90));
    }

    #[test]
    fn endless_defaults_to_disabled() {
        let registry = ThresholdRegistry::new();
        assert_eq!(registry.threshold("endless"), Duration::from_secs(0));
    }
}
