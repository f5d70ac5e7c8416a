//! Live configuration handle.
//!
//! Readers take a snapshot with [`ConfigHandle::load`] and never block.
//! Writers go through [`ConfigHandle::replace`] or [`ConfigHandle::update`],
//! which validate first and swap atomically; a rejected update leaves the
//! active configuration untouched.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use serde_json::Value;

use crate::config::loader::ConfigError;
use crate::config::schema::OrchestratorConfig;
use crate::config::validation::validate_config;

/// Shared, atomically swappable configuration.
#[derive(Debug)]
pub struct ConfigHandle {
    current: ArcSwap<OrchestratorConfig>,
    write_lock: Mutex<()>,
}

impl ConfigHandle {
    /// Validate and wrap an initial configuration.
    pub fn new(config: OrchestratorConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(Self {
            current: ArcSwap::from_pointee(config),
            write_lock: Mutex::new(()),
        })
    }

    /// Snapshot of the active configuration.
    pub fn load(&self) -> Arc<OrchestratorConfig> {
        self.current.load_full()
    }

    /// Validate and install a whole new configuration.
    pub fn replace(&self, config: OrchestratorConfig) -> Result<Arc<OrchestratorConfig>, ConfigError> {
        let _guard = self.write_lock.lock().expect("config write lock poisoned");
        self.install(config)
    }

    /// Merge a partial JSON document over the active configuration.
    ///
    /// Objects merge key by key; any other value replaces the existing one.
    pub fn update(&self, patch: Value) -> Result<Arc<OrchestratorConfig>, ConfigError> {
        let _guard = self.write_lock.lock().expect("config write lock poisoned");

        let mut merged = serde_json::to_value(&**self.current.load()).map_err(ConfigError::Patch)?;
        merge_json(&mut merged, patch);
        let next: OrchestratorConfig = serde_json::from_value(merged).map_err(ConfigError::Patch)?;

        self.install(next)
    }

    fn install(&self, config: OrchestratorConfig) -> Result<Arc<OrchestratorConfig>, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let config = Arc::new(config);
        self.current.store(Arc::clone(&config));
        tracing::info!("Configuration updated");
        Ok(config)
    }
}

fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_merges_nested_sections() {
        let handle = ConfigHandle::new(OrchestratorConfig::default()).unwrap();
        let updated = handle
            .update(json!({ "pool": { "max_size": 20 }, "breaker": { "cooldown_secs": 5 } }))
            .unwrap();

        assert_eq!(updated.pool.max_size, 20);
        assert_eq!(updated.pool.min_size, 2);
        assert_eq!(updated.breaker.cooldown_secs, 5);
        assert_eq!(handle.load().pool.max_size, 20);
    }

    #[test]
    fn test_invalid_update_keeps_previous_config() {
        let handle = ConfigHandle::new(OrchestratorConfig::default()).unwrap();
        let err = handle.update(json!({ "pool": { "min_size": 0 } })).unwrap_err();

        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(handle.load().pool.min_size, 2);
    }

    #[test]
    fn test_malformed_patch_rejected() {
        let handle = ConfigHandle::new(OrchestratorConfig::default()).unwrap();
        let err = handle.update(json!({ "retries": { "max_attempts": "many" } })).unwrap_err();
        assert!(matches!(err, ConfigError::Patch(_)));
    }
}
