//! Result post-processing.
//!
//! Runs inside the attempt, so a response that fails to parse is retried
//! like any other transient failure.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{ConfigHandle, ProcessingRules};
use crate::error::{FetchError, Result};
use crate::orchestrator::request::FetchRequest;
use crate::worker::RawPage;

/// Turns a raw page into the value that is cached and returned.
pub trait ResultProcessor: Send + Sync {
    fn process(&self, request: &FetchRequest, page: &RawPage) -> Result<Value>;
}

/// Parses JSON and shapes the result list with the live [`ProcessingRules`].
#[derive(Debug, Clone)]
pub struct JsonProcessor {
    config: Arc<ConfigHandle>,
}

impl JsonProcessor {
    pub fn new(config: Arc<ConfigHandle>) -> Self {
        Self { config }
    }
}

impl ResultProcessor for JsonProcessor {
    fn process(&self, _request: &FetchRequest, page: &RawPage) -> Result<Value> {
        let value: Value = serde_json::from_str(&page.body)
            .map_err(|e| FetchError::Parse(format!("{} (from {})", e, page.url)))?;
        Ok(apply_rules(value, &self.config.load().upstream.processing))
    }
}

/// Filter, de-duplicate and sort the array at `rules.items_pointer`.
///
/// Values without an array at the pointer are returned untouched.
pub fn apply_rules(mut value: Value, rules: &ProcessingRules) -> Value {
    if rules.items_pointer.is_empty() {
        return value;
    }
    let Some(Value::Array(items)) = value.pointer_mut(&rules.items_pointer) else {
        return value;
    };

    items.retain(Value::is_object);

    if let Some(key) = &rules.dedupe_key {
        let mut seen = HashSet::new();
        items.retain(|item| match item.get(key) {
            Some(id) => seen.insert(id.to_string()),
            None => true,
        });
    }

    if let Some(key) = &rules.sort_key {
        items.sort_by(|a, b| {
            let left = a.get(key).and_then(Value::as_f64);
            let right = b.get(key).and_then(Value::as_f64);
            match (left, right) {
                (Some(l), Some(r)) => {
                    let order = l.partial_cmp(&r).unwrap_or(Ordering::Equal);
                    if rules.descending {
                        order.reverse()
                    } else {
                        order
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
    }

    value
}
