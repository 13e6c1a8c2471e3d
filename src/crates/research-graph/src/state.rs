//! Run-state merge semantics.
//!
//! Run State is single-writer: only the scheduler ever merges a node's
//! returned delta into state. Nodes themselves only ever see and return
//! immutable JSON values. The default merge is recursive structural merge:
//! lists append, maps merge key-by-key (recursing on conflicts), and scalars
//! overwrite (delta wins). Individual fields can opt out of the default via
//! a [`Reducer`] registered in a [`StateSchema`] when append/overwrite-all
//! isn't the right behavior for that field (e.g. a monotonic counter).

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("reducer '{reducer}' failed on field '{field}': {reason}")]
    ReducerFailed {
        reducer: String,
        field: String,
        reason: String,
    },
}

/// Merge strategy for a single state field.
pub trait Reducer: Send + Sync {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value, StateError>;
    fn name(&self) -> &str;
}

/// Last write wins.
pub struct OverwriteReducer;
impl Reducer for OverwriteReducer {
    fn reduce(&self, _current: &Value, update: &Value) -> Result<Value, StateError> {
        Ok(update.clone())
    }
    fn name(&self) -> &str {
        "overwrite"
    }
}

/// Concatenates two JSON arrays; non-array values are wrapped as single-element arrays first.
pub struct AppendReducer;
impl Reducer for AppendReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value, StateError> {
        let mut items = as_array(current);
        items.extend(as_array(update));
        Ok(Value::Array(items))
    }
    fn name(&self) -> &str {
        "append"
    }
}

/// Recursively merges two JSON objects (or falls back to overwrite for non-objects).
pub struct MergeReducer;
impl Reducer for MergeReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value, StateError> {
        Ok(deep_merge(current, update))
    }
    fn name(&self) -> &str {
        "merge"
    }
}

/// Sums two numeric values.
pub struct SumReducer;
impl Reducer for SumReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value, StateError> {
        let a = current.as_f64().unwrap_or(0.0);
        let b = update.as_f64().unwrap_or(0.0);
        let sum = a + b;
        if sum.fract() == 0.0 && current.is_i64() && update.is_i64() {
            Ok(Value::from(sum as i64))
        } else {
            Ok(Value::from(sum))
        }
    }
    fn name(&self) -> &str {
        "sum"
    }
}

fn as_array(v: &Value) -> Vec<Value> {
    match v {
        Value::Null => vec![],
        Value::Array(a) => a.clone(),
        other => vec![other.clone()],
    }
}

/// Deep-merge `update` into `current`: maps merge key-by-key (recursing), arrays
/// append, everything else is overwritten by `update`. This is the default
/// merge applied by the graph runtime when no field-specific reducer is
/// registered, matching the spec's deep-merge invariant.
pub fn deep_merge(current: &Value, update: &Value) -> Value {
    match (current, update) {
        (Value::Object(a), Value::Object(b)) => {
            let mut merged = a.clone();
            for (k, v) in b {
                let next = match merged.get(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => v.clone(),
                };
                merged.insert(k.clone(), next);
            }
            Value::Object(merged)
        }
        (Value::Array(a), Value::Array(b)) => {
            let mut merged = a.clone();
            merged.extend(b.clone());
            Value::Array(merged)
        }
        (_, update) => update.clone(),
    }
}

/// Per-field reducer overrides layered on top of the default [`deep_merge`].
#[derive(Default)]
pub struct StateSchema {
    fields: HashMap<String, Box<dyn Reducer>>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(&mut self, name: impl Into<String>, reducer: Box<dyn Reducer>) -> &mut Self {
        self.fields.insert(name.into(), reducer);
        self
    }

    /// Apply `update` onto `state` in place, honoring per-field reducers for
    /// top-level keys and falling back to [`deep_merge`] for everything else.
    pub fn apply(&self, state: &mut Value, update: &Value) -> Result<(), StateError> {
        let Value::Object(update_obj) = update else {
            *state = deep_merge(state, update);
            return Ok(());
        };
        if !state.is_object() {
            *state = Value::Object(Default::default());
        }
        for (key, value) in update_obj {
            let current = state.get(key).cloned().unwrap_or(Value::Null);
            let merged = match self.fields.get(key) {
                Some(reducer) => reducer
                    .reduce(&current, value)
                    .map_err(|e| match e {
                        StateError::ReducerFailed { reducer, reason, .. } => {
                            StateError::ReducerFailed {
                                reducer,
                                field: key.clone(),
                                reason,
                            }
                        }
                    })?,
                None => deep_merge(&current, value),
            };
            state
                .as_object_mut()
                .expect("state coerced to object above")
                .insert(key.clone(), merged);
        }
        Ok(())
    }
}
