use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structural kind of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Object,
    Array,
    Number,
    String,
    Boolean,
    Null,
}

impl Kind {
    pub fn of(value: &Value) -> Kind {
        match value {
            Value::Object(_) => Kind::Object,
            Value::Array(_) => Kind::Array,
            Value::Number(_) => Kind::Number,
            Value::String(_) => Kind::String,
            Value::Bool(_) => Kind::Boolean,
            Value::Null => Kind::Null,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Copies every property of `defaults` that `target` lacks, recursing into objects
/// present on both sides. Existing values in `target` always win.
///
/// Returns whether `target` changed.
pub fn backfill(target: &mut Value, defaults: &Value) -> bool {
    let (Value::Object(target), Value::Object(defaults)) = (target, defaults) else {
        return false;
    };
    let mut changed = false;
    for (key, default) in defaults {
        match target.get_mut(key) {
            Some(existing) => changed |= backfill(existing, default),
            None => {
                target.insert(key.clone(), default.clone());
                changed = true;
            }
        }
    }
    changed
}

/// Merges `patch` over `target`. Nested objects merge recursively; any other value in
/// `patch` replaces the one in `target`.
pub fn merge_over(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_over(existing, value)
                    }
                    _ => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}
