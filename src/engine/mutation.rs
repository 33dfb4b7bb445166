//! Read-modify-write helpers on top of [`Collection`].
//!
//! Every helper reads the value currently in storage, runs the type guard, and only
//! then mutates and writes. A failed check leaves storage untouched.

use log::warn;
use serde_json::{Map, Value};

use crate::engine::collection::{validate_key, Collection};
use crate::engine::guard;
use crate::engine::math::{self, MathOp};
use crate::engine::path::{self, Path};
use crate::engine::value::{backfill, merge_over, Kind};
use crate::{Error, Result};

impl Collection {
    /// Runs the type guard on `key`/`path`, applies `f` to the target, and writes the
    /// root back if `f` reports a change.
    fn mutate_target<T>(
        &self,
        key: &str,
        path: &Path,
        accepted: &[Kind],
        f: impl FnOnce(&mut Value) -> Result<(bool, T)>,
    ) -> Result<T> {
        validate_key(key)?;
        let old = self.read(key)?;
        guard::check(key, old.as_ref(), accepted, path)?;

        let mut root = old.clone().unwrap_or_default();
        let target = path::resolve_mut(&mut root, path).ok_or_else(|| Error::MissingPath {
            key: key.to_string(),
            path: path.to_string(),
        })?;
        let (changed, out) = f(target)?;
        if changed {
            self.write(key, old, root)?;
        }
        Ok(out)
    }

    /// Appends `value` to the array stored under `key`.
    ///
    /// Unless `allow_dupes` is set, pushing a value the array already contains does nothing.
    pub fn push(&self, key: &str, value: Value, allow_dupes: bool) -> Result<&Self> {
        self.push_at(key, Path::root(), value, allow_dupes)
    }

    /// Appends `value` to the array at `path` inside `key`.
    pub fn push_at(
        &self,
        key: &str,
        path: impl Into<Path>,
        value: Value,
        allow_dupes: bool,
    ) -> Result<&Self> {
        self.mutate_target(key, &path.into(), &[Kind::Array], |target| {
            let Value::Array(items) = target else {
                return Ok((false, ()));
            };
            if !allow_dupes && items.contains(&value) {
                return Ok((false, ()));
            }
            items.push(value);
            Ok((true, ()))
        })?;
        Ok(self)
    }

    /// Applies `operation` with `operand` to the number stored under `key` and returns
    /// the new value.
    ///
    /// Operators: `+ add addition`, `- sub subtract`, `* mult multiply`, `/ div divide`,
    /// `^ exp exponent`, `% mod modulo`, and `rand random` (a random integer between 0
    /// and `operand`). Unknown operators are rejected before anything is read.
    pub fn math(&self, key: &str, operation: &str, operand: f64) -> Result<Value> {
        self.math_at(key, Path::root(), operation, operand)
    }

    pub fn math_at(
        &self,
        key: &str,
        path: impl Into<Path>,
        operation: &str,
        operand: f64,
    ) -> Result<Value> {
        let op: MathOp = operation.parse()?;
        self.apply_math(key, &path.into(), op, operand)
    }

    fn apply_math(&self, key: &str, path: &Path, op: MathOp, operand: f64) -> Result<Value> {
        self.mutate_target(key, path, &[Kind::Number], |target| {
            let base = target.as_f64().unwrap_or_default();
            let result = math::to_number(op.apply(base, operand)?)?;
            *target = result.clone();
            Ok((true, result))
        })
    }

    pub fn inc(&self, key: &str) -> Result<Value> {
        self.inc_at(key, Path::root())
    }

    pub fn inc_at(&self, key: &str, path: impl Into<Path>) -> Result<Value> {
        self.apply_math(key, &path.into(), MathOp::Add, 1.0)
    }

    pub fn dec(&self, key: &str) -> Result<Value> {
        self.dec_at(key, Path::root())
    }

    pub fn dec_at(&self, key: &str, path: impl Into<Path>) -> Result<Value> {
        self.apply_math(key, &path.into(), MathOp::Sub, 1.0)
    }

    fn effective_default(&self, key: &str, default: Value) -> Value {
        match self.auto_default() {
            Some(auto) => {
                warn!(
                    "[{}] ensure on key {} ignores its default: the collection has an auto-default",
                    self.name(),
                    key
                );
                auto.clone()
            }
            None => default,
        }
    }

    /// Returns the value under `key`, storing `default` first if the key is absent.
    ///
    /// When the key holds an object, missing properties of `default` are merged into it
    /// (unless disabled with `ensure_props`). If the collection has an auto-default, it
    /// replaces `default`.
    pub fn ensure(&self, key: &str, default: Value) -> Result<Value> {
        validate_key(key)?;
        let default = self.effective_default(key, default);
        self.ensure_whole(key, default)
    }

    fn ensure_whole(&self, key: &str, default: Value) -> Result<Value> {
        let Some(existing) = self.read(key)? else {
            self.write(key, None, default.clone())?;
            return Ok(default);
        };
        if !existing.is_object() {
            return Ok(existing);
        }
        if !default.is_object() {
            return Err(Error::Argument(format!(
                "default for object-valued key `{}` must be an object",
                key
            )));
        }
        if !self.ensure_props() {
            return Ok(existing);
        }
        let mut merged = existing.clone();
        if backfill(&mut merged, &default) {
            self.write(key, Some(existing), merged.clone())?;
        }
        Ok(merged)
    }

    /// Returns the value at `path` inside `key`, storing `default` there first if nothing
    /// is there. The key itself is created as an empty object when absent.
    pub fn ensure_at(&self, key: &str, path: impl Into<Path>, default: Value) -> Result<Value> {
        let path = path.into();
        if path.is_root() {
            return self.ensure(key, default);
        }
        validate_key(key)?;
        let default = self.effective_default(key, default);
        let root = self.ensure_whole(key, Value::Object(Map::new()))?;
        guard::expect_kind(key, &Path::root(), &root, &[Kind::Object, Kind::Array])?;
        if let Some(found) = path::resolve(&root, &path) {
            return Ok(found.clone());
        }
        self.set_at(key, path, default.clone())?;
        Ok(default)
    }

    /// Merges `partial` over the object stored under `key` and returns the result.
    pub fn update(&self, key: &str, partial: Value) -> Result<Value> {
        if !partial.is_object() {
            return Err(Error::Argument(format!(
                "update of key `{}` needs an object to merge",
                key
            )));
        }
        self.mutate_target(key, &Path::root(), &[Kind::Object], |target| {
            merge_over(target, partial);
            Ok((true, target.clone()))
        })
    }

    /// Replaces the object stored under `key` with `f(current)`. Nothing is merged: the
    /// returned value is stored as is.
    pub fn update_with(&self, key: &str, f: impl FnOnce(Value) -> Value) -> Result<Value> {
        self.mutate_target(key, &Path::root(), &[Kind::Object], |target| {
            *target = f(std::mem::take(target));
            Ok((true, target.clone()))
        })
    }

    /// Removes the first element equal to `value` from the array (or the first property
    /// with that value from the object) stored under `key`.
    pub fn remove(&self, key: &str, value: &Value) -> Result<&Self> {
        self.remove_at_with(key, Path::root(), |v| v == value)
    }

    pub fn remove_at(&self, key: &str, path: impl Into<Path>, value: &Value) -> Result<&Self> {
        self.remove_at_with(key, path, |v| v == value)
    }

    /// Removes the first element for which `predicate` returns true.
    pub fn remove_with(&self, key: &str, predicate: impl Fn(&Value) -> bool) -> Result<&Self> {
        self.remove_at_with(key, Path::root(), predicate)
    }

    pub fn remove_at_with(
        &self,
        key: &str,
        path: impl Into<Path>,
        predicate: impl Fn(&Value) -> bool,
    ) -> Result<&Self> {
        self.mutate_target(key, &path.into(), &[Kind::Array, Kind::Object], |target| {
            let removed = match target {
                Value::Array(items) => match items.iter().position(|v| predicate(v)) {
                    Some(index) => {
                        items.remove(index);
                        true
                    }
                    None => false,
                },
                Value::Object(map) => {
                    match map.iter().find(|(_, v)| predicate(v)).map(|(k, _)| k.clone()) {
                        Some(prop) => map.remove(&prop).is_some(),
                        None => false,
                    }
                }
                _ => false,
            };
            Ok((removed, ()))
        })?;
        Ok(self)
    }

    /// Whether the array stored under `key` contains `value`.
    pub fn includes(&self, key: &str, value: &Value) -> Result<bool> {
        self.includes_at(key, Path::root(), value)
    }

    pub fn includes_at(&self, key: &str, path: impl Into<Path>, value: &Value) -> Result<bool> {
        let path = path.into();
        validate_key(key)?;
        let root = self.read(key)?;
        let target = guard::check(key, root.as_ref(), &[Kind::Array], &path)?;
        Ok(target.as_array().is_some_and(|items| items.contains(value)))
    }
}
