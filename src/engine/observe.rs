use std::ops::Deref;

use serde_json::Value;

use crate::engine::collection::{validate_key, Collection};
use crate::engine::guard;
use crate::engine::path::{self, Path};
use crate::engine::value::Kind;
use crate::{Error, Result};

/// A live view of an object or array stored in a [`Collection`].
///
/// Reads go through [`Deref`] to the handle's current value. Every mutation made
/// through the handle is written back with `set` before the call returns, so a later
/// `get` of the key sees it.
///
/// ```
/// use celerix_map::Collection;
/// use serde_json::json;
///
/// # fn main() -> celerix_map::Result<()> {
/// let profiles = Collection::open("profiles")?;
/// profiles.set("ann", json!({"badges": []}))?;
///
/// let mut ann = profiles.observe("ann")?;
/// ann.set("nick", json!("annie"))?;
/// ann.modify(|v| v["badges"].as_array_mut().map(|b| b.push(json!("early"))))?;
///
/// assert_eq!(
///     profiles.get("ann")?,
///     Some(json!({"badges": ["early"], "nick": "annie"}))
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Observed<'c> {
    collection: &'c Collection,
    key: String,
    path: Path,
    value: Value,
}

impl Collection {
    /// Returns a live handle over the object or array stored under `key`.
    pub fn observe(&self, key: &str) -> Result<Observed<'_>> {
        self.observe_at(key, Path::root())
    }

    /// Returns a live handle over the object or array at `path` inside `key`.
    pub fn observe_at(&self, key: &str, path: impl Into<Path>) -> Result<Observed<'_>> {
        let path = path.into();
        validate_key(key)?;
        let root = self.read(key)?;
        let value = guard::check(key, root.as_ref(), &[Kind::Object, Kind::Array], &path)?.clone();
        Ok(Observed {
            collection: self,
            key: key.to_string(),
            path,
            value,
        })
    }
}

impl<'c> Observed<'c> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    fn commit(&self) -> Result<()> {
        self.collection
            .set_at(&self.key, &self.path, self.value.clone())
            .map(|_| ())
    }

    /// Assigns `value` at `prop`, a path relative to the observed value.
    pub fn set(&mut self, prop: impl Into<Path>, value: Value) -> Result<()> {
        let prop = prop.into();
        if prop.is_root() {
            return self.replace(value);
        }
        let mut next = self.value.clone();
        path::assign(&mut next, &prop, value)?;
        self.value = next;
        self.commit()
    }

    /// Removes the value at `prop`. Array elements are spliced out.
    pub fn delete(&mut self, prop: impl Into<Path>) -> Result<bool> {
        let removed = path::unassign(&mut self.value, &prop.into());
        if removed {
            self.commit()?;
        }
        Ok(removed)
    }

    /// Appends to the observed array.
    pub fn push(&mut self, value: Value) -> Result<()> {
        match &mut self.value {
            Value::Array(items) => items.push(value),
            other => {
                return Err(Error::TypeMismatch {
                    key: self.key.clone(),
                    path: self.path.to_string(),
                    expected: vec![Kind::Array],
                    found: Kind::of(other),
                })
            }
        }
        self.commit()
    }

    /// Replaces the observed value wholesale.
    pub fn replace(&mut self, value: Value) -> Result<()> {
        self.value = value;
        self.commit()
    }

    /// Runs `f` on the observed value, writing back if anything changed. Use this for
    /// nested edits.
    pub fn modify<T>(&mut self, f: impl FnOnce(&mut Value) -> T) -> Result<T> {
        let before = self.value.clone();
        let out = f(&mut self.value);
        if self.value != before {
            self.commit()?;
        }
        Ok(out)
    }

    /// Re-reads the observed value from storage.
    pub fn refresh(&mut self) -> Result<()> {
        self.value = self.collection.get_strict(&self.key, &self.path)?;
        Ok(())
    }
}

impl Deref for Observed<'_> {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_edits_are_persisted() {
        let c = Collection::open("test").unwrap();
        c.set("user", json!({"name": "ann", "tags": ["a"]})).unwrap();

        let mut user = c.observe("user").unwrap();
        user.set("age", json!(30)).unwrap();
        assert_eq!(c.get_at("user", "age").unwrap(), Some(json!(30)));

        user.delete("tags.0").unwrap();
        assert_eq!(c.get_at("user", "tags").unwrap(), Some(json!([])));

        user.modify(|v| v["name"] = json!("anne")).unwrap();
        assert_eq!(user["name"], json!("anne"));
        assert_eq!(c.get_at("user", "name").unwrap(), Some(json!("anne")));
    }

    #[test]
    fn test_observe_nested_array() {
        let c = Collection::open("test").unwrap();
        c.set("doc", json!({"list": [1], "other": true})).unwrap();

        let mut list = c.observe_at("doc", "list").unwrap();
        list.push(json!(2)).unwrap();
        assert_eq!(c.get("doc").unwrap(), Some(json!({"list": [1, 2], "other": true})));
    }

    #[test]
    fn test_set_past_array_end_is_rejected() {
        let c = Collection::open("test").unwrap();
        c.set("arr", json!([1, 2])).unwrap();
        let mut arr = c.observe("arr").unwrap();
        let huge = usize::MAX.to_string();
        assert_eq!(arr.set(huge.as_str(), json!(9)).unwrap_err().kind(), ErrorKind::Argument);
        assert_eq!(arr.value(), &json!([1, 2]));
        assert_eq!(c.get("arr").unwrap(), Some(json!([1, 2])));
    }

    #[test]
    fn test_one_event_per_edit() {
        use std::sync::{Arc, Mutex};

        let c = Collection::open("test").unwrap();
        c.set("k", json!({})).unwrap();
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        c.changed(move |_| *counter.lock().unwrap() += 1);

        let mut k = c.observe("k").unwrap();
        k.set("a", json!(1)).unwrap();
        k.set("b.c", json!(2)).unwrap();
        k.modify(|_| ()).unwrap();
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn test_refresh_and_guard() {
        let c = Collection::open("test").unwrap();
        c.set("k", json!({"a": 1})).unwrap();
        let mut k = c.observe("k").unwrap();
        c.set_at("k", "a", json!(2)).unwrap();
        k.refresh().unwrap();
        assert_eq!(k.value(), &json!({"a": 2}));

        c.set("n", json!(1)).unwrap();
        assert_eq!(c.observe("n").unwrap_err().kind(), ErrorKind::TypeMismatch);
        assert_eq!(c.observe("nope").unwrap_err().kind(), ErrorKind::MissingKey);
    }
}
