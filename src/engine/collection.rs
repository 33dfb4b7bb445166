use std::fmt;
use std::sync::{Mutex, PoisonError, RwLock};

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::CollectionBuilder;
use crate::engine::path::{self, Path};
use crate::engine::value::Kind;
use crate::engine::guard;
use crate::{ChangeEvent, Codec, Error, Gateway, Result};

type ChangeCallback = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// A named, persisted `key -> value` collection.
///
/// All operations are synchronous. Read-modify-write operations always read the value
/// currently in storage, so sequential calls observe each other's effects. Nothing is
/// coordinated across processes: two processes sharing a data directory each see their
/// own reads.
pub struct Collection {
    name: String,
    gateway: Mutex<Option<Box<dyn Gateway>>>,
    codec: Box<dyn Codec>,
    auto_default: Option<Value>,
    ensure_props: bool,
    on_change: RwLock<Option<ChangeCallback>>,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("auto_default", &self.auto_default)
            .field("ensure_props", &self.ensure_props)
            .finish_non_exhaustive()
    }
}

/// Returns `Err(InvalidKey)` unless `key` is non-empty word characters and hyphens.
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty() && key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidKey(key.to_string()))
    }
}

impl Collection {
    /// Opens an in-memory collection with default settings.
    pub fn open(name: &str) -> Result<Self> {
        Self::builder(name).open()
    }

    /// Starts configuring a collection.
    pub fn builder(name: impl Into<String>) -> CollectionBuilder {
        CollectionBuilder::new(name)
    }

    pub(crate) fn from_parts(
        name: String,
        gateway: Box<dyn Gateway>,
        codec: Box<dyn Codec>,
        auto_default: Option<Value>,
        ensure_props: bool,
    ) -> Self {
        Self {
            name,
            gateway: Mutex::new(Some(gateway)),
            codec,
            auto_default,
            ensure_props,
            on_change: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn auto_default(&self) -> Option<&Value> {
        self.auto_default.as_ref()
    }

    pub(crate) fn ensure_props(&self) -> bool {
        self.ensure_props
    }

    pub(crate) fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    pub(crate) fn with_gateway<T>(&self, f: impl FnOnce(&dyn Gateway) -> Result<T>) -> Result<T> {
        let guard = self.gateway.lock().unwrap_or_else(PoisonError::into_inner);
        let gateway = guard.as_deref().ok_or(Error::AlreadyShutDown)?;
        f(gateway)
    }

    /// Registers the change callback, replacing any previous one.
    ///
    /// The callback runs synchronously once per top-level mutation, after the new value
    /// has been written. It must not call `changed` itself.
    pub fn changed(&self, callback: impl Fn(&ChangeEvent) + Send + Sync + 'static) {
        let mut slot = self.on_change.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Box::new(callback));
    }

    fn notify(&self, key: &str, old: Option<Value>, new: Option<Value>) {
        let slot = self.on_change.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(callback) = slot.as_ref() {
            callback(&ChangeEvent {
                key: key.to_string(),
                old,
                new,
            });
        }
    }

    /// Reads and decodes the value currently stored under `key`.
    pub(crate) fn read(&self, key: &str) -> Result<Option<Value>> {
        let raw = self.with_gateway(|g| g.get(key))?;
        raw.map(|raw| self.codec.decode(&raw)).transpose()
    }

    /// Encodes and stores `new` as the whole value of `key`, then fires the change event.
    pub(crate) fn write(&self, key: &str, old: Option<Value>, new: Value) -> Result<()> {
        let raw = self.codec.encode(&new)?;
        self.with_gateway(|g| g.put(key, &raw))?;
        debug!("[{}] wrote key {}", self.name, key);
        self.notify(key, old, Some(new));
        Ok(())
    }

    fn erase(&self, key: &str, old: Option<Value>) -> Result<bool> {
        let removed = self.with_gateway(|g| g.delete(key))?;
        if removed {
            debug!("[{}] deleted key {}", self.name, key);
            self.notify(key, old, None);
        }
        Ok(removed)
    }

    /// Stores `value` as the whole value of `key`.
    pub fn set(&self, key: &str, value: Value) -> Result<&Self> {
        self.set_at(key, Path::root(), value)
    }

    /// Stores `value` at `path` inside `key`.
    ///
    /// An absent key starts out as an empty object. Missing intermediate segments are
    /// created as objects.
    pub fn set_at(&self, key: &str, path: impl Into<Path>, value: Value) -> Result<&Self> {
        let path = path.into();
        validate_key(key)?;
        let old = self.read(key)?;
        let new = if path.is_root() {
            value
        } else {
            let mut root = match &old {
                Some(Value::Null) | None => Value::Object(Map::new()),
                Some(existing) => {
                    guard::expect_kind(key, &Path::root(), existing, &[Kind::Object, Kind::Array])?;
                    existing.clone()
                }
            };
            path::assign(&mut root, &path, value)?;
            root
        };
        self.write(key, old, new)?;
        Ok(self)
    }

    /// Serializes `value` and stores it under `key`.
    pub fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<&Self> {
        self.set(key, serde_json::to_value(value)?)
    }

    /// Returns the value stored under `key`.
    ///
    /// If the collection has an auto-default and the key is absent, the default is stored
    /// first and returned.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.get_at(key, Path::root())
    }

    /// Returns the value at `path` inside `key`, or `None` if nothing is there.
    ///
    /// A path into a scalar value is a type mismatch.
    pub fn get_at(&self, key: &str, path: impl Into<Path>) -> Result<Option<Value>> {
        let path = path.into();
        validate_key(key)?;
        let root = match self.read(key)? {
            Some(root) => root,
            None => match &self.auto_default {
                Some(default) => {
                    self.write(key, None, default.clone())?;
                    default.clone()
                }
                None => return Ok(None),
            },
        };
        if path.is_root() {
            return Ok(Some(root));
        }
        if root.is_null() {
            return Ok(None);
        }
        guard::expect_kind(key, &Path::root(), &root, &[Kind::Object, Kind::Array])?;
        Ok(path::resolve(&root, &path).cloned())
    }

    /// Like [`get_at`](Self::get_at), but a missing key or path is an error.
    pub fn get_strict(&self, key: &str, path: impl Into<Path>) -> Result<Value> {
        let path = path.into();
        validate_key(key)?;
        let root = self.read(key)?.ok_or_else(|| Error::MissingKey(key.to_string()))?;
        if path.is_root() {
            return Ok(root);
        }
        guard::expect_kind(key, &Path::root(), &root, &[Kind::Object, Kind::Array])?;
        path::resolve(&root, &path)
            .cloned()
            .ok_or_else(|| Error::MissingPath {
                key: key.to_string(),
                path: path.to_string(),
            })
    }

    /// Deserializes the value stored under `key`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.with_gateway(|g| g.get(key))?.is_some())
    }

    /// Whether `path` inside `key` resolves to a value.
    pub fn has_at(&self, key: &str, path: impl Into<Path>) -> Result<bool> {
        let path = path.into();
        validate_key(key)?;
        Ok(match self.read(key)? {
            Some(root) => path::resolve(&root, &path).is_some(),
            None => false,
        })
    }

    /// Removes `key`. Deleting an absent key does nothing and fires no event.
    pub fn delete(&self, key: &str) -> Result<&Self> {
        validate_key(key)?;
        let old = self.read(key)?;
        if old.is_some() {
            self.erase(key, old)?;
        }
        Ok(self)
    }

    /// Removes the value at `path` inside `key`. Array elements are spliced out.
    ///
    /// The root path deletes the whole key.
    pub fn delete_at(&self, key: &str, path: impl Into<Path>) -> Result<&Self> {
        let path = path.into();
        if path.is_root() {
            return self.delete(key);
        }
        validate_key(key)?;
        let old = self.read(key)?;
        guard::check(key, old.as_ref(), &[Kind::Object, Kind::Array], &Path::root())?;
        let mut root = old.clone().unwrap_or(Value::Null);
        if path::unassign(&mut root, &path) {
            self.write(key, old, root)?;
        }
        Ok(self)
    }

    /// Returns the next autonum value for this collection: 1, 2, 3, ...
    ///
    /// Numbers are never handed out twice, even after the matching key is deleted.
    pub fn autonum(&self) -> Result<u64> {
        self.with_gateway(|g| g.next_counter(&self.name))
    }

    pub fn count(&self) -> Result<usize> {
        self.with_gateway(|g| g.count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.count()? == 0)
    }

    /// All keys in insertion order.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.with_gateway(|g| g.keys())
    }

    /// All `(key, value)` pairs in insertion order.
    pub fn entries(&self) -> Result<Vec<(String, Value)>> {
        self.scan()?.collect()
    }

    pub fn values(&self) -> Result<Vec<Value>> {
        self.scan()?.map(|entry| entry.map(|(_, v)| v)).collect()
    }

    /// Returns the values of `keys`, `None` for the absent ones.
    pub fn get_many(&self, keys: &[&str]) -> Result<Vec<(String, Option<Value>)>> {
        keys.iter()
            .map(|key| -> Result<(String, Option<Value>)> {
                validate_key(key)?;
                Ok((key.to_string(), self.read(key)?))
            })
            .collect()
    }

    /// Stores every entry. Existing keys are skipped unless `overwrite` is set.
    pub fn set_many(&self, entries: Vec<(String, Value)>, overwrite: bool) -> Result<&Self> {
        for (key, _) in &entries {
            validate_key(key)?;
        }
        for (key, value) in entries {
            let old = self.read(&key)?;
            if old.is_some() && !overwrite {
                continue;
            }
            self.write(&key, old, value)?;
        }
        Ok(self)
    }

    /// Removes every entry, firing one change event per removed key.
    ///
    /// Rows the codec cannot decode are still removed; their events carry no old value.
    pub fn clear(&self) -> Result<usize> {
        let (rows, removed) = self.with_gateway(|g| {
            let rows = g.rows()?;
            let removed = g.clear()?;
            Ok((rows, removed))
        })?;
        for (key, raw) in rows {
            let old = match self.codec.decode(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("[{}] clearing undecodable entry `{}`: {}", self.name, key, e);
                    None
                }
            };
            self.notify(&key, old, None);
        }
        info!("[{}] cleared {} entries", self.name, removed);
        Ok(removed)
    }

    /// Loads every stored row, then decodes them one at a time in insertion order.
    pub(crate) fn scan(&self) -> Result<impl Iterator<Item = Result<(String, Value)>> + '_> {
        let rows = self.with_gateway(|g| g.rows())?;
        Ok(rows
            .into_iter()
            .map(move |(key, raw)| -> Result<(String, Value)> {
                Ok((key, self.codec.decode(&raw)?))
            }))
    }

    /// Releases the storage handle. Every later operation fails with
    /// [`Error::AlreadyShutDown`].
    pub fn close(&self) -> Result<()> {
        let mut guard = self.gateway.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.take() {
            Some(gateway) => {
                drop(gateway);
                info!("[{}] collection closed", self.name);
                Ok(())
            }
            None => Err(Error::AlreadyShutDown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn recorder(collection: &Collection) -> Arc<Mutex<Vec<ChangeEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        collection.changed(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    #[test]
    fn test_set_get() {
        let c = Collection::open("test").unwrap();
        c.set("k1", json!("v1")).unwrap();
        assert_eq!(c.get("k1").unwrap(), Some(json!("v1")));
        assert_eq!(c.get("missing").unwrap(), None);
    }

    #[test]
    fn test_set_at_creates_root_object() {
        let c = Collection::open("test").unwrap();
        c.set_at("k", "a.b", json!(1)).unwrap();
        c.set_at("k", "a.c", json!(2)).unwrap();
        assert_eq!(c.get("k").unwrap(), Some(json!({"a": {"b": 1, "c": 2}})));
        assert_eq!(c.get_at("k", "a.b").unwrap(), Some(json!(1)));
        assert_eq!(c.get_at("k", "a.zzz").unwrap(), None);
    }

    #[test]
    fn test_path_into_scalar_is_error() {
        let c = Collection::open("test").unwrap();
        c.set("n", json!(5)).unwrap();
        assert_eq!(c.get_at("n", "x").unwrap_err().kind(), ErrorKind::TypeMismatch);
        assert_eq!(c.set_at("n", "x", json!(1)).unwrap_err().kind(), ErrorKind::TypeMismatch);
        assert_eq!(c.get("n").unwrap(), Some(json!(5)));
    }

    #[test]
    fn test_set_at_index_past_end_is_rejected() {
        let c = Collection::open("test").unwrap();
        c.set("doc", json!({"list": [1, 2]})).unwrap();
        let huge = format!("list.{}", usize::MAX);
        assert_eq!(c.set_at("doc", huge.as_str(), json!(9)).unwrap_err().kind(), ErrorKind::Argument);
        assert_eq!(c.set_at("doc", "list.3", json!(9)).unwrap_err().kind(), ErrorKind::Argument);
        assert_eq!(c.get("doc").unwrap(), Some(json!({"list": [1, 2]})));

        c.set_at("doc", "list.2", json!(3)).unwrap();
        assert_eq!(c.get_at("doc", "list").unwrap(), Some(json!([1, 2, 3])));
    }

    #[test]
    fn test_invalid_key() {
        let c = Collection::open("test").unwrap();
        for key in ["", "has space", "dot.ted", "slash/key"] {
            assert_eq!(c.set(key, json!(1)).unwrap_err().kind(), ErrorKind::InvalidKey);
        }
        assert!(c.set("ok_key-1", json!(1)).is_ok());
    }

    #[test]
    fn test_get_strict() {
        let c = Collection::open("test").unwrap();
        c.set("k", json!({"a": 1})).unwrap();
        assert_eq!(c.get_strict("k", "a").unwrap(), json!(1));
        assert_eq!(c.get_strict("k", "b").unwrap_err().kind(), ErrorKind::MissingPath);
        assert_eq!(c.get_strict("nope", "a").unwrap_err().kind(), ErrorKind::MissingKey);
    }

    #[test]
    fn test_auto_default_on_first_access() {
        let c = Collection::builder("test")
            .auto_default(json!({"count": 0}))
            .open()
            .unwrap();
        let events = recorder(&c);
        assert!(!c.has("fresh").unwrap());
        assert_eq!(c.get_at("fresh", "count").unwrap(), Some(json!(0)));
        assert!(c.has("fresh").unwrap());
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_fires_once() {
        let c = Collection::open("test").unwrap();
        c.set("k", json!({"a": 1, "b": 2})).unwrap();
        let events = recorder(&c);

        c.delete_at("k", "a").unwrap();
        assert_eq!(c.get("k").unwrap(), Some(json!({"b": 2})));

        c.delete("k").unwrap();
        c.delete("k").unwrap();
        assert!(!c.has("k").unwrap());
        assert_eq!(c.get("k").unwrap(), None);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].old, Some(json!({"a": 1, "b": 2})));
        assert_eq!(events[0].new, Some(json!({"b": 2})));
        assert_eq!(events[1].new, None);
    }

    #[test]
    fn test_change_event_snapshot() {
        let c = Collection::open("test").unwrap();
        let events = recorder(&c);
        c.set("k", json!([1])).unwrap();
        c.set_at("k", "0", json!(2)).unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events[0].old, None);
        assert_eq!(events[1].old, Some(json!([1])));
        assert_eq!(events[1].new, Some(json!([2])));
    }

    #[test]
    fn test_typed_helpers() {
        #[derive(Serialize, serde::Deserialize, Debug, PartialEq)]
        struct User {
            name: String,
            age: i32,
        }

        let c = Collection::open("test").unwrap();
        let user = User { name: "Alice".to_string(), age: 30 };
        c.set_as("user1", &user).unwrap();
        assert_eq!(c.get_as::<User>("user1").unwrap(), Some(user));
        assert_eq!(c.get_as::<User>("user2").unwrap(), None);
    }

    #[test]
    fn test_bulk_helpers() {
        let c = Collection::open("test").unwrap();
        c.set_many(vec![("a".into(), json!(1)), ("b".into(), json!(2))], false).unwrap();
        c.set_many(vec![("a".into(), json!(10)), ("c".into(), json!(3))], false).unwrap();
        assert_eq!(c.keys().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(c.values().unwrap(), vec![json!(1), json!(2), json!(3)]);
        assert_eq!(
            c.get_many(&["a", "zz"]).unwrap(),
            vec![("a".to_string(), Some(json!(1))), ("zz".to_string(), None)]
        );
        assert_eq!(c.clear().unwrap(), 3);
        assert!(c.is_empty().unwrap());
    }

    #[test]
    fn test_autonum_is_never_reused() {
        let c = Collection::open("test").unwrap();
        let first = c.autonum().unwrap();
        c.set(&first.to_string(), json!("x")).unwrap();
        c.delete(&first.to_string()).unwrap();
        assert_eq!(first, 1);
        assert_eq!(c.autonum().unwrap(), 2);
    }

    #[test]
    fn test_close() {
        let c = Collection::open("test").unwrap();
        c.set("k", json!(1)).unwrap();
        c.close().unwrap();
        assert_eq!(c.get("k").unwrap_err().kind(), ErrorKind::AlreadyShutDown);
        assert_eq!(c.close().unwrap_err().kind(), ErrorKind::AlreadyShutDown);
    }
}
