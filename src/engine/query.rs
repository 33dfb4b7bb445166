//! Whole-collection scans.
//!
//! There are no indexes: every query decodes the stored rows in insertion order and
//! stops early only where the operation allows it (`find`, `some`, `every`).

use serde_json::Value;

use crate::engine::collection::Collection;
use crate::engine::path::{self, Path};
use crate::{Error, Result};

/// Selects entries in a query.
pub enum Criteria<'a> {
    /// Matches when the function returns true for `(value, key)`.
    Predicate(Box<dyn Fn(&Value, &str) -> bool + 'a>),
    /// Matches when the value at `path` equals `value`. A missing `value` is rejected
    /// when the query runs.
    PathEquals { path: Path, value: Option<Value> },
}

impl<'a> Criteria<'a> {
    pub fn from_fn(predicate: impl Fn(&Value, &str) -> bool + 'a) -> Self {
        Criteria::Predicate(Box::new(predicate))
    }

    /// Matches entries whose value at `path` equals `value`. The root path compares the
    /// whole value.
    pub fn path_equals(path: impl Into<Path>, value: Value) -> Self {
        Criteria::PathEquals {
            path: path.into(),
            value: Some(value),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Criteria::PathEquals { path, value: None } => Err(Error::Argument(format!(
                "a value to compare against is required when querying by path `{}`",
                path
            ))),
            _ => Ok(()),
        }
    }

    fn matches(&self, value: &Value, key: &str) -> bool {
        match self {
            Criteria::Predicate(predicate) => predicate(value, key),
            Criteria::PathEquals {
                path,
                value: Some(expected),
            } => path::resolve(value, path) == Some(expected),
            Criteria::PathEquals { value: None, .. } => false,
        }
    }
}

impl<'a, F> From<F> for Criteria<'a>
where
    F: Fn(&Value, &str) -> bool + 'a,
{
    fn from(predicate: F) -> Self {
        Criteria::from_fn(predicate)
    }
}

impl Collection {
    /// Returns the first value that matches.
    pub fn find<'a>(&self, criteria: impl Into<Criteria<'a>>) -> Result<Option<Value>> {
        Ok(self.find_entry(&criteria.into())?.map(|(_, value)| value))
    }

    /// Returns the key of the first value that matches.
    pub fn find_key<'a>(&self, criteria: impl Into<Criteria<'a>>) -> Result<Option<String>> {
        Ok(self.find_entry(&criteria.into())?.map(|(key, _)| key))
    }

    fn find_entry(&self, criteria: &Criteria<'_>) -> Result<Option<(String, Value)>> {
        criteria.validate()?;
        for entry in self.scan()? {
            let (key, value) = entry?;
            if criteria.matches(&value, &key) {
                return Ok(Some((key, value)));
            }
        }
        Ok(None)
    }

    /// Returns every value that matches.
    pub fn filter<'a>(&self, criteria: impl Into<Criteria<'a>>) -> Result<Vec<Value>> {
        Ok(self.partition(criteria)?.0)
    }

    /// Returns `(matches, non_matches)`.
    pub fn partition<'a>(
        &self,
        criteria: impl Into<Criteria<'a>>,
    ) -> Result<(Vec<Value>, Vec<Value>)> {
        let criteria = criteria.into();
        let mut hits = Vec::new();
        let mut misses = Vec::new();
        criteria.validate()?;
        for entry in self.scan()? {
            let (key, value) = entry?;
            if criteria.matches(&value, &key) {
                hits.push(value);
            } else {
                misses.push(value);
            }
        }
        Ok((hits, misses))
    }

    /// Deletes every matching entry and returns how many were removed. Each deletion
    /// fires its own change event.
    pub fn sweep<'a>(&self, criteria: impl Into<Criteria<'a>>) -> Result<usize> {
        let criteria = criteria.into();
        let mut doomed = Vec::new();
        criteria.validate()?;
        for entry in self.scan()? {
            let (key, value) = entry?;
            if criteria.matches(&value, &key) {
                doomed.push(key);
            }
        }
        for key in &doomed {
            self.delete(key)?;
        }
        Ok(doomed.len())
    }

    pub fn some<'a>(&self, criteria: impl Into<Criteria<'a>>) -> Result<bool> {
        let criteria = criteria.into();
        criteria.validate()?;
        for entry in self.scan()? {
            let (key, value) = entry?;
            if criteria.matches(&value, &key) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True when every entry matches, including when the collection is empty.
    pub fn every<'a>(&self, criteria: impl Into<Criteria<'a>>) -> Result<bool> {
        let criteria = criteria.into();
        criteria.validate()?;
        for entry in self.scan()? {
            let (key, value) = entry?;
            if !criteria.matches(&value, &key) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Projects every entry through `f`.
    pub fn map<T>(&self, mut f: impl FnMut(&Value, &str) -> T) -> Result<Vec<T>> {
        self.scan()?
            .map(|entry| entry.map(|(key, value)| f(&value, &key)))
            .collect()
    }

    /// Projects every entry to the value at `path`, `Value::Null` where it is missing.
    pub fn map_path(&self, path: impl Into<Path>) -> Result<Vec<Value>> {
        let path = path.into();
        self.map(|value, _| path::resolve(value, &path).cloned().unwrap_or(Value::Null))
    }

    /// Folds every entry into an accumulator, in insertion order.
    pub fn reduce<A>(&self, init: A, mut f: impl FnMut(A, &Value, &str) -> A) -> Result<A> {
        let mut acc = init;
        for entry in self.scan()? {
            let (key, value) = entry?;
            acc = f(acc, &value, &key);
        }
        Ok(acc)
    }

    /// Returns up to `n` distinct values picked at random.
    pub fn random(&self, n: usize) -> Result<Vec<Value>> {
        let rows = self.with_gateway(|g| g.sample(n))?;
        rows.into_iter()
            .map(|(_, raw)| self.codec().decode(&raw))
            .collect()
    }

    /// Returns up to `n` distinct keys picked at random.
    pub fn random_key(&self, n: usize) -> Result<Vec<String>> {
        let rows = self.with_gateway(|g| g.sample(n))?;
        Ok(rows.into_iter().map(|(key, _)| key).collect())
    }
}
