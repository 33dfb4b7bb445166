//! Structural checks that run before any mutation touches storage.

use serde_json::Value;

use crate::engine::path::{self, Path};
use crate::engine::value::Kind;
use crate::{Error, Result};

/// Checks that `key` exists and that the value it holds (or the value at `path` inside
/// it) has one of the `accepted` kinds.
///
/// `root` is the decoded value currently stored under `key`. On success the value that
/// was checked is returned.
pub fn check<'v>(
    key: &str,
    root: Option<&'v Value>,
    accepted: &[Kind],
    path: &Path,
) -> Result<&'v Value> {
    let root = root.ok_or_else(|| Error::MissingKey(key.to_string()))?;
    if path.is_root() {
        return expect_kind(key, path, root, accepted);
    }
    expect_kind(key, &Path::root(), root, &[Kind::Object, Kind::Array])?;
    let target = path::resolve(root, path).ok_or_else(|| Error::MissingPath {
        key: key.to_string(),
        path: path.to_string(),
    })?;
    expect_kind(key, path, target, accepted)
}

/// Fails with [`Error::TypeMismatch`] unless `value` has one of the `accepted` kinds.
pub fn expect_kind<'v>(key: &str, path: &Path, value: &'v Value, accepted: &[Kind]) -> Result<&'v Value> {
    let found = Kind::of(value);
    if accepted.contains(&found) {
        Ok(value)
    } else {
        Err(Error::TypeMismatch {
            key: key.to_string(),
            path: path.to_string(),
            expected: accepted.to_vec(),
            found,
        })
    }
}
