//! Dot-notation paths into stored values.
//!
//! A path such as `"users.0.name"` is split on `.` into segments. A segment is looked up
//! as a property on objects and parsed as an index on arrays. The empty string is the
//! root path and addresses the whole value.
//!
//! Assignment creates missing intermediate containers as objects, never arrays. An
//! array is only ever indexed when it already exists at that position.

use std::fmt;

use serde_json::{Map, Value};

use crate::{Error, Result};

/// A parsed dot-notation path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<String>);

impl Path {
    /// The root path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parses a dot-notation expression. The empty string yields the root path.
    pub fn parse(expr: &str) -> Self {
        if expr.is_empty() {
            return Self::root();
        }
        Self(expr.split('.').map(str::to_string).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<&str> for Path {
    fn from(expr: &str) -> Self {
        Path::parse(expr)
    }
}

impl From<String> for Path {
    fn from(expr: String) -> Self {
        Path::parse(&expr)
    }
}

impl From<&String> for Path {
    fn from(expr: &String) -> Self {
        Path::parse(expr)
    }
}

impl From<&Path> for Path {
    fn from(path: &Path) -> Self {
        path.clone()
    }
}

fn step<'v>(current: &'v Value, seg: &str) -> Option<&'v Value> {
    match current {
        Value::Object(map) => map.get(seg),
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn step_mut<'v>(current: &'v mut Value, seg: &str) -> Option<&'v mut Value> {
    match current {
        Value::Object(map) => map.get_mut(seg),
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}

/// Returns the value at `path`, or `None` if any segment is missing.
pub fn resolve<'v>(value: &'v Value, path: &Path) -> Option<&'v Value> {
    path.segments()
        .iter()
        .try_fold(value, |current, seg| step(current, seg))
}

/// Mutable counterpart of [`resolve`].
pub fn resolve_mut<'v>(value: &'v mut Value, path: &Path) -> Option<&'v mut Value> {
    resolve_segments_mut(value, path.segments())
}

fn resolve_segments_mut<'v>(value: &'v mut Value, segments: &[String]) -> Option<&'v mut Value> {
    segments
        .iter()
        .try_fold(value, |current, seg| step_mut(current, seg))
}

/// Writes `new` at `path` inside `root`, creating missing intermediate objects.
///
/// A null or scalar found where a container is needed is replaced by an empty object.
/// An index equal to an existing array's length appends to it; any index further out
/// is an [`Error::Argument`].
pub fn assign(root: &mut Value, path: &Path, new: Value) -> Result<()> {
    assign_segments(root, path.segments(), new, path)
}

fn assign_segments(current: &mut Value, segments: &[String], new: Value, full: &Path) -> Result<()> {
    let Some((seg, rest)) = segments.split_first() else {
        *current = new;
        return Ok(());
    };

    match current {
        Value::Array(items) => {
            let index = seg.parse::<usize>().map_err(|_| {
                Error::Argument(format!(
                    "segment `{}` of path `{}` is not an index into an array",
                    seg, full
                ))
            })?;
            if index > items.len() {
                return Err(Error::Argument(format!(
                    "index {} is past the end of the array at path `{}` (length {})",
                    index,
                    full,
                    items.len()
                )));
            }
            if index == items.len() {
                items.push(Value::Null);
            }
            assign_segments(&mut items[index], rest, new, full)
        }
        Value::Object(map) => {
            let slot = map.entry(seg.clone()).or_insert(Value::Null);
            assign_segments(slot, rest, new, full)
        }
        other => {
            *other = Value::Object(Map::new());
            assign_segments(other, segments, new, full)
        }
    }
}

/// Removes the value at `path`. Array elements are spliced out, shifting the ones after
/// them; object properties are deleted. Returns whether anything was removed.
///
/// The root path is never removed here.
pub fn unassign(root: &mut Value, path: &Path) -> bool {
    let Some((leaf, parent)) = path.segments().split_last() else {
        return false;
    };
    match resolve_segments_mut(root, parent) {
        Some(Value::Array(items)) => match leaf.parse::<usize>() {
            Ok(index) if index < items.len() => {
                items.remove(index);
                true
            }
            _ => false,
        },
        Some(Value::Object(map)) => map.remove(leaf).is_some(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_and_display() {
        let path = Path::parse("a.b.2.c");
        assert_eq!(path.len(), 4);
        assert_eq!(path.to_string(), "a.b.2.c");
        assert!(Path::parse("").is_root());
    }

    #[test]
    fn test_resolve() {
        let doc = json!({"a": {"b": [10, {"c": "deep"}]}});
        assert_eq!(resolve(&doc, &"a.b.1.c".into()), Some(&json!("deep")));
        assert_eq!(resolve(&doc, &"a.b.0".into()), Some(&json!(10)));
        assert_eq!(resolve(&doc, &"a.b.7".into()), None);
        assert_eq!(resolve(&doc, &"a.x.y".into()), None);
        assert_eq!(resolve(&doc, &"a.b.0.z".into()), None);
        assert_eq!(resolve(&doc, &Path::root()), Some(&doc));
    }

    #[test]
    fn test_resolve_null_root_is_absent() {
        assert_eq!(resolve(&Value::Null, &"a.b".into()), None);
    }

    #[test]
    fn test_assign_creates_objects_never_arrays() {
        let mut doc = Value::Null;
        assign(&mut doc, &"a.0.b".into(), json!(1)).unwrap();
        assert_eq!(doc, json!({"a": {"0": {"b": 1}}}));
    }

    #[test]
    fn test_assign_into_existing_array() {
        let mut doc = json!({"list": [1, 2]});
        assign(&mut doc, &"list.1".into(), json!(20)).unwrap();
        assign(&mut doc, &"list.2".into(), json!(30)).unwrap();
        assert_eq!(doc, json!({"list": [1, 20, 30]}));

        let err = assign(&mut doc, &"list.5".into(), json!(50)).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
        assert_eq!(doc, json!({"list": [1, 20, 30]}));

        let err = assign(&mut doc, &"list.name".into(), json!("x")).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn test_assign_huge_index_is_rejected() {
        let mut doc = json!([1, 2]);
        let huge = format!("{}", usize::MAX);
        let err = assign(&mut doc, &Path::parse(&huge), json!(9)).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
        assert_eq!(doc, json!([1, 2]));
    }

    #[test]
    fn test_assign_replaces_scalar_intermediate() {
        let mut doc = json!({"a": 5});
        assign(&mut doc, &"a.b".into(), json!(true)).unwrap();
        assert_eq!(doc, json!({"a": {"b": true}}));
    }

    #[test]
    fn test_unassign() {
        let mut doc = json!({"list": ["x", "y", "z"], "obj": {"k": 1, "j": 2}});
        assert!(unassign(&mut doc, &"list.0".into()));
        assert!(unassign(&mut doc, &"obj.k".into()));
        assert!(!unassign(&mut doc, &"obj.missing".into()));
        assert!(!unassign(&mut doc, &Path::root()));
        assert_eq!(doc, json!({"list": ["y", "z"], "obj": {"j": 2}}));
    }
}
