//! Export and import of a whole collection.
//!
//! A bundle is JSON of the form
//!
//! ```json
//! {"name": "users", "version": 1, "exportDate": 1700000000000,
//!  "keys": [{"key": "ann", "value": "{\"age\":31}"}]}
//! ```
//!
//! Values are the raw stored strings, exactly as the collection's codec wrote them.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use serde::{Deserialize, Serialize};

use crate::engine::collection::{validate_key, Collection};
use crate::{Error, Result};

/// Bundle format version written by [`Collection::export`].
pub const BUNDLE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub name: String,
    pub version: u32,
    pub export_date: u64,
    pub keys: Vec<ExportEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub key: String,
    pub value: String,
}

impl Collection {
    /// Serializes every row into a bundle.
    pub fn export(&self) -> Result<String> {
        let rows = self.with_gateway(|g| g.rows())?;
        let export_date = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let bundle = ExportBundle {
            name: self.name().to_string(),
            version: BUNDLE_VERSION,
            export_date,
            keys: rows
                .into_iter()
                .map(|(key, value)| ExportEntry { key, value })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&bundle)?)
    }

    /// Loads rows from a bundle produced by [`export`](Self::export) and returns how
    /// many were written.
    ///
    /// The bundle must carry this collection's name. Existing keys are kept unless
    /// `overwrite` is set; `clear` empties the collection first. Every entry is
    /// validated before anything is written. No change events are fired.
    pub fn import(&self, bundle: &str, overwrite: bool, clear: bool) -> Result<usize> {
        let bundle: ExportBundle = serde_json::from_str(bundle)
            .map_err(|e| Error::Argument(format!("malformed bundle: {}", e)))?;
        if bundle.name != self.name() {
            return Err(Error::Argument(format!(
                "bundle belongs to collection `{}`, not `{}`",
                bundle.name,
                self.name()
            )));
        }
        if bundle.version > BUNDLE_VERSION {
            return Err(Error::Argument(format!(
                "unsupported bundle version {}",
                bundle.version
            )));
        }
        for entry in &bundle.keys {
            validate_key(&entry.key)?;
            self.codec().decode(&entry.value)?;
        }

        let written = self.with_gateway(|g| {
            if clear {
                g.clear()?;
            }
            let existing: HashSet<String> = g.keys()?.into_iter().collect();
            let mut written = 0;
            for entry in &bundle.keys {
                if !overwrite && existing.contains(&entry.key) {
                    continue;
                }
                g.put(&entry.key, &entry.value)?;
                written += 1;
            }
            Ok(written)
        })?;
        info!("[{}] imported {} entries", self.name(), written);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_export_shape() {
        let c = Collection::open("users").unwrap();
        c.set("ann", json!({"age": 31})).unwrap();
        let bundle: serde_json::Value = serde_json::from_str(&c.export().unwrap()).unwrap();
        assert_eq!(bundle["name"], json!("users"));
        assert_eq!(bundle["version"], json!(1));
        assert!(bundle["exportDate"].is_u64());
        assert_eq!(bundle["keys"], json!([{"key": "ann", "value": "{\"age\":31}"}]));
    }

    #[test]
    fn test_import_respects_overwrite() {
        let source = Collection::open("users").unwrap();
        source.set("ann", json!(1)).unwrap();
        source.set("bob", json!(2)).unwrap();
        let bundle = source.export().unwrap();

        let target = Collection::open("users").unwrap();
        target.set("ann", json!("keep")).unwrap();
        assert_eq!(target.import(&bundle, false, false).unwrap(), 1);
        assert_eq!(target.get("ann").unwrap(), Some(json!("keep")));
        assert_eq!(target.get("bob").unwrap(), Some(json!(2)));

        assert_eq!(target.import(&bundle, true, false).unwrap(), 2);
        assert_eq!(target.get("ann").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_import_with_clear() {
        let source = Collection::open("users").unwrap();
        source.set("ann", json!(1)).unwrap();
        let bundle = source.export().unwrap();

        let target = Collection::open("users").unwrap();
        target.set("zed", json!(0)).unwrap();
        target.import(&bundle, false, true).unwrap();
        assert_eq!(target.keys().unwrap(), vec!["ann"]);
    }

    #[test]
    fn test_import_rejects_foreign_or_broken_bundles() {
        let source = Collection::open("users").unwrap();
        source.set("ann", json!(1)).unwrap();
        let bundle = source.export().unwrap();

        let other = Collection::open("orders").unwrap();
        assert_eq!(other.import(&bundle, true, false).unwrap_err().kind(), ErrorKind::Argument);

        let broken = r#"{"name":"orders","version":1,"exportDate":0,
            "keys":[{"key":"a","value":"1"},{"key":"b","value":"{oops"}]}"#;
        assert_eq!(other.import(broken, true, false).unwrap_err().kind(), ErrorKind::Codec);
        assert!(other.is_empty().unwrap());

        for garbage in ["not json", "{\"name\":\"orders\"}", "[]"] {
            assert_eq!(other.import(garbage, true, false).unwrap_err().kind(), ErrorKind::Argument);
        }
        assert!(other.is_empty().unwrap());
    }
}
