//! Collection configuration.
//!
//! A [`Config`] can be deserialized, built in code, or read from the environment:
//!
//! | Variable               | Meaning                                               |
//! |------------------------|-------------------------------------------------------|
//! | `CELERIX_DATA_DIR`     | Directory holding `celerix.sqlite`. Unset: in-memory. |
//! | `CELERIX_VAULT_KEY`    | Hex-encoded 32-byte key; enables encryption at rest.  |
//! | `CELERIX_ENSURE_PROPS` | `false` turns off object backfilling in `ensure`.     |

use std::env;
use std::path::PathBuf;

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{Collection, JsonCodec, Persistence, VaultCodec};
use crate::{Codec, Error, Gateway, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collection name; also the name of its table.
    pub name: String,
    /// Where the database file lives. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Value written on first access to an absent key. Overrides `ensure` defaults.
    pub auto_default: Option<Value>,
    /// Whether `ensure` on an object-valued key backfills missing default properties.
    pub ensure_props: bool,
    /// Hex-encoded AES-256 key for encryption at rest.
    pub vault_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: String::new(),
            data_dir: None,
            auto_default: None,
            ensure_props: true,
            vault_key: None,
        }
    }
}

impl Config {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builds a configuration for `name` from the `CELERIX_*` environment variables.
    pub fn from_env(name: impl Into<String>) -> Self {
        let mut config = Self::new(name);
        config.data_dir = env::var("CELERIX_DATA_DIR")
            .ok()
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);
        config.vault_key = env::var("CELERIX_VAULT_KEY").ok().filter(|k| !k.is_empty());
        if let Ok(flag) = env::var("CELERIX_ENSURE_PROPS") {
            config.ensure_props = flag != "false";
        }
        config
    }

    pub fn open(self) -> Result<Collection> {
        CollectionBuilder::from_config(self).open()
    }
}

/// Configures and opens a [`Collection`].
///
/// ```
/// use celerix_map::Collection;
/// use serde_json::json;
///
/// # fn main() -> celerix_map::Result<()> {
/// let settings = Collection::builder("settings")
///     .auto_default(json!({"prefix": "!"}))
///     .open()?;
/// assert_eq!(settings.get("guild1")?, Some(json!({"prefix": "!"})));
/// # Ok(())
/// # }
/// ```
pub struct CollectionBuilder {
    config: Config,
    codec: Option<Box<dyn Codec>>,
}

impl CollectionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(Config::new(name))
    }

    pub fn from_config(config: Config) -> Self {
        Self { config, codec: None }
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = Some(dir.into());
        self
    }

    pub fn auto_default(mut self, value: Value) -> Self {
        self.config.auto_default = Some(value);
        self
    }

    pub fn ensure_props(mut self, enabled: bool) -> Self {
        self.config.ensure_props = enabled;
        self
    }

    /// Encrypts values at rest with a 32-byte key.
    pub fn vault_key(mut self, master_key: &[u8]) -> Self {
        self.config.vault_key = Some(hex::encode(master_key));
        self
    }

    /// Replaces the value codec. Takes precedence over [`vault_key`](Self::vault_key).
    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Some(Box::new(codec));
        self
    }

    pub fn open(self) -> Result<Collection> {
        let Self { config, codec } = self;

        let gateway: Box<dyn Gateway> = match &config.data_dir {
            Some(dir) => Box::new(Persistence::open(dir, &config.name)?),
            None => Box::new(Persistence::in_memory(&config.name)?),
        };

        let codec: Box<dyn Codec> = match (codec, &config.vault_key) {
            (Some(codec), _) => codec,
            (None, Some(key_hex)) => {
                let key = hex::decode(key_hex)
                    .map_err(|e| Error::Argument(format!("vault key is not valid hex: {}", e)))?;
                Box::new(VaultCodec::new(&key)?)
            }
            (None, None) => Box::new(JsonCodec),
        };

        match &config.data_dir {
            Some(dir) => info!("Opened collection {} in {:?}", config.name, dir),
            None => info!("Opened in-memory collection {}", config.name),
        }

        Ok(Collection::from_parts(
            config.name,
            gateway,
            codec,
            config.auto_default,
            config.ensure_props,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_config_defaults_from_json() {
        let config: Config = serde_json::from_value(json!({"name": "guilds"})).unwrap();
        assert_eq!(config, Config::new("guilds"));
        assert!(config.ensure_props);
    }

    #[test]
    fn test_open_from_config() {
        let dir = tempdir().unwrap();
        let config = Config {
            data_dir: Some(dir.path().to_path_buf()),
            auto_default: Some(json!(0)),
            ..Config::new("scores")
        };
        let scores = config.open().unwrap();
        assert_eq!(scores.name(), "scores");
        assert_eq!(scores.get("anyone").unwrap(), Some(json!(0)));
    }

    #[test]
    fn test_bad_vault_key() {
        let config = Config {
            vault_key: Some("zz".to_string()),
            ..Config::new("secrets")
        };
        assert!(matches!(config.open(), Err(Error::Argument(_))));
    }

    #[test]
    fn test_invalid_name() {
        assert!(Collection::open("").is_err());
        assert!(Collection::open("has space").is_err());
    }
}
