//! Celerix Map is a synchronous, path-addressable store for JSON-shaped values.
//!
//! Every [`Collection`] is a named, persisted `key -> value` namespace backed by an
//! embedded SQLite table. On top of plain `get`/`set`, values can be addressed with
//! dot-notation paths (`"a.b.2.c"`), mutated through helpers (push, math, ensure,
//! update, remove), scanned with the query engine, and observed through live handles
//! that write every in-place edit back to storage.
//!
//! ## Core Components
//! - [`engine`]: The collection, its mutation and query engine, and the storage backends.
//! - [`config`]: Collection configuration and the builder used to open collections.
//!
//! ```
//! use celerix_map::Collection;
//! use serde_json::json;
//!
//! # fn main() -> celerix_map::Result<()> {
//! let users = Collection::open("users")?;
//! users.set("alice", json!({"age": 30, "tags": []}))?;
//! users.push_at("alice", "tags", json!("admin"), false)?;
//! users.inc_at("alice", "age")?;
//! assert_eq!(users.get_at("alice", "age")?, Some(json!(31)));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;

use std::fmt;

use serde_json::Value;
use thiserror::Error;

pub use config::{CollectionBuilder, Config};
pub use engine::{
    Collection, Criteria, JsonCodec, Kind, MathOp, Observed, Path, Persistence, VaultCodec,
};

/// Errors returned by Celerix Map.
#[derive(Error, Debug)]
pub enum Error {
    /// The key does not pass key-format validation.
    #[error("invalid key `{0}`: keys must be non-empty and contain only word characters and hyphens")]
    InvalidKey(String),
    /// The operation requires the key to exist.
    #[error("key `{0}` does not exist")]
    MissingKey(String),
    /// The path does not resolve to a value inside the key.
    #[error("path `{path}` does not exist in key `{key}`")]
    MissingPath { key: String, path: String },
    /// The value at the key (or path) has an unexpected kind.
    #[error("{} in key `{key}` is {found}, expected {}", describe_path(.path), describe_kinds(.expected))]
    TypeMismatch {
        key: String,
        path: String,
        expected: Vec<Kind>,
        found: Kind,
    },
    /// The call itself is malformed.
    #[error("invalid argument: {0}")]
    Argument(String),
    /// The value codec failed to encode or decode a value.
    #[error("codec error: {0}")]
    Codec(String),
    /// The collection was closed.
    #[error("collection has already been shut down")]
    AlreadyShutDown,
    /// The storage engine reported an error.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    /// An I/O error occurred while preparing the data directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

fn describe_path(path: &str) -> String {
    if path.is_empty() {
        "value".to_string()
    } else {
        format!("path `{}`", path)
    }
}

fn describe_kinds(kinds: &[Kind]) -> String {
    kinds
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Machine-readable classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidKey,
    MissingKey,
    MissingPath,
    TypeMismatch,
    Argument,
    Codec,
    AlreadyShutDown,
    Storage,
}

impl Error {
    /// Returns the kind of this error, for branching on cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidKey(_) => ErrorKind::InvalidKey,
            Error::MissingKey(_) => ErrorKind::MissingKey,
            Error::MissingPath { .. } => ErrorKind::MissingPath,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::Argument(_) => ErrorKind::Argument,
            Error::Codec(_) => ErrorKind::Codec,
            Error::AlreadyShutDown => ErrorKind::AlreadyShutDown,
            Error::Storage(_) | Error::Io(_) => ErrorKind::Storage,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A specialized Result type for Celerix Map operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Durable `key -> raw value` storage for a single collection.
///
/// Implementations serialize their own access; the collection never holds more than
/// one call into the gateway at a time.
pub trait Gateway: Send {
    /// Returns the raw value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Inserts or replaces the raw value stored under `key`.
    fn put(&self, key: &str, raw: &str) -> Result<()>;
    /// Removes `key`. Returns whether a row was removed.
    fn delete(&self, key: &str) -> Result<bool>;
    /// Removes every row, returning how many were removed.
    fn clear(&self) -> Result<usize>;
    /// Number of stored rows.
    fn count(&self) -> Result<usize>;
    /// All keys, in insertion order.
    fn keys(&self) -> Result<Vec<String>>;
    /// All `(key, raw)` rows, in insertion order.
    fn rows(&self) -> Result<Vec<(String, String)>>;
    /// Up to `n` distinct rows picked uniformly at random.
    fn sample(&self, n: usize) -> Result<Vec<(String, String)>>;
    /// Atomically increments the counter called `name` and returns its new value.
    fn next_counter(&self, name: &str) -> Result<u64>;
}

/// Converts values to and from their stored representation.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<String>;
    fn decode(&self, raw: &str) -> Result<Value>;
}

/// A change delivered to the callback registered with [`Collection::changed`].
///
/// `old` is a snapshot taken before the mutation; `new` is `None` when the key was deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub key: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}
