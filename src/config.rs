//! Typed configuration, consumed by [`crate::supervisor::Supervisor`].
//!
//! The `.info`-file parsers that produce a raw configuration in the wider
//! library are out of scope for this crate (see §1); what this module
//! specifies is the boundary they are expected to produce: a
//! [`ConfigSource`] yielding a [`ParamMap`] of typed [`ParamValue`]s. Tests
//! (and small standalone tools) can use [`MapConfigSource`], an in-memory
//! literal, without needing any particular on-disk grammar.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::random::RandomSourceDescriptor;

/// A single configuration value, as it would be produced by parsing an
/// `.info` file or equivalent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    String(String),
    Int(i64),
    Path(PathBuf),
    Bool(bool),
}

impl ParamValue {
    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::String(_) => "string",
            ParamValue::Int(_) => "int",
            ParamValue::Path(_) => "path",
            ParamValue::Bool(_) => "bool",
        }
    }
}

/// A typed, validated parameter map.
///
/// Construction from a [`ConfigSource`] does no filesystem mutation; it
/// only validates the shape of the values present. Per §4.7, an unknown key
/// is always an error and omitted optional keys fall back to the documented
/// defaults.
#[derive(Debug, Clone, Default)]
pub struct ParamMap {
    values: BTreeMap<String, ParamValue>,
}

/// The configuration keys the Supervisor understands. Any other key
/// encountered while building a [`ParamMap`] from a [`ConfigSource`] is a
/// [`CoreError::ConfigError`].
pub const RECOGNIZED_KEYS: &[&str] = &[
    "sid",
    "name",
    "description",
    "nopart",
    "statdist",
    "directory",
    "randomness",
    "certainty",
    "bullboard",
    "max_wait_millis",
    "max_byte_length",
    "max_recursion_depth",
];

impl ParamMap {
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let raw = source.load()?;
        for key in raw.keys() {
            if !RECOGNIZED_KEYS.contains(&key.as_str()) {
                return Err(CoreError::config(format!("unrecognized configuration key '{key}'")));
            }
        }
        Ok(Self { values: raw })
    }

    fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn require_string(&self, key: &str) -> Result<String> {
        match self.get(key) {
            Some(ParamValue::String(s)) => Ok(s.clone()),
            Some(other) => Err(CoreError::config(format!(
                "key '{key}' must be a string, got {}",
                other.type_name()
            ))),
            None => Err(CoreError::config(format!("missing required key '{key}'"))),
        }
    }

    pub fn string_or(&self, key: &str, default: impl Into<String>) -> Result<String> {
        match self.get(key) {
            Some(ParamValue::String(s)) => Ok(s.clone()),
            Some(other) => Err(CoreError::config(format!(
                "key '{key}' must be a string, got {}",
                other.type_name()
            ))),
            None => Ok(default.into()),
        }
    }

    pub fn require_u32(&self, key: &str) -> Result<u32> {
        match self.get(key) {
            Some(ParamValue::Int(i)) => u32::try_from(*i)
                .map_err(|_| CoreError::config(format!("key '{key}' does not fit in u32: {i}"))),
            Some(other) => Err(CoreError::config(format!(
                "key '{key}' must be an int, got {}",
                other.type_name()
            ))),
            None => Err(CoreError::config(format!("missing required key '{key}'"))),
        }
    }

    pub fn u32_or(&self, key: &str, default: u32) -> Result<u32> {
        match self.get(key) {
            Some(ParamValue::Int(i)) => u32::try_from(*i)
                .map_err(|_| CoreError::config(format!("key '{key}' does not fit in u32: {i}"))),
            Some(other) => Err(CoreError::config(format!(
                "key '{key}' must be an int, got {}",
                other.type_name()
            ))),
            None => Ok(default),
        }
    }

    pub fn i64_or(&self, key: &str, default: i64) -> Result<i64> {
        match self.get(key) {
            Some(ParamValue::Int(i)) => Ok(*i),
            Some(other) => Err(CoreError::config(format!(
                "key '{key}' must be an int, got {}",
                other.type_name()
            ))),
            None => Ok(default),
        }
    }

    pub fn path_or(&self, key: &str, default: PathBuf) -> Result<PathBuf> {
        match self.get(key) {
            Some(ParamValue::Path(p)) => Ok(p.clone()),
            Some(ParamValue::String(s)) => Ok(PathBuf::from(s)),
            Some(other) => Err(CoreError::config(format!(
                "key '{key}' must be a path, got {}",
                other.type_name()
            ))),
            None => Ok(default),
        }
    }

    /// Parses the `randomness` key, defaulting to a device reader over
    /// `/dev/urandom` (§6 defaults).
    pub fn random_source_descriptor(&self) -> Result<RandomSourceDescriptor> {
        match self.get("randomness") {
            None => Ok(RandomSourceDescriptor::default_device()),
            Some(ParamValue::String(s)) if s == "device" => Ok(RandomSourceDescriptor::default_device()),
            Some(ParamValue::Path(p)) => Ok(RandomSourceDescriptor::Device { path: p.clone() }),
            Some(other) => Err(CoreError::config(format!(
                "key 'randomness' has an unparseable descriptor: {other:?}"
            ))),
        }
    }
}

/// Produces a [`ParamMap`]'s raw key/value pairs from some external store
/// (an `.info` file, environment variables, a CLI, ...).
///
/// This crate defines the trait boundary only; parsing any particular
/// on-disk grammar is out of scope (see §1).
pub trait ConfigSource {
    fn load(&self) -> Result<BTreeMap<String, ParamValue>>;
}

/// An in-memory [`ConfigSource`] literal, primarily for tests and small
/// embedding tools that already have their parameters as Rust values.
#[derive(Debug, Clone, Default)]
pub struct MapConfigSource {
    values: BTreeMap<String, ParamValue>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

impl ConfigSource for MapConfigSource {
    fn load(&self) -> Result<BTreeMap<String, ParamValue>> {
        Ok(self.values.clone())
    }
}
