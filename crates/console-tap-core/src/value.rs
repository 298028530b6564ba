//! Remote value references and their materialized local form.

use std::fmt;

use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::{Number, Value};

/// Text used wherever a value could not be resolved.
pub const UNRESOLVABLE_TEXT: &str = "[unserializable object]";

/// A JSON scalar carried inline by the remote runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    /// Keeps the remote textual form, so integers print without a fraction.
    Number(Number),
    String(String),
}

/// A value as advertised by the remote runtime.
///
/// Produced by the collaborator once per event argument or property
/// and consumed exactly once by the materializer.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteValueRef {
    /// Inline scalar value.
    Primitive(Scalar),
    /// Human-readable description of a value that has no JSON form
    /// (functions, symbols, `NaN`, bigints, ...).
    Description(String),
    /// Opaque handle to a remote object; its properties need a round-trip.
    ObjectHandle(String),
    /// `undefined` or no value at all.
    Undefined,
}

impl RemoteValueRef {
    /// Wrap an inline JSON value.
    ///
    /// Scalars stay primitive; composite values (only seen when the runtime
    /// serializes by value) are kept as their compact JSON text.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Primitive(Scalar::Null),
            Value::Bool(b) => Self::Primitive(Scalar::Bool(b)),
            Value::Number(n) => Self::Primitive(Scalar::Number(n)),
            Value::String(s) => Self::Primitive(Scalar::String(s)),
            composite @ (Value::Array(_) | Value::Object(_)) => {
                Self::Description(composite.to_string())
            }
        }
    }

    /// Shorthand for a string primitive.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::Primitive(Scalar::String(s.into()))
    }

    /// Shorthand for an object handle.
    #[must_use]
    pub fn handle(id: impl Into<String>) -> Self {
        Self::ObjectHandle(id.into())
    }
}

impl From<i64> for RemoteValueRef {
    fn from(n: i64) -> Self {
        Self::Primitive(Scalar::Number(n.into()))
    }
}

impl From<bool> for RemoteValueRef {
    fn from(b: bool) -> Self {
        Self::Primitive(Scalar::Bool(b))
    }
}

/// A fully local, JSON-shaped value.
///
/// Owns its sub-values exclusively: a tree, never a graph.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterializedValue {
    String(String),
    Number(Number),
    Bool(bool),
    Null,
    /// Property name to value, in the order the runtime listed them.
    Mapping(Vec<(String, MaterializedValue)>),
    /// The value (or subtree) could not be resolved.
    Unresolvable,
}

impl MaterializedValue {
    /// Look up a mapping entry by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Mapping(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<Scalar> for MaterializedValue {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Null => Self::Null,
            Scalar::Bool(b) => Self::Bool(b),
            Scalar::Number(n) => Self::Number(n),
            Scalar::String(s) => Self::String(s),
        }
    }
}

impl Serialize for MaterializedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Number(n) => n.serialize(serializer),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Null => serializer.serialize_unit(),
            Self::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Unresolvable => serializer.serialize_str(UNRESOLVABLE_TEXT),
        }
    }
}

/// Message rendering: strings print raw, mappings print as compact JSON.
impl fmt::Display for MaterializedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null => f.write_str("null"),
            Self::Mapping(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
            Self::Unresolvable => f.write_str(UNRESOLVABLE_TEXT),
        }
    }
}
