// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tagged cache values.
//!
//! A [`DataValue`] is the unit stored under a composite key. Its variant tag
//! ([`ValueType`]) travels next to the ciphertext at rest so the value can be
//! rebuilt after decryption; the plaintext itself holds only the variant's
//! payload in canonical JSON form.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of a stream value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub id: String,
    pub fields: BTreeMap<String, String>,
}

/// A sorted-set member with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

/// A named coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoMember {
    pub member: String,
    pub longitude: f64,
    pub latitude: f64,
}

/// A cache value.
///
/// Serialized with an explicit tag, e.g. `{"type":"string","value":"a"}`.
///
/// # Example
///
/// ```
/// use sealed_cache::{DataValue, ValueType};
///
/// let value = DataValue::String("a".into());
/// assert_eq!(value.value_type(), ValueType::String);
///
/// let json = serde_json::to_string(&value).unwrap();
/// assert_eq!(json, r#"{"type":"string","value":"a"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DataValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<String>),
    Set(BTreeSet<String>),
    Hash(BTreeMap<String, String>),
    Stream(Vec<StreamEntry>),
    #[serde(rename = "zset")]
    SortedSet(Vec<ScoredMember>),
    /// Probabilistic set, kept as its observed members.
    #[serde(rename = "hll")]
    HyperLogLog(BTreeSet<String>),
    Geo(Vec<GeoMember>),
    Json(Value),
}

/// Variant tag of a [`DataValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Null,
    Boolean,
    Integer,
    Float,
    String,
    List,
    Set,
    Hash,
    Stream,
    #[serde(rename = "zset")]
    SortedSet,
    #[serde(rename = "hll")]
    HyperLogLog,
    Geo,
    Json,
}

impl ValueType {
    pub const ALL: [ValueType; 13] = [
        ValueType::Null,
        ValueType::Boolean,
        ValueType::Integer,
        ValueType::Float,
        ValueType::String,
        ValueType::List,
        ValueType::Set,
        ValueType::Hash,
        ValueType::Stream,
        ValueType::SortedSet,
        ValueType::HyperLogLog,
        ValueType::Geo,
        ValueType::Json,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::List => "list",
            Self::Set => "set",
            Self::Hash => "hash",
            Self::Stream => "stream",
            Self::SortedSet => "zset",
            Self::HyperLogLog => "hll",
            Self::Geo => "geo",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored tag names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value type '{0}'")]
pub struct UnknownValueType(pub String);

impl FromStr for ValueType {
    type Err = UnknownValueType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValueType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownValueType(s.to_string()))
    }
}

impl DataValue {
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Integer(_) => ValueType::Integer,
            Self::Float(_) => ValueType::Float,
            Self::String(_) => ValueType::String,
            Self::List(_) => ValueType::List,
            Self::Set(_) => ValueType::Set,
            Self::Hash(_) => ValueType::Hash,
            Self::Stream(_) => ValueType::Stream,
            Self::SortedSet(_) => ValueType::SortedSet,
            Self::HyperLogLog(_) => ValueType::HyperLogLog,
            Self::Geo(_) => ValueType::Geo,
            Self::Json(_) => ValueType::Json,
        }
    }

    /// Canonical byte form of the payload, without the tag.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Null => serde_json::to_vec(&Value::Null),
            Self::Boolean(v) => serde_json::to_vec(v),
            Self::Integer(v) => serde_json::to_vec(v),
            Self::Float(v) => serde_json::to_vec(v),
            Self::String(v) => serde_json::to_vec(v),
            Self::List(v) => serde_json::to_vec(v),
            Self::Set(v) | Self::HyperLogLog(v) => serde_json::to_vec(v),
            Self::Hash(v) => serde_json::to_vec(v),
            Self::Stream(v) => serde_json::to_vec(v),
            Self::SortedSet(v) => serde_json::to_vec(v),
            Self::Geo(v) => serde_json::to_vec(v),
            Self::Json(v) => serde_json::to_vec(v),
        }
    }

    /// Rebuild a value from its tag and canonical bytes.
    ///
    /// Fails if the bytes do not parse as the payload of `value_type`.
    pub fn from_canonical_bytes(value_type: ValueType, bytes: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match value_type {
            ValueType::Null => {
                serde_json::from_slice::<()>(bytes)?;
                Self::Null
            }
            ValueType::Boolean => Self::Boolean(serde_json::from_slice(bytes)?),
            ValueType::Integer => Self::Integer(serde_json::from_slice(bytes)?),
            ValueType::Float => Self::Float(serde_json::from_slice(bytes)?),
            ValueType::String => Self::String(serde_json::from_slice(bytes)?),
            ValueType::List => Self::List(serde_json::from_slice(bytes)?),
            ValueType::Set => Self::Set(serde_json::from_slice(bytes)?),
            ValueType::Hash => Self::Hash(serde_json::from_slice(bytes)?),
            ValueType::Stream => Self::Stream(serde_json::from_slice(bytes)?),
            ValueType::SortedSet => Self::SortedSet(serde_json::from_slice(bytes)?),
            ValueType::HyperLogLog => Self::HyperLogLog(serde_json::from_slice(bytes)?),
            ValueType::Geo => Self::Geo(serde_json::from_slice(bytes)?),
            ValueType::Json => Self::Json(serde_json::from_slice(bytes)?),
        })
    }

    /// Approximate in-memory footprint, used for metrics.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.to_canonical_bytes().map(|b| b.len()).unwrap_or_default()
    }
}

impl From<&str> for DataValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for DataValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Value> for DataValue {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}
