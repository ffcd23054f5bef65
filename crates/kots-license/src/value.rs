//! Entitlement values.
//!
//! Entitlement signatures cover the rendered value text, so decoding must
//! preserve both the scalar type and whether the `value` key was present at
//! all. [`EntitlementValue`] is the typed scalar; [`FieldValue`] adds the
//! absent state generation-1 documents can carry.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{LicenseError, LicenseResult};

/// Rendering of a value that is not set.
pub const ABSENT_TEXT: &str = "<nil>";

/// Scalar type of an entitlement value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Integer,
    String,
    Boolean,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Integer => "Integer",
            Self::String => "String",
            Self::Boolean => "Boolean",
        })
    }
}

/// Typed entitlement value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementValue {
    Int(i64),
    String(String),
    Bool(bool),
}

impl Default for EntitlementValue {
    fn default() -> Self {
        Self::Int(0)
    }
}

impl EntitlementValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Integer,
            Self::String(_) => ValueKind::String,
            Self::Bool(_) => ValueKind::Boolean,
        }
    }

    /// Classify a raw JSON scalar.
    ///
    /// A leading quote makes it a string. Otherwise it is tried as a decimal
    /// `i64`, then as a boolean (`1`, `t`, `T`, `TRUE`, `true`, `True` and
    /// their false counterparts).
    pub fn from_json_scalar(raw: &str) -> LicenseResult<Self> {
        if raw.starts_with('"') {
            return serde_json::from_str::<String>(raw)
                .map(Self::String)
                .map_err(|_| LicenseError::UnknownValueType {
                    raw: raw.to_string(),
                });
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Ok(Self::Int(i));
        }
        match raw {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(Self::Bool(true)),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(Self::Bool(false)),
            _ => Err(LicenseError::UnknownValueType {
                raw: raw.to_string(),
            }),
        }
    }
}

impl fmt::Display for EntitlementValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::String(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for EntitlementValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for EntitlementValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for EntitlementValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for EntitlementValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl Serialize for EntitlementValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::String(s) => serializer.serialize_str(s),
            Self::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

struct EntitlementValueVisitor;

impl<'de> Visitor<'de> for EntitlementValueVisitor {
    type Value = EntitlementValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, integer or boolean entitlement value")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(EntitlementValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(EntitlementValue::String(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(EntitlementValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        i64::try_from(v)
            .map(EntitlementValue::Int)
            .map_err(|_| E::custom(format!("unknown license value type: {}", v)))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(EntitlementValue::Bool(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Err(E::custom(format!("unknown license value type: {}", v)))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Err(E::custom("unknown license value type: null"))
    }
}

impl<'de> Deserialize<'de> for EntitlementValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(EntitlementValueVisitor)
    }
}

/// Entitlement value that may be absent.
///
/// `Absent` means the `value` key was missing, which signs differently from
/// an empty string or zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldValue {
    Present(EntitlementValue),
    #[default]
    Absent,
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Typed payload, or `None` when absent.
    pub fn as_value(&self) -> Option<&EntitlementValue> {
        match self {
            Self::Present(value) => Some(value),
            Self::Absent => None,
        }
    }

    pub fn kind(&self) -> Option<ValueKind> {
        self.as_value().map(EntitlementValue::kind)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present(value) => value.fmt(f),
            Self::Absent => f.write_str(ABSENT_TEXT),
        }
    }
}

impl From<EntitlementValue> for FieldValue {
    fn from(value: EntitlementValue) -> Self {
        Self::Present(value)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Present(value) => value.serialize(serializer),
            Self::Absent => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    /// Only reached when the key is present; a missing key falls back to `Default`.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        EntitlementValue::deserialize(deserializer).map(Self::Present)
    }
}

/// Render an optional kind for reconciliation messages.
pub(crate) fn kind_text(kind: Option<ValueKind>) -> String {
    kind.map_or_else(|| ABSENT_TEXT.to_string(), |k| k.to_string())
}
