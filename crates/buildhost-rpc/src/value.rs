//! Loosely-typed scalar values crossing the RPC boundary.
//!
//! The wire protocol only ever carries four shapes: string, integer,
//! boolean, and null (which doubles as the void result). A closed enum
//! keeps the contract explicit instead of passing open `serde_json::Value`
//! trees around.

use crate::error::{Result, RpcError};
use serde::{Deserialize, Serialize};

/// A scalar argument or result value.
///
/// Serializes untagged, so the JSON form is the plain scalar
/// (`null`, `true`, `42`, `"text"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcValue {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
}

impl Default for RpcValue {
    fn default() -> Self {
        RpcValue::Null
    }
}

impl RpcValue {
    /// Name of the contained shape, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            RpcValue::Null => "null",
            RpcValue::Bool(_) => "bool",
            RpcValue::Int(_) => "int",
            RpcValue::String(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RpcValue::Null)
    }

    /// Consume the value as a string.
    pub fn into_string(self) -> Result<String> {
        match self {
            RpcValue::String(s) => Ok(s),
            other => Err(RpcError::TypeMismatch {
                expected: "string",
                actual: other.type_name(),
            }),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RpcValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            RpcValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RpcValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for RpcValue {
    fn from(value: &str) -> Self {
        RpcValue::String(value.to_string())
    }
}

impl From<String> for RpcValue {
    fn from(value: String) -> Self {
        RpcValue::String(value)
    }
}

impl From<i64> for RpcValue {
    fn from(value: i64) -> Self {
        RpcValue::Int(value)
    }
}

impl From<i32> for RpcValue {
    fn from(value: i32) -> Self {
        RpcValue::Int(value as i64)
    }
}

impl From<bool> for RpcValue {
    fn from(value: bool) -> Self {
        RpcValue::Bool(value)
    }
}

impl<T: Into<RpcValue>> From<Option<T>> for RpcValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => RpcValue::Null,
        }
    }
}

/// Conversion from a wire value into the caller's expected type.
///
/// A mismatch is a hard error (`RpcError::TypeMismatch`); callers never
/// receive a silently-coerced value.
pub trait FromRpcValue: Sized {
    fn from_rpc_value(value: RpcValue) -> Result<Self>;
}

impl FromRpcValue for RpcValue {
    fn from_rpc_value(value: RpcValue) -> Result<Self> {
        Ok(value)
    }
}

impl FromRpcValue for String {
    fn from_rpc_value(value: RpcValue) -> Result<Self> {
        value.into_string()
    }
}

impl FromRpcValue for i64 {
    fn from_rpc_value(value: RpcValue) -> Result<Self> {
        value.as_int().ok_or(RpcError::TypeMismatch {
            expected: "int",
            actual: value.type_name(),
        })
    }
}

impl FromRpcValue for i32 {
    fn from_rpc_value(value: RpcValue) -> Result<Self> {
        let wide = i64::from_rpc_value(value)?;
        i32::try_from(wide).map_err(|_| RpcError::TypeMismatch {
            expected: "i32",
            actual: "int out of range",
        })
    }
}

impl FromRpcValue for bool {
    fn from_rpc_value(value: RpcValue) -> Result<Self> {
        value.as_bool().ok_or(RpcError::TypeMismatch {
            expected: "bool",
            actual: value.type_name(),
        })
    }
}

/// Void results arrive as `Null`.
impl FromRpcValue for () {
    fn from_rpc_value(value: RpcValue) -> Result<Self> {
        match value {
            RpcValue::Null => Ok(()),
            other => Err(RpcError::TypeMismatch {
                expected: "null",
                actual: other.type_name(),
            }),
        }
    }
}
