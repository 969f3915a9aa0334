//! Typed register values.

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// A decoded or to-be-encoded register value.
///
/// Serializes untagged, so JSON sees a plain number or string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer value.
    Int(i64),
    /// Scaled decimal value.
    Float(f64),
    /// Enum label.
    Enum(String),
}

impl Value {
    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Enum(_) => "string",
        }
    }

    /// Convert to i64 if possible.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    /// Convert to f64 if possible.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Enum(_) => None,
        }
    }

    /// Borrow the enum label.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Enum(v) => Some(v),
            _ => None,
        }
    }

    /// JSON representation.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Value::from(*v),
            Value::Enum(v) => serde_json::Value::from(v.as_str()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Enum(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Enum(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Enum(v)
    }
}

impl TryFrom<&serde_json::Value> for Value {
    type Error = ValueError;

    fn try_from(json: &serde_json::Value) -> Result<Self, Self::Error> {
        let found = match json {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Value::Int(i));
                }
                if let Some(f) = n.as_f64() {
                    return Ok(Value::Float(f));
                }
                "number"
            }
            serde_json::Value::String(s) => return Ok(Value::Enum(s.clone())),
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "bool",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        };
        Err(ValueError::TypeMismatch {
            expected: "scalar",
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion() {
        assert_eq!(Value::try_from(&json!(1)).unwrap(), Value::Int(1));
        assert_eq!(Value::try_from(&json!(-2.5)).unwrap(), Value::Float(-2.5));
        assert_eq!(
            Value::try_from(&json!("ECONOMY")).unwrap(),
            Value::Enum("ECONOMY".to_string())
        );
        assert!(matches!(
            Value::try_from(&json!([1, 2])),
            Err(ValueError::TypeMismatch { found: "array", .. })
        ));
        assert!(Value::try_from(&json!(null)).is_err());
    }

    #[test]
    fn test_untagged_serialization() {
        assert_eq!(serde_json::to_string(&Value::Int(251)).unwrap(), "251");
        assert_eq!(serde_json::to_string(&Value::Float(11.6)).unwrap(), "11.6");
        assert_eq!(
            serde_json::to_string(&Value::from("LUXURY")).unwrap(),
            "\"LUXURY\""
        );
        assert_eq!(Value::Float(11.6).to_json(), json!(11.6));
    }

    #[test]
    fn test_as_conversions() {
        assert_eq!(Value::Float(3.0).as_i64(), Some(3));
        assert_eq!(Value::Float(3.5).as_i64(), None);
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::from("X").as_str(), Some("X"));
        assert_eq!(Value::from("X").as_f64(), None);
    }
}
