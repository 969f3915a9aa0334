//! Value codec: raw register bytes to typed values and back.
//!
//! Registers are little-endian. Read responses carry four value bytes no
//! matter how wide the item is, so decoding only looks at the first
//! `size` bytes of the payload.

use crate::definition::{DataItemDefinition, ValueType};
use crate::error::ValueError;
use crate::value::Value;

/// Why a decoded value is flagged.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidReason {
    /// Outside the declared bounds.
    OutOfRange {
        /// The decoded value.
        value: f64,
        /// Declared minimum.
        min: Option<f64>,
        /// Declared maximum.
        max: Option<f64>,
    },
    /// Raw code missing from the enum table. The value holds the raw integer.
    UnknownEnumCode(i64),
}

impl InvalidReason {
    /// The equivalent error, for diagnostics.
    pub fn to_error(&self) -> ValueError {
        match self {
            InvalidReason::OutOfRange { value, min, max } => ValueError::OutOfRange {
                value: *value,
                min: min.unwrap_or(f64::NEG_INFINITY),
                max: max.unwrap_or(f64::INFINITY),
            },
            InvalidReason::UnknownEnumCode(code) => ValueError::UnknownEnumCode(code.to_string()),
        }
    }
}

/// Result of decoding: the best-effort value and an optional flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Decoded value.
    pub value: Value,
    /// Set when the value is out of bounds or an unknown enum code.
    pub invalid: Option<InvalidReason>,
}

impl Decoded {
    /// True if the value is not flagged.
    pub fn is_valid(&self) -> bool {
        self.invalid.is_none()
    }
}

/// Decode a register payload.
///
/// Only a payload shorter than the item fails; bad codes and out-of-bounds
/// values come back flagged in [`Decoded::invalid`].
pub fn decode(def: &DataItemDefinition, payload: &[u8]) -> Result<Decoded, ValueError> {
    let raw = read_raw(def, payload)?;

    let decoded = match def.value_type {
        ValueType::Int => bounded(def, Value::Int(raw), raw as f64),
        ValueType::Float => {
            let value = to_engineering(def.scale, raw);
            bounded(def, Value::Float(value), value)
        }
        ValueType::Enum => match def.enum_label(raw) {
            Some(label) => Decoded {
                value: Value::Enum(label.to_string()),
                invalid: None,
            },
            None => Decoded {
                value: Value::Int(raw),
                invalid: Some(InvalidReason::UnknownEnumCode(raw)),
            },
        },
    };

    Ok(decoded)
}

/// Encode a value into `size` register bytes.
pub fn encode(def: &DataItemDefinition, value: &Value) -> Result<Vec<u8>, ValueError> {
    let raw = to_raw(def, value)?;
    Ok(raw.to_le_bytes()[..def.size.bytes()].to_vec())
}

/// Encode a value into the four-byte field of a write request.
///
/// Signed items are sign-extended, unsigned items zero-extended.
pub fn encode_register(def: &DataItemDefinition, value: &Value) -> Result<[u8; 4], ValueError> {
    let raw = to_raw(def, value)?;
    // Truncating to u32 keeps the two's complement bits of negative values
    Ok((raw as u32).to_le_bytes())
}

fn read_raw(def: &DataItemDefinition, payload: &[u8]) -> Result<i64, ValueError> {
    let n = def.size.bytes();
    if payload.len() < n {
        return Err(ValueError::PayloadTooShort {
            expected: n,
            actual: payload.len(),
        });
    }

    let mut buf = [0u8; 8];
    buf[..n].copy_from_slice(&payload[..n]);
    let unsigned = u64::from_le_bytes(buf);

    if def.signed {
        let shift = 64 - 8 * n as u32;
        Ok(((unsigned << shift) as i64) >> shift)
    } else {
        Ok(unsigned as i64)
    }
}

/// Divisor for scales that are reciprocals of an integer (0.1, 0.01, ...).
fn scale_divisor(scale: f64) -> Option<f64> {
    let factor = 1.0 / scale;
    let rounded = factor.round();
    (rounded >= 1.0 && (factor - rounded).abs() < 1e-9).then_some(rounded)
}

fn to_engineering(scale: f64, raw: i64) -> f64 {
    match scale_divisor(scale) {
        Some(divisor) => raw as f64 / divisor,
        None => raw as f64 * scale,
    }
}

fn from_engineering(scale: f64, value: f64) -> f64 {
    match scale_divisor(scale) {
        Some(divisor) => (value * divisor).round(),
        None => (value / scale).round(),
    }
}

fn bounded(def: &DataItemDefinition, value: Value, numeric: f64) -> Decoded {
    let invalid = (!def.in_bounds(numeric)).then(|| InvalidReason::OutOfRange {
        value: numeric,
        min: def.min,
        max: def.max,
    });
    Decoded { value, invalid }
}

fn check_bounds(def: &DataItemDefinition, value: f64) -> Result<(), ValueError> {
    if def.in_bounds(value) {
        Ok(())
    } else {
        Err(ValueError::OutOfRange {
            value,
            min: def.min.unwrap_or(f64::NEG_INFINITY),
            max: def.max.unwrap_or(f64::INFINITY),
        })
    }
}

fn mismatch(def: &DataItemDefinition, value: &Value) -> ValueError {
    ValueError::TypeMismatch {
        expected: def.value_type.as_str(),
        found: value.type_name(),
    }
}

fn to_raw(def: &DataItemDefinition, value: &Value) -> Result<i64, ValueError> {
    let raw = match def.value_type {
        ValueType::Enum => match value {
            Value::Enum(label) => def
                .enum_code(label)
                .ok_or_else(|| ValueError::UnknownEnumCode(label.clone()))?,
            Value::Int(code) if def.enum_label(*code).is_some() => *code,
            Value::Int(code) => return Err(ValueError::UnknownEnumCode(code.to_string())),
            Value::Float(_) => return Err(mismatch(def, value)),
        },
        ValueType::Int => {
            let v = value.as_i64().ok_or_else(|| mismatch(def, value))?;
            check_bounds(def, v as f64)?;
            v
        }
        ValueType::Float => {
            let v = value
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| mismatch(def, value))?;
            check_bounds(def, v)?;
            let scaled = from_engineering(def.scale, v);
            if scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
                let (min, max) = def.raw_range();
                return Err(ValueError::OutOfRange {
                    value: v,
                    min: to_engineering(def.scale, min),
                    max: to_engineering(def.scale, max),
                });
            }
            scaled as i64
        }
    };

    let (min, max) = def.raw_range();
    if raw < min || raw > max {
        return Err(ValueError::OutOfRange {
            value: value.as_f64().unwrap_or(raw as f64),
            min: to_engineering(def.scale, min),
            max: to_engineering(def.scale, max),
        });
    }

    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DataItemRecord;
    use std::collections::BTreeMap;

    fn def(value_type: ValueType, scale: f64, size: u8, signed: bool) -> DataItemDefinition {
        let mappings = (value_type == ValueType::Enum).then(|| {
            BTreeMap::from([
                (0, "ECONOMY".to_string()),
                (1, "NORMAL".to_string()),
                (2, "LUXURY".to_string()),
            ])
        });
        DataItemDefinition::from_record(DataItemRecord {
            name: "item".to_string(),
            address: 1,
            value_type,
            scale,
            size,
            signed,
            mappings,
            min: None,
            max: None,
        })
        .unwrap()
    }

    #[test]
    fn test_outdoor_temperature() {
        let d = def(ValueType::Float, 0.1, 2, true);
        let decoded = decode(&d, &116i16.to_le_bytes()).unwrap();
        assert_eq!(decoded.value, Value::Float(11.6));
        assert!(decoded.is_valid());

        assert_eq!(encode(&d, &Value::Float(11.6)).unwrap(), 116i16.to_le_bytes().to_vec());
    }

    #[test]
    fn test_sign_extension() {
        let d = def(ValueType::Float, 0.1, 2, true);
        let decoded = decode(&d, &(-52i16).to_le_bytes()).unwrap();
        assert_eq!(decoded.value, Value::Float(-5.2));

        let d = def(ValueType::Int, 1.0, 1, true);
        assert_eq!(decode(&d, &[0xFF]).unwrap().value, Value::Int(-1));

        let d = def(ValueType::Int, 1.0, 1, false);
        assert_eq!(decode(&d, &[0xFF]).unwrap().value, Value::Int(255));
    }

    #[test]
    fn test_four_byte_payload_for_narrow_item() {
        // Read responses always carry four bytes
        let d = def(ValueType::Enum, 1.0, 1, false);
        let decoded = decode(&d, &[0x00, 0x00, 0x44, 0x02]).unwrap();
        assert_eq!(decoded.value, Value::Enum("ECONOMY".to_string()));
    }

    #[test]
    fn test_payload_too_short() {
        let d = def(ValueType::Int, 1.0, 4, false);
        assert_eq!(
            decode(&d, &[0x01, 0x02]),
            Err(ValueError::PayloadTooShort {
                expected: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn test_unknown_enum_code_flagged() {
        let d = def(ValueType::Enum, 1.0, 1, false);
        let decoded = decode(&d, &[7]).unwrap();
        assert_eq!(decoded.value, Value::Int(7));
        assert_eq!(decoded.invalid, Some(InvalidReason::UnknownEnumCode(7)));
        assert_eq!(
            decoded.invalid.unwrap().to_error(),
            ValueError::UnknownEnumCode("7".to_string())
        );
    }

    #[test]
    fn test_out_of_bounds_flagged_not_clamped() {
        let mut d = def(ValueType::Int, 1.0, 2, false);
        d.max = Some(100.0);
        let decoded = decode(&d, &[200, 0]).unwrap();
        assert_eq!(decoded.value, Value::Int(200));
        assert!(matches!(
            decoded.invalid,
            Some(InvalidReason::OutOfRange { value, .. }) if value == 200.0
        ));
    }

    #[test]
    fn test_encode_enum() {
        let d = def(ValueType::Enum, 1.0, 1, false);
        assert_eq!(encode(&d, &Value::from("ECONOMY")).unwrap(), vec![0]);
        assert_eq!(encode(&d, &Value::from("luxury")).unwrap(), vec![2]);
        assert_eq!(encode(&d, &Value::Int(1)).unwrap(), vec![1]);
        assert_eq!(
            encode(&d, &Value::from("BOGUS")),
            Err(ValueError::UnknownEnumCode("BOGUS".to_string()))
        );
        assert_eq!(
            encode(&d, &Value::Int(9)),
            Err(ValueError::UnknownEnumCode("9".to_string()))
        );
        assert!(matches!(
            encode(&d, &Value::Float(1.5)),
            Err(ValueError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_encode_type_mismatch() {
        let d = def(ValueType::Int, 1.0, 2, false);
        assert_eq!(
            encode(&d, &Value::from("ten")),
            Err(ValueError::TypeMismatch {
                expected: "int",
                found: "string"
            })
        );
        assert!(encode(&d, &Value::Float(1.5)).is_err());
        assert_eq!(encode(&d, &Value::Float(3.0)).unwrap(), vec![3, 0]);
    }

    #[test]
    fn test_encode_out_of_range() {
        let d = def(ValueType::Int, 1.0, 1, false);
        assert!(matches!(
            encode(&d, &Value::Int(256)),
            Err(ValueError::OutOfRange { .. })
        ));
        assert!(matches!(
            encode(&d, &Value::Int(-1)),
            Err(ValueError::OutOfRange { .. })
        ));

        let mut d = def(ValueType::Float, 0.1, 2, true);
        d.min = Some(-10.0);
        d.max = Some(10.0);
        assert!(matches!(
            encode(&d, &Value::Float(10.5)),
            Err(ValueError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_encode_register_extension() {
        let d = def(ValueType::Int, 1.0, 2, true);
        assert_eq!(encode_register(&d, &Value::Int(-2)).unwrap(), [0xFE, 0xFF, 0xFF, 0xFF]);

        let d = def(ValueType::Int, 1.0, 1, false);
        assert_eq!(encode_register(&d, &Value::Int(1)).unwrap(), [0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_non_reciprocal_scale() {
        let d = def(ValueType::Float, 2.5, 2, false);
        assert_eq!(decode(&d, &[6, 0]).unwrap().value, Value::Float(15.0));
        assert_eq!(encode(&d, &Value::Float(15.0)).unwrap(), vec![6, 0]);
    }
}
