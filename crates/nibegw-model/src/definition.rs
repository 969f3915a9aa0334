//! Data item definitions and the records they are loaded from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

// ============================================================================
// Type Descriptors
// ============================================================================

/// How a register's raw integer is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Plain integer.
    Int,
    /// Integer scaled to a decimal quantity.
    Float,
    /// Integer code with a label table.
    Enum,
}

impl ValueType {
    /// Returns the type as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Enum => "enum",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Register width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemSize {
    /// 8-bit register.
    One,
    /// 16-bit register.
    Two,
    /// 32-bit register.
    Four,
}

impl ItemSize {
    /// Width in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            ItemSize::One => 1,
            ItemSize::Two => 2,
            ItemSize::Four => 4,
        }
    }
}

impl TryFrom<u8> for ItemSize {
    type Error = u8;

    fn try_from(size: u8) -> Result<Self, Self::Error> {
        match size {
            1 => Ok(ItemSize::One),
            2 => Ok(ItemSize::Two),
            4 => Ok(ItemSize::Four),
            other => Err(other),
        }
    }
}

// ============================================================================
// Catalog Records
// ============================================================================

fn default_scale() -> f64 {
    1.0
}

fn default_size() -> u8 {
    2
}

/// One entry of the catalog source, as written in YAML or JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItemRecord {
    /// Unique item name, conventionally `<description>-<address>`.
    pub name: String,
    /// Register address.
    pub address: u16,
    /// Value type.
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Raw value multiplied by this gives the engineering value.
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Register width in bytes.
    #[serde(default = "default_size")]
    pub size: u8,
    /// Two's complement when true.
    #[serde(default)]
    pub signed: bool,
    /// Enum code table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings: Option<BTreeMap<i64, String>>,
    /// Lower bound in engineering units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound in engineering units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

// ============================================================================
// Definitions
// ============================================================================

/// A validated data item. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DataItemDefinition {
    /// Unique item name.
    pub id: String,
    /// Register address.
    pub address: u16,
    /// Value type.
    pub value_type: ValueType,
    /// Scale factor; 1.0 for int and enum items.
    pub scale: f64,
    /// Register width.
    pub size: ItemSize,
    /// Two's complement when true.
    pub signed: bool,
    /// Enum code table; empty unless `value_type` is `Enum`.
    pub enum_codes: BTreeMap<i64, String>,
    /// Lower bound in engineering units.
    pub min: Option<f64>,
    /// Upper bound in engineering units.
    pub max: Option<f64>,
}

impl DataItemDefinition {
    /// Validate a record.
    pub fn from_record(record: DataItemRecord) -> Result<Self, SchemaError> {
        let name = record.name;

        let size = ItemSize::try_from(record.size).map_err(|size| SchemaError::InvalidSize {
            name: name.clone(),
            size,
        })?;

        let scale_ok = match record.value_type {
            ValueType::Float => record.scale.is_finite() && record.scale > 0.0,
            ValueType::Int | ValueType::Enum => record.scale == 1.0,
        };
        if !scale_ok {
            return Err(SchemaError::InvalidScale {
                name,
                scale: record.scale,
            });
        }

        let enum_codes = match (record.value_type, record.mappings) {
            (ValueType::Enum, Some(codes)) if !codes.is_empty() => codes,
            (ValueType::Enum, _) => return Err(SchemaError::MissingEnumCodes(name)),
            (_, Some(codes)) if !codes.is_empty() => {
                return Err(SchemaError::UnexpectedEnumCodes(name))
            }
            (_, _) => BTreeMap::new(),
        };

        if let (Some(min), Some(max)) = (record.min, record.max) {
            if min > max {
                return Err(SchemaError::InvalidBounds { name, min, max });
            }
        }

        Ok(DataItemDefinition {
            id: name,
            address: record.address,
            value_type: record.value_type,
            scale: record.scale,
            size,
            signed: record.signed,
            enum_codes,
            min: record.min,
            max: record.max,
        })
    }

    /// Smallest and largest raw integer the register can hold.
    pub fn raw_range(&self) -> (i64, i64) {
        let bits = 8 * self.size.bytes() as u32;
        if self.signed {
            (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
        } else {
            (0, (1i64 << bits) - 1)
        }
    }

    /// Label for an enum code.
    pub fn enum_label(&self, code: i64) -> Option<&str> {
        self.enum_codes.get(&code).map(String::as_str)
    }

    /// Code for an enum label, matched exactly first and then ignoring ASCII case.
    pub fn enum_code(&self, label: &str) -> Option<i64> {
        let exact = self
            .enum_codes
            .iter()
            .find(|(_, l)| l.as_str() == label)
            .map(|(code, _)| *code);

        exact.or_else(|| {
            self.enum_codes
                .iter()
                .find(|(_, l)| l.eq_ignore_ascii_case(label))
                .map(|(code, _)| *code)
        })
    }

    /// True if `value` lies within the declared bounds.
    pub fn in_bounds(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}
