//! Decoding inverts encoding for every register shape.

use nibegw_model::{codec, DataItemDefinition, DataItemRecord, Value, ValueType};

fn definition(value_type: ValueType, scale: f64, size: u8, signed: bool) -> DataItemDefinition {
    DataItemDefinition::from_record(DataItemRecord {
        name: format!("item-{}-{}-{}-{}", value_type, scale, size, signed),
        address: 40000,
        value_type,
        scale,
        size,
        signed,
        mappings: None,
        min: None,
        max: None,
    })
    .unwrap()
}

/// Raw edges of the register: min, -1, 0, 1, max.
fn raw_edges(def: &DataItemDefinition) -> Vec<i64> {
    let (min, max) = def.raw_range();
    let mut raws = vec![min, 0, 1, max];
    if def.signed {
        raws.push(-1);
    }
    raws
}

fn shapes() -> Vec<DataItemDefinition> {
    let mut defs = Vec::new();
    for size in [1u8, 2, 4] {
        for signed in [true, false] {
            defs.push(definition(ValueType::Int, 1.0, size, signed));
            for scale in [0.1, 0.01, 2.5] {
                defs.push(definition(ValueType::Float, scale, size, signed));
            }
        }
    }
    defs
}

#[test]
fn test_decode_inverts_encode_at_raw_edges() {
    for def in shapes() {
        for raw in raw_edges(&def) {
            let bytes = raw.to_le_bytes();
            let value = codec::decode(&def, &bytes[..def.size.bytes()]).unwrap();
            assert!(value.is_valid(), "{} raw {}", def.id, raw);

            let payload = codec::encode(&def, &value.value).unwrap();
            assert_eq!(payload, &bytes[..def.size.bytes()], "{} raw {}", def.id, raw);
            assert_eq!(
                codec::decode(&def, &payload).unwrap().value,
                value.value,
                "{} raw {}",
                def.id,
                raw
            );

            let register = codec::encode_register(&def, &value.value).unwrap();
            assert_eq!(
                codec::decode(&def, &register).unwrap().value,
                value.value,
                "{} raw {} via register",
                def.id,
                raw
            );
        }
    }
}

#[test]
fn test_value_kinds_by_type() {
    for def in shapes() {
        let decoded = codec::decode(&def, &[1, 0, 0, 0]).unwrap();
        match def.value_type {
            ValueType::Int => assert_eq!(decoded.value, Value::Int(1)),
            _ => assert!(matches!(decoded.value, Value::Float(_))),
        }
    }
}

#[test]
fn test_one_past_raw_edges_rejected() {
    for def in shapes() {
        let (min, max) = def.raw_range();
        for raw in [min - 1, max + 1] {
            let value = match def.value_type {
                ValueType::Int => Value::Int(raw),
                _ => Value::Float(raw as f64 * def.scale),
            };
            assert!(
                codec::encode(&def, &value).is_err(),
                "{} accepted raw {}",
                def.id,
                raw
            );
        }
    }
}
