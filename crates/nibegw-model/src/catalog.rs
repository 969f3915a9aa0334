//! The data item catalog.

use std::collections::HashMap;
use std::path::Path;

use crate::definition::{DataItemDefinition, DataItemRecord};
use crate::error::SchemaError;

/// Immutable set of data item definitions, indexed by name and by address.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<DataItemDefinition>,
    by_name: HashMap<String, usize>,
    by_address: HashMap<u16, usize>,
}

impl Catalog {
    /// Validate and index a list of records.
    pub fn from_records(records: Vec<DataItemRecord>) -> Result<Self, SchemaError> {
        let mut catalog = Catalog {
            items: Vec::with_capacity(records.len()),
            by_name: HashMap::with_capacity(records.len()),
            by_address: HashMap::with_capacity(records.len()),
        };

        for record in records {
            let def = DataItemDefinition::from_record(record)?;
            let index = catalog.items.len();

            if catalog.by_name.contains_key(&def.id) {
                return Err(SchemaError::DuplicateName(def.id));
            }
            if let Some(&first) = catalog.by_address.get(&def.address) {
                return Err(SchemaError::DuplicateAddress {
                    address: def.address,
                    first: catalog.items[first].id.clone(),
                    second: def.id,
                });
            }

            catalog.by_name.insert(def.id.clone(), index);
            catalog.by_address.insert(def.address, index);
            catalog.items.push(def);
        }

        Ok(catalog)
    }

    /// Parse a YAML list of records.
    pub fn from_yaml_str(source: &str) -> Result<Self, SchemaError> {
        let records: Vec<DataItemRecord> =
            serde_yaml::from_str(source).map_err(|e| SchemaError::Parse(e.to_string()))?;
        Self::from_records(records)
    }

    /// Parse a JSON list of records.
    pub fn from_json_str(source: &str) -> Result<Self, SchemaError> {
        let records: Vec<DataItemRecord> =
            serde_json::from_str(source).map_err(|e| SchemaError::Parse(e.to_string()))?;
        Self::from_records(records)
    }

    /// Load a catalog file. `.json` files are parsed as JSON, anything else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let catalog = if is_json {
            Self::from_json_str(&source)?
        } else {
            Self::from_yaml_str(&source)?
        };

        log::info!("loaded {} data items from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Look up an item by name.
    pub fn by_name(&self, name: &str) -> Option<&DataItemDefinition> {
        self.by_name.get(name).map(|&i| &self.items[i])
    }

    /// Look up an item by register address.
    pub fn by_address(&self, address: u16) -> Option<&DataItemDefinition> {
        self.by_address.get(&address).map(|&i| &self.items[i])
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the catalog holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over the items in load order.
    pub fn iter(&self) -> impl Iterator<Item = &DataItemDefinition> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
- name: bt1-outdoor-temperature-40004
  address: 40004
  type: float
  scale: 0.1
  signed: true
- name: hot-water-comfort-mode-47041
  address: 47041
  type: enum
  size: 1
  mappings:
    0: ECONOMY
    1: NORMAL
    2: LUXURY
"#;

    #[test]
    fn test_lookup() {
        let catalog = Catalog::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(catalog.len(), 2);

        let def = catalog.by_name("hot-water-comfort-mode-47041").unwrap();
        assert_eq!(def.address, 47041);
        assert_eq!(catalog.by_address(40004).unwrap().id, "bt1-outdoor-temperature-40004");

        assert!(catalog.by_name("missing").is_none());
        assert!(catalog.by_address(1).is_none());
    }

    #[test]
    fn test_duplicate_name() {
        let source = r#"
- {name: a, address: 1, type: int}
- {name: a, address: 2, type: int}
"#;
        assert!(matches!(
            Catalog::from_yaml_str(source),
            Err(SchemaError::DuplicateName(name)) if name == "a"
        ));
    }

    #[test]
    fn test_duplicate_address() {
        let source = r#"
- {name: a, address: 1, type: int}
- {name: b, address: 1, type: int}
"#;
        assert!(matches!(
            Catalog::from_yaml_str(source),
            Err(SchemaError::DuplicateAddress { address: 1, .. })
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Catalog::from_yaml_str("- {name: a, type: int}"),
            Err(SchemaError::Parse(_))
        ));
        assert!(matches!(
            Catalog::from_yaml_str("- {name: a, address: 1, type: bool}"),
            Err(SchemaError::Parse(_))
        ));
    }

    #[test]
    fn test_json_source() {
        let source = r#"[
            {"name": "alarm-45001", "address": 45001, "type": "int"},
            {"name": "mode-47041", "address": 47041, "type": "enum", "size": 1,
             "mappings": {"0": "ECONOMY", "1": "NORMAL"}}
        ]"#;
        let catalog = Catalog::from_json_str(source).unwrap();
        assert_eq!(catalog.by_name("mode-47041").unwrap().enum_label(1), Some("NORMAL"));
    }
}
