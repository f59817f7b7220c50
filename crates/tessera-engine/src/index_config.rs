//! Index-definition file parsing and validation.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tessera_index::IndexDefinition;

use crate::error::ConfigError;

/// The list of secondary indexes to register at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub indexes: Vec<IndexDefinition>,
}

impl IndexConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path)?;
        Self::parse(&data)
    }

    pub fn parse(data: &[u8]) -> Result<Self, ConfigError> {
        let config: IndexConfig = serde_json::from_slice(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indexes.is_empty() {
            return Err(ConfigError::NoIndexes);
        }

        let mut seen = HashSet::new();
        for (i, index) in self.indexes.iter().enumerate() {
            if index.name.is_empty() {
                return Err(ConfigError::EmptyIndexName(i));
            }
            if !seen.insert(index.name.clone()) {
                return Err(ConfigError::DuplicateIndexName(index.name.clone()));
            }
            if index.source_column.is_empty() {
                return Err(ConfigError::EmptySourceColumn(index.name.clone()));
            }
            if index.shard_key_field.is_empty() {
                return Err(ConfigError::EmptyShardKeyField(index.name.clone()));
            }
            for field in &index.unique_fields {
                if !index.fields.contains(field) {
                    return Err(ConfigError::UniqueFieldNotProjected {
                        index: index.name.clone(),
                        field: field.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str) -> IndexDefinition {
        IndexDefinition {
            name: name.to_string(),
            source_column: "profile".to_string(),
            shard_key_field: "email".to_string(),
            fields: vec!["email".to_string()],
            unique_fields: vec!["email".to_string()],
        }
    }

    #[test]
    fn valid_config_passes() {
        let config = IndexConfig {
            indexes: vec![definition("user_by_email")],
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_list_and_empty_fields_are_rejected() {
        assert!(matches!(
            IndexConfig { indexes: vec![] }.validate(),
            Err(ConfigError::NoIndexes)
        ));

        let mut unnamed = definition("");
        unnamed.name = String::new();
        assert!(matches!(
            IndexConfig { indexes: vec![unnamed] }.validate(),
            Err(ConfigError::EmptyIndexName(0))
        ));

        let mut no_source = definition("x");
        no_source.source_column = String::new();
        assert!(matches!(
            IndexConfig { indexes: vec![no_source] }.validate(),
            Err(ConfigError::EmptySourceColumn(_))
        ));

        let mut no_key = definition("x");
        no_key.shard_key_field = String::new();
        assert!(matches!(
            IndexConfig { indexes: vec![no_key] }.validate(),
            Err(ConfigError::EmptyShardKeyField(_))
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let config = IndexConfig {
            indexes: vec![definition("dup"), definition("dup")],
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateIndexName(name)) if name == "dup"
        ));
    }

    #[test]
    fn unique_fields_must_be_projected() {
        let mut index = definition("x");
        index.unique_fields = vec!["phone".to_string()];
        let config = IndexConfig {
            indexes: vec![index],
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UniqueFieldNotProjected { field, .. }) if field == "phone"
        ));
    }

    #[test]
    fn parse_reads_a_real_document() {
        let doc = br#"{
            "indexes": [{
                "name": "user_by_email",
                "source_column": "profile",
                "shard_key_field": "email",
                "fields": ["email", "display_name"],
                "unique_fields": ["email"]
            }]
        }"#;
        let config = IndexConfig::parse(doc).unwrap();
        assert_eq!(config.indexes[0].fields.len(), 2);
    }
}
