//! Shard-map parsing and validation.
//!
//! The shard map assigns every backend a contiguous, non-overlapping shard
//! range; together the ranges must cover exactly `{0 … num_shards-1}`. Any
//! violation is fatal at startup — a partially covered keyspace would
//! silently drop writes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One PostgreSQL backend and the shard range it owns (inclusive on both
/// ends).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub database_url: String,
    pub shard_start: u32,
    pub shard_end: u32,
}

/// The list of backends that together cover the whole shard space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardMap {
    pub backends: Vec<BackendConfig>,
}

impl ShardMap {
    /// Reads and validates a shard-map JSON file.
    pub fn load(path: &Path, num_shards: u32) -> Result<Self, ConfigError> {
        let data = std::fs::read(path)?;
        Self::parse(&data, num_shards)
    }

    /// Parses and validates a shard-map JSON document.
    pub fn parse(data: &[u8], num_shards: u32) -> Result<Self, ConfigError> {
        let map: ShardMap = serde_json::from_slice(data)?;
        map.validate(num_shards)?;
        Ok(map)
    }

    pub fn validate(&self, num_shards: u32) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        let mut covered = vec![false; num_shards as usize];
        for backend in &self.backends {
            if backend.database_url.is_empty() {
                return Err(ConfigError::EmptyDatabaseUrl(backend.name.clone()));
            }
            if backend.shard_start > backend.shard_end {
                return Err(ConfigError::InvalidRange {
                    name: backend.name.clone(),
                    start: backend.shard_start,
                    end: backend.shard_end,
                });
            }
            if backend.shard_end >= num_shards {
                return Err(ConfigError::RangeOutOfBounds {
                    name: backend.name.clone(),
                    end: backend.shard_end,
                    num_shards,
                });
            }
            for shard in backend.shard_start..=backend.shard_end {
                if covered[shard as usize] {
                    return Err(ConfigError::ShardOverlap(shard));
                }
                covered[shard as usize] = true;
            }
        }

        for (shard, seen) in covered.iter().enumerate() {
            if !seen {
                return Err(ConfigError::ShardUncovered(shard as u32));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(name: &str, start: u32, end: u32) -> BackendConfig {
        BackendConfig {
            name: name.to_string(),
            database_url: format!("postgres://localhost/{name}"),
            shard_start: start,
            shard_end: end,
        }
    }

    #[test]
    fn full_coverage_is_accepted() {
        let map = ShardMap {
            backends: vec![backend("a", 0, 31), backend("b", 32, 63)],
        };
        assert!(map.validate(64).is_ok());

        let single = ShardMap {
            backends: vec![backend("solo", 0, 63)],
        };
        assert!(single.validate(64).is_ok());
    }

    #[test]
    fn empty_backend_list_is_rejected() {
        let map = ShardMap { backends: vec![] };
        assert!(matches!(map.validate(4), Err(ConfigError::NoBackends)));
    }

    #[test]
    fn empty_database_url_is_rejected() {
        let mut bad = backend("a", 0, 3);
        bad.database_url = String::new();
        let map = ShardMap {
            backends: vec![bad],
        };
        assert!(matches!(
            map.validate(4),
            Err(ConfigError::EmptyDatabaseUrl(name)) if name == "a"
        ));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let map = ShardMap {
            backends: vec![backend("a", 3, 1)],
        };
        assert!(matches!(
            map.validate(4),
            Err(ConfigError::InvalidRange { .. })
        ));
    }

    #[test]
    fn range_past_num_shards_is_rejected() {
        let map = ShardMap {
            backends: vec![backend("a", 0, 64)],
        };
        assert!(matches!(
            map.validate(64),
            Err(ConfigError::RangeOutOfBounds { end: 64, .. })
        ));
    }

    #[test]
    fn overlapping_ranges_are_rejected() {
        let map = ShardMap {
            backends: vec![backend("a", 0, 3), backend("b", 3, 7)],
        };
        assert!(matches!(map.validate(8), Err(ConfigError::ShardOverlap(3))));
    }

    #[test]
    fn gaps_are_rejected() {
        let map = ShardMap {
            backends: vec![backend("a", 0, 2), backend("b", 4, 7)],
        };
        assert!(matches!(
            map.validate(8),
            Err(ConfigError::ShardUncovered(3))
        ));
    }

    #[test]
    fn parse_round_trips_a_real_document() {
        let doc = br#"{
            "backends": [
                {"name": "pg-a", "database_url": "postgres://a/db", "shard_start": 0, "shard_end": 7},
                {"name": "pg-b", "database_url": "postgres://b/db", "shard_start": 8, "shard_end": 15}
            ]
        }"#;
        let map = ShardMap::parse(doc, 16).unwrap();
        assert_eq!(map.backends.len(), 2);
        assert_eq!(map.backends[1].shard_start, 8);

        // Same document fails when num_shards disagrees with the union.
        assert!(ShardMap::parse(doc, 32).is_err());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            ShardMap::parse(b"{not json", 4),
            Err(ConfigError::Parse(_))
        ));
    }
}
