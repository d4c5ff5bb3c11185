//! Data-source-wide configuration
//!
//! These options apply to every layer of a source: the read mode is chosen
//! once and fixed for the session, and the leftover-tag encoding is a
//! source-wide flag, never per layer.

use serde::{Deserialize, Serialize};

/// Serialization of the leftover-tag aggregate field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagsFormat {
    /// `"key"=>"value"` pairs, comma-joined; only `"` and `\` are escaped
    /// (by doubling with a backslash)
    HStore,
    /// A JSON object `{"key":"value",...}` with standard JSON escaping
    Json,
}

/// How the source schedules chunk consumption across layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// Each layer pulls from its own stream position until exhausted
    Normal,
    /// All layers share one stream cursor; only one layer is current at a
    /// time and consumers may be redirected to drain other layers
    Interleaved,
}

/// Source-wide options, fixed before streaming begins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsmSourceConfig {
    /// Chunk scheduling mode (default: normal)
    #[serde(default = "default_read_mode")]
    pub read_mode: ReadMode,

    /// Leftover-tag aggregate encoding (default: hstore)
    #[serde(default = "default_tags_format")]
    pub tags_format: TagsFormat,

    /// Replace `:` with `_` in field display names. Applies only to the
    /// schema name; tag lookup always uses the original key.
    #[serde(default)]
    pub attribute_name_laundering: bool,
}

fn default_read_mode() -> ReadMode {
    ReadMode::Normal
}

fn default_tags_format() -> TagsFormat {
    TagsFormat::HStore
}

impl Default for OsmSourceConfig {
    fn default() -> Self {
        Self {
            read_mode: default_read_mode(),
            tags_format: default_tags_format(),
            attribute_name_laundering: false,
        }
    }
}

impl OsmSourceConfig {
    /// Config with interleaved scheduling enabled
    pub fn interleaved() -> Self {
        Self {
            read_mode: ReadMode::Interleaved,
            ..Default::default()
        }
    }

    pub fn with_tags_format(mut self, format: TagsFormat) -> Self {
        self.tags_format = format;
        self
    }

    pub fn is_interleaved(&self) -> bool {
        self.read_mode == ReadMode::Interleaved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OsmSourceConfig::default();
        assert_eq!(config.read_mode, ReadMode::Normal);
        assert_eq!(config.tags_format, TagsFormat::HStore);
        assert!(!config.attribute_name_laundering);
    }

    #[test]
    fn test_interleaved_constructor() {
        let config = OsmSourceConfig::interleaved();
        assert!(config.is_interleaved());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: OsmSourceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.read_mode, ReadMode::Normal);

        let config: OsmSourceConfig =
            serde_json::from_str(r#"{"read_mode":"interleaved","tags_format":"json"}"#).unwrap();
        assert!(config.is_interleaved());
        assert_eq!(config.tags_format, TagsFormat::Json);
    }
}
