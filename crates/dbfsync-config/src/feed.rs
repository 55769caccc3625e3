use std::collections::BTreeMap;

use dbfsync_core::FieldKind;
use serde::Deserialize;

use crate::error::ConfigResult;

/// Raw feed configuration as parsed from TOML.
#[derive(Debug, Deserialize)]
pub struct FeedConfig {
    /// Stable identifier for this feed.
    pub name: String,
    /// Path of the source table file.
    pub source: String,
    /// Change detection.
    #[serde(default)]
    pub diff: DiffConfig,
    /// Remote resource.
    pub endpoint: EndpointConfig,
    /// Record mapping.
    pub mapping: MappingConfig,
}

impl FeedConfig {
    /// Parse a feed config from a TOML string.
    pub fn parse(toml_str: &str) -> ConfigResult<Self> {
        let config: FeedConfig = toml::from_str(toml_str)?;
        Ok(config)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DiffConfig {
    #[serde(default)]
    pub strategy: DiffStrategyConfig,
    /// Sequence field (for the sequence strategy).
    pub field: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStrategyConfig {
    /// Compare content digests against the last snapshot (default).
    #[default]
    ContentHash,
    /// Compare an increasing field against a high-water mark.
    Sequence,
}

#[derive(Debug, Deserialize)]
pub struct EndpointConfig {
    /// Resource path segment.
    pub resource: String,
    /// Body key for single-record posts. Defaults to the resource name.
    pub item_key: Option<String>,
    /// Body key for batch posts. Defaults to `<resource>_list`.
    pub list_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MappingConfig {
    pub key: KeyConfig,
    /// Target name -> source field.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDef>,
    /// Target name -> fixed value.
    #[serde(default)]
    pub constants: BTreeMap<String, toml::Value>,
    /// Targets retained even when empty.
    #[serde(default)]
    pub keep_always: Vec<String>,
    pub quantity: Option<QuantityConfig>,
    pub year: Option<YearConfig>,
    pub priority: Option<PriorityConfig>,
}

#[derive(Debug, Deserialize)]
pub struct KeyConfig {
    pub source: String,
    pub target: String,
}

/// A field copy, either `target = "SOURCE"` or `target = { source = "SOURCE", type = "integer" }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FieldDef {
    Source(String),
    Typed {
        source: String,
        #[serde(rename = "type", default)]
        kind: FieldKind,
    },
}

impl FieldDef {
    pub fn source(&self) -> &str {
        match self {
            FieldDef::Source(source) | FieldDef::Typed { source, .. } => source,
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldDef::Source(_) => FieldKind::Text,
            FieldDef::Typed { kind, .. } => *kind,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuantityConfig {
    pub target: String,
    pub candidates: Vec<String>,
    #[serde(default = "default_quantity")]
    pub default: i64,
}

fn default_quantity() -> i64 {
    1000
}

#[derive(Debug, Deserialize)]
pub struct YearConfig {
    pub target: String,
    pub primary: String,
    pub secondary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PriorityConfig {
    pub target: String,
    pub field: String,
    /// Fallback when nothing matches. Defaults to medium.
    pub default: Option<String>,
    /// Ordered rules; the built-in table is used when omitted.
    pub rules: Option<Vec<PriorityRuleConfig>>,
}

#[derive(Debug, Deserialize)]
pub struct PriorityRuleConfig {
    #[serde(rename = "match")]
    pub needles: Vec<String>,
    pub priority: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_feed() {
        let toml = r#"
name = "orders"
source = "data/OPRO.DBF"

[endpoint]
resource = "production_orders"

[mapping]
key = { source = "NO_OPRO", target = "no_opro" }
"#;

        let config = FeedConfig::parse(toml).unwrap();
        assert_eq!(config.name, "orders");
        assert_eq!(config.diff.strategy, DiffStrategyConfig::ContentHash);
        assert!(config.endpoint.item_key.is_none());
        assert!(config.mapping.fields.is_empty());
    }

    #[test]
    fn test_parse_full_feed() {
        let toml = r#"
name = "orders"
source = "data/OPRO.DBF"

[diff]
strategy = "sequence"
field = "NO_OPRO"

[endpoint]
resource = "production_orders"
list_key = "production_orders"

[mapping]
key = { source = "NO_OPRO", target = "no_opro" }
keep_always = ["notes"]

[mapping.fields]
notes = "OBSERVA"
costo = { source = "COSTO", type = "float" }

[mapping.constants]
warehouse_id = "45c4bbc8-2950-434c-b710-2ae0e080bfd1"
active = true

[mapping.quantity]
target = "quantity_requested"
candidates = ["REN_OPRO", "CARGA_OPRO"]

[mapping.year]
target = "ano"
primary = "FEC_OPRO"
secondary = "ANO"

[mapping.priority]
target = "priority"
field = "STAT_OPRO"
rules = [
    { match = ["urgente"], priority = "high" },
]
"#;

        let config = FeedConfig::parse(toml).unwrap();
        assert_eq!(config.diff.strategy, DiffStrategyConfig::Sequence);
        assert_eq!(config.diff.field.as_deref(), Some("NO_OPRO"));
        assert_eq!(config.mapping.fields["notes"], FieldDef::Source("OBSERVA".into()));
        assert_eq!(config.mapping.fields["costo"].kind(), FieldKind::Float);
        assert_eq!(config.mapping.quantity.as_ref().unwrap().default, 1000);
        assert_eq!(config.mapping.constants.len(), 2);
        let rules = config.mapping.priority.unwrap().rules.unwrap();
        assert_eq!(rules[0].needles, vec!["urgente"]);
    }

    #[test]
    fn test_parse_rejects_unknown_strategy() {
        let toml = r#"
name = "orders"
source = "a.dbf"

[diff]
strategy = "timestamp"

[endpoint]
resource = "x"

[mapping]
key = { source = "A", target = "a" }
"#;
        assert!(FeedConfig::parse(toml).is_err());
    }
}
