use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::diff::DiffStrategy;

/// Configuration for syncing one legacy table file to one remote resource.
#[derive(Debug, Clone)]
pub struct Feed {
    /// Stable identifier for this feed.
    pub name: String,
    /// Path of the source table file. Also the key of its persisted state.
    pub source: PathBuf,
    /// How changed records are detected.
    pub diff: DiffStrategy,
    /// Where mapped records are delivered.
    pub endpoint: Endpoint,
    /// How raw records become payloads.
    pub profile: MappingProfile,
}

impl Feed {
    /// Key under which this feed's state is persisted.
    pub fn state_key(&self) -> String {
        self.source.display().to_string()
    }
}

/// Remote resource addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Resource path segment, e.g. `production_orders`.
    pub resource: String,
    /// Body key wrapping a single record.
    pub item_key: String,
    /// Body key wrapping a batch of records.
    pub list_key: String,
}

impl Endpoint {
    /// Endpoint with the default body keys: `<resource>` and `<resource>_list`.
    pub fn new(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        Self {
            item_key: resource.clone(),
            list_key: format!("{}_list", resource),
            resource,
        }
    }

    pub fn with_item_key(mut self, key: impl Into<String>) -> Self {
        self.item_key = key.into();
        self
    }

    pub fn with_list_key(mut self, key: impl Into<String>) -> Self {
        self.list_key = key.into();
        self
    }

    /// Path of the batch endpoint relative to the API base.
    pub fn batch_path(&self) -> String {
        format!("{}/batch", self.resource)
    }

    /// Path of the single-record endpoint relative to the API base.
    pub fn single_path(&self) -> String {
        self.resource.clone()
    }
}

/// The designated identifier field of a record.
#[derive(Debug, Clone)]
pub struct KeyField {
    pub source: String,
    pub target: String,
}

/// How a copied field is typed in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Integer,
    Float,
}

/// A field copied from the raw record into the payload.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub target: String,
    pub source: String,
    pub kind: FieldKind,
}

/// Ordered candidate fields for a quantity, with a fallback.
#[derive(Debug, Clone)]
pub struct QuantityRule {
    pub target: String,
    pub candidates: Vec<String>,
    pub default: i64,
}

/// Year derivation from a date field with a numeric fallback field.
#[derive(Debug, Clone)]
pub struct YearRule {
    pub target: String,
    pub primary: String,
    pub secondary: Option<String>,
}

/// Delivery priority of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(crate::Error::InvalidPriority(s.to_string())),
        }
    }
}

/// A substring rule: any needle found in the status text selects the priority.
#[derive(Debug, Clone)]
pub struct PriorityMatch {
    pub needles: Vec<String>,
    pub priority: Priority,
}

impl PriorityMatch {
    pub fn new(needles: &[&str], priority: Priority) -> Self {
        Self {
            needles: needles.iter().map(|n| n.to_lowercase()).collect(),
            priority,
        }
    }
}

/// Priority classification from a status text field.
#[derive(Debug, Clone)]
pub struct PriorityRule {
    pub target: String,
    pub field: String,
    /// Evaluated in order; first match wins.
    pub rules: Vec<PriorityMatch>,
    pub default: Priority,
}

impl PriorityRule {
    /// The standard status table used by production order feeds.
    pub fn standard(target: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            field: field.into(),
            rules: standard_priority_rules(),
            default: Priority::Medium,
        }
    }
}

pub fn standard_priority_rules() -> Vec<PriorityMatch> {
    vec![
        PriorityMatch::new(&["terminada", "completada"], Priority::High),
        PriorityMatch::new(&["cancelada", "rechazada"], Priority::Low),
        PriorityMatch::new(&["urgente", "alta"], Priority::High),
        PriorityMatch::new(&["baja"], Priority::Low),
    ]
}

/// Everything the field mapper needs to turn a raw record into a payload.
#[derive(Debug, Clone)]
pub struct MappingProfile {
    pub key: KeyField,
    pub fields: Vec<FieldSpec>,
    pub constants: Vec<(String, serde_json::Value)>,
    pub quantity: Option<QuantityRule>,
    pub year: Option<YearRule>,
    pub priority: Option<PriorityRule>,
    /// Targets retained even when empty or zero.
    pub keep_always: Vec<String>,
}

impl MappingProfile {
    /// Create a builder for constructing a profile.
    pub fn builder() -> MappingProfileBuilder {
        MappingProfileBuilder::new()
    }

    /// Production orders read from `opro.dbf`.
    pub fn production_orders() -> Self {
        Self {
            key: KeyField {
                source: "NO_OPRO".into(),
                target: "no_opro".into(),
            },
            fields: vec![
                text_field("product_key", "CVE_PROP"),
                text_field("notes", "OBSERVA"),
                text_field("lote_referencia", "LOTE"),
                text_field("stat_opro", "STAT_OPRO"),
            ],
            constants: vec![(
                "warehouse_id".into(),
                serde_json::Value::String(WAREHOUSE_ID.into()),
            )],
            quantity: Some(QuantityRule {
                target: "quantity_requested".into(),
                candidates: vec!["REN_OPRO".into(), "CARGA_OPRO".into(), "CANT_LIQ".into()],
                default: 1000,
            }),
            year: Some(YearRule {
                target: "ano".into(),
                primary: "FEC_OPRO".into(),
                secondary: Some("ANO".into()),
            }),
            priority: Some(PriorityRule::standard("priority", "STAT_OPRO")),
            keep_always: vec!["notes".into()],
        }
    }
}

/// Warehouse every production order is filed under.
const WAREHOUSE_ID: &str = "45c4bbc8-2950-434c-b710-2ae0e080bfd1";

fn text_field(target: &str, source: &str) -> FieldSpec {
    FieldSpec {
        target: target.into(),
        source: source.into(),
        kind: FieldKind::Text,
    }
}

/// Builder for constructing a MappingProfile.
#[derive(Default)]
pub struct MappingProfileBuilder {
    key: Option<KeyField>,
    fields: Vec<FieldSpec>,
    constants: Vec<(String, serde_json::Value)>,
    quantity: Option<QuantityRule>,
    year: Option<YearRule>,
    priority: Option<PriorityRule>,
    keep_always: Vec<String>,
}

impl MappingProfileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.key = Some(KeyField {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    pub fn field(mut self, target: impl Into<String>, source: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            target: target.into(),
            source: source.into(),
            kind: FieldKind::Text,
        });
        self
    }

    pub fn typed_field(
        mut self,
        target: impl Into<String>,
        source: impl Into<String>,
        kind: FieldKind,
    ) -> Self {
        self.fields.push(FieldSpec {
            target: target.into(),
            source: source.into(),
            kind,
        });
        self
    }

    pub fn constant(mut self, target: impl Into<String>, value: serde_json::Value) -> Self {
        self.constants.push((target.into(), value));
        self
    }

    pub fn quantity(mut self, rule: QuantityRule) -> Self {
        self.quantity = Some(rule);
        self
    }

    pub fn year(mut self, rule: YearRule) -> Self {
        self.year = Some(rule);
        self
    }

    pub fn priority(mut self, rule: PriorityRule) -> Self {
        self.priority = Some(rule);
        self
    }

    pub fn keep_always(mut self, target: impl Into<String>) -> Self {
        self.keep_always.push(target.into());
        self
    }

    pub fn build(self) -> crate::Result<MappingProfile> {
        let key = self
            .key
            .ok_or_else(|| crate::Error::MissingField("key".into()))?;

        Ok(MappingProfile {
            key,
            fields: self.fields,
            constants: self.constants,
            quantity: self.quantity,
            year: self.year,
            priority: self.priority,
            keep_always: self.keep_always,
        })
    }
}
