use std::collections::HashMap;

use chrono::Datelike;

use crate::error::RecordMappingError;
use crate::mapping::{FieldKind, MappingProfile, Priority, PriorityRule, QuantityRule, YearRule};
use crate::types::{RawRecord, Value};

/// A normalized payload ready for transmission.
pub type MappedRecord = serde_json::Map<String, serde_json::Value>;

/// A raw record after cleaning: every value is trimmed text.
pub type CleanedRecord = HashMap<String, String>;

/// Trait for turning raw records into payloads.
pub trait Transformer: Send + Sync {
    /// Map a record, or explain why it cannot be delivered.
    fn map(&self, record: &RawRecord) -> Result<MappedRecord, RecordMappingError>;
}

/// Profile-driven mapper with derived-field rules.
pub struct FieldMapper {
    profile: MappingProfile,
    fallback_year: i32,
}

impl FieldMapper {
    /// Create a mapper that falls back to the current calendar year.
    pub fn new(profile: MappingProfile) -> Self {
        Self {
            profile,
            fallback_year: chrono::Local::now().year(),
        }
    }

    /// Pin the year used when no date field yields one.
    pub fn with_fallback_year(mut self, year: i32) -> Self {
        self.fallback_year = year;
        self
    }
}

impl Transformer for FieldMapper {
    fn map(&self, record: &RawRecord) -> Result<MappedRecord, RecordMappingError> {
        let cleaned = clean_record(record);
        let profile = &self.profile;

        let key = field(&cleaned, &profile.key.source);
        if key.is_empty() {
            return Err(RecordMappingError::MissingIdentifier {
                field: profile.key.source.clone(),
            });
        }

        let mut mapped = MappedRecord::new();
        mapped.insert(profile.key.target.clone(), key.into());

        for spec in &profile.fields {
            let raw = field(&cleaned, &spec.source);
            mapped.insert(spec.target.clone(), typed_value(raw, spec.kind));
        }

        for (target, value) in &profile.constants {
            mapped.insert(target.clone(), value.clone());
        }

        if let Some(rule) = &profile.quantity {
            mapped.insert(rule.target.clone(), extract_quantity(&cleaned, rule).into());
        }

        if let Some(rule) = &profile.year {
            let year = extract_year(&cleaned, rule, self.fallback_year);
            mapped.insert(rule.target.clone(), year.into());
        }

        if let Some(rule) = &profile.priority {
            let priority = classify_priority(field(&cleaned, &rule.field), rule);
            mapped.insert(rule.target.clone(), priority.as_str().into());
        }

        mapped.retain(|target, value| {
            !is_blank(value) || profile.keep_always.iter().any(|k| k == target)
        });

        Ok(mapped)
    }
}

/// Clean a raw value: null, blank, "nan" and "none" become empty; everything
/// else is rendered as text and trimmed.
pub fn clean_value(value: &Value) -> String {
    let text = value.to_text();
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("nan") || trimmed.eq_ignore_ascii_case("none") {
        return String::new();
    }
    trimmed.to_string()
}

pub fn clean_record(record: &RawRecord) -> CleanedRecord {
    record
        .iter()
        .map(|(name, value)| (name.to_string(), clean_value(value)))
        .collect()
}

fn field<'a>(cleaned: &'a CleanedRecord, name: &str) -> &'a str {
    cleaned.get(name).map(String::as_str).unwrap_or("")
}

fn typed_value(raw: &str, kind: FieldKind) -> serde_json::Value {
    match kind {
        FieldKind::Text => raw.into(),
        FieldKind::Integer => {
            let n = parse_number(raw).map(|f| f.floor() as i64).unwrap_or(0);
            n.into()
        }
        FieldKind::Float => {
            let f = parse_number(raw).unwrap_or(0.0);
            serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| 0.into())
        }
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn is_blank(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

/// First candidate parsing to a number above zero, floored with a minimum of 1.
pub fn extract_quantity(cleaned: &CleanedRecord, rule: &QuantityRule) -> i64 {
    rule.candidates
        .iter()
        .filter_map(|name| parse_number(field(cleaned, name)))
        .find(|qty| *qty > 0.0)
        .map(|qty| (qty.floor() as i64).max(1))
        .unwrap_or(rule.default)
}

/// Year from the primary date field, then the secondary numeric field, then
/// the fallback year.
pub fn extract_year(cleaned: &CleanedRecord, rule: &YearRule, fallback_year: i32) -> String {
    if let Some(year) = year_from_date(field(cleaned, &rule.primary)) {
        return year;
    }

    if let Some(secondary) = &rule.secondary {
        let ano = field(cleaned, secondary);
        if !ano.is_empty() && ano.chars().all(|c| c.is_ascii_digit()) {
            return ano.to_string();
        }
    }

    fallback_year.to_string()
}

fn year_from_date(date: &str) -> Option<String> {
    if date.is_empty() {
        return None;
    }

    let year = if let Some((head, _)) = date.split_once('-') {
        head
    } else if date.contains('/') {
        date.split('/').nth(2).filter(|part| part.chars().count() == 4)?
    } else {
        let head: String = date.chars().take(4).collect();
        return (head.chars().count() == 4 && head.chars().all(|c| c.is_ascii_digit()))
            .then_some(head);
    };

    (!year.is_empty()).then(|| year.to_string())
}

/// First rule whose needle appears in the case-folded status wins.
pub fn classify_priority(status: &str, rule: &PriorityRule) -> Priority {
    let status = status.to_lowercase();
    if status.is_empty() {
        return rule.default;
    }

    rule.rules
        .iter()
        .find(|m| m.needles.iter().any(|needle| status.contains(needle.as_str())))
        .map(|m| m.priority)
        .unwrap_or(rule.default)
}
