use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use dbfsync_core::{
    standard_priority_rules, DiffStrategy, Endpoint, Feed, FieldKind, MappingProfile, Priority,
    PriorityMatch, PriorityRule, QuantityRule, YearRule,
};

use crate::error::{ConfigError, ConfigResult};
use crate::feed::{DiffStrategyConfig, FeedConfig, MappingConfig, PriorityConfig};

/// Validate a feed configuration.
pub fn validate_feed(config: &FeedConfig) -> ConfigResult<()> {
    require("name", &config.name)?;
    require("source", &config.source)?;
    require("endpoint.resource", &config.endpoint.resource)?;
    require("mapping.key.source", &config.mapping.key.source)?;
    require("mapping.key.target", &config.mapping.key.target)?;
    validate_diff(config)?;
    validate_quantity(&config.mapping)?;
    if let Some(priority) = &config.mapping.priority {
        build_priority(priority)?;
    }
    Ok(())
}

fn require(field: &str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn validate_diff(config: &FeedConfig) -> ConfigResult<()> {
    if config.diff.strategy == DiffStrategyConfig::Sequence
        && config.diff.field.as_deref().map_or(true, |f| f.trim().is_empty())
    {
        return Err(ConfigError::MissingSequenceField);
    }
    Ok(())
}

fn validate_quantity(mapping: &MappingConfig) -> ConfigResult<()> {
    match &mapping.quantity {
        Some(q) if q.candidates.is_empty() => Err(ConfigError::EmptyQuantityCandidates),
        _ => Ok(()),
    }
}

fn parse_priority(value: &str) -> ConfigResult<Priority> {
    Ok(value.parse::<Priority>()?)
}

fn build_priority(config: &PriorityConfig) -> ConfigResult<PriorityRule> {
    let default = match &config.default {
        Some(value) => parse_priority(value)?,
        None => Priority::Medium,
    };

    let rules = match &config.rules {
        Some(rules) => rules
            .iter()
            .map(|rule| -> ConfigResult<PriorityMatch> {
                let needles: Vec<&str> = rule.needles.iter().map(String::as_str).collect();
                Ok(PriorityMatch::new(&needles, parse_priority(&rule.priority)?))
            })
            .collect::<ConfigResult<Vec<_>>>()?,
        None => standard_priority_rules(),
    };

    Ok(PriorityRule {
        target: config.target.clone(),
        field: config.field.clone(),
        rules,
        default,
    })
}

fn to_profile(mapping: &MappingConfig) -> ConfigResult<MappingProfile> {
    let mut builder = MappingProfile::builder().key(&mapping.key.source, &mapping.key.target);

    for (target, def) in &mapping.fields {
        builder = match def.kind() {
            FieldKind::Text => builder.field(target, def.source()),
            kind => builder.typed_field(target, def.source(), kind),
        };
    }

    for (name, value) in &mapping.constants {
        let json = serde_json::to_value(value).map_err(|e| ConfigError::InvalidConstant {
            name: name.clone(),
            message: e.to_string(),
        })?;
        builder = builder.constant(name, json);
    }

    if let Some(q) = &mapping.quantity {
        builder = builder.quantity(QuantityRule {
            target: q.target.clone(),
            candidates: q.candidates.clone(),
            default: q.default,
        });
    }

    if let Some(y) = &mapping.year {
        builder = builder.year(YearRule {
            target: y.target.clone(),
            primary: y.primary.clone(),
            secondary: y.secondary.clone(),
        });
    }

    if let Some(p) = &mapping.priority {
        builder = builder.priority(build_priority(p)?);
    }

    for target in &mapping.keep_always {
        builder = builder.keep_always(target);
    }

    Ok(builder.build()?)
}

/// Convert a validated feed config to a core Feed.
pub fn to_feed(config: &FeedConfig) -> ConfigResult<Feed> {
    validate_feed(config)?;

    let diff = match config.diff.strategy {
        DiffStrategyConfig::ContentHash => DiffStrategy::ContentHash,
        DiffStrategyConfig::Sequence => DiffStrategy::Sequence {
            field: config
                .diff
                .field
                .clone()
                .ok_or(ConfigError::MissingSequenceField)?,
        },
    };

    let mut endpoint = Endpoint::new(&config.endpoint.resource);
    if let Some(key) = &config.endpoint.item_key {
        endpoint = endpoint.with_item_key(key);
    }
    if let Some(key) = &config.endpoint.list_key {
        endpoint = endpoint.with_list_key(key);
    }

    Ok(Feed {
        name: config.name.clone(),
        source: PathBuf::from(&config.source),
        diff,
        endpoint,
        profile: to_profile(&config.mapping)?,
    })
}

/// Check that feed names and source paths are unique.
pub fn validate_feed_set(feeds: &[Feed]) -> ConfigResult<()> {
    let mut names = HashSet::new();
    let mut sources: HashMap<String, &str> = HashMap::new();

    for feed in feeds {
        if !names.insert(feed.name.as_str()) {
            return Err(ConfigError::DuplicateFeed(feed.name.clone()));
        }
        let key = feed.state_key();
        if let Some(first) = sources.get(&key) {
            return Err(ConfigError::DuplicateSource {
                first: first.to_string(),
                second: feed.name.clone(),
                source_path: key,
            });
        }
        sources.insert(key, feed.name.as_str());
    }
    Ok(())
}
