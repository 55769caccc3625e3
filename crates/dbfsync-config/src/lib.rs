mod error;
mod feed;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use feed::{
    DiffConfig, DiffStrategyConfig, EndpointConfig, FeedConfig, FieldDef, KeyConfig,
    MappingConfig, PriorityConfig, PriorityRuleConfig, QuantityConfig, YearConfig,
};
pub use validation::{to_feed, validate_feed, validate_feed_set};
