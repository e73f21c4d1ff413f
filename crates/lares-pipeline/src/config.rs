//! Pipeline tunables.

use serde::{Deserialize, Serialize};

use lares_parser::ParserConfig;
use lares_retrieval::{BulkConfig, SearchOptions};

/// Environment override for the bulk arbitration toggle.
///
/// Set to `1`/`true`/`on`/`yes` to force arbitration on, anything else to
/// force it off. Unset falls back to [`PipelineConfig::arbitration`].
pub const ENV_BULK_ARBITRATION: &str = "LARES_BULK_ARBITRATION";

pub const DEFAULT_ARBITRATION: bool = false;

/// Configuration for one [`Pipeline`](crate::Pipeline) instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub parser: ParserConfig,
    pub search: SearchOptions,
    pub bulk: BulkConfig,
    /// Let the model arbitrate low-confidence bulk capability selection.
    /// When off, ambiguity always turns into a clarification result.
    pub arbitration: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parser: ParserConfig::default(),
            search: SearchOptions::default(),
            bulk: BulkConfig::default(),
            arbitration: DEFAULT_ARBITRATION,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parser(mut self, parser: ParserConfig) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_search(mut self, search: SearchOptions) -> Self {
        self.search = search;
        self
    }

    pub fn with_bulk(mut self, bulk: BulkConfig) -> Self {
        self.bulk = bulk;
        self
    }

    pub fn with_arbitration(mut self, arbitration: bool) -> Self {
        self.arbitration = arbitration;
        self
    }

    /// Effective arbitration toggle, honoring [`ENV_BULK_ARBITRATION`].
    pub fn arbitration_enabled(&self) -> bool {
        match std::env::var(ENV_BULK_ARBITRATION) {
            Ok(value) => matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "on" | "yes"
            ),
            Err(_) => self.arbitration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();

        assert!(!config.arbitration);
        assert_eq!(config.search.top_k, 5);
        assert_eq!(config.bulk.batch_size, 20);
        assert!(!config.parser.allow_legacy_input);
    }

    #[test]
    fn test_builders() {
        let config = PipelineConfig::new()
            .with_arbitration(true)
            .with_search(SearchOptions::default().with_top_k(3))
            .with_bulk(BulkConfig::default().with_batch_size(10));

        assert!(config.arbitration);
        assert_eq!(config.search.top_k, 3);
        assert_eq!(config.bulk.batch_size, 10);
    }

    #[test]
    fn test_env_override_wins() {
        let config = PipelineConfig::new().with_arbitration(true);

        std::env::set_var(ENV_BULK_ARBITRATION, "off");
        assert!(!config.arbitration_enabled());

        std::env::set_var(ENV_BULK_ARBITRATION, "1");
        assert!(config.arbitration_enabled());

        std::env::remove_var(ENV_BULK_ARBITRATION);
        assert!(config.arbitration_enabled());
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = PipelineConfig::new().with_arbitration(true);
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();

        assert!(back.arbitration);
        assert_eq!(back.search.top_k, config.search.top_k);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let back: PipelineConfig = serde_json::from_str(r#"{"arbitration": true}"#).unwrap();

        assert!(back.arbitration);
        assert_eq!(back.search.top_k, 5);
        assert_eq!(back.bulk.max_targets, 200);
    }
}
