use crate::error::{FilingsError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tuning knobs for name clustering and duplicate collapse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ResolverConfig {
    #[schemars(
        description = "Number of leading key characters two names must share to be clustered. The comparison is bounded by the shorter key."
    )]
    pub prefix_len: usize,

    #[schemars(
        description = "Match keys shorter than this never match anything, so stray initials cannot swallow real names."
    )]
    pub min_key_len: usize,

    #[schemars(description = "Weight per row with nonzero commissions when ranking name variants.")]
    pub revenue_weight: f64,

    #[schemars(description = "Weight per row with positive total assets when ranking name variants.")]
    pub assets_weight: f64,

    #[schemars(description = "Weight per observed row when ranking name variants.")]
    pub rows_weight: f64,

    #[schemars(
        description = "Only compare names of the same entity type. When false, every pair in the dataset is compared and a cluster spanning both types is dropped."
    )]
    pub partition_by_type: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            prefix_len: 10,
            min_key_len: 3,
            revenue_weight: 10.0,
            assets_weight: 5.0,
            rows_weight: 1.0,
            partition_by_type: false,
        }
    }
}

/// Thresholds deciding whether an entity is a real ongoing business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FilterConfig {
    #[schemars(description = "Minimum quarterly commissions seen at least once.")]
    pub revenue_threshold: f64,

    #[schemars(description = "Minimum total assets seen at least once.")]
    pub asset_threshold: f64,

    #[schemars(description = "Minimum number of distinct quarters with data.")]
    pub min_quarters: usize,

    #[schemars(
        description = "If true a value equal to a threshold passes (>=); if false it must exceed it (>)."
    )]
    pub inclusive_thresholds: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            revenue_threshold: 1.0,
            asset_threshold: 1.0,
            min_quarters: 2,
            inclusive_thresholds: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    pub resolver: ResolverConfig,
    pub filter: FilterConfig,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        let r = &self.resolver;
        if r.prefix_len == 0 {
            return Err(FilingsError::InvalidConfig(
                "resolver.prefix_len must be at least 1".to_string(),
            ));
        }
        for (name, weight) in [
            ("revenue_weight", r.revenue_weight),
            ("assets_weight", r.assets_weight),
            ("rows_weight", r.rows_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(FilingsError::InvalidConfig(format!(
                    "resolver.{} must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }

        let f = &self.filter;
        if f.min_quarters == 0 {
            return Err(FilingsError::InvalidConfig(
                "filter.min_quarters must be at least 1".to_string(),
            ));
        }
        for (name, threshold) in [
            ("revenue_threshold", f.revenue_threshold),
            ("asset_threshold", f.asset_threshold),
        ] {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(FilingsError::InvalidConfig(format!(
                    "filter.{} must be a non-negative number, got {}",
                    name, threshold
                )));
            }
        }

        Ok(())
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = schemars::schema_for!(PipelineConfig);
        serde_json::to_string_pretty(&schema)
    }
}
