//! # Quarterly Filings Builder
//!
//! A library for turning the quarterly regulatory filings of securities firms
//! (Sociedades de Valores) and securities agencies (Agencias de Valores) into a
//! clean, deduplicated quarterly dataset.
//!
//! ## Core Concepts
//!
//! - **YTD Checkpoints**: Filings report flow figures cumulatively from January 1st,
//!   at the end of March, June, September and December
//! - **Flow Columns**: Commissions, margins, expenses and results, de-accumulated into
//!   single-quarter values
//! - **Stock Columns**: Equity and total assets, point-in-time balances passed through
//! - **Canonical Entities**: Name variants of the same firm are clustered and mapped onto
//!   one spelling, keeping a single row per entity and quarter
//!
//! ## Example
//!
//! ```rust,ignore
//! use quarterly_filings_builder::*;
//!
//! let pipeline = FilingsPipeline::new(PipelineConfig::default())?;
//! let view = pipeline.build_from_sources(&[
//!     FilingSource::new("sociedades_estructurado.csv", EntityType::SecuritiesFirm),
//!     FilingSource::new("agencias_estructurado.csv", EntityType::SecuritiesAgency),
//! ])?;
//!
//! let entity = &view.entities()[0];
//! let metrics = compute_quarterly_metrics(&view.records_for(entity));
//! ```

pub mod analysis;
pub mod cache;
pub mod config;
pub mod decumulator;
pub mod error;
pub mod export;
pub mod filter;
pub mod ingestion;
pub mod metrics;
pub mod normalizer;
pub mod resolver;
pub mod schema;
pub mod utils;

pub use analysis::{
    available_periods, dataset_summary, entities, entity_records, health_score, similar_peers,
    type_comparison, DatasetSummary, PeriodSelection, TypeStatistics,
};
pub use cache::{content_key, DatasetCache};
pub use config::{FilterConfig, PipelineConfig, ResolverConfig};
pub use decumulator::{decumulate, decumulate_flows, group_by_entity_year, EntityYear};
pub use error::{FilingsError, Result};
pub use export::{executive_summary, export_file_name, metrics_to_csv, records_to_csv};
pub use filter::{ActivityFilter, ActivityProfile};
pub use ingestion::{load_filings_csv, load_sources, read_filings, FilingSource};
pub use metrics::{compute_quarterly_metrics, QuarterDeltas, QuarterlyMetrics};
pub use normalizer::{normalize_entity_name, normalize_rows};
pub use resolver::{EntityResolver, NameMatcher, Resolution, SubstringPrefixMatcher};
pub use schema::*;

use decumulator::sanitize_records;
use log::{debug, info};
use std::collections::BTreeSet;

/// One-shot transform from raw checkpoint rows to the session dataset.
pub struct FilingsPipeline {
    config: PipelineConfig,
    resolver: EntityResolver,
    filter: ActivityFilter,
}

impl FilingsPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let resolver = EntityResolver::new(config.resolver.clone());
        let filter = ActivityFilter::new(config.filter.clone());
        Ok(Self {
            config,
            resolver,
            filter,
        })
    }

    /// Uses a custom name matcher in place of the substring/prefix heuristic.
    pub fn with_matcher(config: PipelineConfig, matcher: Box<dyn NameMatcher>) -> Result<Self> {
        config.validate()?;
        let resolver = EntityResolver::with_matcher(config.resolver.clone(), matcher);
        let filter = ActivityFilter::new(config.filter.clone());
        Ok(Self {
            config,
            resolver,
            filter,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Normalize, decumulate, sanitize, resolve and filter.
    ///
    /// Data-quality problems never fail the build; offending rows or entities
    /// are dropped and logged.
    pub fn build(&self, rows: Vec<RawFilingRow>) -> DatasetView {
        info!("Building quarterly dataset from {} raw rows", rows.len());

        let rows = normalize_rows(rows);
        let quarterly = sanitize_records(decumulate(&rows));
        debug!("Decumulated into {} quarterly rows", quarterly.len());

        let Resolution {
            records,
            identities,
            merges,
        } = self.resolver.resolve(quarterly);
        debug!(
            "Resolved {} entities ({} name merges)",
            identities.len(),
            merges.len()
        );

        let mut records = self.filter.apply(records);
        records.sort_by(|a, b| a.entity.cmp(&b.entity).then(a.date.cmp(&b.date)));

        let retained: BTreeSet<&str> = records.iter().map(|r| r.entity.as_str()).collect();
        let identities: Vec<EntityIdentity> = identities
            .into_iter()
            .filter(|i| retained.contains(i.canonical_name.as_str()))
            .collect();

        info!(
            "Dataset ready: {} quarterly records for {} entities",
            records.len(),
            identities.len()
        );

        DatasetView {
            records,
            identities,
            merges,
        }
    }

    pub fn build_from_sources(&self, sources: &[ingestion::FilingSource]) -> Result<DatasetView> {
        let rows = load_sources(sources)?;
        Ok(self.build(rows))
    }
}

/// Builds a dataset with the default configuration.
pub fn build_dataset(rows: Vec<RawFilingRow>) -> Result<DatasetView> {
    Ok(FilingsPipeline::new(PipelineConfig::default())?.build(rows))
}
