//! Dataset queries backing entity selection, period filtering and peer comparison.

use crate::error::{FilingsError, Result};
use crate::metrics::QuarterlyMetrics;
use crate::schema::{DatasetView, EntityType, Period, QuarterlyRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Every period present in the dataset, oldest first.
pub fn available_periods(view: &DatasetView) -> Vec<Period> {
    let periods: BTreeSet<Period> = view.records.iter().map(|r| r.period_key()).collect();
    periods.into_iter().collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PeriodSelection {
    Latest,
    All,
    Custom(Vec<Period>),
}

impl PeriodSelection {
    /// The last two available periods, the default for a custom selection.
    pub fn default_custom(view: &DatasetView) -> Self {
        let periods = available_periods(view);
        let start = periods.len().saturating_sub(2);
        PeriodSelection::Custom(periods[start..].to_vec())
    }

    /// Resolves the selection against the dataset. Custom periods absent from
    /// the dataset are ignored.
    pub fn resolve(&self, view: &DatasetView) -> Vec<Period> {
        let periods = available_periods(view);
        match self {
            PeriodSelection::Latest => periods.last().copied().into_iter().collect(),
            PeriodSelection::All => periods,
            PeriodSelection::Custom(chosen) => periods
                .into_iter()
                .filter(|p| chosen.contains(p))
                .collect(),
        }
    }
}

/// Sorted entity names, optionally restricted to one type.
pub fn entities(view: &DatasetView, entity_type: Option<EntityType>) -> Vec<String> {
    let names: BTreeSet<&str> = view
        .records
        .iter()
        .filter(|r| entity_type.map_or(true, |t| r.entity_type == t))
        .map(|r| r.entity.as_str())
        .collect();
    names.into_iter().map(str::to_string).collect()
}

/// One entity's records within the given periods, oldest first.
pub fn entity_records<'a>(
    view: &'a DatasetView,
    entity: &str,
    periods: &[Period],
) -> Vec<&'a QuarterlyRecord> {
    view.records_for(entity)
        .into_iter()
        .filter(|r| periods.contains(&r.period_key()))
        .collect()
}

fn mean_assets_by_entity(view: &DatasetView) -> BTreeMap<&str, (EntityType, f64)> {
    let mut sums: BTreeMap<&str, (EntityType, f64, usize)> = BTreeMap::new();
    for record in &view.records {
        let entry = sums
            .entry(record.entity.as_str())
            .or_insert((record.entity_type, 0.0, 0));
        entry.1 += record.stocks.total_assets;
        entry.2 += 1;
    }
    sums.into_iter()
        .map(|(name, (t, sum, n))| (name, (t, sum / n as f64)))
        .collect()
}

/// The `n` entities of the same type whose mean total assets are closest to
/// `entity`'s, nearest first.
pub fn similar_peers(view: &DatasetView, entity: &str, n: usize) -> Result<Vec<String>> {
    let means = mean_assets_by_entity(view);
    let (entity_type, size) = *means
        .get(entity)
        .ok_or_else(|| FilingsError::UnknownEntity(entity.to_string()))?;

    let mut candidates: Vec<(&str, f64)> = means
        .iter()
        .filter(|(name, (t, _))| **name != entity && *t == entity_type)
        .map(|(name, (_, mean))| (*name, (mean - size).abs()))
        .collect();
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));

    Ok(candidates
        .into_iter()
        .take(n)
        .map(|(name, _)| name.to_string())
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeStatistics {
    pub entity_type: EntityType,
    pub entity_count: usize,
    pub mean_commissions: f64,
    pub mean_assets: f64,
}

/// Side-by-side averages for securities firms and agencies. Types with no
/// records are omitted.
pub fn type_comparison(view: &DatasetView) -> Vec<TypeStatistics> {
    EntityType::ALL
        .iter()
        .filter_map(|&entity_type| {
            let rows: Vec<&QuarterlyRecord> = view
                .records
                .iter()
                .filter(|r| r.entity_type == entity_type)
                .collect();
            if rows.is_empty() {
                return None;
            }
            let n = rows.len() as f64;
            let names: BTreeSet<&str> = rows.iter().map(|r| r.entity.as_str()).collect();
            Some(TypeStatistics {
                entity_type,
                entity_count: names.len(),
                mean_commissions: rows.iter().map(|r| r.flows.commissions_received).sum::<f64>()
                    / n,
                mean_assets: rows.iter().map(|r| r.stocks.total_assets).sum::<f64>() / n,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_records: usize,
    pub firms: usize,
    pub agencies: usize,
}

pub fn dataset_summary(view: &DatasetView) -> DatasetSummary {
    DatasetSummary {
        total_records: view.len(),
        firms: entities(view, Some(EntityType::SecuritiesFirm)).len(),
        agencies: entities(view, Some(EntityType::SecuritiesAgency)).len(),
    }
}

/// Composite 0-100 style score for one quarter: 30% ROE against a 20%
/// benchmark, 30% ROA against 10%, 40% cost efficiency. Capped at 100, not floored.
pub fn health_score(metrics: &QuarterlyMetrics) -> f64 {
    let score = (metrics.roe / 20.0 * 100.0) * 0.3
        + (metrics.roa / 10.0 * 100.0) * 0.3
        + (100.0 - metrics.cost_to_income) * 0.4;
    score.min(100.0)
}
