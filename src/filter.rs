use crate::config::FilterConfig;
use crate::schema::{FlowFigures, Period, QuarterlyRecord};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Per-entity activity aggregated over all of its quarters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityProfile {
    pub max_revenue: f64,
    pub max_assets: f64,
    pub quarters: usize,
    pub flow_totals: FlowFigures,
}

impl ActivityProfile {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a QuarterlyRecord>) -> Self {
        let mut profile = ActivityProfile {
            max_revenue: f64::NEG_INFINITY,
            max_assets: f64::NEG_INFINITY,
            ..Default::default()
        };
        let mut periods: BTreeSet<Period> = BTreeSet::new();

        for record in records {
            profile.max_revenue = profile.max_revenue.max(record.flows.commissions_received);
            profile.max_assets = profile.max_assets.max(record.stocks.total_assets);
            profile.flow_totals = profile.flow_totals.zip_with(&record.flows, |a, b| a + b);
            periods.insert(record.period_key());
        }

        profile.quarters = periods.len();
        profile
    }
}

/// Drops dormant shells and one-off filers.
pub struct ActivityFilter {
    config: FilterConfig,
}

impl ActivityFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    fn passes(&self, value: f64, threshold: f64) -> bool {
        if self.config.inclusive_thresholds {
            value >= threshold
        } else {
            value > threshold
        }
    }

    pub fn is_active(&self, profile: &ActivityProfile) -> bool {
        let has_activity = self.passes(profile.max_revenue, self.config.revenue_threshold)
            || self.passes(profile.max_assets, self.config.asset_threshold);
        let enough_history = profile.quarters >= self.config.min_quarters;
        let has_flows = profile.flow_totals.values().iter().any(|v| *v != 0.0);

        has_activity && enough_history && has_flows
    }

    /// Retains the records of active entities only. Order is preserved.
    pub fn apply(&self, records: Vec<QuarterlyRecord>) -> Vec<QuarterlyRecord> {
        let mut by_entity: BTreeMap<&str, Vec<&QuarterlyRecord>> = BTreeMap::new();
        for record in &records {
            by_entity.entry(record.entity.as_str()).or_default().push(record);
        }

        let active: BTreeSet<String> = by_entity
            .into_iter()
            .filter(|(name, rows)| {
                let profile = ActivityProfile::from_records(rows.iter().copied());
                let keep = self.is_active(&profile);
                if !keep {
                    debug!(
                        "Filtering out '{}' ({} quarters, max revenue {:.2}, max assets {:.2})",
                        name, profile.quarters, profile.max_revenue, profile.max_assets
                    );
                }
                keep
            })
            .map(|(name, _)| name.to_string())
            .collect();

        records
            .into_iter()
            .filter(|r| active.contains(&r.entity))
            .collect()
    }
}
