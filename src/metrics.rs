use crate::schema::{EntityType, FlowFigures, QuarterlyRecord, StockFigures};
use crate::utils::{guarded_pct, pct_change};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Changes against the previous quarter, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuarterDeltas {
    pub assets_change: f64,
    pub revenue_change: f64,
    /// Uses the absolute prior result as base so a recovery from a loss reads positive.
    pub result_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterlyMetrics {
    pub period: String,
    pub date: NaiveDate,
    pub entity_type: EntityType,
    pub flows: FlowFigures,
    pub stocks: StockFigures,
    pub roa: f64,
    pub roe: f64,
    pub cost_to_income: f64,
    pub net_margin: f64,
    pub leverage: f64,
    /// `None` for the first quarter of the series.
    pub deltas: Option<QuarterDeltas>,
}

impl QuarterlyMetrics {
    pub fn from_record(record: &QuarterlyRecord, previous: Option<&QuarterlyRecord>) -> Self {
        let f = &record.flows;
        let s = &record.stocks;

        let leverage = if s.equity > 0.0 {
            s.total_assets / s.equity
        } else {
            0.0
        };

        let deltas = previous.map(|prev| QuarterDeltas {
            assets_change: pct_change(s.total_assets, prev.stocks.total_assets),
            revenue_change: pct_change(
                f.commissions_received,
                prev.flows.commissions_received,
            ),
            result_change: if prev.flows.pre_tax_result != 0.0 {
                (f.pre_tax_result - prev.flows.pre_tax_result) / prev.flows.pre_tax_result.abs()
                    * 100.0
            } else {
                0.0
            },
        });

        Self {
            period: record.period.clone(),
            date: record.date,
            entity_type: record.entity_type,
            flows: *f,
            stocks: *s,
            roa: guarded_pct(f.pre_tax_result, s.total_assets),
            roe: guarded_pct(f.pre_tax_result, s.equity),
            cost_to_income: guarded_pct(f.operating_expenses, f.gross_margin),
            net_margin: guarded_pct(f.pre_tax_result, f.commissions_received),
            leverage,
            deltas,
        }
    }
}

/// Ratios and quarter-over-quarter changes for one entity's series.
///
/// The records are ordered by date before computing; records of other entities
/// must already be filtered out.
pub fn compute_quarterly_metrics(records: &[&QuarterlyRecord]) -> Vec<QuarterlyMetrics> {
    let mut ordered: Vec<&QuarterlyRecord> = records.to_vec();
    ordered.sort_by_key(|r| r.date);

    ordered
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let previous = if i > 0 { Some(ordered[i - 1]) } else { None };
            QuarterlyMetrics::from_record(record, previous)
        })
        .collect()
}
