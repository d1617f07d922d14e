//! Year-to-date to quarterly conversion.
//!
//! Filings report flow figures cumulatively from January 1st, so the
//! contribution of a single quarter is the difference between consecutive
//! checkpoints. When a checkpoint is missing the gap is split evenly across
//! the quarters it covers. Stock figures are balances and pass through as-is.

use crate::error::Result;
use crate::schema::{
    Checkpoint, EntityType, FlowFigures, Period, QuarterlyRecord, RawFilingRow, StockFigures,
};
use log::{debug, warn};
use std::collections::BTreeMap;

/// All checkpoints one entity reported in one calendar year.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityYear {
    pub entity: String,
    pub entity_type: EntityType,
    pub year: i32,
    pub checkpoints: BTreeMap<Checkpoint, (FlowFigures, StockFigures)>,
}

/// Groups rows by (entity, type, year). Names must already be normalized.
pub fn group_by_entity_year(rows: &[RawFilingRow]) -> Vec<EntityYear> {
    let mut groups: BTreeMap<(String, EntityType, i32), EntityYear> = BTreeMap::new();

    for row in rows {
        let key = (row.entity_name.clone(), row.entity_type, row.year);
        let group = groups.entry(key).or_insert_with(|| EntityYear {
            entity: row.entity_name.clone(),
            entity_type: row.entity_type,
            year: row.year,
            checkpoints: BTreeMap::new(),
        });

        if group
            .checkpoints
            .insert(row.checkpoint, (row.flows, row.stocks))
            .is_some()
        {
            warn!(
                "Duplicate {:?} {} checkpoint for '{}'; keeping the last row",
                row.checkpoint, row.year, row.entity_name
            );
        }
    }

    groups.into_values().collect()
}

/// Converts cumulative checkpoint figures into single-quarter figures.
///
/// Returns one entry per checkpoint present in the input.
pub fn decumulate_flows(
    checkpoints: &BTreeMap<Checkpoint, FlowFigures>,
) -> BTreeMap<Checkpoint, FlowFigures> {
    let q1 = checkpoints.get(&Checkpoint::March);
    let q2 = checkpoints.get(&Checkpoint::June);
    let q3 = checkpoints.get(&Checkpoint::September);
    let q4 = checkpoints.get(&Checkpoint::December);

    let mut quarterly = BTreeMap::new();

    if let Some(c1) = q1 {
        quarterly.insert(Checkpoint::March, *c1);
    }

    if let Some(c2) = q2 {
        let value = match q1 {
            Some(c1) => c2.zip_with(c1, |a, b| a - b),
            None => c2.map(|v| v / 2.0),
        };
        quarterly.insert(Checkpoint::June, value);
    }

    if let Some(c3) = q3 {
        let value = match q2 {
            Some(c2) => c3.zip_with(c2, |a, b| a - b),
            None => c3.map(|v| v / 3.0),
        };
        quarterly.insert(Checkpoint::September, value);
    }

    if let Some(c4) = q4 {
        let value = match (q3, q2, q1) {
            (Some(c3), _, _) => c4.zip_with(c3, |a, b| a - b),
            (None, Some(c2), _) => c4.zip_with(c2, |a, b| (a - b) / 2.0),
            (None, None, Some(c1)) => c4.zip_with(c1, |a, b| (a - b) / 3.0),
            (None, None, None) => c4.map(|v| v / 4.0),
        };
        quarterly.insert(Checkpoint::December, value);
    }

    quarterly
}

/// Emits one quarterly record per checkpoint of the year.
pub fn decumulate_year(group: &EntityYear) -> Result<Vec<QuarterlyRecord>> {
    let cumulative: BTreeMap<Checkpoint, FlowFigures> = group
        .checkpoints
        .iter()
        .map(|(checkpoint, (flows, _))| (*checkpoint, *flows))
        .collect();

    let quarterly = decumulate_flows(&cumulative);

    let mut records = Vec::with_capacity(quarterly.len());
    for (checkpoint, flows) in quarterly {
        let stocks = group.checkpoints[&checkpoint].1;
        let period = Period::new(group.year, checkpoint.quarter());

        records.push(QuarterlyRecord {
            entity: group.entity.clone(),
            reported_name: group.entity.clone(),
            entity_type: group.entity_type,
            year: group.year,
            quarter: period.quarter,
            period: period.label(),
            date: period.end_date()?,
            flows,
            stocks,
        });
    }

    Ok(records)
}

/// Runs grouping and decumulation over a whole dataset.
pub fn decumulate(rows: &[RawFilingRow]) -> Vec<QuarterlyRecord> {
    let groups = group_by_entity_year(rows);
    debug!(
        "Decumulating {} rows across {} entity-years",
        rows.len(),
        groups.len()
    );

    let mut records = Vec::new();
    for group in &groups {
        match decumulate_year(group) {
            Ok(mut year_records) => records.append(&mut year_records),
            Err(e) => warn!(
                "Skipping {} {} for '{}': {}",
                group.entity_type, group.year, group.entity, e
            ),
        }
    }

    records
}

fn is_key_value_infinite(record: &QuarterlyRecord) -> bool {
    [
        record.flows.commissions_received,
        record.flows.pre_tax_result,
        record.stocks.equity,
        record.stocks.total_assets,
    ]
    .iter()
    .any(|v| v.is_infinite())
}

/// Drops rows with infinite key figures and fills remaining NaNs with zero.
pub fn sanitize_records(records: Vec<QuarterlyRecord>) -> Vec<QuarterlyRecord> {
    let total = records.len();
    let mut filled = 0usize;

    let kept: Vec<QuarterlyRecord> = records
        .into_iter()
        .filter(|r| !is_key_value_infinite(r))
        .map(|mut r| {
            let has_nan = r.flows.values().iter().any(|v| v.is_nan())
                || r.stocks.equity.is_nan()
                || r.stocks.total_assets.is_nan();
            if has_nan {
                filled += 1;
                r.flows = r.flows.map(|v| if v.is_nan() { 0.0 } else { v });
                if r.stocks.equity.is_nan() {
                    r.stocks.equity = 0.0;
                }
                if r.stocks.total_assets.is_nan() {
                    r.stocks.total_assets = 0.0;
                }
            }
            r
        })
        .collect();

    if kept.len() < total {
        warn!(
            "Dropped {} quarterly rows with infinite key figures",
            total - kept.len()
        );
    }
    if filled > 0 {
        debug!("Filled missing figures with zero in {} quarterly rows", filled);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn flows(commissions: f64) -> FlowFigures {
        FlowFigures {
            commissions_received: commissions,
            net_commissions: commissions * 0.9,
            gross_margin: commissions * 0.8,
            operating_expenses: commissions * 0.5,
            pre_tax_result: commissions * 0.3,
        }
    }

    fn raw(name: &str, year: i32, checkpoint: Checkpoint, commissions: f64) -> RawFilingRow {
        RawFilingRow {
            entity_name: name.to_string(),
            entity_type: EntityType::SecuritiesFirm,
            year,
            checkpoint,
            flows: flows(commissions),
            stocks: StockFigures {
                equity: 1000.0 + commissions,
                total_assets: 5000.0 + commissions,
            },
        }
    }

    fn commissions_by_quarter(records: &[QuarterlyRecord]) -> Vec<(u32, f64)> {
        records
            .iter()
            .map(|r| (r.quarter, r.flows.commissions_received))
            .collect()
    }

    #[test]
    fn test_full_year_differences() {
        let rows = vec![
            raw("ACME S.V", 2023, Checkpoint::March, 100.0),
            raw("ACME S.V", 2023, Checkpoint::June, 220.0),
            raw("ACME S.V", 2023, Checkpoint::September, 300.0),
            raw("ACME S.V", 2023, Checkpoint::December, 450.0),
        ];

        let records = decumulate(&rows);
        assert_eq!(
            commissions_by_quarter(&records),
            vec![(1, 100.0), (2, 120.0), (3, 80.0), (4, 150.0)]
        );
        assert_eq!(records[1].period, "2023 Q2");
        assert_eq!(records[3].date, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[test]
    fn test_conservation_for_every_flow_column() {
        let rows = vec![
            raw("Beta", 2022, Checkpoint::December, 1234.567),
            raw("Beta", 2022, Checkpoint::March, 201.3),
            raw("Beta", 2022, Checkpoint::September, 999.1),
            raw("Beta", 2022, Checkpoint::June, 512.25),
        ];

        let records = decumulate(&rows);
        assert_eq!(records.len(), 4);

        let final_ytd = flows(1234.567).values();
        for (col, expected) in final_ytd.iter().enumerate() {
            let sum: f64 = records.iter().map(|r| r.flows.values()[col]).sum();
            let tolerance = 1e-6 * expected.abs().max(1.0);
            assert!(
                (sum - expected).abs() <= tolerance,
                "column {} sums to {}, expected {}",
                FlowFigures::COLUMNS[col],
                sum,
                expected
            );
        }
    }

    #[test]
    fn test_q4_only_splits_in_four() {
        let rows = vec![raw("Gamma", 2021, Checkpoint::December, 400.0)];
        let records = decumulate(&rows);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].quarter, 4);
        assert_eq!(records[0].flows.commissions_received, 100.0);
        assert_eq!(records[0].flows.pre_tax_result, 400.0 * 0.3 / 4.0);
    }

    #[test]
    fn test_fallback_branches() {
        let mut checkpoints = BTreeMap::new();
        checkpoints.insert(Checkpoint::June, flows(200.0));
        checkpoints.insert(Checkpoint::December, flows(500.0));
        let q = decumulate_flows(&checkpoints);
        assert_eq!(q[&Checkpoint::June].commissions_received, 100.0);
        assert_eq!(q[&Checkpoint::December].commissions_received, 150.0);
        assert!(!q.contains_key(&Checkpoint::March));

        let mut checkpoints = BTreeMap::new();
        checkpoints.insert(Checkpoint::March, flows(90.0));
        checkpoints.insert(Checkpoint::December, flows(390.0));
        let q = decumulate_flows(&checkpoints);
        assert_eq!(q[&Checkpoint::March].commissions_received, 90.0);
        assert_eq!(q[&Checkpoint::December].commissions_received, 100.0);

        let mut checkpoints = BTreeMap::new();
        checkpoints.insert(Checkpoint::September, flows(300.0));
        let q = decumulate_flows(&checkpoints);
        assert_eq!(q.len(), 1);
        assert_eq!(q[&Checkpoint::September].commissions_received, 100.0);

        let mut checkpoints = BTreeMap::new();
        checkpoints.insert(Checkpoint::March, flows(50.0));
        checkpoints.insert(Checkpoint::September, flows(200.0));
        let q = decumulate_flows(&checkpoints);
        assert!((q[&Checkpoint::September].commissions_received - 200.0 / 3.0).abs() < 1e-9);

        assert!(decumulate_flows(&BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_stocks_pass_through() {
        let rows = vec![
            raw("Delta", 2023, Checkpoint::March, 10.0),
            raw("Delta", 2023, Checkpoint::June, 30.0),
        ];
        let records = decumulate(&rows);

        for (row, record) in rows.iter().zip(records.iter()) {
            assert_eq!(row.stocks, record.stocks);
        }
    }

    #[test]
    fn test_years_are_independent() {
        let rows = vec![
            raw("Eps", 2022, Checkpoint::December, 800.0),
            raw("Eps", 2023, Checkpoint::March, 120.0),
        ];
        let records = decumulate(&rows);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].period, "2022 Q4");
        assert_eq!(records[0].flows.commissions_received, 200.0);
        assert_eq!(records[1].period, "2023 Q1");
        assert_eq!(records[1].flows.commissions_received, 120.0);
    }

    #[test]
    fn test_duplicate_checkpoint_keeps_last() {
        let rows = vec![
            raw("Zeta", 2023, Checkpoint::March, 10.0),
            raw("Zeta", 2023, Checkpoint::March, 40.0),
        ];
        let groups = group_by_entity_year(&rows);
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0].checkpoints[&Checkpoint::March].0.commissions_received,
            40.0
        );
    }

    #[test]
    fn test_sanitize_drops_infinite_and_fills_nan() {
        let mut rows = decumulate(&[
            raw("Eta", 2023, Checkpoint::March, 10.0),
            raw("Eta", 2023, Checkpoint::June, 30.0),
        ]);
        rows[0].stocks.total_assets = f64::INFINITY;
        rows[1].flows.gross_margin = f64::NAN;
        rows[1].stocks.equity = f64::NAN;

        let clean = sanitize_records(rows);
        assert_eq!(clean.len(), 1);
        assert_eq!(clean[0].quarter, 2);
        assert_eq!(clean[0].flows.gross_margin, 0.0);
        assert_eq!(clean[0].stocks.equity, 0.0);
    }
}
