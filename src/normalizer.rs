//! Literal clean-up of entity names as they appear in the filings.
//!
//! Only formatting noise is removed here. Deciding that two differently
//! spelled names are the same firm is the resolver's job.

use crate::schema::RawFilingRow;
use log::debug;

/// Canonicalizes a raw entity name.
///
/// Trims, collapses internal whitespace runs to a single space and strips
/// trailing periods and commas. Returns `None` when nothing is left.
pub fn normalize_entity_name(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let stripped = collapsed
        .trim_end_matches(|c: char| c == '.' || c == ',' || c.is_whitespace())
        .to_string();

    if stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// Normalizes every row's entity name, dropping rows left without one.
pub fn normalize_rows(rows: Vec<RawFilingRow>) -> Vec<RawFilingRow> {
    let total = rows.len();
    let normalized: Vec<RawFilingRow> = rows
        .into_iter()
        .filter_map(|mut row| {
            let name = normalize_entity_name(&row.entity_name)?;
            row.entity_name = name;
            Some(row)
        })
        .collect();

    if normalized.len() < total {
        debug!(
            "Dropped {} rows with an empty entity name",
            total - normalized.len()
        );
    }

    normalized
}
