use crate::error::{FilingsError, Result};
use crate::utils::{parse_period_label, period_label, quarter_end_date};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
pub enum EntityType {
    #[serde(rename = "Sociedad")]
    #[schemars(description = "Sociedad de Valores: securities firm that may trade on its own account")]
    SecuritiesFirm,

    #[serde(rename = "Agencia")]
    #[schemars(description = "Agencia de Valores: securities agency acting only on behalf of clients")]
    SecuritiesAgency,
}

impl EntityType {
    pub const ALL: [EntityType; 2] = [EntityType::SecuritiesFirm, EntityType::SecuritiesAgency];

    /// Short discriminator written to the `tipo` column.
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::SecuritiesFirm => "Sociedad",
            EntityType::SecuritiesAgency => "Agencia",
        }
    }

    pub fn long_label(&self) -> &'static str {
        match self {
            EntityType::SecuritiesFirm => "SOCIEDAD DE VALORES",
            EntityType::SecuritiesAgency => "AGENCIA DE VALORES",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One of the four year-to-date reporting checkpoints, in calendar order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
pub enum Checkpoint {
    March,
    June,
    September,
    December,
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 4] = [
        Checkpoint::March,
        Checkpoint::June,
        Checkpoint::September,
        Checkpoint::December,
    ];

    /// Quarter ordinal 1..=4.
    pub fn quarter(&self) -> u32 {
        match self {
            Checkpoint::March => 1,
            Checkpoint::June => 2,
            Checkpoint::September => 3,
            Checkpoint::December => 4,
        }
    }

    pub fn month(&self) -> u32 {
        self.quarter() * 3
    }

    pub fn from_quarter(quarter: u32) -> Option<Self> {
        match quarter {
            1 => Some(Checkpoint::March),
            2 => Some(Checkpoint::June),
            3 => Some(Checkpoint::September),
            4 => Some(Checkpoint::December),
            _ => None,
        }
    }
}

impl FromStr for Checkpoint {
    type Err = FilingsError;

    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim().to_lowercase();
        match label.as_str() {
            "marzo" | "march" | "mar" | "3" | "03" => Ok(Checkpoint::March),
            "junio" | "june" | "jun" | "6" | "06" => Ok(Checkpoint::June),
            "septiembre" | "setiembre" | "september" | "sep" | "sept" | "9" | "09" => {
                Ok(Checkpoint::September)
            }
            "diciembre" | "december" | "dic" | "dec" | "12" => Ok(Checkpoint::December),
            _ => Err(FilingsError::UnknownCheckpoint(s.to_string())),
        }
    }
}

/// Figures that accumulate over a period. In raw filings these are year-to-date totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlowFigures {
    #[serde(rename = "comisiones_percibidas")]
    pub commissions_received: f64,
    #[serde(rename = "comisiones_netas")]
    pub net_commissions: f64,
    #[serde(rename = "margen_bruto")]
    pub gross_margin: f64,
    #[serde(rename = "gastos_explotacion")]
    pub operating_expenses: f64,
    #[serde(rename = "resultados_antes_impuestos")]
    pub pre_tax_result: f64,
}

impl FlowFigures {
    pub const COLUMNS: [&'static str; 5] = [
        "comisiones_percibidas",
        "comisiones_netas",
        "margen_bruto",
        "gastos_explotacion",
        "resultados_antes_impuestos",
    ];

    pub fn values(&self) -> [f64; 5] {
        [
            self.commissions_received,
            self.net_commissions,
            self.gross_margin,
            self.operating_expenses,
            self.pre_tax_result,
        ]
    }

    pub fn from_values(values: [f64; 5]) -> Self {
        Self {
            commissions_received: values[0],
            net_commissions: values[1],
            gross_margin: values[2],
            operating_expenses: values[3],
            pre_tax_result: values[4],
        }
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self::from_values(self.values().map(f))
    }

    /// Combines two sets of figures column by column.
    pub fn zip_with(&self, other: &FlowFigures, f: impl Fn(f64, f64) -> f64) -> Self {
        let a = self.values();
        let b = other.values();
        Self::from_values([
            f(a[0], b[0]),
            f(a[1], b[1]),
            f(a[2], b[2]),
            f(a[3], b[3]),
            f(a[4], b[4]),
        ])
    }
}

/// Point-in-time balances, never accumulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StockFigures {
    #[serde(rename = "fondos_propios")]
    pub equity: f64,
    #[serde(rename = "activos_totales")]
    pub total_assets: f64,
}

impl StockFigures {
    pub const COLUMNS: [&'static str; 2] = ["fondos_propios", "activos_totales"];
}

/// One year-to-date checkpoint as reported by one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFilingRow {
    pub entity_name: String,
    pub entity_type: EntityType,
    pub year: i32,
    pub checkpoint: Checkpoint,
    pub flows: FlowFigures,
    pub stocks: StockFigures,
}

/// A calendar quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub quarter: u32,
}

impl Period {
    pub fn new(year: i32, quarter: u32) -> Self {
        Self { year, quarter }
    }

    pub fn label(&self) -> String {
        period_label(self.year, self.quarter)
    }

    pub fn end_date(&self) -> Result<NaiveDate> {
        quarter_end_date(self.year, self.quarter)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Q{}", self.year, self.quarter)
    }
}

impl FromStr for Period {
    type Err = FilingsError;

    fn from_str(s: &str) -> Result<Self> {
        let (year, quarter) = parse_period_label(s)?;
        Ok(Period::new(year, quarter))
    }
}

/// One entity's results for exactly one calendar quarter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuarterlyRecord {
    #[serde(rename = "entidad")]
    #[schemars(description = "Canonical entity name after duplicate resolution")]
    pub entity: String,

    #[schemars(description = "Normalized name the figures were originally filed under")]
    pub reported_name: String,

    #[serde(rename = "tipo")]
    pub entity_type: EntityType,

    pub year: i32,

    #[schemars(description = "Quarter ordinal, 1 to 4")]
    pub quarter: u32,

    #[serde(rename = "periodo")]
    #[schemars(description = "Period label, e.g. '2023 Q2'")]
    pub period: String,

    #[serde(rename = "fecha")]
    #[schemars(description = "Quarter-end date")]
    pub date: NaiveDate,

    /// Single-quarter flow figures (not cumulative).
    #[serde(flatten)]
    pub flows: FlowFigures,

    #[serde(flatten)]
    pub stocks: StockFigures,
}

impl QuarterlyRecord {
    pub fn period_key(&self) -> Period {
        Period::new(self.year, self.quarter)
    }

    pub fn revenue(&self) -> f64 {
        self.flows.commissions_received
    }

    pub fn total_assets(&self) -> f64 {
        self.stocks.total_assets
    }
}

/// Canonical identity for a cluster of name variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityIdentity {
    pub canonical_name: String,
    pub entity_type: EntityType,
    #[schemars(description = "Every normalized name mapped onto the canonical name, including itself")]
    pub variants: Vec<String>,
}

/// Audit entry recording one name variant folded into a canonical name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MergeDecision {
    pub variant: String,
    pub canonical: String,
    pub variant_score: f64,
    pub canonical_score: f64,
}

/// The deduplicated, filtered dataset held for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DatasetView {
    pub records: Vec<QuarterlyRecord>,
    pub identities: Vec<EntityIdentity>,
    pub merges: Vec<MergeDecision>,
}

impl DatasetView {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted, distinct canonical entity names.
    pub fn entities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.iter().map(|r| r.entity.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn entity_type(&self, entity: &str) -> Option<EntityType> {
        self.records
            .iter()
            .find(|r| r.entity == entity)
            .map(|r| r.entity_type)
    }

    /// Records of one entity, ordered by date.
    pub fn records_for(&self, entity: &str) -> Vec<&QuarterlyRecord> {
        let mut rows: Vec<&QuarterlyRecord> =
            self.records.iter().filter(|r| r.entity == entity).collect();
        rows.sort_by_key(|r| r.date);
        rows
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DatasetView)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
