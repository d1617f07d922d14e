use crate::error::{FilingsError, Result};
use crate::schema::{Checkpoint, EntityType, FlowFigures, RawFilingRow, StockFigures};
use log::{debug, info, warn};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const ENTITY_COLUMN: &str = "entidad";
pub const CHECKPOINT_COLUMN: &str = "mes";
pub const YEAR_COLUMNS: [&str; 4] = ["año", "anio", "ano", "year"];

/// One input file and the entity type every row in it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingSource {
    pub path: PathBuf,
    pub entity_type: EntityType,
}

impl FilingSource {
    pub fn new(path: impl Into<PathBuf>, entity_type: EntityType) -> Self {
        Self {
            path: path.into(),
            entity_type,
        }
    }
}

struct ColumnIndex {
    entity: usize,
    year: usize,
    checkpoint: usize,
    flows: [usize; 5],
    stocks: [usize; 2],
}

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord, source: &str) -> Result<Self> {
        let find = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| FilingsError::MissingColumn {
                    path: source.to_string(),
                    column: name.to_string(),
                })
        };

        let year = headers
            .iter()
            .position(|h| {
                let h = h.trim().to_lowercase();
                YEAR_COLUMNS.contains(&h.as_str())
            })
            .ok_or_else(|| FilingsError::MissingColumn {
                path: source.to_string(),
                column: YEAR_COLUMNS[0].to_string(),
            })?;

        let mut flows = [0usize; 5];
        for (slot, name) in flows.iter_mut().zip(FlowFigures::COLUMNS) {
            *slot = find(name)?;
        }
        let mut stocks = [0usize; 2];
        for (slot, name) in stocks.iter_mut().zip(StockFigures::COLUMNS) {
            *slot = find(name)?;
        }

        Ok(Self {
            entity: find(ENTITY_COLUMN)?,
            year,
            checkpoint: find(CHECKPOINT_COLUMN)?,
            flows,
            stocks,
        })
    }
}

/// Parses a financial cell. Blank or non-numeric cells become NaN.
pub fn parse_amount(cell: &str) -> f64 {
    let cell = cell.trim();
    if cell.is_empty() {
        return f64::NAN;
    }
    cell.parse::<f64>()
        .or_else(|_| cell.replace(',', ".").parse::<f64>())
        .unwrap_or(f64::NAN)
}

fn parse_year(cell: &str) -> Option<i32> {
    let cell = cell.trim();
    cell.parse::<i32>().ok().or_else(|| {
        cell.parse::<f64>()
            .ok()
            .filter(|y| y.is_finite() && y.fract() == 0.0)
            .map(|y| y as i32)
    })
}

/// Reads filings from any CSV source. `source` names it in errors and logs.
pub fn read_filings<R: Read>(
    reader: R,
    entity_type: EntityType,
    source: &str,
) -> Result<Vec<RawFilingRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let columns = ColumnIndex::from_headers(&headers, source)?;

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    let mut non_numeric = 0usize;

    for (line, result) in csv_reader.records().enumerate() {
        let record = result?;
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        let year = match parse_year(cell(columns.year)) {
            Some(year) => year,
            None => {
                warn!(
                    "{}: row {} has unparseable year '{}', skipping",
                    source,
                    line + 2,
                    cell(columns.year)
                );
                skipped += 1;
                continue;
            }
        };

        let checkpoint: Checkpoint = match cell(columns.checkpoint).parse() {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!("{}: row {}: {}, skipping", source, line + 2, e);
                skipped += 1;
                continue;
            }
        };

        let mut amount = |idx: usize| {
            let raw = cell(idx);
            let value = parse_amount(raw);
            if value.is_nan() && !raw.trim().is_empty() {
                non_numeric += 1;
            }
            value
        };

        let flows = FlowFigures::from_values(columns.flows.map(&mut amount));
        let stocks = StockFigures {
            equity: amount(columns.stocks[0]),
            total_assets: amount(columns.stocks[1]),
        };

        rows.push(RawFilingRow {
            entity_name: cell(columns.entity).to_string(),
            entity_type,
            year,
            checkpoint,
            flows,
            stocks,
        });
    }

    if non_numeric > 0 {
        warn!(
            "{}: {} non-numeric financial cells treated as missing",
            source, non_numeric
        );
    }
    debug!("{}: read {} rows, skipped {}", source, rows.len(), skipped);

    Ok(rows)
}

pub fn load_filings_csv(path: impl AsRef<Path>, entity_type: EntityType) -> Result<Vec<RawFilingRow>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| FilingsError::MissingInput {
        path: path.display().to_string(),
        source: e,
    })?;
    read_filings(file, entity_type, &path.display().to_string())
}

/// Loads every source. Any missing file aborts the whole load.
pub fn load_sources(sources: &[FilingSource]) -> Result<Vec<RawFilingRow>> {
    let mut rows = Vec::new();
    for source in sources {
        let mut loaded = load_filings_csv(&source.path, source.entity_type)?;
        info!(
            "Loaded {} {} rows from {}",
            loaded.len(),
            source.entity_type,
            source.path.display()
        );
        rows.append(&mut loaded);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "entidad,año,mes,comisiones_percibidas,comisiones_netas,margen_bruto,gastos_explotacion,resultados_antes_impuestos,fondos_propios,activos_totales";

    #[test]
    fn test_read_filings() {
        let data = format!(
            "{}\nACME S.V.,2023,Marzo,100,90,80,50,30,400,1000\n\"Beta, A.V.\",2023.0,Junio,10,9,8,5,3,40,100\n",
            HEADER
        );
        let rows = read_filings(data.as_bytes(), EntityType::SecuritiesFirm, "mem").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].entity_name, "ACME S.V.");
        assert_eq!(rows[0].checkpoint, Checkpoint::March);
        assert_eq!(rows[0].flows.commissions_received, 100.0);
        assert_eq!(rows[0].stocks.total_assets, 1000.0);
        assert_eq!(rows[1].entity_name, "Beta, A.V.");
        assert_eq!(rows[1].year, 2023);
        assert_eq!(rows[1].entity_type, EntityType::SecuritiesFirm);
    }

    #[test]
    fn test_bad_cells_are_tolerated() {
        let data = format!(
            "{}\nGamma,2023,Diciembre,n/a,,80,50,30,400,1000\nDelta,20x3,Marzo,1,1,1,1,1,1,1\nEps,2023,Abril,1,1,1,1,1,1,1\n",
            HEADER
        );
        let rows = read_filings(data.as_bytes(), EntityType::SecuritiesAgency, "mem").unwrap();

        assert_eq!(rows.len(), 1);
        assert!(rows[0].flows.commissions_received.is_nan());
        assert!(rows[0].flows.net_commissions.is_nan());
        assert_eq!(rows[0].flows.gross_margin, 80.0);
    }

    #[test]
    fn test_missing_column() {
        let data = "entidad,año,mes\nACME,2023,Marzo\n";
        let err = read_filings(data.as_bytes(), EntityType::SecuritiesFirm, "mem").unwrap_err();
        assert!(matches!(err, FilingsError::MissingColumn { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = load_filings_csv("/definitely/not/here.csv", EntityType::SecuritiesFirm)
            .unwrap_err();
        assert!(matches!(err, FilingsError::MissingInput { .. }));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 12.5 "), 12.5);
        assert_eq!(parse_amount("12,5"), 12.5);
        assert_eq!(parse_amount("-3"), -3.0);
        assert!(parse_amount("").is_nan());
        assert!(parse_amount("abc").is_nan());
    }
}
