use crate::analysis::health_score;
use crate::error::Result;
use crate::metrics::QuarterlyMetrics;
use crate::schema::{EntityType, FlowFigures, QuarterlyRecord, StockFigures};
use chrono::NaiveDate;
use std::fmt::Write as _;

const METRIC_COLUMNS: [&str; 8] = [
    "ROA",
    "ROE",
    "ratio_eficiencia",
    "margen_neto",
    "apalancamiento",
    "var_activos",
    "var_ingresos",
    "var_beneficio",
];

fn figure_cells(flows: &FlowFigures, stocks: &StockFigures) -> Vec<String> {
    let mut cells = vec![stocks.equity.to_string(), stocks.total_assets.to_string()];
    cells.extend(flows.values().iter().map(|v| v.to_string()));
    cells
}

fn figure_headers() -> Vec<&'static str> {
    let mut headers = StockFigures::COLUMNS.to_vec();
    headers.extend(FlowFigures::COLUMNS);
    headers
}

fn into_string(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Per-quarter metrics table. Delta columns are blank for the first quarter.
pub fn metrics_to_csv(metrics: &[QuarterlyMetrics]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["periodo", "fecha", "tipo"];
    header.extend(figure_headers());
    header.extend(METRIC_COLUMNS);
    writer.write_record(&header)?;

    for m in metrics {
        let mut row = vec![
            m.period.clone(),
            m.date.format("%Y-%m-%d").to_string(),
            m.entity_type.label().to_string(),
        ];
        row.extend(figure_cells(&m.flows, &m.stocks));
        row.extend(
            [m.roa, m.roe, m.cost_to_income, m.net_margin, m.leverage]
                .iter()
                .map(|v| v.to_string()),
        );
        match &m.deltas {
            Some(d) => row.extend(
                [d.assets_change, d.revenue_change, d.result_change]
                    .iter()
                    .map(|v| v.to_string()),
            ),
            None => row.extend(std::iter::repeat(String::new()).take(3)),
        }
        writer.write_record(&row)?;
    }

    into_string(writer)
}

/// Raw quarterly rows of one or more entities.
pub fn records_to_csv(records: &[&QuarterlyRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["entidad", "nombre_reportado", "tipo", "periodo", "fecha"];
    header.extend(figure_headers());
    writer.write_record(&header)?;

    for r in records {
        let mut row = vec![
            r.entity.clone(),
            r.reported_name.clone(),
            r.entity_type.label().to_string(),
            r.period.clone(),
            r.date.format("%Y-%m-%d").to_string(),
        ];
        row.extend(figure_cells(&r.flows, &r.stocks));
        writer.write_record(&row)?;
    }

    into_string(writer)
}

/// Plain-text executive summary of the latest quarter.
pub fn executive_summary(
    entity: &str,
    entity_type: EntityType,
    metrics: &[QuarterlyMetrics],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "RESUMEN EJECUTIVO: {}", entity);
    let _ = writeln!(out, "Tipo: {}", entity_type.long_label());

    let Some(latest) = metrics.last() else {
        let _ = writeln!(out, "Sin datos trimestrales disponibles.");
        return out;
    };
    let previous = metrics.len().checked_sub(2).map(|i| &metrics[i]);

    let _ = writeln!(out, "Periodo: {}", latest.period);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Comisiones percibidas: {:.0}K",
        latest.flows.commissions_received
    );
    let _ = writeln!(
        out,
        "Resultado antes de impuestos: {:.0}K",
        latest.flows.pre_tax_result
    );
    let _ = writeln!(out, "Activos totales: {:.0}K", latest.stocks.total_assets);
    let _ = writeln!(out, "Fondos propios: {:.0}K", latest.stocks.equity);
    let _ = writeln!(out);
    let _ = writeln!(out, "ROA: {:.1}%", latest.roa);
    let _ = writeln!(out, "ROE: {:.1}%", latest.roe);
    let _ = writeln!(out, "Ratio de eficiencia: {:.1}%", latest.cost_to_income);
    let _ = writeln!(out, "Margen neto: {:.1}%", latest.net_margin);
    let _ = writeln!(out, "Apalancamiento: {:.2}x", latest.leverage);

    if let (Some(prev), Some(d)) = (previous, latest.deltas) {
        let _ = writeln!(out);
        let _ = writeln!(out, "Variacion vs {}:", prev.period);
        let _ = writeln!(out, "  Ingresos: {:+.1}%", d.revenue_change);
        let _ = writeln!(out, "  Beneficio: {:+.1}%", d.result_change);
        let _ = writeln!(out, "  Activos: {:+.1}%", d.assets_change);
        let _ = writeln!(out, "  ROE: {:+.1}pp", latest.roe - prev.roe);
        let _ = writeln!(
            out,
            "  Ratio de eficiencia: {:+.1}pp",
            latest.cost_to_income - prev.cost_to_income
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Puntuacion de salud financiera: {:.0}/100", health_score(latest));

    out
}

/// e.g. `ACME S.V_metricas_20240131.csv`
pub fn export_file_name(entity: &str, kind: &str, date: NaiveDate, extension: &str) -> String {
    format!("{}_{}_{}.{}", entity, kind, date.format("%Y%m%d"), extension)
}
