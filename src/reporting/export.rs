//! Machine-readable exports. Every file is written through a temporary file
//! and renamed into place, so an interrupted run never leaves a truncated table.

use anyhow::{Context, Result};
use std::path::Path;

use crate::core::aggregator::{ResultRow, ResultTable};
use crate::core::analysis::AnalysisReport;
use crate::error::EngineFatalError;
use crate::infra::fs::write_atomic;

const NOT_AVAILABLE: &str = "N/A";

/// Writes the long table: one record per cell, in row order.
pub fn write_table(table: &ResultTable, path: &Path) -> Result<(), EngineFatalError> {
    let export_error = |reason: String| EngineFatalError::Export {
        path: path.to_path_buf(),
        reason,
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    if table.is_empty() {
        // The header still documents the schema of an empty run.
        writer
            .write_record([
                "ordinal",
                "repository",
                "test_id",
                "config_label",
                "status",
                "exit_code",
                "duration_secs",
                "metric",
                "max_rss_kb",
            ])
            .map_err(|e| export_error(e.to_string()))?;
    }
    for row in &table.rows {
        writer.serialize(row).map_err(|e| export_error(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| export_error(e.to_string()))?;
    write_atomic(path, &bytes).map_err(|e| export_error(format!("{e:#}")))
}

/// Writes the pivot: one row per test, one column per configuration.
///
/// A cell holds the duration in seconds when the test succeeded, the
/// upper-case status otherwise, and `N/A` when the cell never ran.
/// `Test_Number` counts tests across every repository of the table, so it
/// is unique within the file.
pub fn write_wide_table(table: &ResultTable, path: &Path) -> Result<(), EngineFatalError> {
    let export_error = |reason: String| EngineFatalError::Export {
        path: path.to_path_buf(),
        reason,
    };

    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    let mut header = vec!["Test_Number".to_string(), "Test_Name".to_string()];
    header.extend(table.labels.iter().cloned());
    writer
        .write_record(&header)
        .map_err(|e| export_error(e.to_string()))?;

    for (number, row) in (1usize..).zip(table.pivot()) {
        let mut record = vec![
            number.to_string(),
            format!("{}/{}", row.repository, row.test_id),
        ];
        record.extend(row.cells.iter().map(|cell| wide_cell(*cell)));
        writer
            .write_record(&record)
            .map_err(|e| export_error(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| export_error(e.to_string()))?;
    write_atomic(path, &bytes).map_err(|e| export_error(format!("{e:#}")))
}

fn wide_cell(cell: Option<&ResultRow>) -> String {
    match cell {
        Some(row) if row.succeeded() => format!("{:.2}", row.duration_secs),
        Some(row) => row.status.marker().to_string(),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Reads a long table written by [`write_table`].
pub fn read_table(path: &Path) -> Result<ResultTable> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open result table {}", path.display()))?;
    let rows = reader
        .deserialize::<ResultRow>()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse result table {}", path.display()))?;
    Ok(ResultTable::from_rows(rows))
}

/// Writes an analysis report as pretty JSON.
pub fn write_analysis(report: &AnalysisReport, path: &Path) -> Result<()> {
    let json = report.to_json().context("Failed to serialize analysis report")?;
    write_atomic(path, json.as_bytes())
}
