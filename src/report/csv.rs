//! CSV export of logged readings.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use log::info;

use crate::db::TestRun;
use crate::sensing::filters::unit_for;

pub const CSV_HEADER: &str = "TestRunID,TestFilterName,TestStartTime,TestEndTime,TestDurationSetSeconds,TestStatus,DataTimestamp,DataValue,DataUnit";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const NOT_AVAILABLE: &str = "N/A";

/// Finished runs that logged at least one reading.
pub fn exportable_runs(runs: &[TestRun]) -> Vec<&TestRun> {
    runs.iter()
        .filter(|run| run.status.is_terminal() && !run.logged_data.is_empty())
        .collect()
}

fn format_timestamp<Tz: TimeZone>(value: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    value.with_timezone(tz).format(TIMESTAMP_FORMAT).to_string()
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render the export document, timestamps shown in `tz`. Returns `None` when
/// there is nothing to export.
pub fn render_csv<Tz: TimeZone>(runs: &[TestRun], tz: &Tz) -> Option<String>
where
    Tz::Offset: std::fmt::Display,
{
    let runs = exportable_runs(runs);
    if runs.is_empty() {
        return None;
    }

    let mut rows = vec![CSV_HEADER.to_string()];
    for run in runs {
        let unit = unit_for(&run.filter_id);
        let start = format_timestamp(&run.start_time, tz);
        let end = run
            .end_time
            .as_ref()
            .map(|end| format_timestamp(end, tz))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        let planned = run
            .test_duration_seconds
            .map(|secs| secs.to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        for point in &run.logged_data {
            let fields = [
                escape_field(&run.id),
                escape_field(&run.filter_name),
                start.clone(),
                end.clone(),
                planned.clone(),
                run.status.as_str().to_string(),
                format_timestamp(&point.timestamp, tz),
                point.value.to_string(),
                unit.to_string(),
            ];
            rows.push(fields.join(","));
        }
    }

    Some(rows.join("\n"))
}

pub fn export_filename(now: DateTime<Local>) -> String {
    format!("minas_teste_relatorio_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

/// Write the export into `out_dir`. `Ok(None)` means there was no data.
pub fn write_export(out_dir: &Path, runs: &[TestRun], now: DateTime<Local>) -> Result<Option<PathBuf>> {
    let Some(content) = render_csv(runs, &Local) else {
        return Ok(None);
    };

    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create export directory {}", out_dir.display()))?;
    let path = out_dir.join(export_filename(now));
    fs::write(&path, content)
        .with_context(|| format!("failed to write report to {}", path.display()))?;

    info!("Report {} saved", path.display());
    Ok(Some(path))
}
