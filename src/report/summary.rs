use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{RunStatus, TestRun};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub id: String,
    pub filter_name: String,
    pub status: RunStatus,
    pub status_text: &'static str,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub effective_duration: String,
    pub planned_duration: Option<String>,
    pub point_count: usize,
}

pub fn status_text(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Completed => "Completed",
        RunStatus::Stopped => "Stopped manually",
        RunStatus::Aborted => "Aborted",
        RunStatus::Running => "Running",
        RunStatus::Interrupted => "Interrupted",
    }
}

fn minutes_seconds(total_secs: i64) -> String {
    format!("{}m {}s", total_secs / 60, total_secs % 60)
}

/// Wall-clock duration for a finished run, otherwise the planned one.
pub fn effective_duration(run: &TestRun) -> String {
    if let Some(end) = run.end_time {
        let secs = (end - run.start_time).num_seconds().max(0);
        return minutes_seconds(secs);
    }
    match run.test_duration_seconds {
        Some(planned) => format!(
            "planned: {} (status: {})",
            minutes_seconds(planned as i64),
            run.status.as_str()
        ),
        None => "N/A".to_string(),
    }
}

/// `mm:ss` form of the planned duration.
pub fn planned_duration(run: &TestRun) -> Option<String> {
    run.test_duration_seconds
        .map(|secs| format!("{:02}:{:02}", secs / 60, secs % 60))
}

pub fn summarize(run: &TestRun) -> RunSummary {
    RunSummary {
        id: run.id.clone(),
        filter_name: run.filter_name.clone(),
        status: run.status,
        status_text: status_text(run.status),
        start_time: run.start_time,
        end_time: run.end_time,
        effective_duration: effective_duration(run),
        planned_duration: planned_duration(run),
        point_count: run.logged_data.len(),
    }
}

/// History view ordering: newest start time first.
pub fn newest_first(mut runs: Vec<TestRun>) -> Vec<TestRun> {
    runs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    runs
}
