//! Test run data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Running,
    Completed,
    Stopped,
    Aborted,
    /// The process ended while the run was still `Running`.
    Interrupted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Stopped => "stopped",
            RunStatus::Aborted => "aborted",
            RunStatus::Interrupted => "interrupted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredDataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub filter_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub id: String,
    pub filter_id: String,
    pub filter_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default)]
    pub logged_data: Vec<StoredDataPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_duration_seconds: Option<u64>,
}

impl TestRun {
    /// Timestamp of the newest logged point, falling back to the start time.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.logged_data
            .last()
            .map(|point| point.timestamp)
            .unwrap_or(self.start_time)
    }
}

/// Fields merged into a stored run by `TestRunRepository::update_run`.
#[derive(Debug, Clone, Default)]
pub struct RunPatch {
    pub status: Option<RunStatus>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RunPatch {
    pub fn finish(status: RunStatus, end_time: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            end_time: Some(end_time),
        }
    }

    pub fn apply(&self, run: &mut TestRun) {
        if let Some(status) = self.status {
            run.status = status;
        }
        if let Some(end_time) = self.end_time {
            run.end_time = Some(end_time);
        }
    }
}
