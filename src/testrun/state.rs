use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sensing::FilterOption;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum EngineStatus {
    #[default]
    Idle,
    Running,
}

/// Reading shown to the operator. Never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveDataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub filter_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub status: EngineStatus,
    pub selected_filter: Option<FilterOption>,
    pub current_run_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub planned_secs: Option<u64>,
    pub remaining_secs: Option<u64>,
    pub live: Vec<LiveDataPoint>,
}

#[derive(Debug, Clone)]
pub struct EngineState {
    pub status: EngineStatus,
    pub selected_filter: Option<FilterOption>,
    pub current_run_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub planned_secs: Option<u64>,
    pub remaining_secs: Option<u64>,
    live: VecDeque<LiveDataPoint>,
    live_capacity: usize,
}

impl EngineState {
    pub fn new(live_capacity: usize) -> Self {
        let live_capacity = live_capacity.max(1);
        Self {
            status: EngineStatus::Idle,
            selected_filter: None,
            current_run_id: None,
            started_at: None,
            planned_secs: None,
            remaining_secs: None,
            live: VecDeque::with_capacity(live_capacity),
            live_capacity,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == EngineStatus::Running
    }

    /// True while `run_id` is the run being recorded.
    pub fn is_current(&self, run_id: &str) -> bool {
        self.is_running() && self.current_run_id.as_deref() == Some(run_id)
    }

    pub fn select_filter(&mut self, filter: FilterOption) {
        self.selected_filter = Some(filter);
        self.live.clear();
    }

    pub fn begin_run(
        &mut self,
        run_id: String,
        planned_secs: Option<u64>,
        started_at: DateTime<Utc>,
    ) {
        self.status = EngineStatus::Running;
        self.current_run_id = Some(run_id);
        self.started_at = Some(started_at);
        self.planned_secs = planned_secs;
        self.remaining_secs = planned_secs;
        self.live.clear();
    }

    pub fn push_live(&mut self, point: LiveDataPoint) {
        self.live.push_front(point);
        self.live.truncate(self.live_capacity);
    }

    /// Count one second down. Returns the seconds left, `None` without a plan.
    pub fn tick_countdown(&mut self) -> Option<u64> {
        let remaining = self.remaining_secs?.saturating_sub(1);
        self.remaining_secs = Some(remaining);
        Some(remaining)
    }

    /// Back to idle. The selected filter and live buffer survive so the last
    /// readings stay visible.
    pub fn end_run(&mut self) -> Option<String> {
        self.status = EngineStatus::Idle;
        self.started_at = None;
        self.planned_secs = None;
        self.remaining_secs = None;
        self.current_run_id.take()
    }

    pub fn live(&self) -> impl Iterator<Item = &LiveDataPoint> {
        self.live.iter()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            status: self.status,
            selected_filter: self.selected_filter,
            current_run_id: self.current_run_id.clone(),
            started_at: self.started_at,
            planned_secs: self.planned_secs,
            remaining_secs: self.remaining_secs,
            live: self.live.iter().cloned().collect(),
        }
    }
}
