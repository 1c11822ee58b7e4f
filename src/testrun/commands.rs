//! Read-side operations the console calls next to the engine itself.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Local;

use crate::{
    db::{AppSession, TestRun},
    report::{self, RunSummary},
    AppState,
};

pub async fn list_runs(state: &AppState) -> Vec<TestRun> {
    report::newest_first(state.runs.list_runs().await)
}

pub async fn get_run(state: &AppState, run_id: &str) -> Option<TestRun> {
    state.runs.get_run(run_id).await
}

pub async fn get_run_summary(state: &AppState, run_id: &str) -> Option<RunSummary> {
    get_run(state, run_id).await.map(|run| report::summarize(&run))
}

pub async fn list_sessions(state: &AppState) -> Vec<AppSession> {
    state.sessions.list_sessions().await
}

/// Export every finished run with data into `out_dir`.
pub async fn request_export(state: &AppState, out_dir: &Path) -> Result<Option<PathBuf>> {
    let runs = state.runs.list_runs().await;
    report::write_export(out_dir, &runs, Local::now())
}
