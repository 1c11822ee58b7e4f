use anyhow::{bail, Result};
use chrono::{Duration, Utc};
use log::warn;

use crate::db::{
    models::{RunPatch, RunStatus, StoredDataPoint, TestRun},
    store::KvStore,
};

use super::TEST_RUNS_KEY;

enum WriteOutcome {
    Applied,
    Missing,
    Finished(RunStatus),
}

#[derive(Clone)]
pub struct TestRunRepository {
    store: KvStore,
}

impl TestRunRepository {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    /// All stored runs in storage order.
    pub async fn list_runs(&self) -> Vec<TestRun> {
        self.store.get(TEST_RUNS_KEY, Vec::new()).await
    }

    pub async fn create_run(&self, run: &TestRun) -> Result<()> {
        if run.status != RunStatus::Running {
            bail!(
                "test run {} must be created as running, got {}",
                run.id,
                run.status.as_str()
            );
        }

        let record = run.clone();
        self.store
            .update(TEST_RUNS_KEY, move |runs: &mut Vec<TestRun>| runs.push(record))
            .await;
        Ok(())
    }

    /// Merge `patch` into the run with `run_id`. Returns `false` if the run is
    /// absent or already finished; a finished run is never rewritten.
    pub async fn update_run(&self, run_id: &str, patch: RunPatch) -> bool {
        let id = run_id.to_string();
        let outcome = self
            .store
            .update(TEST_RUNS_KEY, move |runs: &mut Vec<TestRun>| {
                match runs.iter_mut().find(|run| run.id == id) {
                    Some(run) if run.status.is_terminal() => WriteOutcome::Finished(run.status),
                    Some(run) => {
                        patch.apply(run);
                        WriteOutcome::Applied
                    }
                    None => WriteOutcome::Missing,
                }
            })
            .await;

        match outcome {
            Some(WriteOutcome::Applied) => true,
            Some(WriteOutcome::Missing) => {
                warn!("TestRun with id {run_id} not found. Cannot update.");
                false
            }
            Some(WriteOutcome::Finished(status)) => {
                warn!(
                    "TestRun {run_id} is already {}. Update discarded.",
                    status.as_str()
                );
                false
            }
            None => false,
        }
    }

    /// Append one reading to a running test. Unknown or finished runs are left
    /// untouched and reported as `false`.
    pub async fn append_data_point(&self, run_id: &str, point: StoredDataPoint) -> bool {
        let id = run_id.to_string();
        let outcome = self
            .store
            .update(TEST_RUNS_KEY, move |runs: &mut Vec<TestRun>| {
                match runs.iter_mut().find(|run| run.id == id) {
                    Some(run) if run.status.is_terminal() => WriteOutcome::Finished(run.status),
                    Some(run) => {
                        run.logged_data.push(point);
                        WriteOutcome::Applied
                    }
                    None => WriteOutcome::Missing,
                }
            })
            .await;

        match outcome {
            Some(WriteOutcome::Applied) => true,
            Some(WriteOutcome::Missing) => {
                warn!("TestRun with id {run_id} not found. Cannot add datapoint.");
                false
            }
            Some(WriteOutcome::Finished(status)) => {
                warn!(
                    "TestRun {run_id} is already {}. Datapoint discarded.",
                    status.as_str()
                );
                false
            }
            None => false,
        }
    }

    pub async fn get_run(&self, run_id: &str) -> Option<TestRun> {
        self.list_runs()
            .await
            .into_iter()
            .find(|run| run.id == run_id)
    }

    /// Mark runs left in `Running` by a process that is gone as `Interrupted`.
    ///
    /// A run counts as abandoned once nothing was logged to it for
    /// `stale_after`; a run still being recorded elsewhere keeps appending and
    /// is left alone. The end time becomes the newest logged point, or the
    /// start time for a run that never logged anything. Returns the ids that
    /// were changed.
    pub async fn mark_interrupted_runs(&self, stale_after: Duration) -> Vec<String> {
        let Some(cutoff) = Utc::now().checked_sub_signed(stale_after) else {
            return Vec::new();
        };
        self.store
            .update(TEST_RUNS_KEY, move |runs: &mut Vec<TestRun>| {
                runs.iter_mut()
                    .filter(|run| run.status == RunStatus::Running)
                    .filter(|run| run.last_activity() < cutoff)
                    .map(|run| {
                        run.end_time = Some(run.last_activity());
                        run.status = RunStatus::Interrupted;
                        run.id.clone()
                    })
                    .collect()
            })
            .await
            .unwrap_or_default()
    }
}

/// Finalize runs a crashed process left behind, logging each one.
pub async fn recover_interrupted_runs(
    repo: &TestRunRepository,
    stale_after: Duration,
) -> Vec<String> {
    let recovered = repo.mark_interrupted_runs(stale_after).await;
    for run_id in &recovered {
        warn!(
            "Recovered incomplete test run {run_id}; marked as Interrupted at {}",
            Utc::now().to_rfc3339()
        );
    }
    recovered
}
