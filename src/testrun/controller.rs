use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    db::{RunPatch, RunStatus, StoredDataPoint, TestRun, TestRunRepository},
    sensing::{find_filter, FilterOption, ReadingSource},
};

use super::{EngineConfig, EngineSnapshot, EngineState, LiveDataPoint, Rejection};

// Set to true to enable verbose logging of the schedules
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// Operator ended the test early.
    Stopped,
    /// Operator discarded the test.
    Aborted,
    /// The planned duration elapsed.
    Completed,
}

impl StopReason {
    pub fn status(self) -> RunStatus {
        match self {
            StopReason::Stopped => RunStatus::Stopped,
            StopReason::Aborted => RunStatus::Aborted,
            StopReason::Completed => RunStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    RunStarted { run: TestRun },
    LiveReading { point: LiveDataPoint },
    CountdownTick { run_id: String, remaining_secs: u64 },
    RunFinished { run_id: String, status: RunStatus },
}

struct RunTasks {
    cancel: CancellationToken,
    live: JoinHandle<()>,
    logging: JoinHandle<()>,
    countdown: Option<JoinHandle<()>>,
}

/// Drives one test run at a time: the live refresh, the durable logging and
/// the optional countdown all run as separate tasks sharing one cancel token.
#[derive(Clone)]
pub struct TestRunController {
    state: Arc<Mutex<EngineState>>,
    tasks: Arc<Mutex<Option<RunTasks>>>,
    runs: TestRunRepository,
    source: Arc<dyn ReadingSource>,
    config: EngineConfig,
    events: broadcast::Sender<EngineEvent>,
}

impl TestRunController {
    pub fn new(
        runs: TestRunRepository,
        source: Arc<dyn ReadingSource>,
        config: EngineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(EngineState::new(config.live_history_len))),
            tasks: Arc::new(Mutex::new(None)),
            runs,
            source,
            config,
            events,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn select_filter(&self, filter_id: &str) -> Result<FilterOption> {
        let mut state = self.state.lock().await;
        if state.is_running() {
            return Err(Rejection::FilterLocked.into());
        }
        let filter = *find_filter(filter_id)
            .ok_or_else(|| Rejection::UnknownFilter(filter_id.to_string()))?;
        state.select_filter(filter);
        info!("Filter {} selected", filter.id);
        Ok(filter)
    }

    /// Start recording against the selected filter. `None` runs until stopped.
    pub async fn start_run(&self, planned_secs: Option<u64>) -> Result<TestRun> {
        // Held until the tasks are installed so two starts cannot interleave.
        let mut state = self.state.lock().await;
        if state.is_running() {
            return Err(Rejection::AlreadyRunning.into());
        }
        let filter = state.selected_filter.ok_or(Rejection::NoFilterSelected)?;
        if planned_secs == Some(0) {
            return Err(Rejection::InvalidDuration.into());
        }

        let started_at = Utc::now();
        let run = TestRun {
            id: Uuid::new_v4().to_string(),
            filter_id: filter.id.to_string(),
            filter_name: filter.name.to_string(),
            start_time: started_at,
            end_time: None,
            status: RunStatus::Running,
            logged_data: Vec::new(),
            test_duration_seconds: planned_secs,
        };

        self.runs.create_run(&run).await?;
        state.begin_run(run.id.clone(), planned_secs, started_at);

        let cancel = CancellationToken::new();
        let tasks = RunTasks {
            live: self.spawn_live_refresh(run.id.clone(), filter, cancel.clone()),
            logging: self.spawn_logging(run.id.clone(), filter, cancel.clone()),
            countdown: planned_secs.map(|_| self.spawn_countdown(run.id.clone(), cancel.clone())),
            cancel,
        };
        *self.tasks.lock().await = Some(tasks);
        drop(state);

        info!(
            "Test run {} started for {} ({})",
            run.id,
            filter.id,
            planned_secs
                .map(|secs| format!("{secs}s"))
                .unwrap_or_else(|| "manual".into())
        );
        let _ = self.events.send(EngineEvent::RunStarted { run: run.clone() });
        Ok(run)
    }

    /// Finalize the current run. Returns `None` when nothing was running.
    pub async fn stop_run(&self, reason: StopReason) -> Result<Option<TestRun>> {
        self.finish(reason, None).await
    }

    async fn finish(&self, reason: StopReason, expected_run: Option<&str>) -> Result<Option<TestRun>> {
        let (run_id, tasks) = {
            let mut state = self.state.lock().await;
            if let Some(expected) = expected_run {
                if !state.is_current(expected) {
                    return Ok(None);
                }
            }
            let Some(run_id) = state.end_run() else {
                return Ok(None);
            };
            let tasks = self.tasks.lock().await.take();
            (run_id, tasks)
        };

        if let Some(tasks) = tasks {
            tasks.cancel.cancel();
            join_task("live refresh", tasks.live).await;
            join_task("logging", tasks.logging).await;
            if let Some(countdown) = tasks.countdown {
                // The countdown finishes the run itself and cannot wait on its own handle.
                if expected_run.is_none() {
                    join_task("countdown", countdown).await;
                }
            }
        }

        let requested = reason.status();
        if !self
            .runs
            .update_run(&run_id, RunPatch::finish(requested, Utc::now()))
            .await
        {
            warn!("Test run {run_id} could not be recorded as {}", requested.as_str());
        }

        let run = self.runs.get_run(&run_id).await;
        let status = run.as_ref().map(|run| run.status).unwrap_or(requested);
        info!("Test run {run_id} finished as {}", status.as_str());

        let _ = self.events.send(EngineEvent::RunFinished {
            run_id: run_id.clone(),
            status,
        });
        Ok(run)
    }

    fn spawn_live_refresh(
        &self,
        run_id: String,
        filter: FilterOption,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let state = self.state.clone();
        let source = self.source.clone();
        let events = self.events.clone();
        let period = self.config.live_refresh();

        tokio::spawn(async move {
            let mut ticker = ticker(period);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let point = LiveDataPoint {
                            timestamp: Utc::now(),
                            value: source.read(filter.id),
                            filter_id: filter.id.to_string(),
                        };
                        {
                            let mut guard = state.lock().await;
                            if !guard.is_current(&run_id) {
                                break;
                            }
                            guard.push_live(point.clone());
                        }
                        let _ = events.send(EngineEvent::LiveReading { point });
                    }
                }
            }
        })
    }

    fn spawn_logging(
        &self,
        run_id: String,
        filter: FilterOption,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let runs = self.runs.clone();
        let source = self.source.clone();
        let period = self.config.logging_interval();

        tokio::spawn(async move {
            let mut ticker = ticker(period);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        log_info!("logging loop for run {run_id} shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let point = StoredDataPoint {
                            timestamp: Utc::now(),
                            value: source.read(filter.id),
                            filter_id: filter.id.to_string(),
                        };
                        if !runs.append_data_point(&run_id, point).await {
                            log_warn!("reading for run {run_id} was not stored");
                        }
                    }
                }
            }
        })
    }

    fn spawn_countdown(&self, run_id: String, cancel: CancellationToken) -> JoinHandle<()> {
        let controller = self.clone();
        let period = self.config.countdown_tick();

        tokio::spawn(async move {
            let mut ticker = ticker(period);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let remaining = {
                            let mut guard = controller.state.lock().await;
                            if !guard.is_current(&run_id) {
                                break;
                            }
                            guard.tick_countdown()
                        };
                        let Some(remaining) = remaining else {
                            break;
                        };
                        let _ = controller.events.send(EngineEvent::CountdownTick {
                            run_id: run_id.clone(),
                            remaining_secs: remaining,
                        });
                        if remaining == 0 {
                            log_info!("countdown for run {run_id} elapsed");
                            if let Err(err) = controller
                                .finish(StopReason::Completed, Some(run_id.as_str()))
                                .await
                            {
                                log_error!("failed to complete run {run_id}: {err:#}");
                            }
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// First tick fires one full period after start.
fn ticker(period: Duration) -> time::Interval {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn join_task(name: &str, handle: JoinHandle<()>) {
    if let Err(err) = handle.await {
        if !err.is_cancelled() {
            error!("{name} task failed: {err}");
        }
    }
}
