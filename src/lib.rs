mod cli;
pub mod db;
pub mod report;
pub mod sensing;
pub mod settings;
pub mod testrun;
mod utils;

use std::{future::Future, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::broadcast::{self, error::RecvError};

use cli::{Cli, Commands};
use db::{
    repositories::{
        app_sessions::{close_app_session, open_app_session},
        test_runs::recover_interrupted_runs,
    },
    Database, KvStore, SessionRepository, TestRunRepository,
};
use sensing::{MockGenerator, ReadingSource, FILTER_OPTIONS};
use settings::SettingsStore;
use testrun::{commands, EngineEvent, EngineStatus, Rejection, StopReason, TestRunController};

pub struct AppState {
    pub db: Database,
    pub sessions: SessionRepository,
    pub runs: TestRunRepository,
    pub engine: TestRunController,
    pub settings: SettingsStore,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Open the store under `data_dir`, finalize runs a crashed process left
    /// behind and build the engine around the mock sensor.
    pub async fn open(data_dir: PathBuf) -> Result<Self> {
        Self::open_with_source(data_dir, Arc::new(MockGenerator)).await
    }

    pub async fn open_with_source(
        data_dir: PathBuf,
        source: Arc<dyn ReadingSource>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let database = Database::new(data_dir.join("oiltest.sqlite3"))?;
        let store = KvStore::new(database.clone());
        let sessions = SessionRepository::new(store.clone());
        let runs = TestRunRepository::new(store);

        let settings = SettingsStore::new(data_dir.join("settings.json"))?;

        // Another console may be recording right now; only runs that stopped
        // logging long ago are finalized.
        recover_interrupted_runs(&runs, settings.engine().stale_run_after()).await;

        let engine = TestRunController::new(runs.clone(), source, settings.engine());

        Ok(Self {
            db: database,
            sessions,
            runs,
            engine,
            settings,
            data_dir,
        })
    }

    fn default_export_dir(&self) -> PathBuf {
        self.settings
            .export_dir()
            .unwrap_or_else(|| self.data_dir.join("reports"))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("oiltest"))
        .unwrap_or_else(|| PathBuf::from(".oiltest"))
}

pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let state = AppState::open(data_dir).await?;

    let session = open_app_session(&state.sessions, Utc::now()).await;
    let result = dispatch(&state, cli.command).await;
    close_app_session(&state.sessions, &session.id, Utc::now()).await;
    result
}

async fn dispatch(state: &AppState, command: Commands) -> Result<()> {
    match command {
        Commands::Filters => {
            for filter in FILTER_OPTIONS.iter() {
                println!(
                    "{:<12} {:<32} {:>6.2}-{:<6.2} {}",
                    filter.id, filter.name, filter.min, filter.max, filter.unit
                );
            }
            Ok(())
        }
        Commands::Run {
            filter,
            duration,
            manual,
            abort_on_interrupt,
        } => {
            let planned = if manual {
                None
            } else {
                Some(duration.unwrap_or(state.engine.config().default_duration_secs))
            };
            let interrupt_reason = if abort_on_interrupt {
                StopReason::Aborted
            } else {
                StopReason::Stopped
            };
            run_test(&state.engine, &filter, planned, interrupt_reason).await
        }
        Commands::History => {
            for run in commands::list_runs(state).await {
                let summary = report::summarize(&run);
                println!(
                    "{}  {:<32} {:<18} {:>4} pts  {}",
                    summary.id,
                    summary.filter_name,
                    summary.status_text,
                    summary.point_count,
                    summary.effective_duration
                );
            }
            Ok(())
        }
        Commands::Report { run_id } => {
            let Some(run) = commands::get_run(state, &run_id).await else {
                bail!("test run {run_id} not found");
            };
            let summary = report::summarize(&run);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            let unit = sensing::filters::unit_for(&run.filter_id);
            for point in &run.logged_data {
                println!("{}  {:>8.2} {unit}", point.timestamp.to_rfc3339(), point.value);
            }
            Ok(())
        }
        Commands::Export { out_dir } => {
            let out_dir = out_dir.unwrap_or_else(|| state.default_export_dir());
            match commands::request_export(state, &out_dir).await? {
                Some(path) => println!("Report saved to {}", path.display()),
                None => println!("No collected data to report."),
            }
            Ok(())
        }
        Commands::Sessions => {
            for session in commands::list_sessions(state).await {
                let duration = session
                    .duration_ms
                    .map(|ms| format!("{ms} ms"))
                    .unwrap_or_else(|| "open".into());
                println!("{}  {duration}", session.id);
            }
            Ok(())
        }
        Commands::Config { export_dir } => {
            if export_dir.is_some() {
                state.settings.update_export_dir(export_dir)?;
            }
            println!("data dir:   {}", state.data_dir.display());
            if let Some(db_path) = state.db.path() {
                println!("database:   {}", db_path.display());
            }
            println!("export dir: {}", state.default_export_dir().display());
            println!(
                "engine:     {}",
                serde_json::to_string(&state.settings.engine())?
            );
            Ok(())
        }
    }
}

async fn run_test(
    engine: &TestRunController,
    filter_id: &str,
    planned_secs: Option<u64>,
    interrupt_reason: StopReason,
) -> Result<()> {
    let mut events = engine.subscribe();
    engine.select_filter(filter_id).await?;
    let run = match engine.start_run(planned_secs).await {
        Ok(run) => run,
        Err(err) => match err.downcast_ref::<Rejection>() {
            Some(rejection) => bail!("test not started: {rejection}"),
            None => return Err(err),
        },
    };
    println!("Test {} started for {}", run.id, run.filter_name);

    follow_run(
        engine,
        &mut events,
        &run.id,
        tokio::signal::ctrl_c(),
        interrupt_reason,
    )
    .await
}

/// Print engine events until the run ends, stopping it with
/// `interrupt_reason` if `interrupt` resolves first.
async fn follow_run<F: Future>(
    engine: &TestRunController,
    events: &mut broadcast::Receiver<EngineEvent>,
    run_id: &str,
    interrupt: F,
    interrupt_reason: StopReason,
) -> Result<()> {
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            _ = &mut interrupt => {
                if let Some(run) = engine.stop_run(interrupt_reason).await? {
                    println!(
                        "Test {} {} with {} logged readings",
                        run.id,
                        run.status.as_str(),
                        run.logged_data.len()
                    );
                }
                break;
            }
            event = events.recv() => match event {
                Ok(EngineEvent::LiveReading { point }) => {
                    println!("{}  {:>8.2}", point.timestamp.format("%H:%M:%S"), point.value);
                }
                Ok(EngineEvent::CountdownTick { remaining_secs, .. }) if remaining_secs % 10 == 0 => {
                    println!("{:02}:{:02} remaining", remaining_secs / 60, remaining_secs % 60);
                }
                Ok(EngineEvent::RunFinished { run_id, status }) => {
                    println!("Test {run_id} {}", status.as_str());
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    // The finish event may be among the skipped ones.
                    if engine.snapshot().await.status == EngineStatus::Idle {
                        println!("Test {run_id} finished ({skipped} events skipped)");
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{db::RunStatus, testrun::EngineConfig};

    fn chatty_engine() -> (TestRunController, TestRunRepository) {
        let runs = TestRunRepository::new(KvStore::new(Database::open_in_memory().unwrap()));
        let config = EngineConfig {
            live_refresh_ms: 1,
            logging_interval_ms: 50,
            countdown_tick_ms: 30,
            live_history_len: 4,
            default_duration_secs: 3,
            stale_run_after_ms: 1_000,
        };
        let engine = TestRunController::new(runs.clone(), Arc::new(MockGenerator), config);
        (engine, runs)
    }

    #[tokio::test]
    async fn follow_run_ends_when_countdown_finishes() {
        let (engine, runs) = chatty_engine();
        let mut events = engine.subscribe();
        engine.select_filter("index_Three").await.unwrap();
        let run = engine.start_run(Some(2)).await.unwrap();

        tokio::time::timeout(
            Duration::from_secs(3),
            follow_run(
                &engine,
                &mut events,
                &run.id,
                std::future::pending::<()>(),
                StopReason::Stopped,
            ),
        )
        .await
        .expect("follow_run kept waiting after the run ended")
        .unwrap();

        let stored = runs.get_run(&run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn follow_run_ends_after_falling_behind_a_finished_run() {
        let (engine, _runs) = chatty_engine();
        let mut events = engine.subscribe();
        engine.select_filter("index_Three").await.unwrap();
        let run = engine.start_run(Some(5)).await.unwrap();

        // Hundreds of live readings overflow the channel before anyone reads it.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(engine.snapshot().await.status, EngineStatus::Idle);

        tokio::time::timeout(
            Duration::from_secs(1),
            follow_run(
                &engine,
                &mut events,
                &run.id,
                std::future::pending::<()>(),
                StopReason::Stopped,
            ),
        )
        .await
        .expect("follow_run kept waiting after lagging")
        .unwrap();
    }

    #[tokio::test]
    async fn follow_run_stops_the_run_on_interrupt() {
        let (engine, runs) = chatty_engine();
        let mut events = engine.subscribe();
        engine.select_filter("index_One").await.unwrap();
        let run = engine.start_run(None).await.unwrap();

        follow_run(
            &engine,
            &mut events,
            &run.id,
            tokio::time::sleep(Duration::from_millis(60)),
            StopReason::Aborted,
        )
        .await
        .unwrap();

        assert_eq!(engine.snapshot().await.status, EngineStatus::Idle);
        let stored = runs.get_run(&run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Aborted);
    }
}
