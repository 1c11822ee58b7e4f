use std::{fs, path::Path, time::Duration};

use chrono::{Duration as ChronoDuration, Utc};
use oiltest_lib::{
    db::{RunStatus, TestRun},
    report::CSV_HEADER,
    testrun::{commands, StopReason},
    AppState,
};

fn write_fast_settings(dir: &Path) {
    fs::write(
        dir.join("settings.json"),
        r#"{
            "engine": {
                "liveRefreshMs": 10,
                "loggingIntervalMs": 20,
                "countdownTickMs": 30,
                "liveHistoryLen": 5,
                "defaultDurationSecs": 2
            }
        }"#,
    )
    .unwrap();
}

#[tokio::test]
async fn runs_survive_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    write_fast_settings(dir.path());

    let run_id = {
        let state = AppState::open(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(state.engine.config().logging_interval_ms, 20);

        state.engine.select_filter("index_Four").await.unwrap();
        let run = state.engine.start_run(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        state.engine.stop_run(StopReason::Stopped).await.unwrap();
        run.id
    };

    let state = AppState::open(dir.path().to_path_buf()).await.unwrap();
    let run = commands::get_run(&state, &run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Stopped);
    assert!(!run.logged_data.is_empty());

    let summary = commands::get_run_summary(&state, &run_id).await.unwrap();
    assert_eq!(summary.point_count, run.logged_data.len());
    assert_eq!(summary.status_text, "Stopped manually");
}

#[tokio::test]
async fn reopening_marks_crashed_runs_interrupted() {
    let dir = tempfile::tempdir().unwrap();

    {
        let state = AppState::open(dir.path().to_path_buf()).await.unwrap();
        let crashed = TestRun {
            id: "crashed-run".into(),
            filter_id: "index_One".into(),
            filter_name: "Óleo Extremamente Limpo".into(),
            start_time: Utc::now() - ChronoDuration::hours(1),
            end_time: None,
            status: RunStatus::Running,
            logged_data: Vec::new(),
            test_duration_seconds: Some(300),
        };
        state.runs.create_run(&crashed).await.unwrap();
    }

    let state = AppState::open(dir.path().to_path_buf()).await.unwrap();
    let run = commands::get_run(&state, "crashed-run").await.unwrap();
    assert_eq!(run.status, RunStatus::Interrupted);
    assert_eq!(run.end_time, Some(run.start_time));
}

#[tokio::test]
async fn second_console_leaves_a_live_run_recording() {
    let dir = tempfile::tempdir().unwrap();
    write_fast_settings(dir.path());

    let recorder = AppState::open(dir.path().to_path_buf()).await.unwrap();
    recorder.engine.select_filter("index_Three").await.unwrap();
    let run = recorder.engine.start_run(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(70)).await;

    // What `oiltest history` does while the recorder is still going.
    let viewer = AppState::open(dir.path().to_path_buf()).await.unwrap();
    let seen = commands::get_run(&viewer, &run.id).await.unwrap();
    assert_eq!(seen.status, RunStatus::Running);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let stopped = recorder
        .engine
        .stop_run(StopReason::Stopped)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stopped.status, RunStatus::Stopped);
    assert!(stopped.logged_data.len() > seen.logged_data.len());
    let reread = commands::get_run(&viewer, &run.id).await.unwrap();
    assert_eq!(reread, stopped);
}

#[tokio::test]
async fn database_lives_in_the_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::open(dir.path().to_path_buf()).await.unwrap();
    assert_eq!(
        state.db.path(),
        Some(dir.path().join("oiltest.sqlite3").as_path())
    );
}

#[tokio::test]
async fn export_includes_only_finished_runs_with_data() {
    let dir = tempfile::tempdir().unwrap();
    write_fast_settings(dir.path());
    let state = AppState::open(dir.path().to_path_buf()).await.unwrap();

    state.engine.select_filter("index_Two").await.unwrap();
    state.engine.start_run(Some(60)).await.unwrap();
    state.engine.stop_run(StopReason::Aborted).await.unwrap();

    state.engine.start_run(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(90)).await;
    let with_data = state
        .engine
        .stop_run(StopReason::Stopped)
        .await
        .unwrap()
        .unwrap();

    let out_dir = dir.path().join("reports");
    let path = commands::request_export(&state, &out_dir)
        .await
        .unwrap()
        .expect("export should produce a file");

    let file_name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("minas_teste_relatorio_"));
    assert!(file_name.ends_with(".csv"));

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(lines.len(), 1 + with_data.logged_data.len());
    for line in &lines[1..] {
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields.len(), 9);
        assert_eq!(fields[0], with_data.id);
        assert_eq!(fields[4], "N/A");
        assert_eq!(fields[5], "stopped");
        assert_eq!(fields[8], "%");
    }
}

#[tokio::test]
async fn export_without_data_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::open(dir.path().to_path_buf()).await.unwrap();

    let out_dir = dir.path().join("reports");
    assert!(commands::request_export(&state, &out_dir)
        .await
        .unwrap()
        .is_none());
    assert!(!out_dir.exists());
}

#[tokio::test]
async fn history_lists_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    write_fast_settings(dir.path());
    let state = AppState::open(dir.path().to_path_buf()).await.unwrap();

    state.engine.select_filter("index_One").await.unwrap();
    let first = state.engine.start_run(None).await.unwrap();
    state.engine.stop_run(StopReason::Stopped).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = state.engine.start_run(None).await.unwrap();
    state.engine.stop_run(StopReason::Stopped).await.unwrap();

    let ids: Vec<String> = commands::list_runs(&state)
        .await
        .into_iter()
        .map(|run| run.id)
        .collect();
    assert_eq!(ids, vec![second.id, first.id]);
}
