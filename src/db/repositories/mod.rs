pub mod app_sessions;
pub mod test_runs;

pub use app_sessions::SessionRepository;
pub use test_runs::TestRunRepository;

pub const APP_SESSIONS_KEY: &str = "oiltest.appSessions";
pub const TEST_RUNS_KEY: &str = "oiltest.testRuns";
