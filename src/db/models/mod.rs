pub mod app_session;
pub mod test_run;

pub use app_session::AppSession;
pub use test_run::{RunPatch, RunStatus, StoredDataPoint, TestRun};
