//! Where readings come from: the filter catalog, the simulated sensor and the
//! device adapter.

pub mod device;
pub mod filters;
pub mod generator;

pub use filters::{find_filter, FilterOption, FILTER_OPTIONS};
pub use generator::MockGenerator;

/// Produces one numeric reading for the selected filter.
///
/// The test-run engine only sees this trait; it makes no assumption about how
/// the number was obtained.
pub trait ReadingSource: Send + Sync + 'static {
    fn read(&self, filter_id: &str) -> f64;
}
