pub mod csv;
pub mod summary;

pub use csv::{export_filename, render_csv, write_export, CSV_HEADER};
pub use summary::{newest_first, summarize, RunSummary};
