//! Application visit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One application visit. The id is the creation timestamp in RFC 3339 form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl AppSession {
    pub fn open(start_time: DateTime<Utc>) -> Self {
        Self {
            id: start_time.to_rfc3339(),
            start_time,
            end_time: None,
            duration_ms: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }
}
