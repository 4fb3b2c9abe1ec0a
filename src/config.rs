use chrono::{DateTime, Utc};
use getset::{Getters, Setters};

use crate::clock::TimeMode;

/// Process-wide queue configuration.
///
/// Read freshly by every operation, so rebinding the prefix or the clock
/// mode between calls (e.g. from a test) takes effect immediately.
#[derive(Clone, Debug, Default, Getters, Setters, PartialEq, Eq)]
#[getset(get = "pub", set = "pub")]
pub struct QueueConfig {
    /// Prefix prepended to the `delayed_jobs` table name
    table_prefix: String,
    /// Wall clock used for `run_at`, `locked_at` and lock expiry
    time_mode: TimeMode,
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// The unquoted name of the jobs table.
    pub fn table_name(&self) -> String {
        format!("{}delayed_jobs", self.table_prefix)
    }

    /// The database's current time under the configured clock mode.
    pub fn db_time_now(&self) -> DateTime<Utc> {
        self.time_mode.now()
    }
}
