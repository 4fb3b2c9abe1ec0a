use std::str::FromStr;

use chrono::{DateTime, Local, Utc};

/// Which wall clock the process treats as the database's current time.
///
/// `db_time_now` never round-trips to the database, so every worker in the
/// fleet must keep its system clock synchronized for the lock-expiry
/// arithmetic to hold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimeMode {
    /// Coordinated universal time
    #[default]
    Utc,
    /// The system local time of the worker process
    Local,
    /// An explicit named zone, e.g. `"Europe/Paris"`
    Zone(chrono_tz::Tz),
}

impl TimeMode {
    /// Builds the named-zone mode, validating the zone name.
    pub fn zone(name: &str) -> core::result::Result<Self, chrono_tz::ParseError> {
        Ok(TimeMode::Zone(chrono_tz::Tz::from_str(name)?))
    }

    /// The current time under this mode, normalized to UTC for storage
    /// and comparison.
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            TimeMode::Utc => Utc::now(),
            TimeMode::Local => Local::now().with_timezone(&Utc),
            TimeMode::Zone(tz) => Utc::now().with_timezone(tz).with_timezone(&Utc),
        }
    }
}
