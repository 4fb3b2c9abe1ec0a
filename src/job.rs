use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use derive_builder::Builder;
use getset::Getters;
use serde::de::DeserializeOwned;
use sqlx::FromRow;
use tracing::{debug, info_span, Instrument};

use crate::errors::Result;

/// `Job` represents a unit of deferred work as stored in the jobs table.
///
/// A job is created unlocked, reserved by exactly one worker at a time, and
/// either deleted on success, permanently failed, or released back into the
/// eligible pool. The database row is the single source of truth; the
/// `locked_by`/`locked_at` pair is a logical lease, not a row lock.
#[derive(FromRow, Getters, Debug, Clone, PartialEq, Eq, Builder)]
#[getset(get = "pub")]
#[builder(build_fn(private, name = "build_internal"), pattern = "owned")]
pub struct Job {
    /// Unique identifier for this job
    #[builder(default)]
    id: i64,
    /// Lower number means it should run sooner
    #[builder(default)]
    priority: i32,
    /// How many times it has been attempted
    #[builder(default)]
    attempts: i32,
    /// The serialized payload; the executing side owns the format
    #[builder(default, setter(into))]
    handler: String,
    /// If attempts > 0, why did it fail last?
    #[builder(default, setter(strip_option, into))]
    last_error: Option<String>,
    /// Earliest time at which the job may be reserved
    #[builder(default = "Utc::now()")]
    run_at: DateTime<Utc>,
    /// When the current lock was acquired
    #[builder(default, setter(strip_option))]
    locked_at: Option<DateTime<Utc>>,
    /// Identity of the current lock holder
    #[builder(default, setter(strip_option, into))]
    locked_by: Option<String>,
    /// Set once the job is permanently failed
    #[builder(default, setter(strip_option))]
    failed_at: Option<DateTime<Utc>>,
    /// Named queue used for worker-side filtering
    #[builder(default, setter(strip_option, into))]
    queue: Option<String>,
    /// Singleton class: at most one live lock per name across the fleet
    #[builder(default, setter(strip_option, into))]
    singleton: Option<String>,
    /// When the job was created
    #[builder(default = "Utc::now()")]
    created_at: DateTime<Utc>,
    /// When the job was last updated
    #[builder(default = "Utc::now()")]
    updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a new builder for constructing a `Job`.
    pub fn builder() -> JobBuilder {
        JobBuilder::default()
    }

    /// Whether this job has not been persisted yet.
    pub fn is_new_record(&self) -> bool {
        self.id == 0
    }

    /// Deserializes the `handler` blob into the payload type.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.handler)?)
    }

    /// Whether the job currently holds a live lease.
    pub fn is_locked(&self, now: DateTime<Utc>, max_run_time: Duration) -> bool {
        match self.locked_at {
            Some(locked_at) => locked_at >= now - max_run_time,
            None => false,
        }
    }

    /// Releases the lease. `locked_at` and `locked_by` always change
    /// together.
    pub fn unlock(&mut self) {
        self.locked_at = None;
        self.locked_by = None;
    }

    /// Records a terminal failure: keeps the trace, stamps `failed_at` and
    /// releases the lease. A failed row never re-enters the eligible pool.
    pub fn fail_with(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.last_error = Some(message.into());
        self.failed_at = Some(now);
        self.unlock();
    }

    /// Runs the collaborator's execute future inside a span tagged with the
    /// job id, so nested log calls carry the job context.
    pub async fn invoke_job<F, Fut, T>(&self, execute: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let span = info_span!("delayed_job", job_id = self.id);
        async move {
            debug!("Entering job");
            let outcome = execute().await;
            debug!("Exiting job");
            outcome
        }
        .instrument(span)
        .await
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl JobBuilder {
    /// Builds the Job with all configured values.
    pub fn build(self) -> Job {
        self.build_internal()
            .expect("All fields have defaults, build should never fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq, Eq)]
    struct Greeting {
        to: String,
    }

    #[test]
    fn payload_roundtrips_through_the_handler_blob() {
        let job = Job::builder().handler(r#"{"to":"ops"}"#).build();

        let greeting: Greeting = job.payload().expect("Failed to deserialize payload");
        assert_eq!(greeting.to, "ops");
    }

    #[test]
    fn payload_surfaces_corrupt_handler_blobs() {
        let job = Job::builder().handler("{not json").build();

        assert!(job.payload::<Greeting>().is_err());
    }

    #[test]
    fn lock_liveness_follows_the_lease_window() {
        let now = Utc::now();
        let max_run_time = Duration::hours(4);

        let unlocked = Job::builder().build();
        assert!(!unlocked.is_locked(now, max_run_time));

        let live = Job::builder()
            .locked_at(now - Duration::minutes(5))
            .locked_by("w1")
            .build();
        assert!(live.is_locked(now, max_run_time));

        let stale = Job::builder()
            .locked_at(now - Duration::hours(5))
            .locked_by("w1")
            .build();
        assert!(!stale.is_locked(now, max_run_time));
    }

    #[test]
    fn fail_with_clears_the_lease() {
        let now = Utc::now();
        let mut job = Job::builder()
            .locked_at(now)
            .locked_by("w1")
            .build();

        job.fail_with("boom", now);

        assert_eq!(job.last_error(), &Some("boom".to_string()));
        assert_eq!(job.failed_at(), &Some(now));
        assert_eq!(job.locked_at(), &None);
        assert_eq!(job.locked_by(), &None);
    }

    #[tokio::test]
    async fn invoke_job_passes_the_outcome_through() {
        let job = Job::builder().id(7).build();

        let outcome = job.invoke_job(|| async { 41 + 1 }).await;
        assert_eq!(outcome, 42);
    }
}
