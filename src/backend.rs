use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::QueueConfig;
use crate::connection::QueueConnection;
use crate::errors::Result;
use crate::job::Job;
use crate::job_spec::{JobPayload, JobSpec};
use crate::retry::{retry_on_deadlock, DEFAULT_MAX_RETRIES};
use crate::sql;
use crate::worker::Worker;

/// The persistence contract of the job table.
///
/// `reserve` returning `Ok(None)` means "no work", not an error. The
/// mutating operations recover locally from transient lock contention and
/// surface exhaustion as [`crate::RetryError`]; everything else propagates.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Persists a new job from a pre-serialized handler blob.
    async fn enqueue_raw(&self, handler: String, spec: JobSpec) -> Result<Job>;

    /// Atomically claims the next eligible job for `worker`, holding the
    /// lock for at most `max_run_time` before it may be reclaimed.
    async fn reserve(&self, worker: &Worker, max_run_time: Duration) -> Result<Option<Job>>;

    /// Persists the job, inserting or updating by id.
    async fn save(&self, job: &mut Job) -> Result<()>;

    /// Deletes the job; a singleton also clears its pending duplicates.
    async fn destroy(&self, job: &Job) -> Result<()>;

    /// Releases every lock held by `worker_name`, returning the count.
    async fn clear_locks(&self, worker_name: &str) -> Result<u64>;
}

/// The concrete [`JobBackend`] over a [`QueueConnection`].
///
/// Holds the process-wide configuration behind a lock and reads it freshly
/// on every call, so rebinding the table prefix or the clock mode between
/// calls takes effect immediately.
#[derive(Clone)]
pub struct JobQueue {
    connection: Arc<dyn QueueConnection>,
    config: Arc<RwLock<QueueConfig>>,
}

impl JobQueue {
    pub fn new(connection: Arc<dyn QueueConnection>) -> Self {
        Self::with_config(connection, QueueConfig::default())
    }

    pub fn with_config(connection: Arc<dyn QueueConnection>, config: QueueConfig) -> Self {
        Self {
            connection,
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// Rebinds the process-wide configuration; takes effect on the next
    /// call.
    pub async fn configure<F>(&self, mutate: F)
    where
        F: FnOnce(&mut QueueConfig),
    {
        mutate(&mut *self.config.write().await);
    }

    /// The database's current time under the configured clock mode.
    pub async fn db_time_now(&self) -> DateTime<Utc> {
        self.config.read().await.db_time_now()
    }

    /// Persists a new job, deriving the singleton name from the payload
    /// when it exposes one.
    pub async fn enqueue<P: JobPayload>(&self, payload: &P, spec: JobSpec) -> Result<Job> {
        let handler = serde_json::to_string(payload)?;
        let spec = match payload.singleton_queue_name() {
            Some(name) => JobSpec {
                singleton: Some(name),
                ..spec
            },
            None => spec,
        };

        self.enqueue_raw(handler, spec).await
    }

    /// Closes all pooled connections ahead of a process fork.
    pub async fn before_fork(&self) {
        self.connection.before_fork().await;
    }

    /// Re-establishes the default connection in the forked child.
    pub async fn after_fork(&self) -> Result<()> {
        self.connection.after_fork().await
    }

    async fn quoted_table(&self) -> String {
        let table_name = self.config.read().await.table_name();
        self.connection.adapter().quote_table_name(&table_name)
    }
}

#[async_trait]
impl JobBackend for JobQueue {
    async fn enqueue_raw(&self, handler: String, spec: JobSpec) -> Result<Job> {
        let now = self.db_time_now().await;

        let mut builder = Job::builder()
            .priority(spec.priority.unwrap_or(0))
            .handler(handler)
            .run_at(spec.run_at.unwrap_or(now))
            .created_at(now)
            .updated_at(now);
        if let Some(queue) = spec.queue {
            builder = builder.queue(queue);
        }
        if let Some(singleton) = spec.singleton {
            builder = builder.singleton(singleton);
        }
        if let Some(failed_at) = spec.failed_at {
            builder = builder.failed_at(failed_at);
        }
        if let Some(locked_at) = spec.locked_at {
            builder = builder.locked_at(locked_at);
        }
        if let Some(locked_by) = spec.locked_by {
            builder = builder.locked_by(locked_by);
        }

        let mut job = builder.build();
        self.save(&mut job).await?;
        Ok(job)
    }

    async fn reserve(&self, worker: &Worker, max_run_time: Duration) -> Result<Option<Job>> {
        let now = self.db_time_now().await;
        let table = self.quoted_table().await;

        let job = sql::reserve::reserve(
            self.connection.as_ref(),
            &table,
            worker,
            max_run_time,
            now,
        )
        .await?;

        if let Some(job) = &job {
            debug!(job_id = *job.id(), worker = %worker.name(), "Job reserved");
        }

        Ok(job)
    }

    async fn save(&self, job: &mut Job) -> Result<()> {
        let now = self.db_time_now().await;
        let table = self.quoted_table().await;
        let connection = self.connection.as_ref();

        if job.is_new_record() {
            let snapshot = job.clone();
            let persisted = retry_on_deadlock(DEFAULT_MAX_RETRIES, || {
                let table = table.as_str();
                let snapshot = &snapshot;
                async move { sql::enqueue::insert_job(connection, table, snapshot).await }
            })
            .await?;
            *job = persisted;
        } else {
            let current = &*job;
            retry_on_deadlock(DEFAULT_MAX_RETRIES, || {
                let table = table.as_str();
                async move { sql::save::update_job(connection, table, current, now).await }
            })
            .await?;
            job.touch(now);
        }

        Ok(())
    }

    async fn destroy(&self, job: &Job) -> Result<()> {
        let table = self.quoted_table().await;
        let connection = self.connection.as_ref();

        retry_on_deadlock(DEFAULT_MAX_RETRIES, || {
            let table = table.as_str();
            async move { sql::destroy::destroy_job(connection, table, job).await }
        })
        .await?;

        debug!(job_id = *job.id(), "Job removed from queue");
        Ok(())
    }

    async fn clear_locks(&self, worker_name: &str) -> Result<u64> {
        let table = self.quoted_table().await;
        let connection = self.connection.as_ref();

        let cleared = retry_on_deadlock(DEFAULT_MAX_RETRIES, || {
            let table = table.as_str();
            async move { sql::clear_locks::clear_locks(connection, table, worker_name).await }
        })
        .await?;

        if cleared > 0 {
            info!(worker = worker_name, cleared, "Released job locks");
        }

        Ok(cleared)
    }
}
