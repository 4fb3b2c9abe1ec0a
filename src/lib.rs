//! Database-backed delayed-job reservation core.
//!
//! Producers enqueue units of deferred work into a shared `delayed_jobs`
//! table; a fleet of workers competes to atomically claim eligible rows,
//! honoring readiness time, lock expiry, priority order, queue filters and
//! singleton-queue mutual exclusion. Coordination happens purely through
//! the table: no pub/sub, at-least-once under crashes, at most one live
//! lock per singleton name across the fleet.
//!
//! ```no_run
//! use std::sync::Arc;
//! use delayed_worker::{JobQueue, JobSpec, PgQueueConnection, Worker};
//!
//! # #[derive(serde::Serialize)]
//! # struct SendWelcomeEmail { user_id: i64 }
//! # impl delayed_worker::JobPayload for SendWelcomeEmail {}
//! # async fn example() -> delayed_worker::Result<()> {
//! let connection = Arc::new(PgQueueConnection::connect("postgres://localhost/app").await?);
//! let queue = JobQueue::new(connection);
//!
//! queue
//!     .enqueue(&SendWelcomeEmail { user_id: 42 }, JobSpec::default())
//!     .await?;
//!
//! let worker = Worker::builder().name("worker-1").build();
//! use delayed_worker::JobBackend;
//! if let Some(_job) = queue.reserve(&worker, *worker.max_run_time()).await? {
//!     // execute, then queue.destroy(&job) on success
//! }
//! # Ok(())
//! # }
//! ```

mod backend;
mod clock;
mod config;
mod connection;
pub mod errors;
mod job;
mod job_spec;
mod migrate;
mod retry;
mod sql;
mod worker;

pub use backend::{JobBackend, JobQueue};
pub use clock::TimeMode;
pub use config::QueueConfig;
pub use connection::{
    Adapter, MySqlQueueConnection, PgQueueConnection, QueueConnection, SqlParam,
};
pub use errors::{DelayedWorkerError, Result, RetryError};
pub use job::{Job, JobBuilder};
pub use job_spec::{JobPayload, JobSpec, JobSpecBuilder};
pub use migrate::migrate;
pub use retry::{retry_on_deadlock, DEFAULT_MAX_RETRIES};
pub use worker::{Worker, WorkerBuilder};
