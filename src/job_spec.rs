use chrono::{DateTime, Utc};
use derive_builder::Builder;
use getset::Getters;
use serde::Serialize;

/// A payload that can be enqueued.
///
/// The payload is serialized into the job's `handler` blob; deserialization
/// and execution are the consuming side's concern. A payload may opt into a
/// singleton queue by returning its name, in which case at most one job of
/// that name holds a live lock across the whole fleet, and the name
/// overrides any caller-supplied `singleton` option.
pub trait JobPayload: Serialize {
    /// Name of the singleton queue this payload belongs to, if any.
    fn singleton_queue_name(&self) -> Option<String> {
        None
    }
}

/// Configuration options for a job being added to the queue.
///
/// All fields are optional; on persist the defaults are `priority = 0`,
/// `run_at = now` under the configured clock, and null for everything else.
///
/// To create a JobSpec with fluent syntax, use the JobSpecBuilder:
///
/// ```
/// use delayed_worker::JobSpec;
/// use chrono::Utc;
///
/// let spec = JobSpec::builder()
///     .queue("emails")
///     .run_at(Utc::now() + chrono::Duration::minutes(5))
///     .priority(10)
///     .build();
/// ```
#[derive(Getters, Debug, Default, Clone, PartialEq, Eq, Builder)]
#[getset(get = "pub")]
#[builder(
    build_fn(private, name = "build_internal"),
    setter(strip_option),
    default,
    pattern = "owned"
)]
pub struct JobSpec {
    /// Priority of the new job; lower runs sooner
    pub priority: Option<i32>,

    /// Earliest time the job may be reserved (defaults to now on persist)
    #[builder(setter(into))]
    pub run_at: Option<DateTime<Utc>>,

    /// Named queue the job belongs to, for worker-side filtering
    #[builder(setter(into))]
    pub queue: Option<String>,

    /// Singleton class name; ignored when the payload derives its own
    #[builder(setter(into))]
    pub singleton: Option<String>,

    /// Persist the job as already permanently failed
    #[builder(setter(into))]
    pub failed_at: Option<DateTime<Utc>>,

    /// Persist the job with a pre-acquired lock
    #[builder(setter(into))]
    pub locked_at: Option<DateTime<Utc>>,

    /// Holder of the pre-acquired lock
    #[builder(setter(into))]
    pub locked_by: Option<String>,
}

impl JobSpec {
    /// Creates a new instance of JobSpec with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing a JobSpec with a fluent API.
    pub fn builder() -> JobSpecBuilder {
        JobSpecBuilder::new()
    }
}

impl JobSpecBuilder {
    /// Creates a new instance of JobSpecBuilder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the JobSpec from the current builder state.
    pub fn build(self) -> JobSpec {
        self.build_internal()
            .expect("There is a default value for all fields")
    }
}
