use chrono::Duration;
use derive_builder::Builder;
use getset::Getters;
use rand::RngCore;

/// Identity and reservation knobs of a single worker.
///
/// Every field is read at reservation time, so a test can rebuild the
/// worker between calls to rebind a knob. `name` is what ends up in
/// `locked_by`; it must be unique across the fleet or two processes will
/// treat each other's locks as their own.
#[derive(Getters, Debug, Clone, Builder)]
#[getset(get = "pub")]
#[builder(build_fn(private, name = "build_internal"), pattern = "owned")]
pub struct Worker {
    /// Unique identity recorded in `locked_by`
    #[builder(default = "generate_worker_name()", setter(into))]
    name: String,
    /// How many candidate rows the generic reservation path scans per
    /// attempt
    #[builder(default = "5")]
    read_ahead: i64,
    /// Queues this worker serves; empty means every queue
    #[builder(default, setter(into))]
    queues: Vec<String>,
    /// Lowest priority value this worker will pick up
    #[builder(default, setter(strip_option))]
    min_priority: Option<i32>,
    /// Highest priority value this worker will pick up
    #[builder(default, setter(strip_option))]
    max_priority: Option<i32>,
    /// Lock lease: a lock older than this is treated as abandoned
    #[builder(default = "Duration::hours(4)")]
    max_run_time: Duration,
}

impl Worker {
    /// Creates a new builder for constructing a `Worker`.
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder::default()
    }
}

impl WorkerBuilder {
    /// Builds the Worker with all configured values.
    pub fn build(self) -> Worker {
        self.build_internal()
            .expect("All fields have defaults, build should never fail")
    }
}

fn generate_worker_name() -> String {
    let mut random_bytes = [0u8; 9];
    rand::rng().fill_bytes(&mut random_bytes);
    format!("delayed_worker_{}", hex::encode(random_bytes))
}
