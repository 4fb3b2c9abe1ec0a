use chrono::{DateTime, Duration, Utc};
use indoc::formatdoc;

use crate::connection::{Adapter, SqlParam};
use crate::worker::Worker;

/// Rows are claimed lowest priority first, oldest `run_at` next, `id` as
/// the stable tiebreak.
pub(crate) const RESERVE_ORDER: &str = "priority asc, run_at asc, id asc";

/// Accumulates bind values while rendering adapter-correct placeholders.
///
/// Clauses must be assembled in the textual order of the final statement:
/// the `?` style is positional, so a value pushed out of order binds to the
/// wrong marker.
pub(crate) struct SqlParams {
    adapter: Adapter,
    params: Vec<SqlParam>,
}

impl SqlParams {
    pub(crate) fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            params: Vec::new(),
        }
    }

    /// Registers a bind value and returns its placeholder token.
    pub(crate) fn push(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        self.adapter.placeholder(self.params.len())
    }

    pub(crate) fn into_params(self) -> Vec<SqlParam> {
        self.params
    }
}

/// The values the eligibility predicate is evaluated against.
pub(crate) struct ReservationFilter<'a> {
    pub(crate) now: DateTime<Utc>,
    /// Locks acquired before this instant are expired
    pub(crate) lock_expired_before: DateTime<Utc>,
    pub(crate) worker_name: &'a str,
    pub(crate) min_priority: Option<i32>,
    pub(crate) max_priority: Option<i32>,
    pub(crate) queues: &'a [String],
}

impl<'a> ReservationFilter<'a> {
    pub(crate) fn for_worker(
        worker: &'a Worker,
        now: DateTime<Utc>,
        max_run_time: Duration,
    ) -> Self {
        Self {
            now,
            lock_expired_before: now - max_run_time,
            worker_name: worker.name(),
            min_priority: *worker.min_priority(),
            max_priority: *worker.max_priority(),
            queues: worker.queues(),
        }
    }
}

/// Renders the full eligibility predicate: readiness or self-lock, the
/// priority band, the queue filter, and the singleton exclusion.
pub(crate) fn eligibility_sql(
    table: &str,
    filter: &ReservationFilter<'_>,
    params: &mut SqlParams,
) -> String {
    let mut clauses = Vec::new();

    let run_at = params.push(SqlParam::Timestamp(filter.now));
    let expired = params.push(SqlParam::Timestamp(filter.lock_expired_before));
    let me = params.push(SqlParam::Text(filter.worker_name.to_string()));
    clauses.push(format!(
        "failed_at is null and ((run_at <= {run_at} and (locked_at is null or locked_at < {expired})) or locked_by = {me})"
    ));

    if let Some(min_priority) = filter.min_priority {
        let min = params.push(SqlParam::Int(i64::from(min_priority)));
        clauses.push(format!("priority >= {min}"));
    }

    if let Some(max_priority) = filter.max_priority {
        let max = params.push(SqlParam::Int(i64::from(max_priority)));
        clauses.push(format!("priority <= {max}"));
    }

    if !filter.queues.is_empty() {
        let marks: Vec<String> = filter
            .queues
            .iter()
            .map(|queue| params.push(SqlParam::Text(queue.clone())))
            .collect();
        clauses.push(format!("queue in ({})", marks.join(", ")));
    }

    clauses.push(singleton_exclusion_sql(table, filter, params));

    clauses.join(" and ")
}

/// A singleton row is skipped while another live-locked row shares its
/// name. The nested derived table is load-bearing: MySQL refuses a
/// subquery that selects from the table being updated unless it is wrapped
/// one level deeper, and the other dialects tolerate the wrapper.
pub(crate) fn singleton_exclusion_sql(
    table: &str,
    filter: &ReservationFilter<'_>,
    params: &mut SqlParams,
) -> String {
    let now = params.push(SqlParam::Timestamp(filter.now));
    let live_after = params.push(SqlParam::Timestamp(filter.lock_expired_before));
    let me = params.push(SqlParam::Text(filter.worker_name.to_string()));

    formatdoc!(
        r#"(singleton is null or singleton not in (
            select singleton from (
                select distinct singleton from {table}
                    where run_at <= {now}
                    and singleton is not null
                    and locked_at is not null and locked_at >= {live_after}
                    and locked_by <> {me}
                    and failed_at is null
            ) as locked_singletons
        ))"#
    )
}
