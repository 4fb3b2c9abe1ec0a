use indoc::formatdoc;
use tracing::info;

use crate::connection::{Adapter, QueueConnection, SqlParam};
use crate::errors::Result;
use crate::job::Job;
use crate::sql::predicate::SqlParams;

/// Persists a new job row and returns the stored row.
pub(crate) async fn insert_job(
    connection: &dyn QueueConnection,
    table: &str,
    job: &Job,
) -> Result<Job> {
    let adapter = connection.adapter();
    let mut params = SqlParams::new(adapter);

    let values = [
        params.push(SqlParam::Int(i64::from(*job.priority()))),
        params.push(SqlParam::Int(i64::from(*job.attempts()))),
        params.push(SqlParam::Text(job.handler().clone())),
        params.push(SqlParam::NullableText(job.last_error().clone())),
        params.push(SqlParam::Timestamp(*job.run_at())),
        params.push(SqlParam::NullableTimestamp(*job.locked_at())),
        params.push(SqlParam::NullableText(job.locked_by().clone())),
        params.push(SqlParam::NullableTimestamp(*job.failed_at())),
        params.push(SqlParam::NullableText(job.queue().clone())),
        params.push(SqlParam::NullableText(job.singleton().clone())),
        params.push(SqlParam::Timestamp(*job.created_at())),
        params.push(SqlParam::Timestamp(*job.updated_at())),
    ]
    .join(", ");

    let returning = match adapter {
        Adapter::Postgres => "returning *",
        _ => "",
    };

    let insert_sql = formatdoc!(
        r#"
            insert into {table}
                (priority, attempts, handler, last_error, run_at, locked_at, locked_by, failed_at, queue, singleton, created_at, updated_at)
                values ({values})
                {returning}
        "#
    );

    // Only meaningful on connection-local-id dialects; the others return
    // the row from the insert itself.
    let reselect_sql = format!("select * from {table} where id = last_insert_id()");

    let persisted = connection
        .insert_returning(&insert_sql, &params.into_params(), &reselect_sql)
        .await?;

    info!(
        job_id = *persisted.id(),
        queue = persisted.queue().as_deref(),
        singleton = persisted.singleton().as_deref(),
        "Job added to queue"
    );

    Ok(persisted)
}
