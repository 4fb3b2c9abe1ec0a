use chrono::{DateTime, Utc};
use indoc::formatdoc;

use crate::connection::{QueueConnection, SqlParam};
use crate::errors::Result;
use crate::job::Job;
use crate::sql::predicate::SqlParams;

/// Writes every mutable column of an existing row back, stamping
/// `updated_at`.
pub(crate) async fn update_job(
    connection: &dyn QueueConnection,
    table: &str,
    job: &Job,
    now: DateTime<Utc>,
) -> Result<u64> {
    let mut params = SqlParams::new(connection.adapter());

    let assignments = [
        format!("priority = {}", params.push(SqlParam::Int(i64::from(*job.priority())))),
        format!("attempts = {}", params.push(SqlParam::Int(i64::from(*job.attempts())))),
        format!("handler = {}", params.push(SqlParam::Text(job.handler().clone()))),
        format!("last_error = {}", params.push(SqlParam::NullableText(job.last_error().clone()))),
        format!("run_at = {}", params.push(SqlParam::Timestamp(*job.run_at()))),
        format!("locked_at = {}", params.push(SqlParam::NullableTimestamp(*job.locked_at()))),
        format!("locked_by = {}", params.push(SqlParam::NullableText(job.locked_by().clone()))),
        format!("failed_at = {}", params.push(SqlParam::NullableTimestamp(*job.failed_at()))),
        format!("queue = {}", params.push(SqlParam::NullableText(job.queue().clone()))),
        format!("singleton = {}", params.push(SqlParam::NullableText(job.singleton().clone()))),
        format!("updated_at = {}", params.push(SqlParam::Timestamp(now))),
    ]
    .join(", ");

    let id = params.push(SqlParam::Int(*job.id()));
    let sql = formatdoc!(
        r#"
            update {table}
                set {assignments}
                where id = {id}
        "#
    );

    connection.execute(&sql, &params.into_params()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{Reply, StubConnection};
    use crate::connection::Adapter;

    #[tokio::test]
    async fn update_touches_every_mutable_column_by_id() {
        let connection = StubConnection::new(Adapter::Postgres);
        connection.push_reply(Reply::Affected(1));

        let now = Utc::now();
        let mut job = Job::builder().id(42).handler("{}").build();
        job.fail_with("boom", now);

        let affected = update_job(&connection, "\"delayed_jobs\"", &job, now)
            .await
            .expect("Failed to update");
        assert_eq!(affected, 1);

        let calls = connection.calls();
        let sql = &calls[0].sql;
        assert!(sql.contains("set priority = $1"));
        assert!(sql.contains("failed_at = $8"));
        assert!(sql.contains("updated_at = $11"));
        assert!(sql.contains("where id = $12"));
        assert!(!sql.contains("created_at ="));
        assert_eq!(calls[0].params[11], SqlParam::Int(42));
        assert_eq!(calls[0].params[7], SqlParam::NullableTimestamp(Some(now)));
    }
}
