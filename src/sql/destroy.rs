use tracing::warn;

use crate::connection::{QueueConnection, SqlParam};
use crate::errors::Result;
use crate::job::Job;
use crate::sql::predicate::SqlParams;

/// Deletes a job row.
///
/// When the row belongs to a singleton queue, its pending duplicates are
/// deleted first: a successful singleton clears the whole class.
pub(crate) async fn destroy_job(
    connection: &dyn QueueConnection,
    table: &str,
    job: &Job,
) -> Result<()> {
    if let Some(singleton) = job.singleton() {
        remove_others_from_singleton_queue(connection, table, job, singleton).await?;
    }

    let mut params = SqlParams::new(connection.adapter());
    let id = params.push(SqlParam::Int(*job.id()));
    let sql = format!("delete from {table} where id = {id}");
    connection.execute(&sql, &params.into_params()).await?;

    Ok(())
}

/// Deletes every other row sharing this job's singleton name.
///
/// A payload that no longer deserializes must not abort the destroy: the
/// cleanup is skipped with a warning and the row itself is still deleted.
async fn remove_others_from_singleton_queue(
    connection: &dyn QueueConnection,
    table: &str,
    job: &Job,
    singleton: &str,
) -> Result<()> {
    if let Err(error) = job.payload::<serde_json::Value>() {
        warn!(
            job_id = *job.id(),
            %error,
            "Skipping singleton cleanup, payload does not deserialize"
        );
        return Ok(());
    }

    let mut params = SqlParams::new(connection.adapter());
    let name = params.push(SqlParam::Text(singleton.to_string()));
    let id = params.push(SqlParam::Int(*job.id()));
    let sql = format!("delete from {table} where singleton = {name} and id <> {id}");
    connection.execute(&sql, &params.into_params()).await?;

    Ok(())
}
