use chrono::{DateTime, Duration, SubsecRound, Utc};
use indoc::formatdoc;

use crate::connection::{Adapter, QueueConnection, SqlParam};
use crate::errors::Result;
use crate::job::Job;
use crate::retry::{retry_on_deadlock, DEFAULT_MAX_RETRIES};
use crate::sql::predicate::{eligibility_sql, ReservationFilter, SqlParams, RESERVE_ORDER};
use crate::worker::Worker;

/// Atomically claims the next eligible job for `worker`, or returns `None`
/// when no row qualifies.
///
/// Selection and lock acquisition happen in one round-trip where the
/// dialect allows it; the portable fallback claims optimistically. Two
/// concurrent calls never return the same row.
pub(crate) async fn reserve(
    connection: &dyn QueueConnection,
    table: &str,
    worker: &Worker,
    max_run_time: Duration,
    now: DateTime<Utc>,
) -> Result<Option<Job>> {
    match connection.adapter() {
        Adapter::Postgres => reserve_postgres(connection, table, worker, max_run_time, now).await,
        Adapter::Mysql => reserve_mysql(connection, table, worker, max_run_time, now).await,
        Adapter::Mssql | Adapter::Teradata => {
            reserve_mssql(connection, table, worker, max_run_time, now).await
        }
        Adapter::Other => reserve_generic(connection, table, worker, max_run_time, now).await,
    }
}

/// Single-statement claim: the inner `for update` is required so that two
/// concurrent selections cannot settle on the same id.
async fn reserve_postgres(
    connection: &dyn QueueConnection,
    table: &str,
    worker: &Worker,
    max_run_time: Duration,
    now: DateTime<Utc>,
) -> Result<Option<Job>> {
    let filter = ReservationFilter::for_worker(worker, now, max_run_time);
    let mut params = SqlParams::new(Adapter::Postgres);

    let locked_at = params.push(SqlParam::Timestamp(now));
    let locked_by = params.push(SqlParam::Text(worker.name().clone()));
    let eligible = eligibility_sql(table, &filter, &mut params);

    let sql = formatdoc!(
        r#"
            update {table}
                set locked_at = {locked_at}, locked_by = {locked_by}
                where id in (
                    select id from {table}
                        where {eligible}
                        order by {RESERVE_ORDER}
                        limit 1
                        for update
                )
                returning *
        "#
    );

    connection.fetch_optional(&sql, &params.into_params()).await
}

/// Two-step claim: MySQL cannot both self-select and update, so the update
/// applies the filter and order directly and the claimed row is re-read by
/// its fresh lock. Timestamps are truncated to whole seconds to match
/// DATETIME precision, and the mutating statement runs under the deadlock
/// retry.
async fn reserve_mysql(
    connection: &dyn QueueConnection,
    table: &str,
    worker: &Worker,
    max_run_time: Duration,
    now: DateTime<Utc>,
) -> Result<Option<Job>> {
    let now = now.trunc_subsecs(0);
    let filter = ReservationFilter::for_worker(worker, now, max_run_time);
    let mut params = SqlParams::new(Adapter::Mysql);

    let locked_at = params.push(SqlParam::Timestamp(now));
    let locked_by = params.push(SqlParam::Text(worker.name().clone()));
    let eligible = eligibility_sql(table, &filter, &mut params);

    let update_sql = formatdoc!(
        r#"
            update {table}
                set locked_at = {locked_at}, locked_by = {locked_by}
                where {eligible}
                order by {RESERVE_ORDER}
                limit 1
        "#
    );

    let update_params = params.into_params();
    let affected = retry_on_deadlock(DEFAULT_MAX_RETRIES, || {
        let sql = update_sql.as_str();
        let params = update_params.as_slice();
        async move { connection.execute(sql, params).await }
    })
    .await?;

    if affected == 0 {
        return Ok(None);
    }

    let mut params = SqlParams::new(Adapter::Mysql);
    let locked_at = params.push(SqlParam::Timestamp(now));
    let locked_by = params.push(SqlParam::Text(worker.name().clone()));
    let select_sql = formatdoc!(
        r#"
            select * from {table}
                where locked_at = {locked_at} and locked_by = {locked_by} and failed_at is null
                limit 1
        "#
    );

    connection
        .fetch_optional(&select_sql, &params.into_params())
        .await
}

/// Claim for dialects with `top` instead of `limit` and no way to return
/// the updated row; the claimed row is re-read by its fresh lock.
async fn reserve_mssql(
    connection: &dyn QueueConnection,
    table: &str,
    worker: &Worker,
    max_run_time: Duration,
    now: DateTime<Utc>,
) -> Result<Option<Job>> {
    let filter = ReservationFilter::for_worker(worker, now, max_run_time);
    let mut params = SqlParams::new(connection.adapter());

    let locked_at = params.push(SqlParam::Timestamp(now));
    let locked_by = params.push(SqlParam::Text(worker.name().clone()));
    let eligible = eligibility_sql(table, &filter, &mut params);

    let update_sql = formatdoc!(
        r#"
            update {table}
                set locked_at = {locked_at}, locked_by = {locked_by}
                where id in (
                    select id from (
                        select top 1 id from {table}
                            where {eligible}
                            order by {RESERVE_ORDER}
                    ) as winner
                )
        "#
    );

    let affected = connection
        .execute(&update_sql, &params.into_params())
        .await?;
    if affected == 0 {
        return Ok(None);
    }

    let mut params = SqlParams::new(connection.adapter());
    let locked_at = params.push(SqlParam::Timestamp(now));
    let locked_by = params.push(SqlParam::Text(worker.name().clone()));
    let select_sql = formatdoc!(
        r#"
            select top 1 * from {table}
                where locked_at = {locked_at} and locked_by = {locked_by} and failed_at is null
        "#
    );

    connection
        .fetch_optional(&select_sql, &params.into_params())
        .await
}

/// Portable optimistic claim: read a window of candidates, then
/// compare-and-swap each by id until one update reports exactly one row.
/// A candidate whose claim is lost to another worker is skipped, so under
/// contention the claimed row may not be the global priority minimum.
async fn reserve_generic(
    connection: &dyn QueueConnection,
    table: &str,
    worker: &Worker,
    max_run_time: Duration,
    now: DateTime<Utc>,
) -> Result<Option<Job>> {
    let filter = ReservationFilter::for_worker(worker, now, max_run_time);
    let read_ahead = *worker.read_ahead();

    let mut params = SqlParams::new(connection.adapter());
    let eligible = eligibility_sql(table, &filter, &mut params);
    let select_sql = formatdoc!(
        r#"
            select * from {table}
                where {eligible}
                order by {RESERVE_ORDER}
                limit {read_ahead}
        "#
    );

    let candidates = connection
        .fetch_all(&select_sql, &params.into_params())
        .await?;

    for candidate in candidates {
        let mut params = SqlParams::new(connection.adapter());
        let locked_at = params.push(SqlParam::Timestamp(now));
        let locked_by = params.push(SqlParam::Text(worker.name().clone()));
        let id = params.push(SqlParam::Int(*candidate.id()));
        let eligible = eligibility_sql(table, &filter, &mut params);

        let claim_sql = formatdoc!(
            r#"
                update {table}
                    set locked_at = {locked_at}, locked_by = {locked_by}
                    where id = {id} and {eligible}
            "#
        );

        let claimed = connection.execute(&claim_sql, &params.into_params()).await?;
        if claimed == 1 {
            let mut params = SqlParams::new(connection.adapter());
            let id = params.push(SqlParam::Int(*candidate.id()));
            let reload_sql = format!("select * from {table} where id = {id}");
            return connection
                .fetch_optional(&reload_sql, &params.into_params())
                .await;
        }
    }

    Ok(None)
}
