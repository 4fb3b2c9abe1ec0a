use indoc::formatdoc;

use crate::connection::{QueueConnection, SqlParam};
use crate::errors::Result;
use crate::sql::predicate::SqlParams;

/// Releases every lock held by `worker_name`, returning how many rows were
/// unlocked.
pub(crate) async fn clear_locks(
    connection: &dyn QueueConnection,
    table: &str,
    worker_name: &str,
) -> Result<u64> {
    let mut params = SqlParams::new(connection.adapter());
    let name = params.push(SqlParam::Text(worker_name.to_string()));

    let sql = formatdoc!(
        r#"
            update {table}
                set locked_by = null, locked_at = null
                where locked_by = {name}
        "#
    );

    connection.execute(&sql, &params.into_params()).await
}
