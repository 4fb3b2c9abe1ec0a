use indoc::formatdoc;
use tracing::info;

use crate::config::QueueConfig;
use crate::connection::{Adapter, QueueConnection};
use crate::errors::Result;

/// Installs the jobs table and its reservation indices.
///
/// Idempotent on the dialects that support `if not exists`; the claim
/// indices cover the reservation ordering key, the lock holder, the
/// singleton class and the failure marker.
pub async fn migrate(connection: &dyn QueueConnection, config: &QueueConfig) -> Result<()> {
    let adapter = connection.adapter();
    let name = config.table_name();
    let table = adapter.quote_table_name(&name);

    for statement in install_statements(adapter, &name, &table) {
        connection.execute(&statement, &[]).await?;
    }

    info!(table = %name, "Installed jobs table");
    Ok(())
}

fn install_statements(adapter: Adapter, name: &str, table: &str) -> Vec<String> {
    match adapter {
        Adapter::Mysql => vec![formatdoc!(
            r#"
                create table if not exists {table} (
                    id bigint auto_increment primary key,
                    priority int not null default 0,
                    attempts int not null default 0,
                    handler text not null,
                    last_error text,
                    run_at datetime not null,
                    locked_at datetime,
                    locked_by varchar(255),
                    failed_at datetime,
                    queue varchar(255),
                    singleton varchar(255),
                    created_at datetime not null,
                    updated_at datetime not null,
                    index index_{name}_on_priority_run_at (priority, run_at),
                    index index_{name}_on_locked_by (locked_by),
                    index index_{name}_on_singleton (singleton),
                    index index_{name}_on_failed_at (failed_at)
                )
            "#
        )],
        Adapter::Postgres => vec![
            formatdoc!(
                r#"
                    create table if not exists {table} (
                        id bigserial primary key,
                        priority integer not null default 0,
                        attempts integer not null default 0,
                        handler text not null,
                        last_error text,
                        run_at timestamptz not null,
                        locked_at timestamptz,
                        locked_by text,
                        failed_at timestamptz,
                        queue text,
                        singleton text,
                        created_at timestamptz not null,
                        updated_at timestamptz not null
                    )
                "#
            ),
            format!(
                "create index if not exists index_{name}_on_priority_run_at on {table} (priority, run_at)"
            ),
            format!("create index if not exists index_{name}_on_locked_by on {table} (locked_by)"),
            format!("create index if not exists index_{name}_on_singleton on {table} (singleton)"),
            format!("create index if not exists index_{name}_on_failed_at on {table} (failed_at)"),
        ],
        _ => vec![
            formatdoc!(
                r#"
                    create table {table} (
                        id bigint generated by default as identity primary key,
                        priority integer not null default 0,
                        attempts integer not null default 0,
                        handler varchar(8000) not null,
                        last_error varchar(8000),
                        run_at timestamp not null,
                        locked_at timestamp,
                        locked_by varchar(255),
                        failed_at timestamp,
                        queue varchar(255),
                        singleton varchar(255),
                        created_at timestamp not null,
                        updated_at timestamp not null
                    )
                "#
            ),
            format!("create index index_{name}_on_priority_run_at on {table} (priority, run_at)"),
            format!("create index index_{name}_on_locked_by on {table} (locked_by)"),
            format!("create index index_{name}_on_singleton on {table} (singleton)"),
            format!("create index index_{name}_on_failed_at on {table} (failed_at)"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::StubConnection;

    #[tokio::test]
    async fn postgres_install_creates_the_table_and_every_index() {
        let connection = StubConnection::new(Adapter::Postgres);

        migrate(&connection, &QueueConfig::default())
            .await
            .expect("Failed to migrate");

        let calls = connection.calls();
        assert_eq!(calls.len(), 5);
        assert!(calls[0]
            .sql
            .contains("create table if not exists \"delayed_jobs\""));
        assert!(calls[1].sql.contains("(priority, run_at)"));
        assert!(calls[2].sql.contains("(locked_by)"));
        assert!(calls[3].sql.contains("(singleton)"));
        assert!(calls[4].sql.contains("(failed_at)"));
    }

    #[tokio::test]
    async fn mssql_install_emits_plain_ansi_ddl() {
        let connection = StubConnection::new(Adapter::Mssql);

        migrate(&connection, &QueueConfig::default())
            .await
            .expect("Failed to migrate");

        let calls = connection.calls();
        assert_eq!(calls.len(), 5);
        assert!(calls[0].sql.contains("create table [delayed_jobs]"));
        assert!(calls[0]
            .sql
            .contains("id bigint generated by default as identity primary key"));
        assert!(calls[1].sql.contains("(priority, run_at)"));
        assert!(calls[4].sql.contains("(failed_at)"));
        // no if-not-exists guard exists in these dialects' DDL
        for call in &calls {
            assert!(!call.sql.contains("if not exists"));
        }
    }

    #[tokio::test]
    async fn mysql_install_inlines_its_indices() {
        let connection = StubConnection::new(Adapter::Mysql);

        let mut config = QueueConfig::default();
        config.set_table_prefix("acme_".to_string());
        migrate(&connection, &config)
            .await
            .expect("Failed to migrate");

        let calls = connection.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0]
            .sql
            .contains("create table if not exists `acme_delayed_jobs`"));
        assert!(calls[0]
            .sql
            .contains("index index_acme_delayed_jobs_on_priority_run_at (priority, run_at)"));
    }
}
