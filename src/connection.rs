use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlArguments, MySqlPoolOptions};
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::{Arguments, MySqlPool, PgPool};
use tokio::sync::RwLock;
use tracing::warn;

use crate::errors::Result;
use crate::job::Job;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// The SQL dialect family a connection speaks.
///
/// The reservation engine selects its claim strategy by this value, and the
/// table quoting and placeholder styles follow it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Adapter {
    Postgres,
    Mysql,
    Mssql,
    Teradata,
    /// Anything else: served by the portable optimistic claim path
    Other,
}

impl Adapter {
    /// Maps a driver-reported adapter name onto a dialect family.
    pub fn from_name(adapter_name: &str) -> Self {
        match adapter_name.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Adapter::Postgres,
            "mysql" | "mysql2" => Adapter::Mysql,
            "mssql" | "sqlserver" => Adapter::Mssql,
            "teradata" => Adapter::Teradata,
            _ => Adapter::Other,
        }
    }

    /// Quotes a table name in this dialect.
    pub fn quote_table_name(&self, name: &str) -> String {
        match self {
            Adapter::Mysql => format!("`{name}`"),
            Adapter::Mssql => format!("[{name}]"),
            _ => format!("\"{name}\""),
        }
    }

    /// The placeholder token for the 1-based `ordinal`-th bind parameter.
    pub(crate) fn placeholder(&self, ordinal: usize) -> String {
        match self {
            Adapter::Postgres => format!("${ordinal}"),
            _ => "?".to_string(),
        }
    }
}

/// A typed bind value handed to the driver.
///
/// Statements are built as SQL text with placeholders; the values travel
/// separately so the driver does the quoting.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlParam {
    Text(String),
    NullableText(Option<String>),
    Int(i64),
    Timestamp(DateTime<Utc>),
    NullableTimestamp(Option<DateTime<Utc>>),
}

/// The seam between the queue logic and a concrete database driver.
///
/// Everything above this trait is dialect logic over SQL strings; everything
/// below it is driver plumbing. Tests substitute a scripted implementation
/// to exercise claim flows and error handling without a server.
#[async_trait]
pub trait QueueConnection: Send + Sync {
    /// Which SQL dialect this connection speaks.
    fn adapter(&self) -> Adapter;

    /// Runs a statement, returning the affected row count.
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64>;

    /// Runs a query returning job rows.
    async fn fetch_all(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Job>>;

    /// Runs a query returning at most one job row.
    async fn fetch_optional(&self, sql: &str, params: &[SqlParam]) -> Result<Option<Job>>;

    /// Runs an INSERT and returns the stored row.
    ///
    /// `reselect_sql` serves the backends whose driver cannot return the
    /// inserted row; it must run on the same pooled connection as the
    /// INSERT so connection-local state (e.g. `last_insert_id()`) resolves.
    async fn insert_returning(
        &self,
        insert_sql: &str,
        params: &[SqlParam],
        reselect_sql: &str,
    ) -> Result<Job>;

    /// Closes every pooled connection ahead of a process fork.
    async fn before_fork(&self);

    /// Re-establishes the pool in the child after a fork.
    async fn after_fork(&self) -> Result<()>;
}

/// PostgreSQL-backed [`QueueConnection`].
pub struct PgQueueConnection {
    pool: RwLock<PgPool>,
    database_url: Option<String>,
    max_connections: u32,
}

impl PgQueueConnection {
    /// Wraps an existing pool. Fork support needs a URL, so
    /// [`QueueConnection::after_fork`] on a wrapped pool only warns.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool: RwLock::new(pool),
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Connects a fresh pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Connects a fresh pool with an explicit size.
    pub async fn connect_with(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self {
            pool: RwLock::new(pool),
            database_url: Some(database_url.to_string()),
            max_connections,
        })
    }

    async fn pool(&self) -> PgPool {
        self.pool.read().await.clone()
    }
}

fn pg_arguments(params: &[SqlParam]) -> Result<PgArguments> {
    let mut arguments = PgArguments::default();
    for param in params {
        let added = match param {
            SqlParam::Text(value) => arguments.add(value.as_str()),
            SqlParam::NullableText(value) => arguments.add(value.as_deref()),
            SqlParam::Int(value) => arguments.add(*value),
            SqlParam::Timestamp(value) => arguments.add(*value),
            SqlParam::NullableTimestamp(value) => arguments.add(*value),
        };
        added.map_err(sqlx::Error::Encode)?;
    }
    Ok(arguments)
}

#[async_trait]
impl QueueConnection for PgQueueConnection {
    fn adapter(&self) -> Adapter {
        Adapter::Postgres
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let pool = self.pool().await;
        let done = sqlx::query_with(sql, pg_arguments(params)?)
            .execute(&pool)
            .await?;
        Ok(done.rows_affected())
    }

    async fn fetch_all(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Job>> {
        let pool = self.pool().await;
        Ok(sqlx::query_as_with::<_, Job, _>(sql, pg_arguments(params)?)
            .fetch_all(&pool)
            .await?)
    }

    async fn fetch_optional(&self, sql: &str, params: &[SqlParam]) -> Result<Option<Job>> {
        let pool = self.pool().await;
        Ok(sqlx::query_as_with::<_, Job, _>(sql, pg_arguments(params)?)
            .fetch_optional(&pool)
            .await?)
    }

    async fn insert_returning(
        &self,
        insert_sql: &str,
        params: &[SqlParam],
        _reselect_sql: &str,
    ) -> Result<Job> {
        let pool = self.pool().await;
        Ok(
            sqlx::query_as_with::<_, Job, _>(insert_sql, pg_arguments(params)?)
                .fetch_one(&pool)
                .await?,
        )
    }

    async fn before_fork(&self) {
        self.pool.read().await.close().await;
    }

    async fn after_fork(&self) -> Result<()> {
        let Some(database_url) = &self.database_url else {
            warn!("No database url retained, cannot re-establish the pool after fork");
            return Ok(());
        };

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(database_url)
            .await?;
        *self.pool.write().await = pool;

        Ok(())
    }
}

/// MySQL-backed [`QueueConnection`].
pub struct MySqlQueueConnection {
    pool: RwLock<MySqlPool>,
    database_url: Option<String>,
    max_connections: u32,
}

impl MySqlQueueConnection {
    /// Wraps an existing pool. Fork support needs a URL, so
    /// [`QueueConnection::after_fork`] on a wrapped pool only warns.
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self {
            pool: RwLock::new(pool),
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Connects a fresh pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Connects a fresh pool with an explicit size.
    pub async fn connect_with(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self {
            pool: RwLock::new(pool),
            database_url: Some(database_url.to_string()),
            max_connections,
        })
    }

    async fn pool(&self) -> MySqlPool {
        self.pool.read().await.clone()
    }
}

fn mysql_arguments(params: &[SqlParam]) -> Result<MySqlArguments> {
    let mut arguments = MySqlArguments::default();
    for param in params {
        let added = match param {
            SqlParam::Text(value) => arguments.add(value.as_str()),
            SqlParam::NullableText(value) => arguments.add(value.as_deref()),
            SqlParam::Int(value) => arguments.add(*value),
            SqlParam::Timestamp(value) => arguments.add(*value),
            SqlParam::NullableTimestamp(value) => arguments.add(*value),
        };
        added.map_err(sqlx::Error::Encode)?;
    }
    Ok(arguments)
}

#[async_trait]
impl QueueConnection for MySqlQueueConnection {
    fn adapter(&self) -> Adapter {
        Adapter::Mysql
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let pool = self.pool().await;
        let done = sqlx::query_with(sql, mysql_arguments(params)?)
            .execute(&pool)
            .await?;
        Ok(done.rows_affected())
    }

    async fn fetch_all(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Job>> {
        let pool = self.pool().await;
        Ok(
            sqlx::query_as_with::<_, Job, _>(sql, mysql_arguments(params)?)
                .fetch_all(&pool)
                .await?,
        )
    }

    async fn fetch_optional(&self, sql: &str, params: &[SqlParam]) -> Result<Option<Job>> {
        let pool = self.pool().await;
        Ok(
            sqlx::query_as_with::<_, Job, _>(sql, mysql_arguments(params)?)
                .fetch_optional(&pool)
                .await?,
        )
    }

    async fn insert_returning(
        &self,
        insert_sql: &str,
        params: &[SqlParam],
        reselect_sql: &str,
    ) -> Result<Job> {
        let pool = self.pool().await;
        let mut conn = pool.acquire().await?;

        sqlx::query_with(insert_sql, mysql_arguments(params)?)
            .execute(&mut *conn)
            .await?;
        let job: Job = sqlx::query_as(reselect_sql).fetch_one(&mut *conn).await?;

        Ok(job)
    }

    async fn before_fork(&self) {
        self.pool.read().await.close().await;
    }

    async fn after_fork(&self) -> Result<()> {
        let Some(database_url) = &self.database_url else {
            warn!("No database url retained, cannot re-establish the pool after fork");
            return Ok(());
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(database_url)
            .await?;
        *self.pool.write().await = pool;

        Ok(())
    }
}
