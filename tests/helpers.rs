#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use delayed_worker::{
    migrate, Job, JobPayload, JobQueue, PgQueueConnection, QueueConfig, Worker,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// A payload that opts into a singleton queue.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct SingletonPayload {
    pub name: String,
}

impl SingletonPayload {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl JobPayload for SingletonPayload {
    fn singleton_queue_name(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

/// A payload without any capability.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct PlainPayload {
    pub value: i32,
}

impl JobPayload for PlainPayload {}

pub fn worker(name: &str) -> Worker {
    Worker::builder().name(name).build()
}

#[derive(Clone)]
pub struct TestDatabase {
    pub source_pool: PgPool,
    pub test_pool: PgPool,
    pub queue: JobQueue,
    pub name: String,
}

impl TestDatabase {
    async fn teardown(&self) {
        self.test_pool.close().await;
        sqlx::query(&format!("DROP DATABASE {} WITH (FORCE)", self.name))
            .execute(&self.source_pool)
            .await
            .expect("Failed to drop test database");
    }

    pub async fn get_jobs(&self) -> Vec<Job> {
        sqlx::query_as("select * from delayed_jobs order by id asc")
            .fetch_all(&self.test_pool)
            .await
            .expect("Failed to get jobs")
    }

    pub async fn get_job(&self, id: i64) -> Job {
        sqlx::query_as("select * from delayed_jobs where id = $1")
            .bind(id)
            .fetch_one(&self.test_pool)
            .await
            .expect("Failed to get job")
    }

    pub async fn set_locked_at(&self, id: i64, locked_at: DateTime<Utc>) {
        sqlx::query("update delayed_jobs set locked_at = $1 where id = $2")
            .bind(locked_at)
            .bind(id)
            .execute(&self.test_pool)
            .await
            .expect("Failed to set locked_at");
    }

    pub async fn set_failed_at(&self, id: i64, failed_at: DateTime<Utc>) {
        sqlx::query("update delayed_jobs set failed_at = $1 where id = $2")
            .bind(failed_at)
            .bind(id)
            .execute(&self.test_pool)
            .await
            .expect("Failed to set failed_at");
    }

    pub async fn corrupt_handler(&self, id: i64) {
        sqlx::query("update delayed_jobs set handler = '{not json' where id = $1")
            .bind(id)
            .execute(&self.test_pool)
            .await
            .expect("Failed to corrupt handler");
    }
}

pub async fn create_test_database() -> TestDatabase {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let conn_options: PgConnectOptions = db_url.parse().expect("Failed to parse DATABASE_URL");

    let source_pool = PgPoolOptions::new()
        .max_connections(4)
        .connect_with(conn_options.clone())
        .await
        .expect("Failed to connect to database");

    let mut random_bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut random_bytes);
    let db_name = format!("__test_delayed_worker_{}", hex::encode(random_bytes));

    sqlx::query(&format!("CREATE DATABASE {db_name}"))
        .execute(&source_pool)
        .await
        .expect("Failed to create test database");

    let test_pool = PgPoolOptions::new()
        .max_connections(4)
        .connect_with(conn_options.database(&db_name))
        .await
        .expect("Failed to connect to test database");

    let connection = Arc::new(PgQueueConnection::from_pool(test_pool.clone()));
    migrate(connection.as_ref(), &QueueConfig::default())
        .await
        .expect("Failed to install jobs table");

    TestDatabase {
        source_pool,
        test_pool,
        queue: JobQueue::new(connection),
        name: db_name,
    }
}

pub async fn with_test_db<F, Fut>(test_fn: F)
where
    F: FnOnce(TestDatabase) -> Fut,
    Fut: Future<Output = ()>,
{
    let test_db = create_test_database().await;
    test_fn(test_db.clone()).await;
    test_db.teardown().await;
}
