//! Postgres-backed repository implementations.

mod authors;
mod drafts;
mod interactions;
mod published;
mod sync;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    Postgres, Transaction,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::repos::RepoError;
use crate::domain::clock::{Clock, SystemClock};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
    clock: Arc<dyn Clock>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool: Arc::new(pool),
            clock,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, RepoError> {
        self.pool.begin().await.map_err(map_sqlx_error)
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }
}

fn to_db_offset(value: u32) -> i64 {
    i64::from(value)
}
