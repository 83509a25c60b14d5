//! Database connection at startup.

use std::time::Duration;

use common::RetryPolicy;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to PostgreSQL, retrying while the database is still coming up.
pub async fn connect_with_retry(url: &str, policy: &RetryPolicy) -> Result<PgPool, sqlx::Error> {
    policy
        .retry("database connection", || {
            PgPoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .acquire_timeout(ACQUIRE_TIMEOUT)
                .connect(url)
        })
        .await
}
