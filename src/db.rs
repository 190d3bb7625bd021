use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

/// Builds the shared Postgres pool. The pool is bounded so that saturation
/// shows up as acquisition backpressure instead of unbounded queueing.
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<Pool<Postgres>, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
