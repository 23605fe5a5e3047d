//! Pool provider abstraction for read/write routing.
//!
//! [`PoolProvider`] lets [`super::PostgresStorage`] send listings and
//! statistics to a replica while writes, transactions, advisory locks and the
//! lookups behind them stay on the primary. A bare [`PgPool`] serves both.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Trait for providing database pools with read/write routing.
///
/// # Example
///
/// ```ignore
/// use barangay::PoolProvider;
/// use sqlx::PgPool;
///
/// #[derive(Clone)]
/// struct OfficePools {
///     primary: PgPool,
///     replica: Option<PgPool>,
/// }
///
/// impl PoolProvider for OfficePools {
///     fn read(&self) -> &PgPool {
///         self.replica.as_ref().unwrap_or(&self.primary)
///     }
///
///     fn write(&self) -> &PgPool {
///         &self.primary
///     }
/// }
/// ```
pub trait PoolProvider: Clone + Send + Sync + 'static {
    /// Pool for queries that tolerate slight staleness: resident and request
    /// listings and statistics.
    fn read(&self) -> &PgPool;

    /// Pool for writes, transactions and advisory locks, and for the
    /// single-record lookups that decide an update.
    fn write(&self) -> &PgPool;
}

impl PoolProvider for PgPool {
    fn read(&self) -> &PgPool {
        self
    }

    fn write(&self) -> &PgPool {
        self
    }
}

/// Test pool provider with read-only replica enforcement.
///
/// The replica pool sets `default_transaction_read_only = on`, so a write
/// routed through `.read()` fails the test instead of silently succeeding.
#[derive(Clone, Debug)]
pub struct TestDbPools {
    primary: PgPool,
    replica: PgPool,
}

impl TestDbPools {
    pub async fn new(pool: PgPool) -> Result<Self, sqlx::Error> {
        let primary = pool.clone();

        let replica = PgPoolOptions::new()
            .max_connections(pool.options().get_max_connections())
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("SET default_transaction_read_only = on")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(pool.connect_options().as_ref().clone())
            .await?;

        Ok(Self { primary, replica })
    }
}

impl PoolProvider for TestDbPools {
    fn read(&self) -> &PgPool {
        &self.replica
    }

    fn write(&self) -> &PgPool {
        &self.primary
    }
}
