use crate::config::AppConfig;
use crate::errors::ServiceError;
use futures::future::BoxFuture;
use sea_orm::{
    ConnectOptions, Database, DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database
///
/// # Errors
/// Returns a `DbErr` if the connection cannot be established
pub async fn establish_connection(config: &DbConfig) -> Result<DbPool, DbErr> {
    debug!(
        max_connections = config.max_connections,
        "Configuring database connection"
    );

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(opt).await?;
    info!("Database connection pool established");
    Ok(pool)
}

/// Establish DB pool using AppConfig tuning
pub async fn connect_from_app_config(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection(&db_cfg).await
}

/// Runs the embedded migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbErr> {
    info!("Running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None).await;

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!("Database migrations completed in {:?}", elapsed),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }
    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), DbErr> {
    let start = std::time::Instant::now();
    let result = pool.ping().await;
    match &result {
        Ok(_) => debug!("Database ping ok in {:?}", start.elapsed()),
        Err(e) => error!("Database ping failed after {:?}: {}", start.elapsed(), e),
    }
    result
}

/// Runs `f` inside a transaction; commits on `Ok`, rolls back on `Err`.
pub async fn with_transaction<F, T>(db: &DbPool, f: F) -> Result<T, ServiceError>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, ServiceError>> + Send,
    T: Send,
{
    let transaction_id = Uuid::new_v4();
    debug!(transaction_id = %transaction_id, "Starting database transaction");

    let txn = db.begin().await?;
    match f(&txn).await {
        Ok(value) => {
            txn.commit().await?;
            debug!(transaction_id = %transaction_id, "Transaction committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                error!(transaction_id = %transaction_id, error = %rollback_err, "Rollback failed");
            }
            warn!(transaction_id = %transaction_id, error = %err, "Transaction rolled back");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectionTrait, Statement};

    async fn memory_pool() -> DbPool {
        establish_connection(&DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn migrations_apply_and_ping_succeeds() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        check_connection(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn failed_transaction_rolls_back() {
        let pool = memory_pool().await;
        pool.execute(Statement::from_string(
            pool.get_database_backend(),
            "CREATE TABLE t (v INTEGER)".to_string(),
        ))
        .await
        .unwrap();

        let result: Result<(), ServiceError> = with_transaction(&pool, |txn| {
            Box::pin(async move {
                txn.execute(Statement::from_string(
                    txn.get_database_backend(),
                    "INSERT INTO t (v) VALUES (1)".to_string(),
                ))
                .await?;
                Err(ServiceError::InvalidOperation("abort".into()))
            })
        })
        .await;
        assert!(result.is_err());

        let row = pool
            .query_one(Statement::from_string(
                pool.get_database_backend(),
                "SELECT COUNT(*) AS c FROM t".to_string(),
            ))
            .await
            .unwrap()
            .unwrap();
        let count: i64 = row.try_get("", "c").unwrap();
        assert_eq!(count, 0);
    }
}
