use crate::config::DatabaseConfig;
use crate::db::repositories::{CamerasRepository, EventsRepository};
use crate::error::Error;
use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub mod migrations;
pub mod models;
pub mod repositories;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared Postgres pool behind the camera registry and the event store
#[derive(Clone)]
pub struct DatabaseService {
    pool: Arc<PgPool>,
}

impl DatabaseService {
    /// Connect, then apply pending migrations when configured
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&config.url)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?;

        let service = Self::from_pool(Arc::new(pool));

        if config.auto_migrate {
            service.run_migrations().await?;
        }

        Ok(service)
    }

    pub fn from_pool(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to run migrations: {}", e)))?;

        info!("Database schema is up to date");
        Ok(())
    }

    pub fn cameras(&self) -> CamerasRepository {
        CamerasRepository::new(self.pool.clone())
    }

    pub fn events(&self) -> EventsRepository {
        EventsRepository::new(self.pool.clone())
    }

    /// Round trip to the database, bounded by a short timeout
    pub async fn ping(&self) -> Result<(), Error> {
        let query = sqlx::query("SELECT 1").execute(&*self.pool);

        match tokio::time::timeout(PING_TIMEOUT, query).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                debug!("Database ping failed: {}", e);
                Err(Error::Database(format!("Database unreachable: {}", e)))
            }
            Err(_) => Err(Error::Database(format!(
                "Database did not answer within {:?}",
                PING_TIMEOUT
            ))),
        }
    }
}
