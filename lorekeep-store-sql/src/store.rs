use lorekeep_core::PersistenceError;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use crate::codec::format_timestamp;
use crate::error::map_sqlx_error;
use crate::migrate::{MigrationSet, SqlMigrator};

/// Durable store backed by Postgres or SQLite, picked from the URL scheme.
#[derive(Debug, Clone)]
pub struct SqlStore {
    pub(crate) pool: AnyPool,
}

#[derive(Debug, Clone)]
pub struct SqlStoreBuilder {
    database_url: String,
    max_connections: u32,
    min_connections: u32,
    run_migrations: bool,
}

impl SqlStore {
    pub fn builder(database_url: impl Into<String>) -> SqlStoreBuilder {
        SqlStoreBuilder {
            database_url: database_url.into(),
            max_connections: 5,
            min_connections: 0,
            run_migrations: true,
        }
    }

    /// Wraps an existing pool. No migrations are run.
    pub fn from_pool(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Migrator over the schema compiled into this crate.
    pub fn migrator(&self) -> SqlMigrator {
        SqlMigrator::new(self.pool.clone(), MigrationSet::embedded())
    }

    /// Marks a session deleted. It disappears from `list_active` but keeps its
    /// rows.
    pub async fn soft_delete(&self, session_id: &str) -> Result<(), PersistenceError> {
        let now = format_timestamp(&chrono::Utc::now());
        let result = sqlx::query(
            "UPDATE client_sessions SET deleted_at = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(session_id.to_string())
        .bind(now.clone())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::session_not_found(session_id));
        }
        tracing::debug!(%session_id, "soft-deleted session");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl SqlStoreBuilder {
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn min_connections(mut self, min_connections: u32) -> Self {
        self.min_connections = min_connections;
        self
    }

    /// Apply pending embedded migrations while building. On by default.
    pub fn run_migrations(mut self, run_migrations: bool) -> Self {
        self.run_migrations = run_migrations;
        self
    }

    pub async fn build(self) -> Result<SqlStore, PersistenceError> {
        if self.max_connections == 0 {
            return Err(PersistenceError::InvalidConfig(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections.min(self.max_connections))
            .connect(&self.database_url)
            .await
            .map_err(map_sqlx_error)?;

        let store = SqlStore { pool };
        if self.run_migrations {
            let applied = store.migrator().up().await?;
            if !applied.is_empty() {
                tracing::info!(count = applied.len(), "durable schema migrated");
            }
        }
        Ok(store)
    }
}
