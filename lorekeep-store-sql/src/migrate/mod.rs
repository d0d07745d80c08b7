mod source;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lorekeep_core::PersistenceError;
use serde::{Deserialize, Serialize};
use sqlx::{AnyPool, Row};

use crate::codec::{format_timestamp, parse_timestamp};
use crate::error::map_sqlx_error;

pub(crate) use source::split_statements;
pub use source::{Migration, MigrationSet, MigrationVersion};

const CREATE_HISTORY_SQL: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version BIGINT PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
)";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub version: MigrationVersion,
    pub name: String,
    pub applied: bool,
    pub applied_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
struct HistoryRecord {
    name: String,
    applied_at: DateTime<Utc>,
}

/// Applies and reverts versioned schema changes against the durable store.
///
/// Each unit runs in its own transaction together with its history row, so a
/// failing unit leaves nothing behind. The applied set is always a prefix of
/// the known versions.
#[derive(Clone, Debug)]
pub struct SqlMigrator {
    pool: AnyPool,
    migrations: MigrationSet,
}

impl SqlMigrator {
    pub fn new(pool: AnyPool, migrations: MigrationSet) -> Self {
        Self { pool, migrations }
    }

    pub fn migrations(&self) -> &MigrationSet {
        &self.migrations
    }

    /// Creates the history table if it is missing.
    pub async fn initialize(&self) -> Result<(), PersistenceError> {
        sqlx::query(CREATE_HISTORY_SQL)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn history(&self) -> Result<BTreeMap<MigrationVersion, HistoryRecord>, PersistenceError> {
        self.initialize().await?;
        let rows = sqlx::query("SELECT version, name, applied_at FROM schema_migrations")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut history = BTreeMap::new();
        for row in rows {
            let version: i64 = row.try_get("version").map_err(map_sqlx_error)?;
            let version = u64::try_from(version).map_err(|_| {
                PersistenceError::InvalidData(format!("negative migration version {version}"))
            })?;
            let applied_at: String = row.try_get("applied_at").map_err(map_sqlx_error)?;
            history.insert(
                MigrationVersion(version),
                HistoryRecord {
                    name: row.try_get("name").map_err(map_sqlx_error)?,
                    applied_at: parse_timestamp(&applied_at)?,
                },
            );
        }
        Ok(history)
    }

    /// Every known unit tagged applied or pending, ascending by version.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>, PersistenceError> {
        let history = self.history().await?;
        Ok(self
            .migrations
            .iter()
            .map(|migration| {
                let record = history.get(&migration.version);
                MigrationStatus {
                    version: migration.version,
                    name: migration.name.clone(),
                    applied: record.is_some(),
                    applied_at: record.map(|record| record.applied_at),
                }
            })
            .collect())
    }

    pub async fn pending(&self) -> Result<Vec<MigrationVersion>, PersistenceError> {
        let history = self.history().await?;
        Ok(self
            .migrations
            .iter()
            .map(|migration| migration.version)
            .filter(|version| !history.contains_key(version))
            .collect())
    }

    /// Highest applied version, or `None` when nothing is applied.
    pub async fn current_version(&self) -> Result<Option<MigrationVersion>, PersistenceError> {
        Ok(self.history().await?.keys().next_back().copied())
    }

    pub fn latest_version(&self) -> Option<MigrationVersion> {
        self.migrations.latest()
    }

    pub async fn is_up_to_date(&self) -> Result<bool, PersistenceError> {
        Ok(self.pending().await?.is_empty())
    }

    /// Applies every pending unit in order and returns the versions applied.
    ///
    /// Stops at the first failure. Units applied earlier in the same call stay
    /// committed.
    pub async fn up(&self) -> Result<Vec<MigrationVersion>, PersistenceError> {
        let history = self.history().await?;

        if let Some(unknown) = history
            .keys()
            .find(|version| self.migrations.get(**version).is_none())
        {
            return Err(PersistenceError::migration(
                unknown,
                "applied version is missing from the migration source",
            ));
        }

        let highest = history.keys().next_back().copied();
        let pending: Vec<&Migration> = self
            .migrations
            .iter()
            .filter(|migration| !history.contains_key(&migration.version))
            .collect();

        if let (Some(highest), Some(first)) = (highest, pending.first()) {
            if first.version < highest {
                return Err(PersistenceError::migration(
                    first.version,
                    format!("pending unit is older than applied version {highest}"),
                ));
            }
        }

        if pending.is_empty() {
            tracing::debug!("schema is up to date");
            return Ok(Vec::new());
        }

        let mut applied = Vec::with_capacity(pending.len());
        for migration in pending {
            self.apply(migration).await?;
            applied.push(migration.version);
        }
        Ok(applied)
    }

    async fn apply(&self, migration: &Migration) -> Result<(), PersistenceError> {
        let version = migration.version;
        let script = migration
            .up
            .as_deref()
            .ok_or_else(|| PersistenceError::migration(version, "missing up script"))?;
        let fail = |error: sqlx::Error| PersistenceError::migration(version, error.to_string());

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        for statement in split_statements(script) {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(fail)?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES ($1, $2, $3)")
            .bind(version.as_i64()?)
            .bind(migration.name.clone())
            .bind(format_timestamp(&Utc::now()))
            .execute(&mut *tx)
            .await
            .map_err(fail)?;
        tx.commit().await.map_err(fail)?;

        tracing::info!(version = %version, name = %migration.name, "applied migration");
        Ok(())
    }

    /// Reverts the highest applied unit and returns its version.
    pub async fn down(&self) -> Result<MigrationVersion, PersistenceError> {
        let history = self.history().await?;
        let Some((&version, record)) = history.iter().next_back() else {
            return Err(PersistenceError::migration("none", "no applied migration to revert"));
        };

        let script = self
            .migrations
            .get(version)
            .and_then(|migration| migration.down.as_deref())
            .ok_or_else(|| PersistenceError::migration(version, "missing down script"))?;
        let fail = |error: sqlx::Error| PersistenceError::migration(version, error.to_string());

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        for statement in split_statements(script) {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(fail)?;
        }
        sqlx::query("DELETE FROM schema_migrations WHERE version = $1")
            .bind(version.as_i64()?)
            .execute(&mut *tx)
            .await
            .map_err(fail)?;
        tx.commit().await.map_err(fail)?;

        tracing::info!(version = %version, name = %record.name, "reverted migration");
        Ok(version)
    }
}
