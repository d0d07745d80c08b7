use std::sync::Arc;

use lorekeep_core::{MessageReader, MessageWriter, PersistenceError, SessionReader, SessionWriter};
use lorekeep_store_sql::{SqlMigrator, SqlStore};
use lorekeep_sync::{
    BackupService, CancellationToken, IntervalTrigger, PersistenceManager, RestoreService,
    SyncConfig,
};
use tokio::task::JoinHandle;

#[cfg(feature = "redis")]
use crate::config::StackConfig;

struct DurableParts {
    store: SqlStore,
    backup: BackupService,
    restore: RestoreService,
}

/// Every adapter built once at startup, plus the services that use them.
pub struct PersistenceStack {
    manager: Arc<PersistenceManager>,
    durable: Option<DurableParts>,
}

impl PersistenceStack {
    /// Connects to Redis and, when configured, the durable database.
    #[cfg(feature = "redis")]
    pub async fn connect(config: &StackConfig) -> Result<Self, PersistenceError> {
        config.validate()?;
        let fast = Arc::new(
            lorekeep_store_redis::RedisStore::new(&config.redis_url, config.redis_namespace.clone())
                .await?,
        );

        let durable = match &config.database_url {
            Some(url) => Some(
                SqlStore::builder(url.clone())
                    .max_connections(config.max_connections)
                    .run_migrations(config.run_migrations)
                    .build()
                    .await?,
            ),
            None => None,
        };

        tracing::info!(
            namespace = %config.redis_namespace,
            durable = durable.is_some(),
            "persistence stack connected"
        );
        Self::assemble(fast, durable, config.sync.clone())
    }

    /// Wires services around an already-built fast store.
    pub fn assemble<F>(
        fast: Arc<F>,
        durable: Option<SqlStore>,
        sync: SyncConfig,
    ) -> Result<Self, PersistenceError>
    where
        F: SessionReader + SessionWriter + MessageReader + MessageWriter + 'static,
    {
        let trigger = Arc::new(IntervalTrigger::new(sync.sync_interval));
        let mut builder = PersistenceManager::builder(trigger, fast.clone(), fast.clone())
            .config(sync.clone());

        let durable = match durable {
            Some(store) => {
                let shared = Arc::new(store.clone());
                builder = builder.durable(shared.clone(), shared.clone());

                let backup = BackupService::new(
                    fast.clone(),
                    fast.clone(),
                    shared.clone(),
                    shared.clone(),
                )
                .with_page_size(sync.page_size);
                let restore = RestoreService::new(
                    shared.clone(),
                    shared,
                    fast.clone(),
                    fast.clone(),
                    fast,
                )
                .with_page_size(sync.page_size);

                Some(DurableParts {
                    store,
                    backup,
                    restore,
                })
            }
            None => None,
        };

        Ok(Self {
            manager: Arc::new(builder.build()?),
            durable,
        })
    }

    pub fn manager(&self) -> &Arc<PersistenceManager> {
        &self.manager
    }

    /// Starts the background sync loop.
    pub fn spawn_manager(&self, cancel: CancellationToken) -> JoinHandle<()> {
        self.manager.clone().spawn(cancel)
    }

    pub fn backup(&self) -> Option<&BackupService> {
        self.durable.as_ref().map(|parts| &parts.backup)
    }

    pub fn restore(&self) -> Option<&RestoreService> {
        self.durable.as_ref().map(|parts| &parts.restore)
    }

    pub fn durable_store(&self) -> Option<&SqlStore> {
        self.durable.as_ref().map(|parts| &parts.store)
    }

    pub fn migrator(&self) -> Option<SqlMigrator> {
        self.durable.as_ref().map(|parts| parts.store.migrator())
    }
}
