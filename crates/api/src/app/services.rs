use std::sync::Arc;

use tracing::info;

use netfab_infra::config::StoreConfig;
use netfab_infra::migrations;
use netfab_infra::services::{CancellationRestorer, CatalogService, LedgerService, OrderService};
use netfab_infra::store::{InMemoryStore, PostgresStore, Store, StoreError};

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: CatalogService,
    pub ledger: LedgerService,
    pub orders: OrderService,
    pub restorer: CancellationRestorer,
}

impl AppServices {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            ledger: LedgerService::new(store.clone()),
            orders: OrderService::new(store.clone()),
            restorer: CancellationRestorer::new(store),
        }
    }
}

/// Open the configured store, applying pending migrations when asked to.
pub async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    match config {
        StoreConfig::InMemory => {
            info!("using in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreConfig::Postgres {
            database_url,
            max_connections,
            run_migrations,
        } => {
            let store = PostgresStore::connect(database_url, *max_connections).await?;
            if *run_migrations {
                let applied = migrations::run(store.pool()).await?;
                info!(applied = ?applied, "migrations up to date");
            }
            info!(max_connections, "using postgres store");
            Ok(Arc::new(store))
        }
    }
}
