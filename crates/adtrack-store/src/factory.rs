use {
    crate::{
        error::{Result, StoreError},
        memory_store::MemoryStore,
        postgres_store::PostgresStore,
        traits::{Store, StoreFactory},
    },
    adtrack_common::config::{StorageConfig, StorageType, StoresConfig},
    async_trait::async_trait,
    std::sync::Arc,
};

/// Factory for creating store instances based on configuration
pub struct ConfiguredStoreFactory {
    config: StorageConfig,
}

impl ConfiguredStoreFactory {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StoreFactory for ConfiguredStoreFactory {
    async fn create_store(&self, name: &str) -> Result<Arc<dyn Store>> {
        match self.config.storage_type {
            StorageType::Memory => Ok(Arc::new(MemoryStore::new(name))),
            StorageType::Postgres => {
                let config = match &self.config.postgres {
                    Some(config) => config.clone(),
                    None => {
                        return Err(StoreError::Config(format!(
                            "PostgreSQL configuration not provided for {name} store"
                        )))
                    }
                };

                let store = PostgresStore::new(name, config).await?;
                Ok(Arc::new(store))
            }
        }
    }
}

/// The three independently-lifecycled stores.
///
/// `active` holds the working set, `history` receives aged rows from it and
/// `main` keeps shared data that is never migrated.
#[derive(Clone)]
pub struct Stores {
    pub active: Arc<dyn Store>,
    pub history: Arc<dyn Store>,
    pub main: Arc<dyn Store>,
}

impl Stores {
    pub async fn from_config(config: &StoresConfig) -> Result<Self> {
        Ok(Self {
            active: ConfiguredStoreFactory::new(config.active.clone())
                .create_store("active")
                .await?,
            history: ConfiguredStoreFactory::new(config.history.clone())
                .create_store("history")
                .await?,
            main: ConfiguredStoreFactory::new(config.main.clone())
                .create_store("main")
                .await?,
        })
    }

    /// Three empty in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            active: Arc::new(MemoryStore::new("active")),
            history: Arc::new(MemoryStore::new("history")),
            main: Arc::new(MemoryStore::new("main")),
        }
    }

    pub async fn close(&self) -> Result<()> {
        self.active.close().await?;
        self.history.close().await?;
        self.main.close().await
    }
}
