use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub connection_string: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_true")]
    pub create_tables: bool,
}

/// Backend selection for one of the three stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub storage_type: StorageType,
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            storage_type: StorageType::Memory,
            postgres: None,
        }
    }

    pub fn postgres(connection_string: impl Into<String>) -> Self {
        Self {
            storage_type: StorageType::Postgres,
            postgres: Some(PostgresConfig {
                connection_string: connection_string.into(),
                max_connections: default_max_connections(),
                create_tables: true,
            }),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::memory()
    }
}

/// The active, history and main stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoresConfig {
    #[serde(default)]
    pub active: StorageConfig,
    #[serde(default)]
    pub history: StorageConfig,
    #[serde(default)]
    pub main: StorageConfig,
}

fn default_max_connections() -> u32 {
    5
}

fn default_true() -> bool {
    true
}
