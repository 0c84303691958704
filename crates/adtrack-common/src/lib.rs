//! Shared data model, configuration and helpers for the adtrack validator.

pub mod config;
pub mod errors;
pub mod types;
pub mod utils;

pub use config::{
    ConversionRateLimit, FormulaParams, PostgresConfig, SchedulerConfig, Setting, StorageConfig,
    StorageType, StoresConfig, ValidatorConfig,
};
pub use errors::{Error, Result};
pub use types::*;
