//! Persistent recording defaults

use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::config::AppConfig;
use crate::domain::error::ConfigError;

/// Where `record` and `stream` read their defaults from, and where
/// `config set` writes them.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Stored values. A missing store reads as an empty config so that
    /// built-in defaults apply.
    async fn load(&self) -> Result<AppConfig, ConfigError>;

    /// Replace the stored values
    async fn save(&self, config: &AppConfig) -> Result<(), ConfigError>;

    fn path(&self) -> PathBuf;

    fn exists(&self) -> bool;

    /// Write the built-in encoder and format defaults.
    /// Fails with `AlreadyExists` instead of overwriting.
    async fn init(&self) -> Result<(), ConfigError>;
}
