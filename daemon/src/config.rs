use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::management::{BatchConfig, SupervisorConfig};
use crate::storage::file::Config;
use crate::storage::StorageConfig;

pub const CONFIG_PATH_ENV: &str = "MCBOT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "daemon.json";

/// immutable through full lifetime of app, unless restart app.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub supervisor: SupervisorConfig,
    pub batch: BatchConfig,
}

impl Config for AppConfig {
    type ConfigType = AppConfig;
}

impl AppConfig {
    pub fn path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Loads the daemon config, writing the defaults when the file is absent.
    pub async fn load() -> Result<AppConfig> {
        Self::load_config_or_default(&Self::path(), Self::default).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::management::ExitWatch;

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");

        let config = AppConfig::load_config_or_default(&path, AppConfig::default)
            .await
            .unwrap();
        assert_eq!(config.batch.stagger_ms, 1000);
        assert!(path.is_file());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "supervisor": { "watch": { "mode": "wait" } }, "batch": { "stagger_ms": 250 } }"#,
        )
        .unwrap();
        assert_eq!(config.supervisor.watch, ExitWatch::Wait);
        assert_eq!(config.supervisor.manifest_file, "package.json");
        assert_eq!(config.batch.stagger_ms, 250);
        assert_eq!(config.storage.worker_ids.len(), 4);
    }
}
