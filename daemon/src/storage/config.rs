use mcbot_protocol::config::DEFAULT_WORKER_IDS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// directory holding the shared document and one folder per worker
    pub workers_root: PathBuf,
    /// shared document, relative to `workers_root`
    pub config_file: String,
    /// private settings document inside each worker folder
    pub settings_file: String,
    pub worker_ids: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            workers_root: PathBuf::from("."),
            config_file: "config.json".to_owned(),
            settings_file: "settings.json".to_owned(),
            worker_ids: DEFAULT_WORKER_IDS.iter().map(|id| id.to_string()).collect(),
        }
    }
}
