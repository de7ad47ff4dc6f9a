use super::{ServerConfig, WorkerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_WORKER_IDS: [&str; 4] = ["MC1", "MC2", "MC3", "MC4"];

/// Root document persisted to the shared config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalConfig {
    pub accounts: BTreeMap<String, WorkerConfig>,
    pub server: ServerConfig,
}

impl GlobalConfig {
    /// One offline account per id (username = id) plus the default server.
    pub fn with_defaults<I, S>(worker_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let accounts = worker_ids
            .into_iter()
            .map(|id| {
                let id = id.as_ref().to_owned();
                (id.clone(), WorkerConfig::offline(id))
            })
            .collect();
        Self {
            accounts,
            server: ServerConfig::default(),
        }
    }

    pub fn worker(&self, worker_id: &str) -> Option<&WorkerConfig> {
        self.accounts.get(worker_id)
    }

    pub fn worker_ids(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountType;
    use pretty_assertions::assert_eq;

    const CONFIG_TEXT: &str = r#"{
        "accounts": {
            "MC1": { "username": "Steve", "password": "", "type": "offline" },
            "MC2": { "username": "alex@example.com", "password": "hunter2", "type": "microsoft" }
        },
        "server": {
            "ip": "mc.example.net",
            "version": "1.19.4",
            "chatMessages": ["/login hunter2", "/lobby"],
            "repeat": false,
            "repeatDelay": 30
        }
    }"#;

    #[test]
    fn defaults_for_ids() {
        let config = GlobalConfig::with_defaults(DEFAULT_WORKER_IDS);
        assert_eq!(config.worker_ids().collect::<Vec<_>>(), DEFAULT_WORKER_IDS);
        for account in config.accounts.values() {
            assert_eq!(account.account_type, AccountType::Offline);
            assert!(account.password.is_empty());
        }
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn document_round_trip() {
        let config: GlobalConfig = serde_json::from_str(CONFIG_TEXT).unwrap();
        assert_eq!(config.worker("MC2").unwrap().credentials(), Some("hunter2"));
        assert_eq!(config.server.repeat_delay_seconds.get(), 30);

        let serialized = serde_json::to_string_pretty(&config).unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&serialized).unwrap(),
            serde_json::from_str::<serde_json::Value>(CONFIG_TEXT).unwrap()
        );
    }
}
