use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// 离线账号, 不需要密码
    #[default]
    Offline,
    Mojang,
    Microsoft,
}

impl AccountType {
    pub fn requires_auth(&self) -> bool {
        !matches!(self, AccountType::Offline)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Offline => "offline",
            AccountType::Mojang => "mojang",
            AccountType::Microsoft => "microsoft",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "offline" => Ok(AccountType::Offline),
            "mojang" => Ok(AccountType::Mojang),
            "microsoft" => Ok(AccountType::Microsoft),
            other => Err(format!("unknown account type: {}", other)),
        }
    }
}

/// Account of a single worker. The worker id is the key of the
/// `accounts` map in [`super::GlobalConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerConfig {
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "type", default)]
    pub account_type: AccountType,
}

impl WorkerConfig {
    pub fn offline<S: Into<String>>(username: S) -> Self {
        Self {
            username: username.into(),
            password: String::new(),
            account_type: AccountType::Offline,
        }
    }

    /// Password to authenticate with, `None` for offline accounts even if one is stored.
    pub fn credentials(&self) -> Option<&str> {
        if self.account_type.requires_auth() {
            Some(self.password.as_str())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn offline_password_is_ignored() {
        let cfg = WorkerConfig {
            username: "bot".into(),
            password: "secret".into(),
            account_type: AccountType::Offline,
        };
        assert_eq!(cfg.credentials(), None);

        let cfg = WorkerConfig {
            account_type: AccountType::Microsoft,
            ..cfg
        };
        assert_eq!(cfg.credentials(), Some("secret"));
    }

    #[test]
    fn account_type_serialized_as_type() {
        let cfg: WorkerConfig = serde_json::from_str(
            r#"{ "username": "Steve", "password": "pw", "type": "mojang" }"#,
        )
        .unwrap();
        assert_eq!(cfg.account_type, AccountType::Mojang);

        let value = serde_json::to_value(WorkerConfig::offline("Alex")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "username": "Alex", "password": "", "type": "offline" })
        );
    }

    #[test]
    fn parse_account_type() {
        assert_eq!("Microsoft".parse::<AccountType>(), Ok(AccountType::Microsoft));
        assert!("cracked".parse::<AccountType>().is_err());
    }
}
