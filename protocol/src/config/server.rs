use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

pub const DEFAULT_SERVER_ADDRESS: &str = "play.pika-network.net";
pub const DEFAULT_PROTOCOL_VERSION: &str = "1.18.1";
pub const DEFAULT_REPEAT_DELAY: u32 = 6;

/// Server settings shared by every worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(rename = "ip")]
    pub address: String,
    #[serde(rename = "version")]
    pub protocol_version: String,
    /// replayed in order
    #[serde(rename = "chatMessages", default)]
    pub scripted_messages: Vec<String>,
    #[serde(rename = "repeat", default)]
    pub repeat_enabled: bool,
    #[serde(rename = "repeatDelay", default = "default_repeat_delay")]
    pub repeat_delay_seconds: NonZeroU32,
}

fn default_repeat_delay() -> NonZeroU32 {
    NonZeroU32::new(DEFAULT_REPEAT_DELAY).unwrap_or(NonZeroU32::MIN)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_SERVER_ADDRESS.to_owned(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_owned(),
            scripted_messages: vec![
                "/server survival".to_owned(),
                "/afk".to_owned(),
                "Hello everyone!".to_owned(),
            ],
            repeat_enabled: true,
            repeat_delay_seconds: default_repeat_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_server() {
        let server = ServerConfig::default();
        assert_eq!(server.address, "play.pika-network.net");
        assert_eq!(server.protocol_version, "1.18.1");
        assert_eq!(server.scripted_messages.len(), 3);
        assert!(server.repeat_enabled);
        assert_eq!(server.repeat_delay_seconds.get(), 6);
    }

    #[test]
    fn zero_delay_rejected() {
        let result = serde_json::from_str::<ServerConfig>(
            r#"{ "ip": "localhost", "version": "1.20", "chatMessages": [],
                 "repeat": false, "repeatDelay": 0 }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn message_order_kept() {
        let server: ServerConfig = serde_json::from_str(
            r#"{ "ip": "localhost", "version": "1.20", "chatMessages": ["b", "a", "c"],
                 "repeat": true, "repeatDelay": 3 }"#,
        )
        .unwrap();
        assert_eq!(server.scripted_messages, vec!["b", "a", "c"]);
    }
}
