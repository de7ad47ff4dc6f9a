use mcbot_protocol::config::{ServerConfig, WorkerConfig};
use serde::Serialize;
use serde_json::{json, Map, Value};

pub const SERVER_KEY: &str = "server";
pub const UTILS_KEY: &str = "utils";
pub const CHAT_KEY: &str = "chat-messages";
pub const ACCOUNT_KEY: &str = "bot-account";

/// Outcome of fanning a shared block out to the workers' private documents.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    pub updated: Vec<String>,
    /// no private document on disk
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl PropagationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Returns the object stored under `key`, replacing any non-object value.
fn object_entry<'a>(parent: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = parent
        .entry(key.to_owned())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("slot was just made an object"),
    }
}

fn root_object(document: &mut Value) -> &mut Map<String, Value> {
    if !document.is_object() {
        *document = Value::Object(Map::new());
    }
    match document {
        Value::Object(map) => map,
        _ => unreachable!("document was just made an object"),
    }
}

/// Overwrites `server.ip`, `server.version` and
/// `utils.chat-messages.{messages, repeat, repeat-delay}`. Every other key is left as is.
pub fn merge_server(document: &mut Value, server: &ServerConfig) {
    let root = root_object(document);

    let server_block = object_entry(root, SERVER_KEY);
    server_block.insert("ip".into(), json!(server.address));
    server_block.insert("version".into(), json!(server.protocol_version));

    let chat = object_entry(object_entry(root, UTILS_KEY), CHAT_KEY);
    chat.insert("messages".into(), json!(server.scripted_messages));
    chat.insert("repeat".into(), json!(server.repeat_enabled));
    chat.insert(
        "repeat-delay".into(),
        json!(server.repeat_delay_seconds.get()),
    );
}

/// Overwrites `bot-account.{username, password, type}`; offline accounts get an empty password.
pub fn merge_account(document: &mut Value, account: &WorkerConfig) {
    let block = object_entry(root_object(document), ACCOUNT_KEY);
    block.insert("username".into(), json!(account.username));
    block.insert(
        "password".into(),
        json!(account.credentials().unwrap_or_default()),
    );
    block.insert("type".into(), json!(account.account_type.as_str()));
}
