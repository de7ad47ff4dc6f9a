use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Success => "OK",
        })
    }
}

/// One entry of the user-facing log stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, worker_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            worker_id: worker_id.map(str::to_owned),
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {:<5} ",
            self.timestamp.format("%H:%M:%S"),
            self.level
        )?;
        if let Some(worker_id) = &self.worker_id {
            write!(f, "{}: ", worker_id)?;
        }
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_worker() {
        let event = LogEvent::new(LogLevel::Success, Some("MC1"), "install finished");
        let line = event.to_string();
        assert!(line.contains("OK"));
        assert!(line.ends_with("MC1: install finished"));
    }

    #[test]
    fn worker_id_omitted_when_absent() {
        let event = LogEvent::new(LogLevel::Info, None, "hello");
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("worker_id").is_none());
        assert_eq!(value["level"], "info");
    }
}
