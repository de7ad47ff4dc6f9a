use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Stopped,
    Installing,
    Running,
}

impl WorkerState {
    /// `installing` and `running` both own a live process.
    pub fn is_busy(&self) -> bool {
        !matches!(self, WorkerState::Stopped)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Installing => "installing",
            WorkerState::Running => "running",
        })
    }
}

/// Runtime status of a worker. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerStatus {
    pub state: WorkerState,
    /// present only while installing or running
    pub pid: Option<u32>,
    pub since: DateTime<Utc>,
}

impl WorkerStatus {
    pub fn stopped() -> Self {
        Self {
            state: WorkerState::Stopped,
            pid: None,
            since: Utc::now(),
        }
    }
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self::stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serialization() {
        assert_eq!(
            serde_json::to_string(&WorkerState::Installing).unwrap(),
            r#""installing""#
        );
        assert_eq!(WorkerState::Running.to_string(), "running");
        assert!(!WorkerState::default().is_busy());
    }
}
