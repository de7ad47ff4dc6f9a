use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperation {
    Install,
    Start,
    Stop,
}

impl fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BatchOperation::Install => "install",
            BatchOperation::Start => "start",
            BatchOperation::Stop => "stop",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Parse,
    InvalidTransition,
    ProcessLaunch,
    Io,
    /// install process exited with a nonzero code or a signal
    InstallFailed,
    TimedOut,
    /// worker was stopped before the install finished
    Interrupted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WorkerOutcome {
    Succeeded,
    /// `start` on a worker that is already running
    AlreadyRunning,
    Failed { kind: ErrorKind, message: String },
}

impl WorkerOutcome {
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        WorkerOutcome::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, WorkerOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchEntry {
    /// delay between the batch start and the moment the operation was issued
    pub issued_after_ms: u64,
    pub outcome: WorkerOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchReport {
    pub id: Uuid,
    pub operation: BatchOperation,
    pub started_at: DateTime<Utc>,
    pub entries: BTreeMap<String, BatchEntry>,
}

impl BatchReport {
    pub fn new(operation: BatchOperation) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            started_at: Utc::now(),
            entries: BTreeMap::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.outcome.is_success())
            .count()
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &WorkerOutcome)> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.outcome.is_success())
            .map(|(id, entry)| (id.as_str(), &entry.outcome))
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.entries.len()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchProgress {
    pub operation: Option<BatchOperation>,
    pub completed: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn report_counts() {
        let mut report = BatchReport::new(BatchOperation::Install);
        report.entries.insert(
            "MC1".into(),
            BatchEntry {
                issued_after_ms: 0,
                outcome: WorkerOutcome::Succeeded,
            },
        );
        report.entries.insert(
            "MC2".into(),
            BatchEntry {
                issued_after_ms: 1000,
                outcome: WorkerOutcome::failed(ErrorKind::NotFound, "package.json missing"),
            },
        );
        assert_eq!(report.succeeded(), 1);
        assert!(!report.all_succeeded());
        assert_eq!(report.failed().map(|(id, _)| id).collect::<Vec<_>>(), ["MC2"]);
    }

    #[test]
    fn outcome_tagging() {
        let value =
            serde_json::to_value(WorkerOutcome::failed(ErrorKind::TimedOut, "deadline")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "result": "failed", "kind": "timed_out", "message": "deadline" })
        );
    }

    #[test]
    fn progress_fraction() {
        let progress = BatchProgress {
            operation: Some(BatchOperation::Start),
            completed: 1,
            total: 4,
        };
        assert_eq!(progress.fraction(), 0.25);
        assert!(!progress.is_done());
        assert_eq!(BatchProgress::default().fraction(), 1.0);
    }
}
