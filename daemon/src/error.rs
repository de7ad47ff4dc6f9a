use mcbot_protocol::batch::ErrorKind;
use mcbot_protocol::status::WorkerState;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Start,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Install => "install",
            Operation::Start => "start",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{what} not found: {}", path.display())]
    NotFound { what: &'static str, path: PathBuf },

    #[error("invalid worker id: {0:?}")]
    InvalidWorkerId(String),

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot {operation} worker {worker_id} while it is {state}")]
    InvalidTransition {
        worker_id: String,
        operation: Operation,
        state: WorkerState,
    },

    #[error("another batch operation is already in progress")]
    BatchInProgress,

    #[error("failed to launch {program} for worker {worker_id}: {source}")]
    ProcessLaunch {
        worker_id: String,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("worker {worker_id} exited during startup ({detail})")]
    EarlyExit { worker_id: String, detail: String },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } | Error::InvalidWorkerId(_) => ErrorKind::NotFound,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::InvalidTransition { .. } | Error::BatchInProgress => {
                ErrorKind::InvalidTransition
            }
            Error::ProcessLaunch { .. } | Error::EarlyExit { .. } => ErrorKind::ProcessLaunch,
            Error::Io { .. } => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let err = Error::InvalidTransition {
            worker_id: "MC1".into(),
            operation: Operation::Start,
            state: WorkerState::Installing,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(
            err.to_string(),
            "cannot start worker MC1 while it is installing"
        );
        assert_eq!(
            Error::InvalidWorkerId("../etc".into()).kind(),
            ErrorKind::NotFound
        );
    }
}
