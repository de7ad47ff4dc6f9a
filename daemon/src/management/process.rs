use crate::error::{Error, Result};
use crate::management::process_helper::ProcessHelper;
use crate::management::ExitWatch;
use crate::management::LaunchSpec;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use log::{debug, warn};
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time;

/// Set in the environment of every process spawned for a worker.
pub const WORKER_ID_ENV: &str = "MCBOT_WORKER_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    /// dependency install, output drained into the debug log
    Install,
    /// long-running worker, output not owned by the supervisor
    Worker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitEvent {
    /// exit code, `None` when killed by a signal
    Exited(Option<i32>),
    /// deadline expired, the process was killed
    TimedOut,
    /// the exit status could not be observed
    Lost(String),
}

pub fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_owned(),
    }
}

/// Spawns `spec` inside `working_dir` as the leader of a new process group.
pub fn spawn(
    spec: &LaunchSpec,
    worker_id: &str,
    working_dir: &Path,
    role: ProcessRole,
) -> Result<Child> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(working_dir)
        .env(WORKER_ID_ENV, worker_id)
        .stdin(Stdio::null())
        .kill_on_drop(false);

    match role {
        ProcessRole::Install => cmd.stdout(Stdio::piped()).stderr(Stdio::piped()),
        ProcessRole::Worker => cmd.stdout(Stdio::null()).stderr(Stdio::null()),
    };

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| Error::ProcessLaunch {
        worker_id: worker_id.to_owned(),
        program: spec.program.clone(),
        source,
    })?;

    if let Some(stdout) = child.stdout.take() {
        forward_output(worker_id.to_owned(), "stdout", stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_output(worker_id.to_owned(), "stderr", stderr);
    }
    Ok(child)
}

fn forward_output<R>(worker_id: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("[{}:{}] {}", worker_id, stream, line);
        }
    });
}

/// Kills the process tree of `child`, falling back to the handle itself.
pub fn terminate(child: &mut Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        // already reaped
        return Ok(());
    };
    ProcessHelper::kill_tree(pid).or_else(|err| {
        warn!("could not kill process group {}: {}, killing the process only", pid, err);
        child.start_kill()
    })
}

async fn wait_exit(child: &mut Child, mode: ExitWatch) -> io::Result<ExitStatus> {
    match mode {
        ExitWatch::Wait => child.wait().await,
        ExitWatch::Poll { interval_ms } => {
            let mut ticker = time::interval(Duration::from_millis(interval_ms.max(1)));
            loop {
                ticker.tick().await;
                if let Some(status) = child.try_wait()? {
                    return Ok(status);
                }
            }
        }
    }
}

/// Stream of exit events of `child`. Yields exactly one event, then ends.
pub fn watch(
    mut child: Child,
    mode: ExitWatch,
    deadline: Option<Duration>,
) -> BoxStream<'static, ExitEvent> {
    stream::once(async move {
        let waited = match deadline {
            None => wait_exit(&mut child, mode).await,
            Some(deadline) => match time::timeout(deadline, wait_exit(&mut child, mode)).await {
                Ok(waited) => waited,
                Err(_) => {
                    if let Err(err) = terminate(&mut child) {
                        warn!("could not kill timed out process: {}", err);
                    }
                    let _ = child.wait().await;
                    return ExitEvent::TimedOut;
                }
            },
        };
        match waited {
            Ok(status) => ExitEvent::Exited(status.code()),
            Err(err) => ExitEvent::Lost(err.to_string()),
        }
    })
    .boxed()
}
