use crate::error::{Error, Operation, Result};
use crate::management::process::{self, describe_exit, ExitEvent, ProcessRole};
use crate::management::process_helper::ProcessHelper;
use crate::management::SupervisorConfig;
use crate::storage::ConfigStore;
use crate::utils::Journal;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use log::debug;
use mcbot_protocol::batch::{ErrorKind, WorkerOutcome};
use mcbot_protocol::status::{WorkerReport, WorkerState, WorkerStatus};
use std::sync::{Arc, Weak};
use tokio::process::Child;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Succeeded,
    Failed { exit_code: Option<i32> },
    TimedOut,
    /// the worker was stopped while installing
    Interrupted,
    Lost(String),
}

impl InstallOutcome {
    pub fn to_worker_outcome(&self) -> WorkerOutcome {
        match self {
            InstallOutcome::Succeeded => WorkerOutcome::Succeeded,
            InstallOutcome::Failed { exit_code } => {
                WorkerOutcome::failed(ErrorKind::InstallFailed, describe_exit(*exit_code))
            }
            InstallOutcome::TimedOut => {
                WorkerOutcome::failed(ErrorKind::TimedOut, "install deadline expired")
            }
            InstallOutcome::Interrupted => {
                WorkerOutcome::failed(ErrorKind::Interrupted, "stopped during install")
            }
            InstallOutcome::Lost(reason) => WorkerOutcome::failed(ErrorKind::Io, reason.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: Option<u32> },
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub worker_id: String,
    pub state: WorkerState,
}

struct WorkerSlot {
    state: WorkerState,
    pid: Option<u32>,
    /// handle of the long-running worker; install processes are owned by their watcher
    child: Option<Child>,
    since: DateTime<Utc>,
    /// bumped on every transition, lets a late install watcher detect it was superseded
    epoch: u64,
}

impl WorkerSlot {
    fn new() -> Self {
        Self {
            state: WorkerState::Stopped,
            pid: None,
            child: None,
            since: Utc::now(),
            epoch: 0,
        }
    }

    fn status(&self) -> WorkerStatus {
        WorkerStatus {
            state: self.state,
            pid: self.pid,
            since: self.since,
        }
    }

    fn transition(&mut self, state: WorkerState, pid: Option<u32>, child: Option<Child>) {
        self.state = state;
        self.pid = pid;
        self.child = child;
        self.since = Utc::now();
        self.epoch += 1;
    }
}

type Slot = Arc<Mutex<WorkerSlot>>;

/// Owns the runtime status of every worker and all process launches.
pub struct Supervisor {
    config: SupervisorConfig,
    store: Arc<ConfigStore>,
    journal: Journal,
    slots: scc::HashMap<String, Slot, ahash::RandomState>,
    status_tx: broadcast::Sender<StatusChange>,
    monitor: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, store: Arc<ConfigStore>, journal: Journal) -> Arc<Self> {
        let (status_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            config,
            store,
            journal,
            slots: scc::HashMap::default(),
            status_tx,
            monitor: std::sync::Mutex::new(None),
        })
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusChange> {
        self.status_tx.subscribe()
    }

    fn slot(&self, worker_id: &str) -> Slot {
        if let Some(slot) = self.slots.read(worker_id, |_, slot| slot.clone()) {
            return slot;
        }
        self.slots
            .entry(worker_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(WorkerSlot::new())))
            .get()
            .clone()
    }

    fn publish(&self, worker_id: &str, state: WorkerState) {
        let _ = self.status_tx.send(StatusChange {
            worker_id: worker_id.to_owned(),
            state,
        });
    }

    /// In-memory status; never touches the process table.
    pub async fn status(&self, worker_id: &str) -> WorkerStatus {
        match self.slots.read(worker_id, |_, slot| slot.clone()) {
            Some(slot) => slot.lock().await.status(),
            None => WorkerStatus::stopped(),
        }
    }

    /// Status plus a cpu/memory sample of the worker's process.
    pub async fn report(&self, worker_id: &str) -> WorkerReport {
        let status = self.status(worker_id).await;
        let performance_counter = match status.pid {
            Some(pid) if status.state.is_busy() => ProcessHelper::sample(pid).await,
            _ => None,
        };
        WorkerReport {
            worker_id: worker_id.to_owned(),
            status,
            performance_counter,
        }
    }

    /// Launches the dependency install and returns once it is running.
    /// `on_complete` is invoked exactly once when the install process exits,
    /// and never if this call returns an error.
    pub async fn install<F>(self: &Arc<Self>, worker_id: &str, on_complete: F) -> Result<()>
    where
        F: FnOnce(InstallOutcome) + Send + 'static,
    {
        let (child, epoch) = self.begin_install(worker_id).await.inspect_err(|err| {
            self.journal
                .error(Some(worker_id), format!("install failed: {}", err))
        })?;

        let events = process::watch(child, self.config.watch, self.config.install_timeout());
        let supervisor = Arc::clone(self);
        let worker_id = worker_id.to_owned();
        tokio::spawn(async move {
            let mut events = events;
            let event = events
                .next()
                .await
                .unwrap_or_else(|| ExitEvent::Lost("exit watch ended without an event".into()));
            let outcome = supervisor.finish_install(&worker_id, epoch, event).await;
            on_complete(outcome);
        });
        Ok(())
    }

    async fn begin_install(&self, worker_id: &str) -> Result<(Child, u64)> {
        let dir = self.store.worker_dir(worker_id)?;
        let manifest = dir.join(&self.config.manifest_file);
        if !manifest.is_file() {
            return Err(Error::NotFound {
                what: "dependency manifest",
                path: manifest,
            });
        }

        let slot = self.slot(worker_id);
        let mut guard = slot.lock().await;
        if guard.state.is_busy() {
            return Err(Error::InvalidTransition {
                worker_id: worker_id.to_owned(),
                operation: Operation::Install,
                state: guard.state,
            });
        }

        let child = process::spawn(&self.config.install, worker_id, &dir, ProcessRole::Install)?;
        let pid = child.id();
        guard.transition(WorkerState::Installing, pid, None);
        let epoch = guard.epoch;
        drop(guard);

        self.publish(worker_id, WorkerState::Installing);
        self.journal.info(
            Some(worker_id),
            format!(
                "installing dependencies: {} (pid {})",
                self.config.install,
                pid.map(|pid| pid.to_string()).unwrap_or_else(|| "?".into())
            ),
        );
        Ok((child, epoch))
    }

    async fn finish_install(
        &self,
        worker_id: &str,
        epoch: u64,
        event: ExitEvent,
    ) -> InstallOutcome {
        let slot = self.slot(worker_id);
        let mut guard = slot.lock().await;
        if guard.epoch != epoch {
            drop(guard);
            self.journal
                .warning(Some(worker_id), "install interrupted");
            return InstallOutcome::Interrupted;
        }
        guard.transition(WorkerState::Stopped, None, None);
        drop(guard);
        self.publish(worker_id, WorkerState::Stopped);

        match event {
            ExitEvent::Exited(Some(0)) => {
                self.journal
                    .success(Some(worker_id), "dependencies installed");
                InstallOutcome::Succeeded
            }
            ExitEvent::Exited(exit_code) => {
                self.journal.error(
                    Some(worker_id),
                    format!("install failed ({})", describe_exit(exit_code)),
                );
                InstallOutcome::Failed { exit_code }
            }
            ExitEvent::TimedOut => {
                self.journal.error(
                    Some(worker_id),
                    "install did not finish before its deadline and was killed",
                );
                InstallOutcome::TimedOut
            }
            ExitEvent::Lost(reason) => {
                self.journal
                    .error(Some(worker_id), format!("lost track of install: {}", reason));
                InstallOutcome::Lost(reason)
            }
        }
    }

    /// Launches the worker detached. A second call while running is a no-op.
    pub async fn start(&self, worker_id: &str) -> Result<StartOutcome> {
        self.start_inner(worker_id).await.inspect_err(|err| {
            self.journal
                .error(Some(worker_id), format!("start failed: {}", err))
        })
    }

    async fn start_inner(&self, worker_id: &str) -> Result<StartOutcome> {
        let dir = self.store.worker_dir(worker_id)?;
        let slot = self.slot(worker_id);
        let mut guard = slot.lock().await;
        match guard.state {
            WorkerState::Running => {
                self.journal.warning(
                    Some(worker_id),
                    format!(
                        "already running (pid {}), start ignored",
                        guard.pid.map(|pid| pid.to_string()).unwrap_or_else(|| "?".into())
                    ),
                );
                return Ok(StartOutcome::AlreadyRunning);
            }
            WorkerState::Installing => {
                return Err(Error::InvalidTransition {
                    worker_id: worker_id.to_owned(),
                    operation: Operation::Start,
                    state: guard.state,
                });
            }
            WorkerState::Stopped => {}
        }

        let child = process::spawn(&self.config.launch, worker_id, &dir, ProcessRole::Worker)?;
        let pid = child.id();
        guard.transition(WorkerState::Running, pid, Some(child));
        let epoch = guard.epoch;
        drop(guard);
        self.publish(worker_id, WorkerState::Running);

        if let Some(grace) = self.config.start_grace() {
            // the slot stays unlocked so status and stop are served meanwhile
            tokio::time::sleep(grace).await;
            self.settle(worker_id, &slot, epoch).await?;
        }

        self.journal.success(
            Some(worker_id),
            format!(
                "started: {} (pid {})",
                self.config.launch,
                pid.map(|pid| pid.to_string()).unwrap_or_else(|| "?".into())
            ),
        );
        Ok(StartOutcome::Started { pid })
    }

    /// Fails a launch whose process is gone once the start grace has elapsed.
    async fn settle(&self, worker_id: &str, slot: &Slot, epoch: u64) -> Result<()> {
        let mut guard = slot.lock().await;
        if guard.epoch != epoch {
            return Err(Error::EarlyExit {
                worker_id: worker_id.to_owned(),
                detail: "stopped during startup".to_owned(),
            });
        }
        let exit_code = match guard.child.as_mut().map(Child::try_wait) {
            Some(Ok(Some(status))) => status.code(),
            _ => return Ok(()),
        };
        guard.transition(WorkerState::Stopped, None, None);
        drop(guard);

        self.publish(worker_id, WorkerState::Stopped);
        Err(Error::EarlyExit {
            worker_id: worker_id.to_owned(),
            detail: describe_exit(exit_code),
        })
    }

    /// Best-effort kill of whatever the worker owns. The worker always ends up `stopped`.
    pub async fn stop(&self, worker_id: &str) -> WorkerStatus {
        // untracked ids were never launched
        let Some(slot) = self.slots.read(worker_id, |_, slot| slot.clone()) else {
            self.journal.info(Some(worker_id), "already stopped");
            return WorkerStatus::stopped();
        };
        let mut guard = slot.lock().await;
        let previous = guard.state;
        let pid = guard.pid;
        let mut child = guard.child.take();
        guard.transition(WorkerState::Stopped, None, None);
        let status = guard.status();
        drop(guard);

        let exited = matches!(child.as_mut().map(Child::try_wait), Some(Ok(Some(_))));
        if let (Some(pid), false) = (pid, exited) {
            if let Err(err) = ProcessHelper::kill_tree(pid) {
                self.journal.warning(
                    Some(worker_id),
                    format!("could not kill process {}: {}", pid, err),
                );
            }
        }
        if let Some(mut child) = child {
            let _ = child.start_kill();
            // reap
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }

        self.publish(worker_id, WorkerState::Stopped);
        match previous {
            WorkerState::Stopped => self.journal.info(Some(worker_id), "already stopped"),
            _ => self
                .journal
                .info(Some(worker_id), format!("stopped (was {})", previous)),
        }
        status
    }

    fn tracked(&self) -> Vec<(String, Slot)> {
        let mut slots = Vec::new();
        self.slots
            .scan(|worker_id, slot| slots.push((worker_id.clone(), slot.clone())));
        slots
    }

    /// Resets running workers whose process has exited on its own. Returns their ids.
    pub async fn reconcile(&self) -> Vec<String> {
        let mut reaped = Vec::new();
        for (worker_id, slot) in self.tracked() {
            let mut guard = slot.lock().await;
            if guard.state != WorkerState::Running {
                continue;
            }
            let detail = match guard.child.as_mut().map(Child::try_wait) {
                Some(Ok(None)) => continue,
                Some(Ok(Some(status))) => describe_exit(status.code()),
                Some(Err(err)) => {
                    debug!("liveness check of {} failed: {}", worker_id, err);
                    continue;
                }
                None => "no process handle".to_owned(),
            };
            guard.transition(WorkerState::Stopped, None, None);
            drop(guard);

            self.publish(&worker_id, WorkerState::Stopped);
            self.journal.warning(
                Some(&worker_id),
                format!("worker exited on its own ({})", detail),
            );
            reaped.push(worker_id);
        }
        reaped
    }

    /// Periodically runs [`Supervisor::reconcile`] until shutdown.
    pub fn spawn_liveness_monitor(self: &Arc<Self>) {
        let Some(period) = self.config.liveness_interval() else {
            return;
        };
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(supervisor) = weak.upgrade() else {
                    break;
                };
                supervisor.reconcile().await;
            }
        });
        if let Ok(mut monitor) = self.monitor.lock() {
            if let Some(previous) = monitor.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Stops the liveness monitor and every worker that still owns a process.
    pub async fn shutdown(&self) {
        if let Ok(mut monitor) = self.monitor.lock() {
            if let Some(handle) = monitor.take() {
                handle.abort();
            }
        }
        for (worker_id, slot) in self.tracked() {
            let busy = slot.lock().await.state.is_busy();
            if busy {
                self.stop(&worker_id).await;
            }
        }
        debug!("supervisor shut down");
    }
}
