use crate::error::{Error, Result};
use crate::management::supervisor::{StartOutcome, Supervisor};
use crate::utils::Journal;
use mcbot_protocol::batch::{
    BatchEntry, BatchOperation, BatchProgress, BatchReport, ErrorKind, WorkerOutcome,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{self, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// offset between successive installs/starts of one batch
    pub stagger_ms: u64,
}

impl BatchConfig {
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { stagger_ms: 1000 }
    }
}

/// Runs one supervisor operation across every worker and aggregates the result.
pub struct BatchCoordinator {
    supervisor: Arc<Supervisor>,
    worker_ids: Vec<String>,
    config: BatchConfig,
    journal: Journal,
    progress_tx: watch::Sender<BatchProgress>,
    running: Mutex<()>,
}

impl BatchCoordinator {
    pub fn new(
        supervisor: Arc<Supervisor>,
        worker_ids: Vec<String>,
        config: BatchConfig,
        journal: Journal,
    ) -> Self {
        let (progress_tx, _) = watch::channel(BatchProgress::default());
        Self {
            supervisor,
            worker_ids,
            config,
            journal,
            progress_tx,
            running: Mutex::new(()),
        }
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<BatchProgress> {
        self.progress_tx.subscribe()
    }

    pub fn progress(&self) -> BatchProgress {
        self.progress_tx.borrow().clone()
    }

    /// Staggered installs; resolves once every install process has exited.
    pub async fn install_all(&self) -> Result<BatchReport> {
        self.run(
            BatchOperation::Install,
            self.config.stagger(),
            |supervisor, worker_id| async move {
                let (tx, rx) = oneshot::channel();
                let issued = supervisor
                    .install(&worker_id, move |outcome| {
                        let _ = tx.send(outcome);
                    })
                    .await;
                if let Err(err) = issued {
                    return WorkerOutcome::failed(err.kind(), err.to_string());
                }
                match rx.await {
                    Ok(outcome) => outcome.to_worker_outcome(),
                    Err(_) => WorkerOutcome::failed(ErrorKind::Io, "install watcher dropped"),
                }
            },
        )
        .await
    }

    pub async fn start_all(&self) -> Result<BatchReport> {
        self.run(
            BatchOperation::Start,
            self.config.stagger(),
            |supervisor, worker_id| async move {
                match supervisor.start(&worker_id).await {
                    Ok(StartOutcome::Started { .. }) => WorkerOutcome::Succeeded,
                    Ok(StartOutcome::AlreadyRunning) => WorkerOutcome::AlreadyRunning,
                    Err(err) => WorkerOutcome::failed(err.kind(), err.to_string()),
                }
            },
        )
        .await
    }

    /// Stops every worker at once.
    pub async fn stop_all(&self) -> Result<BatchReport> {
        self.run(BatchOperation::Stop, Duration::ZERO, |supervisor, worker_id| async move {
            supervisor.stop(&worker_id).await;
            WorkerOutcome::Succeeded
        })
        .await
    }

    async fn run<F, Fut>(
        &self,
        operation: BatchOperation,
        stagger: Duration,
        task: F,
    ) -> Result<BatchReport>
    where
        F: Fn(Arc<Supervisor>, String) -> Fut,
        Fut: Future<Output = WorkerOutcome> + Send + 'static,
    {
        let _running = self.running.try_lock().map_err(|_| Error::BatchInProgress)?;

        let mut report = BatchReport::new(operation);
        let total = self.worker_ids.len();
        self.progress_tx.send_replace(BatchProgress {
            operation: Some(operation),
            completed: 0,
            total,
        });
        self.journal.info(
            None,
            format!(
                "{} all: {} workers, {} ms apart",
                operation,
                total,
                stagger.as_millis()
            ),
        );

        let began = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel();
        for (index, worker_id) in self.worker_ids.iter().enumerate() {
            let work = task(Arc::clone(&self.supervisor), worker_id.clone());
            let issue_at = began + stagger * index as u32;
            let worker_id = worker_id.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                time::sleep_until(issue_at).await;
                let issued_after_ms = began.elapsed().as_millis() as u64;
                let outcome = work.await;
                let _ = tx.send((
                    worker_id,
                    BatchEntry {
                        issued_after_ms,
                        outcome,
                    },
                ));
            });
        }
        drop(tx);

        // completions arrive in any order
        while let Some((worker_id, entry)) = rx.recv().await {
            report.entries.insert(worker_id, entry);
            self.progress_tx
                .send_modify(|progress| progress.completed += 1);
        }

        for worker_id in &self.worker_ids {
            if !report.entries.contains_key(worker_id) {
                report.entries.insert(
                    worker_id.clone(),
                    BatchEntry {
                        issued_after_ms: began.elapsed().as_millis() as u64,
                        outcome: WorkerOutcome::failed(ErrorKind::Io, "operation task aborted"),
                    },
                );
                self.progress_tx
                    .send_modify(|progress| progress.completed += 1);
            }
        }

        let summary = format!(
            "{} all complete: {}/{} succeeded",
            operation,
            report.succeeded(),
            total
        );
        if report.all_succeeded() {
            self.journal.success(None, summary);
        } else {
            let failed: Vec<&str> = report.failed().map(|(worker_id, _)| worker_id).collect();
            self.journal.warning(
                None,
                format!("{} (failed: {})", summary, failed.join(", ")),
            );
        }
        Ok(report)
    }
}
