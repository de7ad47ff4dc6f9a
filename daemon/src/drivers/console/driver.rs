use crate::app::AppState;
use crate::drivers::console::command::{Command, ServerField, HELP};
use crate::drivers::{Driver, Drivers};
use crate::storage::file::read_json;
use anyhow::{anyhow, Context};
use log::{debug, warn};
use mcbot_protocol::batch::BatchOperation;
use mcbot_protocol::config::{GlobalConfig, ServerConfig};
use mcbot_protocol::log::LogEvent;
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, PartialEq, Eq)]
enum LineAction {
    Skip,
    Run(Command),
    Invalid(String),
}

/// Input state of the console. A failed save holds back the next line,
/// which only acknowledges the failure.
#[derive(Debug, Default)]
struct Prompt {
    awaiting_ack: bool,
}

impl Prompt {
    fn accept(&mut self, line: &str) -> LineAction {
        if std::mem::take(&mut self.awaiting_ack) || line.trim().is_empty() {
            return LineAction::Skip;
        }
        match line.parse::<Command>() {
            Ok(command) => LineAction::Run(command),
            Err(err) => LineAction::Invalid(format!("{:#}", err)),
        }
    }

    fn failure(&mut self, is_save: bool, err: &anyhow::Error) -> String {
        if is_save {
            self.awaiting_ack = true;
            format!("!! save failed: {:#}\n!! press enter to acknowledge", err)
        } else {
            format!("error: {:#}", err)
        }
    }
}

pub struct ConsoleDriver {
    app_state: AppState,
}

impl ConsoleDriver {
    pub fn new(app_state: AppState) -> Self {
        Self { app_state }
    }
}

#[async_trait::async_trait]
impl Driver for ConsoleDriver {
    async fn run(&self) {
        let stop_notify = self.app_state.stop_notify.clone();
        let stopped = stop_notify.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();

        let (tx, mut lines) = mpsc::channel(16);
        // blocking stdin reads stay off the runtime
        std::thread::spawn(move || read_stdin(tx));
        let printer = tokio::spawn(print_journal(self.app_state.journal.subscribe()));

        println!(
            "{} workers configured, type `help` for commands",
            self.app_state.store.worker_ids().len()
        );
        let mut prompt = Prompt::default();
        loop {
            let line = tokio::select! {
                _ = &mut stopped => break,
                line = lines.recv() => line,
            };
            let Some(line) = line else {
                debug!("stdin closed, console input disabled");
                stopped.as_mut().await;
                break;
            };

            let command = match prompt.accept(&line) {
                LineAction::Skip => continue,
                LineAction::Invalid(message) => {
                    println!("{}", message);
                    continue;
                }
                LineAction::Run(Command::Quit) => {
                    stop_notify.notify_waiters();
                    break;
                }
                LineAction::Run(command) => command,
            };

            let is_save = command.is_save();
            if let Err(err) = self.execute(command).await {
                let message = prompt.failure(is_save, &err);
                if is_save {
                    eprintln!("{}", message);
                } else {
                    println!("{}", message);
                }
            }
        }
        printer.abort();
    }

    fn get_driver_type(&self) -> Drivers {
        Drivers::Console
    }
}

fn read_stdin(tx: mpsc::Sender<String>) {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        if tx.blocking_send(line).is_err() {
            break;
        }
    }
}

async fn print_journal(mut events: broadcast::Receiver<LogEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => println!("{}", event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("console skipped {} log entries", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

impl ConsoleDriver {
    async fn execute(&self, command: Command) -> anyhow::Result<()> {
        let state = &self.app_state;
        match command {
            // supervisor failures are already in the journal
            Command::Install(worker_id) => {
                if let Err(err) = state.supervisor.install(&worker_id, |_| {}).await {
                    debug!("install {} rejected: {}", worker_id, err);
                }
            }
            Command::Start(worker_id) => {
                if let Err(err) = state.supervisor.start(&worker_id).await {
                    debug!("start {} rejected: {}", worker_id, err);
                }
            }
            Command::Stop(worker_id) => {
                state.supervisor.stop(&worker_id).await;
            }
            Command::Status(worker_id) => {
                let worker_ids = match worker_id {
                    Some(worker_id) => vec![worker_id],
                    None => {
                        let progress = state.batch.progress();
                        if let (Some(operation), false) = (progress.operation, progress.is_done()) {
                            println!(
                                "{} all in progress: {}/{}",
                                operation, progress.completed, progress.total
                            );
                        }
                        state.store.worker_ids().to_vec()
                    }
                };
                for worker_id in worker_ids {
                    let status = state.supervisor.status(&worker_id).await;
                    let pid = status
                        .pid
                        .map(|pid| pid.to_string())
                        .unwrap_or_else(|| "-".into());
                    println!(
                        "{:<8} {:<10} pid {:<8} since {}",
                        worker_id,
                        status.state,
                        pid,
                        status.since.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
            Command::Report(worker_id) => {
                let report = state.supervisor.report(&worker_id).await;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Command::InstallAll => self.spawn_batch(BatchOperation::Install),
            Command::StartAll => self.spawn_batch(BatchOperation::Start),
            Command::StopAll => self.spawn_batch(BatchOperation::Stop),
            Command::Accounts => {
                let config = state.store.load().await?;
                for (worker_id, account) in &config.accounts {
                    println!(
                        "{:<8} {:<10} {}",
                        worker_id, account.account_type, account.username
                    );
                }
            }
            Command::Account { worker_id, account } => {
                state
                    .store
                    .save_one(&worker_id, account)
                    .await
                    .with_context(|| format!("account of {}", worker_id))?;
            }
            Command::Server(field) => {
                self.update_server(|server| match field {
                    ServerField::Address(address) => server.address = address,
                    ServerField::ProtocolVersion(version) => server.protocol_version = version,
                    ServerField::Repeat(enabled) => server.repeat_enabled = enabled,
                    ServerField::RepeatDelay(delay) => server.repeat_delay_seconds = delay,
                })
                .await?;
            }
            Command::MessageAdd(message) => {
                self.update_server(|server| server.scripted_messages.push(message))
                    .await?;
            }
            Command::MessageClear => {
                self.update_server(|server| server.scripted_messages.clear())
                    .await?;
            }
            Command::Import(path) => {
                let config: GlobalConfig = read_json(&path)
                    .await?
                    .ok_or_else(|| anyhow!("{} does not exist", path.display()))?;
                state
                    .store
                    .save(&config)
                    .await
                    .with_context(|| format!("import of {}", path.display()))?;
                self.push_all(&config).await;
            }
            Command::Sync => {
                let config = state.store.load().await?;
                self.push_all(&config).await;
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
        Ok(())
    }

    /// Re-pushes every account and the server block into the private documents.
    async fn push_all(&self, config: &GlobalConfig) {
        let store = &self.app_state.store;
        for (worker_id, account) in &config.accounts {
            if let Err(err) = store.propagate_account(worker_id, account).await {
                self.app_state
                    .journal
                    .error(Some(worker_id), format!("failed to push account: {}", err));
            }
        }
        let report = store
            .propagate_server_config(&config.server, store.worker_ids())
            .await;
        println!(
            "updated: [{}], skipped: [{}], failed: {}",
            report.updated.join(", "),
            report.skipped.join(", "),
            report.failed.len()
        );
    }

    async fn update_server<F>(&self, update: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut ServerConfig),
    {
        let mut server = self.app_state.store.load().await?.server;
        update(&mut server);
        let report = self
            .app_state
            .store
            .save_server(server)
            .await
            .context("server settings")?;
        if !report.is_clean() {
            println!(
                "server settings saved, but {} worker(s) could not be updated",
                report.failed.len()
            );
        }
        Ok(())
    }

    /// Runs the batch in the background, printing progress as it goes.
    fn spawn_batch(&self, operation: BatchOperation) {
        let batch = Arc::clone(&self.app_state.batch);
        let journal = self.app_state.journal.clone();
        tokio::spawn(async move {
            let mut progress = batch.subscribe_progress();
            let work = async {
                match operation {
                    BatchOperation::Install => batch.install_all().await,
                    BatchOperation::Start => batch.start_all().await,
                    BatchOperation::Stop => batch.stop_all().await,
                }
            };
            tokio::pin!(work);
            let result = loop {
                tokio::select! {
                    result = &mut work => break result,
                    Ok(()) = progress.changed() => {
                        let current = progress.borrow_and_update().clone();
                        println!(
                            "{} progress: {}/{} ({:.0}%)",
                            operation,
                            current.completed,
                            current.total,
                            current.fraction() * 100.0
                        );
                    }
                }
            };
            match result {
                Ok(report) => debug!(
                    "batch {} finished: {}",
                    report.id,
                    serde_json::to_string(&report).unwrap_or_default()
                ),
                Err(err) => journal.warning(None, format!("{} all rejected: {}", operation, err)),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::init_app_state;
    use crate::config::AppConfig;
    use crate::storage::file::write_json;
    use crate::storage::StorageConfig;
    use mcbot_protocol::config::WorkerConfig;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn console() -> (TempDir, ConsoleDriver) {
        let dir = tempfile::tempdir().unwrap();
        let state = init_app_state(AppConfig {
            storage: StorageConfig {
                workers_root: dir.path().to_path_buf(),
                ..StorageConfig::default()
            },
            ..AppConfig::default()
        });
        (dir, ConsoleDriver::new(state))
    }

    #[test]
    fn failed_save_holds_back_one_line() {
        let mut prompt = Prompt::default();

        let message = prompt.failure(true, &anyhow!("disk full"));
        assert!(message.starts_with("!! save failed: disk full"));
        assert!(message.ends_with("press enter to acknowledge"));

        assert_eq!(prompt.accept("start MC1"), LineAction::Skip);
        assert_eq!(
            prompt.accept("start MC1"),
            LineAction::Run(Command::Start("MC1".into()))
        );
    }

    #[test]
    fn other_failures_do_not_block() {
        let mut prompt = Prompt::default();

        assert_eq!(prompt.failure(false, &anyhow!("boom")), "error: boom");
        assert_eq!(
            prompt.accept("status"),
            LineAction::Run(Command::Status(None))
        );
    }

    #[test]
    fn blank_and_unknown_lines() {
        let mut prompt = Prompt::default();

        assert_eq!(prompt.accept("   "), LineAction::Skip);
        let LineAction::Invalid(message) = prompt.accept("launch MC1") else {
            panic!("unknown verb accepted");
        };
        assert!(message.contains("unknown command"));
        assert_eq!(prompt.accept("quit"), LineAction::Run(Command::Quit));
    }

    #[tokio::test]
    async fn account_for_unknown_worker_fails_the_save() {
        let (_dir, console) = console();
        let store = &console.app_state.store;
        let before = store.load_or_init().await.unwrap();

        let err = console
            .execute(Command::Account {
                worker_id: "MC9".into(),
                account: WorkerConfig::offline("Nobody"),
            })
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).starts_with("account of MC9"));
        assert_eq!(store.load().await.unwrap(), before);
    }

    #[tokio::test]
    async fn import_replaces_the_document() {
        let (dir, console) = console();
        let store = &console.app_state.store;
        store.load_or_init().await.unwrap();

        let mut imported = GlobalConfig::with_defaults(store.worker_ids());
        imported
            .accounts
            .insert("MC2".into(), WorkerConfig::offline("Imported"));
        imported.server.address = "mc.example.org".into();
        let source = dir.path().join("import.json");
        write_json(&source, &imported).await.unwrap();

        console.execute(Command::Import(source)).await.unwrap();
        assert_eq!(store.load().await.unwrap(), imported);
    }

    #[tokio::test]
    async fn import_rejects_unknown_workers_and_missing_files() {
        let (dir, console) = console();
        let store = &console.app_state.store;
        let before = store.load_or_init().await.unwrap();

        let mut imported = before.clone();
        imported
            .accounts
            .insert("MC5".into(), WorkerConfig::offline("Extra"));
        let source = dir.path().join("import.json");
        write_json(&source, &imported).await.unwrap();

        assert!(console.execute(Command::Import(source)).await.is_err());
        let missing = dir.path().join("missing.json");
        assert!(console.execute(Command::Import(missing)).await.is_err());
        assert_eq!(store.load().await.unwrap(), before);
    }
}
