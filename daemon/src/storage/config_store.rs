use crate::error::{Error, Result};
use crate::storage::file::{read_json, write_json};
use crate::storage::propagation::{merge_account, merge_server, PropagationReport};
use crate::storage::StorageConfig;
use crate::utils::Journal;
use lazy_static::lazy_static;
use log::debug;
use mcbot_protocol::config::{GlobalConfig, ServerConfig, WorkerConfig};
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use tokio::sync::{Mutex, MutexGuard};

lazy_static! {
    static ref WORKER_ID_PATTERN: Regex =
        Regex::new(r"^[A-Za-z0-9_-]+$").expect("Failed to compile WORKER_ID_PATTERN regex");
}

/// Owns the shared document and the workers' private settings documents.
///
/// All writes go through `write_lock`, so "save all" and "save one" can never
/// lose each other's updates. Reads are not serialized.
pub struct ConfigStore {
    config: StorageConfig,
    write_lock: Mutex<()>,
    journal: Journal,
}

impl ConfigStore {
    pub fn new(config: StorageConfig, journal: Journal) -> Self {
        Self {
            config,
            write_lock: Mutex::new(()),
            journal,
        }
    }

    pub fn worker_ids(&self) -> &[String] {
        &self.config.worker_ids
    }

    pub fn document_path(&self) -> PathBuf {
        self.config.workers_root.join(&self.config.config_file)
    }

    pub fn settings_path(&self, worker_id: &str) -> PathBuf {
        self.config
            .workers_root
            .join(worker_id)
            .join(&self.config.settings_file)
    }

    /// The id must be well formed and one of the configured workers.
    pub fn check_worker_id(&self, worker_id: &str) -> Result<()> {
        if !WORKER_ID_PATTERN.is_match(worker_id) {
            return Err(Error::InvalidWorkerId(worker_id.to_owned()));
        }
        if !self.config.worker_ids.iter().any(|id| id == worker_id) {
            return Err(Error::NotFound {
                what: "configured worker",
                path: self.config.workers_root.join(worker_id),
            });
        }
        Ok(())
    }

    /// Folder of the worker, which must exist.
    pub fn worker_dir(&self, worker_id: &str) -> Result<PathBuf> {
        self.check_worker_id(worker_id)?;
        let dir = self.config.workers_root.join(worker_id);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(Error::NotFound {
                what: "worker folder",
                path: dir,
            })
        }
    }

    pub async fn load(&self) -> Result<GlobalConfig> {
        let path = self.document_path();
        read_json(&path).await?.ok_or(Error::NotFound {
            what: "config document",
            path,
        })
    }

    /// Loads the shared document, materializing and persisting defaults when it is absent.
    pub async fn load_or_init(&self) -> Result<GlobalConfig> {
        let guard = self.write_lock.lock().await;
        match self.load().await {
            Err(Error::NotFound { .. }) => {
                let config = GlobalConfig::with_defaults(&self.config.worker_ids);
                self.write_document(&guard, &config).await?;
                self.journal.info(
                    None,
                    format!(
                        "created {} with {} default workers",
                        self.document_path().display(),
                        config.accounts.len()
                    ),
                );
                Ok(config)
            }
            Err(err) => {
                self.journal
                    .error(None, format!("failed to load config: {}", err));
                Err(err)
            }
            loaded => loaded,
        }
    }

    /// Replaces the whole document. Every account key must be a configured worker id.
    pub async fn save(&self, config: &GlobalConfig) -> Result<()> {
        if let Err(err) = config
            .worker_ids()
            .try_for_each(|worker_id| self.check_worker_id(worker_id))
        {
            self.journal
                .error(None, format!("configuration not saved: {}", err));
            return Err(err);
        }
        let guard = self.write_lock.lock().await;
        self.write_document(&guard, config).await?;
        self.journal.success(None, "configuration saved");
        Ok(())
    }

    /// Read-modify-write of a single account, then pushes it to the worker's private document.
    pub async fn save_one(&self, worker_id: &str, account: WorkerConfig) -> Result<GlobalConfig> {
        let log_failure = |err: &Error| {
            self.journal
                .error(Some(worker_id), format!("account not saved: {}", err))
        };
        self.check_worker_id(worker_id).inspect_err(log_failure)?;

        let guard = self.write_lock.lock().await;
        let mut config = self.load_for_update().await.inspect_err(log_failure)?;
        config.accounts.insert(worker_id.to_owned(), account.clone());
        self.write_document(&guard, &config)
            .await
            .inspect_err(log_failure)?;
        self.journal.success(Some(worker_id), "account saved");

        if let Err(err) = self
            .merge_private(&guard, worker_id, |doc| merge_account(doc, &account))
            .await
        {
            self.journal.error(
                Some(worker_id),
                format!("failed to update private settings: {}", err),
            );
        }
        Ok(config)
    }

    /// Read-modify-write of the server block, then propagation to every known worker.
    pub async fn save_server(&self, server: ServerConfig) -> Result<PropagationReport> {
        let guard = self.write_lock.lock().await;
        let mut config = self.load_for_update().await?;
        config.server = server;
        self.write_document(&guard, &config).await?;
        self.journal.success(None, "server settings saved");

        Ok(self
            .propagate_locked(&guard, &config.server, &self.config.worker_ids)
            .await)
    }

    /// Merges the server fields into each worker's private document.
    /// Missing documents are skipped, unreadable ones are reported; neither aborts the fan-out.
    pub async fn propagate_server_config(
        &self,
        server: &ServerConfig,
        worker_ids: &[String],
    ) -> PropagationReport {
        let guard = self.write_lock.lock().await;
        self.propagate_locked(&guard, server, worker_ids).await
    }

    pub async fn propagate_account(&self, worker_id: &str, account: &WorkerConfig) -> Result<bool> {
        let guard = self.write_lock.lock().await;
        self.merge_private(&guard, worker_id, |doc| merge_account(doc, account))
            .await
    }

    async fn propagate_locked(
        &self,
        guard: &MutexGuard<'_, ()>,
        server: &ServerConfig,
        worker_ids: &[String],
    ) -> PropagationReport {
        let mut report = PropagationReport::default();
        for worker_id in worker_ids {
            match self
                .merge_private(guard, worker_id, |doc| merge_server(doc, server))
                .await
            {
                Ok(true) => report.updated.push(worker_id.clone()),
                Ok(false) => report.skipped.push(worker_id.clone()),
                Err(err) => {
                    self.journal.error(
                        Some(worker_id),
                        format!("failed to propagate server settings: {}", err),
                    );
                    report.failed.push((worker_id.clone(), err.to_string()));
                }
            }
        }
        if !report.updated.is_empty() {
            self.journal.info(
                None,
                format!("server settings pushed to {}", report.updated.join(", ")),
            );
        }
        report
    }

    /// `Ok(false)` when the worker has no private document.
    async fn merge_private<F>(
        &self,
        _guard: &MutexGuard<'_, ()>,
        worker_id: &str,
        merge: F,
    ) -> Result<bool>
    where
        F: FnOnce(&mut Value),
    {
        let path = match self.worker_dir(worker_id) {
            Ok(_) => self.settings_path(worker_id),
            Err(err) => {
                self.journal
                    .warning(Some(worker_id), format!("skipped: {}", err));
                return Ok(false);
            }
        };
        let Some(mut document) = read_json::<Value>(&path).await? else {
            self.journal.warning(
                Some(worker_id),
                format!("skipped: {} not found", path.display()),
            );
            return Ok(false);
        };
        merge(&mut document);
        write_json(&path, &document).await?;
        debug!("private settings updated: {}", path.display());
        Ok(true)
    }

    async fn load_for_update(&self) -> Result<GlobalConfig> {
        match self.load().await {
            Ok(config) => Ok(config),
            Err(Error::NotFound { .. }) => {
                Ok(GlobalConfig::with_defaults(&self.config.worker_ids))
            }
            Err(err) => {
                self.journal
                    .error(None, format!("failed to load config: {}", err));
                Err(err)
            }
        }
    }

    async fn write_document(
        &self,
        _guard: &MutexGuard<'_, ()>,
        config: &GlobalConfig,
    ) -> Result<()> {
        let path = self.document_path();
        write_json(&path, config).await.inspect_err(|err| {
            self.journal
                .error(None, format!("failed to save configuration: {}", err));
        })
    }
}
