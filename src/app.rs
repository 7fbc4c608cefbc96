//! Application State
//!
//! Everything one run against one environment needs: the client, the
//! admission gate every fan-out shares, the snapshot store and the
//! health-check ignore list.

use crate::backup::BackupStore;
use crate::bulk::{self, BatchReport, DeleteOutcome};
use crate::config::{Config, Credentials, Environment};
use crate::datasource::DataSource;
use crate::error::Result;
use crate::gate::AdmissionGate;
use crate::redash::DataSourceClient;
use crate::selection::{Criterion, IgnoreList, Selection, SelectionEngine};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolved runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub concurrency: usize,
    pub backup_dir: PathBuf,
    pub timeout: Duration,
    pub ignore: IgnoreList,
}

impl Settings {
    /// Merge command-line overrides over the saved config
    pub fn resolve(
        config: &Config,
        concurrency: Option<usize>,
        backup_dir: Option<PathBuf>,
        timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            concurrency: config.effective_concurrency(concurrency),
            backup_dir: config.effective_backup_dir(backup_dir),
            timeout: config.effective_timeout(timeout_secs),
            ignore: IgnoreList::with_defaults(&config.ignored_test_messages),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::resolve(&Config::default(), None, None, None)
    }
}

/// One session against one Redash environment
pub struct App {
    pub environment: Environment,
    client: DataSourceClient,
    gate: AdmissionGate,
    store: BackupStore,
    ignore: IgnoreList,
}

impl App {
    pub fn new(credentials: &Credentials, settings: &Settings) -> Result<Self> {
        let client = DataSourceClient::new(&credentials.base_url, &credentials.api_key, settings.timeout)?;

        tracing::info!(
            "Session for {} (concurrency {}, backups in {:?})",
            credentials.environment,
            settings.concurrency,
            settings.backup_dir
        );

        Ok(Self {
            environment: credentials.environment,
            client,
            gate: AdmissionGate::new(settings.concurrency),
            store: BackupStore::new(&settings.backup_dir),
            ignore: settings.ignore.clone(),
        })
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    pub fn engine(&self) -> SelectionEngine<'_> {
        SelectionEngine::new(&self.client, self.gate.clone()).with_ignore_list(self.ignore.clone())
    }

    /// Every data source, as listed by the collection endpoint
    pub async fn list(&self) -> Result<Vec<DataSource>> {
        self.gate.run(self.client.show_all()).await
    }

    pub async fn select(&self, criterion: &Criterion) -> Result<Selection> {
        self.engine().select(criterion).await
    }

    /// Snapshot, then delete
    pub async fn delete(&self, data_sources: &[DataSource]) -> Result<DeleteOutcome> {
        bulk::delete_with_backup(&self.store, &self.client, &self.gate, data_sources).await
    }

    /// Resolve `name` against the backup directory and read it
    pub fn load_snapshot(&self, name: &str) -> Result<(PathBuf, Vec<DataSource>)> {
        let path = self.store.resolve(name);
        let data_sources = self.store.load(&path)?;
        Ok((path, data_sources))
    }

    pub async fn restore(&self, snapshot: &[DataSource]) -> Result<BatchReport> {
        bulk::restore(&self.client, &self.gate, snapshot).await
    }

    pub fn backup_dir(&self) -> &Path {
        self.store.dir()
    }

    /// Stop admitting work and release the HTTP session
    pub fn close(self) {
        self.gate.close();
        self.client.close();
    }
}
