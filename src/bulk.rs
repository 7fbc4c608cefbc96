//! Bulk create and delete fan-outs
//!
//! One request per data source, all in flight together behind the admission
//! gate. Items fail independently: there is no rollback, and a restore that
//! fails halfway leaves the created half in place.

use crate::backup::BackupStore;
use crate::datasource::{DataSource, NewDataSource};
use crate::error::{format_error, ItemFailure, Result};
use crate::gate::AdmissionGate;
use crate::redash::DataSourceClient;
use futures::future::join_all;
use std::future::Future;
use std::path::PathBuf;

/// Per-item results of a bulk run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of deleting behind a snapshot
#[derive(Debug)]
pub struct DeleteOutcome {
    /// Snapshot written before the delete; `None` when there was nothing to delete
    pub backup: Option<PathBuf>,
    pub report: BatchReport,
}

/// Delete every data source in `data_sources`
pub async fn delete(
    client: &DataSourceClient,
    gate: &AdmissionGate,
    data_sources: &[DataSource],
) -> Result<BatchReport> {
    fan_out(gate, data_sources, "delete", |data_source| client.delete(data_source)).await
}

/// Recreate every data source in a snapshot.
/// Only `name`, `type` and `options` are sent; the server allocates new ids.
pub async fn restore(
    client: &DataSourceClient,
    gate: &AdmissionGate,
    snapshot: &[DataSource],
) -> Result<BatchReport> {
    let payloads: Vec<NewDataSource> = snapshot.iter().map(NewDataSource::from).collect();
    let items: Vec<(&DataSource, &NewDataSource)> = snapshot.iter().zip(&payloads).collect();

    fan_out(gate, &items, "create", |(_, payload)| client.create(payload)).await
}

/// Snapshot `data_sources`, then delete them.
/// If the snapshot cannot be written, nothing is deleted.
pub async fn delete_with_backup(
    store: &BackupStore,
    client: &DataSourceClient,
    gate: &AdmissionGate,
    data_sources: &[DataSource],
) -> Result<DeleteOutcome> {
    if data_sources.is_empty() {
        return Ok(DeleteOutcome {
            backup: None,
            report: BatchReport::default(),
        });
    }

    let backup = store.snapshot(data_sources)?;
    let report = delete(client, gate, data_sources).await?;

    Ok(DeleteOutcome {
        backup: Some(backup),
        report,
    })
}

/// Something a fan-out failure can be attributed to
trait Item {
    fn source(&self) -> &DataSource;
}

impl Item for DataSource {
    fn source(&self) -> &DataSource {
        self
    }
}

impl Item for (&DataSource, &NewDataSource) {
    fn source(&self) -> &DataSource {
        self.0
    }
}

async fn fan_out<'a, I, F, Fut>(
    gate: &AdmissionGate,
    items: &'a [I],
    action: &str,
    operation: F,
) -> Result<BatchReport>
where
    I: Item,
    F: Fn(&'a I) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let operation = &operation;
    let outcomes = join_all(items.iter().map(|item| async move {
        (item.source(), gate.run(operation(item)).await)
    }))
    .await;

    let mut report = BatchReport::default();
    for (data_source, outcome) in outcomes {
        match outcome {
            Ok(()) => report.succeeded += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!("Failed to {} {}: {}", action, data_source, format_error(&e));
                report
                    .failed
                    .push(ItemFailure::named(data_source.id, &data_source.name, e));
            }
        }
    }

    tracing::info!(
        "Bulk {}: {} succeeded, {} failed",
        action,
        report.succeeded,
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redash::DEFAULT_TIMEOUT;

    #[tokio::test]
    async fn test_empty_delete_makes_no_snapshot_and_no_calls() {
        // Port 9 is discard; any request would fail, so a clean report means none was sent.
        let client = DataSourceClient::new("http://127.0.0.1:9", "k", DEFAULT_TIMEOUT).unwrap();
        let store = BackupStore::new(std::env::temp_dir().join("dsprune-never-created"));

        let outcome = delete_with_backup(&store, &client, &AdmissionGate::default(), &[])
            .await
            .unwrap();

        assert!(outcome.backup.is_none());
        assert_eq!(outcome.report.total(), 0);
        assert!(!store.dir().exists());
    }

    #[test]
    fn test_report_counts() {
        let mut report = BatchReport::default();
        assert!(report.is_complete());

        report.succeeded = 2;
        report
            .failed
            .push(ItemFailure::new(9, crate::error::Error::validation("x")));
        assert_eq!(report.total(), 3);
        assert!(!report.is_complete());
    }
}
