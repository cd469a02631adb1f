use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use super::pool::sync_all;
use super::{with_deadline, MetadataOutcome, MetadataStage, RunReport, RunScope, RunSettings};
use crate::archive::{MetadataArchive, ARCHIVE_FILE_NAME};
use crate::relay::{SyncRunner, SyncUnit};
use crate::target::Target;
use crate::{BackupError, Result};

/// Relay -> archive -> source, then every relayed bucket back to the source
pub struct RestoreOrchestrator {
    source: Arc<dyn Target>,
    relay: Arc<dyn SyncRunner>,
    settings: RunSettings,
    at: Option<String>,
}

impl RestoreOrchestrator {
    pub fn new(source: Arc<dyn Target>, relay: Arc<dyn SyncRunner>, settings: RunSettings) -> Self {
        Self {
            source,
            relay,
            settings,
            at: None,
        }
    }

    /// Restore the state as of a point in time (RFC 3339)
    pub fn at(mut self, at: Option<String>) -> Self {
        self.at = at;
        self
    }

    /// Run the restore, bounded by the configured deadline
    pub async fn run(&self) -> Result<RunReport> {
        with_deadline(self.settings.timeout, self.execute()).await
    }

    #[instrument(
        name = "restore",
        skip(self),
        fields(source = %self.settings.crypt_remote, dest = %self.settings.source_remote, at = ?self.at)
    )]
    async fn execute(&self) -> Result<RunReport> {
        let started = Instant::now();
        let scope = RunScope::new()?;
        info!(run_id = %scope.id(), "Starting restore");

        let metadata = self.restore_metadata(&scope).await;

        let buckets = self
            .relay
            .list_buckets(&self.settings.crypt_remote, self.at.as_deref())
            .await?;
        info!(count = buckets.len(), "Restoring buckets");

        let units = buckets
            .into_iter()
            .map(|bucket| {
                SyncUnit::new(bucket, &self.settings.crypt_remote, &self.settings.source_remote)
                    .at(self.at.clone())
            })
            .collect();
        let results = sync_all(Arc::clone(&self.relay), units, self.settings.concurrency).await;

        let report = RunReport {
            run_id: scope.id(),
            metadata,
            buckets: results,
        };
        info!(
            synced = report.synced_buckets().len(),
            failed = report.failed_buckets().len(),
            metadata_ok = report.metadata.is_success(),
            duration_ms = started.elapsed().as_millis(),
            "Restore finished"
        );
        Ok(report)
    }

    async fn restore_metadata(&self, scope: &RunScope) -> MetadataOutcome {
        let downloaded = self
            .relay
            .download_file(
                &self.settings.crypt_remote,
                ARCHIVE_FILE_NAME,
                scope.path(),
                self.at.as_deref(),
            )
            .await
            .and_then(|path| MetadataArchive::read_from_file(&path));

        let archive = match downloaded {
            Ok(archive) => archive,
            Err(e) => {
                error!(error = %e, "Failed to fetch metadata archive");
                return MetadataOutcome::failed(MetadataStage::Download, &e);
            }
        };

        match self.source.import_metadata(&archive).await {
            Ok(report) => {
                info!(entries = %report, "Metadata restored");
                MetadataOutcome::Imported(report)
            }
            Err(BackupError::PartialImportFailure { report }) => {
                warn!(
                    succeeded = ?report.succeeded(),
                    failed = ?report.failed(),
                    "Metadata partially restored"
                );
                MetadataOutcome::Failed {
                    stage: MetadataStage::Import,
                    reason: format!("partial import: {}", report),
                    report: Some(report),
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to import metadata");
                MetadataOutcome::failed(MetadataStage::Import, &e)
            }
        }
    }
}
