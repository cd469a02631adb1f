use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use super::pool::sync_all;
use super::{with_deadline, MetadataOutcome, MetadataStage, RunReport, RunScope, RunSettings};
use crate::archive::ARCHIVE_FILE_NAME;
use crate::relay::{SyncRunner, SyncUnit};
use crate::target::Target;
use crate::Result;

/// Source -> archive -> relay, then every source bucket through the relay
pub struct BackupOrchestrator {
    source: Arc<dyn Target>,
    dest: Arc<dyn Target>,
    relay: Arc<dyn SyncRunner>,
    settings: RunSettings,
}

impl BackupOrchestrator {
    pub fn new(
        source: Arc<dyn Target>,
        dest: Arc<dyn Target>,
        relay: Arc<dyn SyncRunner>,
        settings: RunSettings,
    ) -> Self {
        Self {
            source,
            dest,
            relay,
            settings,
        }
    }

    /// Run the backup, bounded by the configured deadline
    pub async fn run(&self) -> Result<RunReport> {
        with_deadline(self.settings.timeout, self.execute()).await
    }

    #[instrument(
        name = "backup",
        skip(self),
        fields(source = %self.settings.source_remote, dest = %self.settings.crypt_remote)
    )]
    async fn execute(&self) -> Result<RunReport> {
        let started = Instant::now();
        let scope = RunScope::new()?;
        info!(run_id = %scope.id(), "Starting backup");

        self.dest
            .ensure_bucket(&self.settings.backup_bucket, self.settings.expiration_days)
            .await?;

        let metadata = self.backup_metadata(&scope).await;

        let buckets = self.source.list_buckets().await?;
        info!(count = buckets.len(), "Backing up buckets");

        let units = buckets
            .into_iter()
            .map(|bucket| {
                SyncUnit::new(bucket, &self.settings.source_remote, &self.settings.crypt_remote)
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
            "Backup finished"
        );
        Ok(report)
    }

    async fn backup_metadata(&self, scope: &RunScope) -> MetadataOutcome {
        let archive = match self.source.export_metadata().await {
            Ok(archive) => archive,
            Err(e) => {
                error!(error = %e, "Failed to export metadata");
                return MetadataOutcome::failed(MetadataStage::Export, &e);
            }
        };

        if archive.is_empty() {
            warn!("Source exported no metadata, skipping archive upload");
            return MetadataOutcome::SkippedEmpty;
        }

        let path = match archive.write_to_file(&scope.path().join(ARCHIVE_FILE_NAME)) {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "Failed to write metadata archive");
                return MetadataOutcome::failed(MetadataStage::Export, &e);
            }
        };
        let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        match self
            .relay
            .upload_file(&path, &self.settings.crypt_remote, ARCHIVE_FILE_NAME)
            .await
        {
            Ok(()) => {
                info!(bytes, "Metadata archive uploaded");
                MetadataOutcome::Uploaded { bytes }
            }
            Err(e) => {
                error!(error = %e, "Failed to upload metadata archive");
                MetadataOutcome::failed(MetadataStage::Upload, &e)
            }
        }
    }
}
