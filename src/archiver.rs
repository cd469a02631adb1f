//! Metadata export and import
//!
//! Export runs the three administrative exports in a fixed order and fails
//! as a whole if any of them fails: an archive with partial metadata is not
//! a valid backup. Import is the opposite: every entry is attempted and the
//! caller gets a per-entry account of what happened.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

use crate::admin::{AdminApi, BucketImportReport, BucketOutcome};
use crate::archive::{ArchiveEntry, EntryKind, MetadataArchive, ARCHIVE_FILE_NAME};
use crate::{BackupError, Result};

/// Result of importing one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOutcome {
    pub entry: EntryKind,
    /// First error encountered for this entry, if any
    pub error: Option<String>,
    /// Per-bucket detail, only for the bucket-configuration entry
    pub buckets: Option<BucketImportReport>,
}

impl EntryOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate result of a metadata import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    entries: Vec<EntryOutcome>,
}

impl ImportReport {
    pub fn entries(&self) -> &[EntryOutcome] {
        &self.entries
    }

    pub fn outcome(&self, entry: EntryKind) -> Option<&EntryOutcome> {
        self.entries.iter().find(|o| o.entry == entry)
    }

    pub fn succeeded(&self) -> Vec<EntryKind> {
        self.entries
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.entry)
            .collect()
    }

    pub fn failed(&self) -> Vec<EntryKind> {
        self.entries
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.entry)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.entries.iter().all(EntryOutcome::is_success)
    }

    /// Record an outcome; a repeated entry keeps its first error
    fn record(&mut self, outcome: EntryOutcome) {
        match self.entries.iter_mut().find(|o| o.entry == outcome.entry) {
            Some(existing) if existing.error.is_some() => {}
            Some(existing) => *existing = outcome,
            None => self.entries.push(outcome),
        }
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|o| match &o.error {
                None => format!("{}: ok", o.entry),
                Some(err) => format!("{}: {}", o.entry, err),
            })
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Builds and applies metadata archives against an administrative API
pub struct MetadataArchiver<'a, A: AdminApi + ?Sized> {
    admin: &'a A,
}

impl<'a, A: AdminApi + ?Sized> MetadataArchiver<'a, A> {
    pub fn new(admin: &'a A) -> Self {
        Self { admin }
    }

    /// Export the three entries in fixed order; any failure aborts the export
    #[instrument(skip(self))]
    pub async fn export(&self) -> Result<MetadataArchive> {
        let iam = self
            .admin
            .export_iam()
            .await
            .map_err(|e| export_failed(EntryKind::Iam, e))?;
        let buckets = self
            .admin
            .export_bucket_metadata()
            .await
            .map_err(|e| export_failed(EntryKind::Buckets, e))?;
        let config = self
            .admin
            .export_config()
            .await
            .map_err(|e| export_failed(EntryKind::Config, e))?;

        info!(
            iam_bytes = iam.len(),
            buckets_bytes = buckets.len(),
            config_bytes = config.len(),
            "Metadata exported"
        );
        Ok(MetadataArchive::from_parts(iam, buckets, config))
    }

    /// Export and materialize the archive as a compressed container in `dir`
    pub async fn export_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        let archive = self.export().await?;
        archive.write_to_file(&dir.join(ARCHIVE_FILE_NAME))
    }

    /// Import every known entry in the order received
    ///
    /// Returns the full report on success, or `PartialImportFailure` carrying
    /// the same report when any entry failed.
    #[instrument(skip(self, archive), fields(entries = archive.len()))]
    pub async fn import(&self, archive: &MetadataArchive) -> Result<ImportReport> {
        let mut report = ImportReport::default();

        for entry in archive.entries() {
            let Some(kind) = entry.kind() else {
                debug!(entry = %entry.name, "Ignoring unknown archive entry");
                continue;
            };
            report.record(self.import_entry(kind, entry).await);
        }

        if report.is_success() {
            info!(imported = ?report.succeeded(), "Metadata imported");
            Ok(report)
        } else {
            warn!(
                succeeded = ?report.succeeded(),
                failed = ?report.failed(),
                "Metadata import partially failed"
            );
            Err(BackupError::PartialImportFailure { report })
        }
    }

    async fn import_entry(&self, kind: EntryKind, entry: &ArchiveEntry) -> EntryOutcome {
        let data = entry.data.as_slice();
        let result = match kind {
            EntryKind::Iam => self.admin.import_iam(data).await.map(|_| None),
            EntryKind::Buckets => self.admin.import_bucket_metadata(data).await.map(Some),
            EntryKind::Config => self.admin.import_config(data).await.map(|_| None),
        };

        match result {
            Ok(Some(buckets)) => {
                for (bucket, outcome) in &buckets.buckets {
                    match outcome {
                        BucketOutcome::Restored => {
                            debug!(entry = %kind, bucket = %bucket, "Bucket configuration restored")
                        }
                        BucketOutcome::Failed(reason) => {
                            error!(entry = %kind, bucket = %bucket, error = %reason, "Bucket configuration failed to restore")
                        }
                    }
                }

                let error = {
                    let failed = buckets.failed_buckets();
                    (!failed.is_empty()).then(|| {
                        format!(
                            "{} of {} buckets failed to restore: {}",
                            failed.len(),
                            buckets.buckets.len(),
                            failed.join(", ")
                        )
                    })
                };
                EntryOutcome { entry: kind, error, buckets: Some(buckets) }
            }
            Ok(None) => {
                debug!(entry = %kind, "Entry imported");
                EntryOutcome { entry: kind, error: None, buckets: None }
            }
            Err(e) => {
                error!(entry = %kind, error = %e, "Entry import failed");
                EntryOutcome { entry: kind, error: Some(e.to_string()), buckets: None }
            }
        }
    }
}

fn export_failed(stage: EntryKind, e: BackupError) -> BackupError {
    BackupError::ExportFailed {
        stage,
        reason: e.to_string(),
    }
}
