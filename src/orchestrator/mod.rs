//! Backup and restore sequencing
//!
//! Orchestrators only talk to [`Target`](crate::target::Target) and
//! [`SyncRunner`](crate::relay::SyncRunner). A run is a best-effort batch:
//! one bucket's sync or one metadata entry's import is the unit of failure,
//! never the whole run. Only a failed listing or a failed provisioning of
//! the backup-holding bucket aborts before bucket work starts.

mod backup;
mod pool;
mod restore;

pub use backup::BackupOrchestrator;
pub use restore::RestoreOrchestrator;

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use uuid::Uuid;

use crate::archiver::ImportReport;
use crate::config::{BackupConfig, CRYPT_NAME, DEFAULT_BACKUP_BUCKET, MAX_CONCURRENCY, SOURCE_NAME};
use crate::{BackupError, Result};

/// Per-run settings shared by both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Backup-holding bucket on the destination
    pub backup_bucket: String,
    pub expiration_days: i64,
    /// Maximum bucket syncs in flight
    pub concurrency: usize,
    /// Deadline for the whole run
    pub timeout: Option<Duration>,
    /// Relay remote name of the source
    pub source_remote: String,
    /// Relay remote name of the encrypting namespace
    pub crypt_remote: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            backup_bucket: DEFAULT_BACKUP_BUCKET.to_string(),
            expiration_days: 0,
            concurrency: num_cpus::get().min(MAX_CONCURRENCY),
            timeout: None,
            source_remote: SOURCE_NAME.to_string(),
            crypt_remote: CRYPT_NAME.to_string(),
        }
    }
}

impl RunSettings {
    pub fn from_config(config: &BackupConfig) -> Self {
        Self {
            backup_bucket: config.backup_bucket.clone(),
            expiration_days: config.expiration_days,
            concurrency: config.concurrency.clamp(1, MAX_CONCURRENCY),
            timeout: config.run_timeout,
            source_remote: config.source.name.clone(),
            crypt_remote: config.crypt.name.clone(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_expiration_days(mut self, days: i64) -> Self {
        self.expiration_days = days;
        self
    }
}

/// Temporary directory owned by one run, removed when dropped
pub struct RunScope {
    id: Uuid,
    dir: TempDir,
}

impl RunScope {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("s32s3-").tempdir()?;
        Ok(Self {
            id: Uuid::new_v4(),
            dir,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Step of the metadata leg of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataStage {
    Export,
    Upload,
    Download,
    Import,
}

impl fmt::Display for MetadataStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetadataStage::Export => "export",
            MetadataStage::Upload => "upload",
            MetadataStage::Download => "download",
            MetadataStage::Import => "import",
        };
        f.write_str(name)
    }
}

/// What happened to instance metadata during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataOutcome {
    /// Archive exported and handed to the relay
    Uploaded { bytes: u64 },
    /// Every archive entry imported
    Imported(ImportReport),
    /// The source exported nothing, so no archive was stored
    SkippedEmpty,
    Failed {
        stage: MetadataStage,
        reason: String,
        /// Per-entry detail when the import itself ran
        report: Option<ImportReport>,
    },
}

impl MetadataOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, MetadataOutcome::Failed { .. })
    }

    fn failed(stage: MetadataStage, error: &BackupError) -> Self {
        MetadataOutcome::Failed {
            stage,
            reason: error.to_string(),
            report: None,
        }
    }
}

/// Outcome of one bucket sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketResult {
    pub bucket: String,
    pub error: Option<String>,
    pub duration: Duration,
}

impl BucketResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Collected results of a backup or restore run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub metadata: MetadataOutcome,
    /// One result per bucket, in listing order
    pub buckets: Vec<BucketResult>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.metadata.is_success() && self.buckets.iter().all(BucketResult::is_success)
    }

    pub fn synced_buckets(&self) -> Vec<&str> {
        self.buckets
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.bucket.as_str())
            .collect()
    }

    pub fn failed_buckets(&self) -> Vec<&str> {
        self.buckets
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.bucket.as_str())
            .collect()
    }
}

/// Run `work` under the optional deadline; expiry drops the work in flight
async fn with_deadline<F>(timeout: Option<Duration>, work: F) -> Result<RunReport>
where
    F: Future<Output = Result<RunReport>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| BackupError::DeadlineExceeded(limit))?,
        None => work.await,
    }
}
