//! In-memory target
//!
//! Buckets and metadata live in process memory. Metadata can only be written
//! once: a later import must carry exactly the bytes already held, so a
//! double restore of different data shows up as `MetadataMismatch` instead
//! of silently overwriting.

use std::collections::{BTreeMap, HashSet};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::Target;
use crate::admin::{AdminApi, BucketImportReport};
use crate::archive::{EntryKind, MetadataArchive};
use crate::archiver::{ImportReport, MetadataArchiver};
use crate::provision::{BucketApi, BucketProvisioner, ProvisionOutcome};
use crate::{BackupError, Result};

/// Bucket state held by [`MockTarget`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockBucket {
    pub versioning: bool,
    pub noncurrent_days: Option<u32>,
}

#[derive(Default)]
struct MockState {
    buckets: BTreeMap<String, MockBucket>,
    metadata: BTreeMap<EntryKind, Vec<u8>>,
    operations: Vec<String>,
    unavailable: bool,
    failing_exports: HashSet<EntryKind>,
}

/// Test double for a storage backend
#[derive(Default)]
pub struct MockTarget {
    state: Mutex<MockState>,
}

impl MockTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buckets<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = self.state.lock();
            for name in names {
                state.buckets.entry(name.into()).or_default();
            }
        }
        self
    }

    pub fn with_metadata(self, kind: EntryKind, data: impl Into<Vec<u8>>) -> Self {
        self.state.lock().metadata.insert(kind, data.into());
        self
    }

    /// Make listing fail as if the backend could not be reached
    pub fn unavailable(self) -> Self {
        self.state.lock().unavailable = true;
        self
    }

    /// Make the administrative export of `kind` fail
    pub fn with_failing_export(self, kind: EntryKind) -> Self {
        self.state.lock().failing_exports.insert(kind);
        self
    }

    pub fn bucket(&self, name: &str) -> Option<MockBucket> {
        self.state.lock().buckets.get(name).cloned()
    }

    pub fn bucket_names(&self) -> Vec<String> {
        self.state.lock().buckets.keys().cloned().collect()
    }

    pub fn metadata(&self, kind: EntryKind) -> Option<Vec<u8>> {
        self.state.lock().metadata.get(&kind).cloned()
    }

    /// Mutating bucket calls in the order they were made
    pub fn operations(&self) -> Vec<String> {
        self.state.lock().operations.clone()
    }

    fn export_entry(&self, kind: EntryKind) -> Result<Vec<u8>> {
        let state = self.state.lock();
        if state.failing_exports.contains(&kind) {
            return Err(BackupError::Admin(format!("export of {} refused", kind)));
        }
        Ok(state.metadata.get(&kind).cloned().unwrap_or_default())
    }

    fn import_entry(&self, kind: EntryKind, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        match state.metadata.get(&kind) {
            Some(existing) if !existing.is_empty() && existing.as_slice() != data => {
                Err(BackupError::MetadataMismatch { entry: kind })
            }
            Some(existing) if !existing.is_empty() => Ok(()),
            _ => {
                state.metadata.insert(kind, data.to_vec());
                Ok(())
            }
        }
    }

    fn check_mismatch(&self, archive: &MetadataArchive) -> Result<()> {
        let state = self.state.lock();
        for entry in archive.entries() {
            let Some(kind) = entry.kind() else { continue };
            if let Some(existing) = state.metadata.get(&kind) {
                if !existing.is_empty() && *existing != entry.data {
                    return Err(BackupError::MetadataMismatch { entry: kind });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AdminApi for MockTarget {
    async fn export_iam(&self) -> Result<Vec<u8>> {
        self.export_entry(EntryKind::Iam)
    }

    async fn export_bucket_metadata(&self) -> Result<Vec<u8>> {
        self.export_entry(EntryKind::Buckets)
    }

    async fn export_config(&self) -> Result<Vec<u8>> {
        self.export_entry(EntryKind::Config)
    }

    async fn import_iam(&self, data: &[u8]) -> Result<()> {
        self.import_entry(EntryKind::Iam, data)
    }

    async fn import_bucket_metadata(&self, data: &[u8]) -> Result<BucketImportReport> {
        self.import_entry(EntryKind::Buckets, data)?;
        let report = self
            .bucket_names()
            .into_iter()
            .fold(BucketImportReport::new(), |report, name| report.restored(name));
        Ok(report)
    }

    async fn import_config(&self, data: &[u8]) -> Result<()> {
        self.import_entry(EntryKind::Config, data)
    }
}

#[async_trait]
impl BucketApi for MockTarget {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.state.lock().buckets.contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.buckets.entry(bucket.to_string()).or_default();
        state.operations.push(format!("create {}", bucket));
        Ok(())
    }

    async fn enable_versioning(&self, bucket: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.buckets.entry(bucket.to_string()).or_default().versioning = true;
        state.operations.push(format!("versioning {}", bucket));
        Ok(())
    }

    async fn set_noncurrent_expiration(&self, bucket: &str, days: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.buckets.entry(bucket.to_string()).or_default().noncurrent_days = Some(days);
        state.operations.push(format!("expire {} {}", bucket, days));
        Ok(())
    }
}

#[async_trait]
impl Target for MockTarget {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let state = self.state.lock();
        if state.unavailable {
            return Err(BackupError::BackendUnavailable {
                target: "mock".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(state.buckets.keys().cloned().collect())
    }

    async fn export_metadata(&self) -> Result<MetadataArchive> {
        let holds_nothing = {
            let state = self.state.lock();
            state.metadata.is_empty() && state.failing_exports.is_empty()
        };
        if holds_nothing {
            debug!("Mock target holds no metadata, exporting empty archive");
            return Ok(MetadataArchive::new());
        }
        MetadataArchiver::new(self).export().await
    }

    async fn import_metadata(&self, archive: &MetadataArchive) -> Result<ImportReport> {
        self.check_mismatch(archive)?;
        MetadataArchiver::new(self).import(archive).await
    }

    async fn ensure_bucket(&self, name: &str, retention_days: i64) -> Result<ProvisionOutcome> {
        BucketProvisioner::new(self).provision(name, retention_days).await
    }
}
