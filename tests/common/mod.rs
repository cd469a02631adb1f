// Shared test doubles for integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use parking_lot::Mutex;
use s32s3::admin::{AdminApi, BucketImportReport};
use s32s3::archive::{EntryKind, MetadataArchive};
use s32s3::relay::{SyncRunner, SyncUnit};
use s32s3::{BackupError, Result};

/// Relay double that records every call and fails chosen buckets
#[derive(Default)]
pub struct RecordingRelay {
    failing: HashSet<String>,
    synced: Mutex<Vec<SyncUnit>>,
    uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
    stored: Mutex<BTreeMap<String, Vec<u8>>>,
    remote_buckets: Vec<String>,
    fail_uploads: bool,
    sync_delay: Option<std::time::Duration>,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, bucket: &str) -> Self {
        self.failing.insert(bucket.to_string());
        self
    }

    pub fn with_remote_buckets(mut self, buckets: &[&str]) -> Self {
        self.remote_buckets = buckets.iter().map(|b| b.to_string()).collect();
        self
    }

    /// Pre-store a file under `name` as if a previous run uploaded it
    pub fn with_stored(self, name: &str, data: Vec<u8>) -> Self {
        self.stored.lock().insert(name.to_string(), data);
        self
    }

    pub fn failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    pub fn slow(mut self, delay: std::time::Duration) -> Self {
        self.sync_delay = Some(delay);
        self
    }

    pub fn synced(&self) -> Vec<SyncUnit> {
        let mut units = self.synced.lock().clone();
        units.sort_by(|a, b| a.bucket.cmp(&b.bucket));
        units
    }

    /// `(remote, name, bytes)` for every uploaded file
    pub fn uploads(&self) -> Vec<(String, String, Vec<u8>)> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl SyncRunner for RecordingRelay {
    async fn sync_bucket(&self, unit: &SyncUnit) -> Result<()> {
        if let Some(delay) = self.sync_delay {
            tokio::time::sleep(delay).await;
        }
        self.synced.lock().push(unit.clone());
        if self.failing.contains(&unit.bucket) {
            return Err(BackupError::SyncFailed {
                bucket: unit.bucket.clone(),
                reason: "rclone sync exited with exit status: 1".to_string(),
            });
        }
        Ok(())
    }

    async fn upload_file(&self, path: &Path, remote: &str, name: &str) -> Result<()> {
        if self.fail_uploads {
            return Err(BackupError::Relay("rclone copyto exited with exit status: 1".to_string()));
        }
        let data = std::fs::read(path)?;
        self.stored.lock().insert(name.to_string(), data.clone());
        self.uploads.lock().push((remote.to_string(), name.to_string(), data));
        Ok(())
    }

    async fn download_file(
        &self,
        _remote: &str,
        name: &str,
        into_dir: &Path,
        _at: Option<&str>,
    ) -> Result<PathBuf> {
        let data = self
            .stored
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| BackupError::Relay(format!("{} not found", name)))?;
        let path = into_dir.join(name);
        std::fs::write(&path, data)?;
        Ok(path)
    }

    async fn list_buckets(&self, _remote: &str, _at: Option<&str>) -> Result<Vec<String>> {
        Ok(self.remote_buckets.clone())
    }
}

/// Administrative API double with scripted per-entry behavior
#[derive(Default)]
pub struct ScriptedAdmin {
    exports: BTreeMap<EntryKind, Vec<u8>>,
    failing_exports: HashSet<EntryKind>,
    failing_imports: HashSet<EntryKind>,
    bucket_report: BucketImportReport,
    imported: Mutex<Vec<(EntryKind, Vec<u8>)>>,
}

impl ScriptedAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exporting(mut self, kind: EntryKind, data: &[u8]) -> Self {
        self.exports.insert(kind, data.to_vec());
        self
    }

    pub fn failing_export(mut self, kind: EntryKind) -> Self {
        self.failing_exports.insert(kind);
        self
    }

    pub fn failing_import(mut self, kind: EntryKind) -> Self {
        self.failing_imports.insert(kind);
        self
    }

    pub fn with_bucket_report(mut self, report: BucketImportReport) -> Self {
        self.bucket_report = report;
        self
    }

    /// Entries imported, in call order
    pub fn imported(&self) -> Vec<(EntryKind, Vec<u8>)> {
        self.imported.lock().clone()
    }

    fn export(&self, kind: EntryKind) -> Result<Vec<u8>> {
        if self.failing_exports.contains(&kind) {
            return Err(BackupError::Admin(format!("{} export returned 500", kind)));
        }
        Ok(self.exports.get(&kind).cloned().unwrap_or_default())
    }

    fn import(&self, kind: EntryKind, data: &[u8]) -> Result<()> {
        self.imported.lock().push((kind, data.to_vec()));
        if self.failing_imports.contains(&kind) {
            return Err(BackupError::Admin(format!("{} import returned 400", kind)));
        }
        Ok(())
    }
}

#[async_trait]
impl AdminApi for ScriptedAdmin {
    async fn export_iam(&self) -> Result<Vec<u8>> {
        self.export(EntryKind::Iam)
    }

    async fn export_bucket_metadata(&self) -> Result<Vec<u8>> {
        self.export(EntryKind::Buckets)
    }

    async fn export_config(&self) -> Result<Vec<u8>> {
        self.export(EntryKind::Config)
    }

    async fn import_iam(&self, data: &[u8]) -> Result<()> {
        self.import(EntryKind::Iam, data)
    }

    async fn import_bucket_metadata(&self, data: &[u8]) -> Result<BucketImportReport> {
        self.import(EntryKind::Buckets, data)?;
        Ok(self.bucket_report.clone())
    }

    async fn import_config(&self, data: &[u8]) -> Result<()> {
        self.import(EntryKind::Config, data)
    }
}

/// Archive with one entry per kind, in the given order
pub fn archive_in_order(order: &[EntryKind]) -> MetadataArchive {
    let mut archive = MetadataArchive::new();
    for kind in order {
        archive.push(kind.file_name(), format!("{}-payload", kind).into_bytes());
    }
    archive
}
