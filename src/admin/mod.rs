//! Administrative API of a storage backend
//!
//! The six calls used to move instance metadata in and out of a backend.
//! Payloads are opaque: whatever an export returns is what an import expects.

#[cfg(feature = "minio")]
mod minio;
#[cfg(feature = "minio")]
mod sigv4;

#[cfg(feature = "minio")]
pub use minio::{MinioAdminClient, MinioAdminConfig};

use std::collections::BTreeMap;
use async_trait::async_trait;
use serde_json::Value;

use crate::{BackupError, Result};

/// Administrative export/import operations of a backend
#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Export identity/access configuration
    async fn export_iam(&self) -> Result<Vec<u8>>;

    /// Export configuration of every bucket
    async fn export_bucket_metadata(&self) -> Result<Vec<u8>>;

    /// Export service configuration
    async fn export_config(&self) -> Result<Vec<u8>>;

    /// Import identity/access configuration
    async fn import_iam(&self, data: &[u8]) -> Result<()>;

    /// Import bucket configuration, reporting the outcome per bucket
    async fn import_bucket_metadata(&self, data: &[u8]) -> Result<BucketImportReport>;

    /// Import service configuration
    async fn import_config(&self, data: &[u8]) -> Result<()>;
}

/// Outcome of restoring one bucket's configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketOutcome {
    Restored,
    Failed(String),
}

impl BucketOutcome {
    pub fn is_restored(&self) -> bool {
        matches!(self, BucketOutcome::Restored)
    }
}

/// Per-bucket result of a bucket-configuration import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketImportReport {
    pub buckets: BTreeMap<String, BucketOutcome>,
}

impl BucketImportReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restored(mut self, bucket: impl Into<String>) -> Self {
        self.buckets.insert(bucket.into(), BucketOutcome::Restored);
        self
    }

    pub fn failed(mut self, bucket: impl Into<String>, reason: impl Into<String>) -> Self {
        self.buckets.insert(bucket.into(), BucketOutcome::Failed(reason.into()));
        self
    }

    pub fn outcome(&self, bucket: &str) -> Option<&BucketOutcome> {
        self.buckets.get(bucket)
    }

    pub fn failed_buckets(&self) -> Vec<&str> {
        self.buckets
            .iter()
            .filter(|(_, outcome)| !outcome.is_restored())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.buckets.values().all(BucketOutcome::is_restored)
    }

    /// Parse the JSON body returned by a bucket-metadata import
    ///
    /// The body maps each bucket to a status object whose feature entries
    /// (`policy`, `versioning`, `lifecycle`, ...) may carry an `error` string,
    /// next to an optional bucket-level `error`. A bucket is failed when any
    /// of those errors is non-empty; the first one found is kept.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new());
        }

        let value: Value = serde_json::from_slice(body)?;
        let buckets = value
            .get("buckets")
            .or_else(|| value.get("Buckets"))
            .and_then(Value::as_object);

        let mut report = Self::new();
        let Some(buckets) = buckets else {
            return Ok(report);
        };

        for (name, status) in buckets {
            let outcome = match first_error(status) {
                Some(reason) => BucketOutcome::Failed(reason),
                None => BucketOutcome::Restored,
            };
            report.buckets.insert(name.clone(), outcome);
        }

        Ok(report)
    }
}

fn first_error(status: &Value) -> Option<String> {
    let object = status.as_object()?;

    if let Some(err) = error_field(status) {
        return Some(err);
    }

    object.iter().find_map(|(feature, value)| {
        error_field(value).map(|err| format!("{}: {}", feature, err))
    })
}

fn error_field(value: &Value) -> Option<String> {
    value
        .get("error")
        .or_else(|| value.get("Err"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Map a transport-level failure onto the error taxonomy
#[cfg_attr(not(feature = "minio"), allow(dead_code))]
pub(crate) fn unavailable(target: &str, reason: impl ToString) -> BackupError {
    BackupError::BackendUnavailable {
        target: target.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bucket_import_report() {
        let body = br#"{
            "buckets": {
                "x": {"policy": {"isSet": true, "error": "access denied"}, "versioning": {"isSet": true}},
                "y": {"policy": {"isSet": true}, "lifecycle": {"isSet": false, "error": ""}}
            }
        }"#;

        let report = BucketImportReport::from_json(body).unwrap();
        assert_eq!(
            report.outcome("x"),
            Some(&BucketOutcome::Failed("policy: access denied".to_string()))
        );
        assert_eq!(report.outcome("y"), Some(&BucketOutcome::Restored));
        assert_eq!(report.failed_buckets(), vec!["x"]);
        assert!(!report.is_success());
    }

    #[test]
    fn test_bucket_level_error_wins() {
        let body = br#"{"buckets": {"z": {"error": "bucket not found", "policy": {"error": "later"}}}}"#;
        let report = BucketImportReport::from_json(body).unwrap();
        assert_eq!(
            report.outcome("z"),
            Some(&BucketOutcome::Failed("bucket not found".to_string()))
        );
    }

    #[test]
    fn test_empty_body_is_empty_report() {
        assert!(BucketImportReport::from_json(b"").unwrap().buckets.is_empty());
        assert!(BucketImportReport::from_json(b"{}").unwrap().is_success());
    }

    #[test]
    fn test_invalid_json_is_error() {
        let err = BucketImportReport::from_json(b"{not json").unwrap_err();
        assert!(matches!(err, BackupError::Serialization(_)));
    }
}
