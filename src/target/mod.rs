//! Storage targets
//!
//! A [`Target`] is everything orchestration needs from a backend: list its
//! buckets, export and import its instance metadata, and make sure a bucket
//! exists. Backends are picked by provider kind through [`resolve_target`].

#[cfg(feature = "minio")]
mod minio;
mod mock;

#[cfg(feature = "minio")]
pub use minio::MinioTarget;
pub use mock::{MockBucket, MockTarget};

use std::fmt;
use std::sync::Arc;
use async_trait::async_trait;
use tracing::info;

use crate::archive::MetadataArchive;
use crate::archiver::ImportReport;
use crate::config::RemoteConfig;
use crate::provision::ProvisionOutcome;
use crate::{BackupError, Result};

/// Capability set of a storage backend
#[async_trait]
pub trait Target: Send + Sync {
    /// Names of every bucket on the backend
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Export instance metadata; backends without an administrative API
    /// return an empty archive
    async fn export_metadata(&self) -> Result<MetadataArchive>;

    /// Apply every entry of `archive`, attempting all of them
    async fn import_metadata(&self, archive: &MetadataArchive) -> Result<ImportReport>;

    /// Create `name` if absent; an existing bucket is left untouched
    async fn ensure_bucket(&self, name: &str, retention_days: i64) -> Result<ProvisionOutcome>;
}

/// Role a target plays in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetRole {
    Source,
    Dest,
}

impl fmt::Display for TargetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRole::Source => f.write_str("source"),
            TargetRole::Dest => f.write_str("dest"),
        }
    }
}

/// Provider kinds with an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Minio,
    Mock,
}

impl ProviderKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "Minio" => Some(ProviderKind::Minio),
            "mock" => Some(ProviderKind::Mock),
            _ => None,
        }
    }
}

/// Build the target described by `remote` for the given role
pub async fn resolve_target(remote: &RemoteConfig, role: TargetRole) -> Result<Arc<dyn Target>> {
    let unsupported = || BackupError::UnsupportedTarget {
        kind: remote.provider.clone(),
        role,
    };

    let kind = ProviderKind::parse(&remote.provider).ok_or_else(unsupported)?;
    info!(role = %role, remote = %remote.name, provider = %remote.provider, "Resolving target");

    match kind {
        #[cfg(feature = "minio")]
        ProviderKind::Minio => Ok(Arc::new(MinioTarget::connect(remote).await?)),
        #[cfg(not(feature = "minio"))]
        ProviderKind::Minio => Err(unsupported()),
        ProviderKind::Mock => Ok(Arc::new(MockTarget::new())),
    }
}
