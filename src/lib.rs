//! # s32s3
//!
//! Backup and restore of S3-compatible object-storage instances: bucket
//! contents are routed through an encrypting relay, while instance-level
//! metadata (identity/access, per-bucket settings, service configuration) is
//! carried in a small portable archive.
//!
//! ## Overview
//!
//! A backup run resolves a source and a destination [`target::Target`],
//! provisions the backup-holding bucket on the destination, exports the
//! source's metadata into a [`archive::MetadataArchive`], hands it to the
//! relay, and then syncs every source bucket through the relay one
//! [`relay::SyncUnit`] at a time. A restore run walks the same path backwards.
//!
//! ```no_run
//! use std::sync::Arc;
//! use s32s3::config::BackupConfig;
//! use s32s3::orchestrator::{BackupOrchestrator, RunSettings};
//! use s32s3::relay::{RcloneRunner, RelayConfig};
//! use s32s3::target::{resolve_target, TargetRole};
//!
//! # async fn example() -> s32s3::Result<()> {
//! let config = BackupConfig::from_env()?;
//! let source = resolve_target(&config.source, TargetRole::Source).await?;
//! let dest = resolve_target(&config.dest, TargetRole::Dest).await?;
//! let relay = Arc::new(RcloneRunner::new(&config.rclone_binary, RelayConfig::new(&config)?)?);
//!
//! let report = BackupOrchestrator::new(source, dest, relay, RunSettings::from_config(&config))
//!     .run()
//!     .await?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: environment-driven configuration
//! - [`archive`]: the three-entry metadata archive container
//! - [`admin`]: administrative API seam and the MinIO client
//! - [`archiver`]: metadata export/import with per-entry outcomes
//! - [`provision`]: bucket create/versioning/retention state machine
//! - [`target`]: the storage backend abstraction and its variants
//! - [`relay`]: the external sync collaborator and its configuration
//! - [`orchestrator`]: backup and restore sequencing

#![warn(rustdoc::missing_crate_level_docs)]

use std::time::Duration;
use thiserror::Error;

/// Result type for backup and restore operations
pub type Result<T> = std::result::Result<T, BackupError>;

/// Main error type for backup and restore operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Administrative or listing connection could not be established
    #[error("backend unavailable ({target}): {reason}")]
    BackendUnavailable { target: String, reason: String },

    /// One of the three metadata export calls failed
    #[error("metadata export failed at {stage}: {reason}")]
    ExportFailed {
        stage: archive::EntryKind,
        reason: String,
    },

    /// One or more archive entries failed to import
    #[error("metadata import partially failed: {report}")]
    PartialImportFailure { report: archiver::ImportReport },

    /// Create/versioning/retention step failed for a bucket
    #[error("provisioning bucket {bucket} failed at {stage}: {reason}")]
    BucketProvisionFailed {
        bucket: String,
        stage: provision::ProvisionStage,
        reason: String,
    },

    /// External relay invocation for one bucket returned a non-zero outcome
    #[error("sync of bucket {bucket} failed: {reason}")]
    SyncFailed { bucket: String, reason: String },

    /// Configuration names a provider with no adapter
    #[error("unsupported target kind {kind:?} for {role}")]
    UnsupportedTarget {
        kind: String,
        role: target::TargetRole,
    },

    /// Imported metadata differs from what the target already holds
    #[error("metadata mismatch for entry {entry}")]
    MetadataMismatch { entry: archive::EntryKind },

    /// Configuration error
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// Archive container could not be built or read
    #[error("archive error: {0}")]
    Archive(String),

    /// Relay invocation error that is not tied to a single bucket
    #[error("relay error: {0}")]
    Relay(String),

    /// Administrative or storage API returned an error response
    #[error("admin api error: {0}")]
    Admin(String),

    /// The overall run deadline elapsed
    #[error("run deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Environment-driven configuration
pub mod config;

/// Metadata archive container
pub mod archive;

/// Administrative API of storage backends
pub mod admin;

/// Metadata export and import
pub mod archiver;

/// Bucket provisioning state machine
pub mod provision;

/// Storage targets
pub mod target;

/// Encrypting relay collaborator
pub mod relay;

/// Backup and restore sequencing
pub mod orchestrator;

/// Signal-driven cancellation
pub mod shutdown;
