//! Encrypting relay collaborator
//!
//! Bucket contents never pass through this process: an external sync tool
//! (rclone) moves them between remotes described by a generated config.
//! This module renders that config, runs the tool and reads back its exit
//! status and listings.

mod config;
mod obscure;
mod rclone;

pub use config::RelayConfig;
pub use obscure::{obscure, reveal};
pub use rclone::{parse_bucket_listing, RcloneRunner};

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeZone};

use crate::config::ConfigError;
use crate::Result;

/// Input format of a point-in-time marker
pub const POINT_IN_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One bucket transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncUnit {
    pub bucket: String,
    /// Remote the bucket is read from
    pub source: String,
    /// Remote the bucket is written to
    pub dest: String,
    /// Point-in-time marker for the dest remote
    pub at: Option<String>,
}

impl SyncUnit {
    pub fn new(bucket: impl Into<String>, source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            source: source.into(),
            dest: dest.into(),
            at: None,
        }
    }

    pub fn at(mut self, at: Option<String>) -> Self {
        self.at = at;
        self
    }
}

/// External sync process operations
#[async_trait]
pub trait SyncRunner: Send + Sync {
    /// Sync one bucket from `unit.source` to `unit.dest`
    async fn sync_bucket(&self, unit: &SyncUnit) -> Result<()>;

    /// Copy a local file to `remote:name`
    async fn upload_file(&self, path: &Path, remote: &str, name: &str) -> Result<()>;

    /// Copy `remote:name` into `into_dir`, returning the local path
    async fn download_file(
        &self,
        remote: &str,
        name: &str,
        into_dir: &Path,
        at: Option<&str>,
    ) -> Result<PathBuf>;

    /// Buckets visible at the root of `remote`
    async fn list_buckets(&self, remote: &str, at: Option<&str>) -> Result<Vec<String>>;
}

/// Parse a local `YYYY-MM-DDTHH:MM:SS` timestamp into the RFC 3339 form the relay expects
pub fn parse_point_in_time(raw: &str) -> Result<String> {
    let invalid = || ConfigError::InvalidValue {
        key: "at".to_string(),
        value: raw.to_string(),
    };

    let naive = NaiveDateTime::parse_from_str(raw.trim(), POINT_IN_TIME_FORMAT).map_err(|_| invalid())?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(invalid)?;
    Ok(local.to_rfc3339())
}
