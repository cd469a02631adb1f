//! Bucket provisioning state machine
//!
//! `Absent -> Creating -> VersioningPending -> RetentionPending -> Ready`
//!
//! A bucket that already exists goes straight to `Ready` and is left exactly
//! as found. A negative retention value stops the machine right after the
//! bucket is created. Any failing step ends in `Failed { stage }`.

use std::fmt;
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::{BackupError, Result};

/// Retention applied when the caller passes zero
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Bucket operations the provisioner drives
#[async_trait]
pub trait BucketApi: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    async fn enable_versioning(&self, bucket: &str) -> Result<()>;

    /// Install a single lifecycle rule expiring non-current versions after `days`
    async fn set_noncurrent_expiration(&self, bucket: &str, days: u32) -> Result<()>;
}

/// Lifecycle management requested for a new bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// No versioning, no lifecycle rule
    Disabled,
    /// Versioning plus expiration of non-current versions after N days
    NoncurrentDays(u32),
}

impl Retention {
    /// Interpret a caller-supplied day count: negative disables, zero means default
    pub fn from_days(days: i64) -> Self {
        match days {
            d if d < 0 => Retention::Disabled,
            0 => Retention::NoncurrentDays(DEFAULT_RETENTION_DAYS),
            d => Retention::NoncurrentDays(d.min(i32::MAX as i64) as u32),
        }
    }

    pub fn days(self) -> Option<u32> {
        match self {
            Retention::Disabled => None,
            Retention::NoncurrentDays(days) => Some(days),
        }
    }
}

/// Step at which provisioning can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStage {
    ExistenceCheck,
    Create,
    Versioning,
    Retention,
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisionStage::ExistenceCheck => "existence check",
            ProvisionStage::Create => "create",
            ProvisionStage::Versioning => "versioning",
            ProvisionStage::Retention => "retention",
        };
        f.write_str(name)
    }
}

/// States of the provisioning machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Absent,
    Creating,
    VersioningPending,
    RetentionPending,
    Ready,
    Failed { stage: ProvisionStage },
}

/// What a provisioning call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub bucket: String,
    /// False when the bucket already existed
    pub created: bool,
    /// Non-current expiration installed by this call
    pub retention_days: Option<u32>,
    /// Every state visited, starting at `Absent`
    pub trail: Vec<ProvisionState>,
}

impl ProvisionOutcome {
    pub fn state(&self) -> ProvisionState {
        self.trail.last().copied().unwrap_or(ProvisionState::Absent)
    }
}

/// Drives the provisioning machine for single buckets
pub struct BucketProvisioner<'a, B: BucketApi + ?Sized> {
    api: &'a B,
}

impl<'a, B: BucketApi + ?Sized> BucketProvisioner<'a, B> {
    pub fn new(api: &'a B) -> Self {
        Self { api }
    }

    /// Ensure `bucket` exists, creating and configuring it when absent
    #[instrument(skip(self))]
    pub async fn provision(&self, bucket: &str, retention_days: i64) -> Result<ProvisionOutcome> {
        let mut run = Run::new(bucket);

        info!(bucket, "Checking if bucket exists");
        let exists = run.step(ProvisionStage::ExistenceCheck, self.api.bucket_exists(bucket).await)?;
        if exists {
            info!(bucket, "Found bucket");
            return Ok(run.finish(false, None));
        }

        run.advance(ProvisionState::Creating);
        info!(bucket, "Creating bucket");
        run.step(ProvisionStage::Create, self.api.create_bucket(bucket).await)?;

        let Retention::NoncurrentDays(days) = Retention::from_days(retention_days) else {
            info!(bucket, "Lifecycle management disabled");
            return Ok(run.finish(true, None));
        };

        run.advance(ProvisionState::VersioningPending);
        info!(bucket, "Enabling versioning");
        run.step(ProvisionStage::Versioning, self.api.enable_versioning(bucket).await)?;

        run.advance(ProvisionState::RetentionPending);
        info!(bucket, noncurrent_days = days, "Setting lifecycle");
        run.step(
            ProvisionStage::Retention,
            self.api.set_noncurrent_expiration(bucket, days).await,
        )?;

        Ok(run.finish(true, Some(days)))
    }
}

struct Run<'b> {
    bucket: &'b str,
    trail: Vec<ProvisionState>,
}

impl<'b> Run<'b> {
    fn new(bucket: &'b str) -> Self {
        Self {
            bucket,
            trail: vec![ProvisionState::Absent],
        }
    }

    fn advance(&mut self, state: ProvisionState) {
        self.trail.push(state);
    }

    fn step<T>(&mut self, stage: ProvisionStage, result: Result<T>) -> Result<T> {
        result.map_err(|e| {
            self.advance(ProvisionState::Failed { stage });
            BackupError::BucketProvisionFailed {
                bucket: self.bucket.to_string(),
                stage,
                reason: e.to_string(),
            }
        })
    }

    fn finish(mut self, created: bool, retention_days: Option<u32>) -> ProvisionOutcome {
        self.advance(ProvisionState::Ready);
        ProvisionOutcome {
            bucket: self.bucket.to_string(),
            created,
            retention_days,
            trail: self.trail,
        }
    }
}
