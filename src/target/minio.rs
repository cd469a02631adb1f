//! MinIO target
//!
//! Bucket operations go through the S3 API (path-style, static credentials,
//! custom endpoint); metadata goes through the MinIO administrative API.

use std::fmt;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::types::{
    BucketLifecycleConfiguration, BucketLocationConstraint, BucketVersioningStatus,
    CreateBucketConfiguration, ExpirationStatus, LifecycleRule, LifecycleRuleFilter,
    NoncurrentVersionExpiration, VersioningConfiguration,
};
use aws_sdk_s3::Client;
use aws_types::region::Region;
use tracing::{debug, instrument};

use super::Target;
use crate::admin::{MinioAdminClient, MinioAdminConfig};
use crate::archive::MetadataArchive;
use crate::archiver::{ImportReport, MetadataArchiver};
use crate::config::RemoteConfig;
use crate::provision::{BucketApi, BucketProvisioner, ProvisionOutcome};
use crate::{BackupError, Result};

const CREDENTIALS_PROVIDER: &str = "s32s3";
const LIFECYCLE_RULE_ID: &str = "noncurrent-version-expiration";
const DEFAULT_REGION: &str = "us-east-1";

/// Target backed by a MinIO instance
pub struct MinioTarget {
    name: String,
    region: String,
    client: Client,
    admin: MinioAdminClient,
}

impl MinioTarget {
    /// Build S3 and administrative clients for `remote`
    pub async fn connect(remote: &RemoteConfig) -> Result<Self> {
        let admin = MinioAdminClient::new(MinioAdminConfig::from(remote))?;

        let credentials = Credentials::new(
            remote.access_key_id.clone(),
            remote.secret_access_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(remote.region.clone()))
            .endpoint_url(&remote.endpoint)
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        Ok(Self {
            name: remote.name.clone(),
            region: remote.region.clone(),
            client: Client::from_conf(s3_config),
            admin,
        })
    }

    fn sdk_error<E, R>(&self, operation: &str, err: SdkError<E, R>) -> BackupError
    where
        E: std::error::Error + Send + Sync + 'static,
        R: fmt::Debug,
    {
        let reason = DisplayErrorContext(&err).to_string();
        match err {
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
                BackupError::BackendUnavailable {
                    target: self.name.clone(),
                    reason,
                }
            }
            _ => BackupError::Admin(format!("{}: {}", operation, reason)),
        }
    }
}

#[async_trait]
impl BucketApi for MinioTarget {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) => {
                Ok(false)
            }
            Err(e) => Err(self.sdk_error("head bucket", e)),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);

        if !self.region.is_empty() && self.region != DEFAULT_REGION {
            let location = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build();
            request = request.create_bucket_configuration(location);
        }

        request
            .send()
            .await
            .map_err(|e| self.sdk_error("create bucket", e))?;
        Ok(())
    }

    async fn enable_versioning(&self, bucket: &str) -> Result<()> {
        let versioning = VersioningConfiguration::builder()
            .status(BucketVersioningStatus::Enabled)
            .build();

        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(versioning)
            .send()
            .await
            .map_err(|e| self.sdk_error("put bucket versioning", e))?;
        Ok(())
    }

    async fn set_noncurrent_expiration(&self, bucket: &str, days: u32) -> Result<()> {
        let expiration = NoncurrentVersionExpiration::builder()
            .noncurrent_days(i32::try_from(days).unwrap_or(i32::MAX))
            .build();

        let rule = LifecycleRule::builder()
            .id(LIFECYCLE_RULE_ID)
            .status(ExpirationStatus::Enabled)
            .filter(LifecycleRuleFilter::builder().prefix("").build())
            .noncurrent_version_expiration(expiration)
            .build()
            .map_err(|e| BackupError::Admin(format!("build lifecycle rule: {}", e)))?;

        let lifecycle = BucketLifecycleConfiguration::builder()
            .rules(rule)
            .build()
            .map_err(|e| BackupError::Admin(format!("build lifecycle configuration: {}", e)))?;

        self.client
            .put_bucket_lifecycle_configuration()
            .bucket(bucket)
            .lifecycle_configuration(lifecycle)
            .send()
            .await
            .map_err(|e| self.sdk_error("put bucket lifecycle", e))?;
        Ok(())
    }
}

#[async_trait]
impl Target for MinioTarget {
    #[instrument(skip(self), fields(target = %self.name))]
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| self.sdk_error("list buckets", e))?;

        let names: Vec<String> = output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect();
        debug!(count = names.len(), "Listed buckets");
        Ok(names)
    }

    #[instrument(skip(self), fields(target = %self.name))]
    async fn export_metadata(&self) -> Result<MetadataArchive> {
        MetadataArchiver::new(&self.admin).export().await
    }

    #[instrument(skip(self, archive), fields(target = %self.name))]
    async fn import_metadata(&self, archive: &MetadataArchive) -> Result<ImportReport> {
        MetadataArchiver::new(&self.admin).import(archive).await
    }

    async fn ensure_bucket(&self, name: &str, retention_days: i64) -> Result<ProvisionOutcome> {
        BucketProvisioner::new(self).provision(name, retention_days).await
    }
}
