//! MinIO administrative API client
//!
//! Talks to `/minio/admin/v3` with SigV4-signed requests. The service
//! configuration comes back encrypted for the requesting credentials and is
//! sent back the same way, so it is carried through untouched.

use std::time::Duration;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, Url};
use tracing::{debug, instrument};

use super::sigv4::SigningKey;
use super::{unavailable, AdminApi, BucketImportReport};
use crate::config::{ConfigError, RemoteConfig};
use crate::{BackupError, Result};

const ADMIN_PREFIX: &str = "/minio/admin/v3";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection settings of the admin client
#[derive(Debug, Clone)]
pub struct MinioAdminConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub timeout: Duration,
}

impl From<&RemoteConfig> for MinioAdminConfig {
    fn from(remote: &RemoteConfig) -> Self {
        Self {
            endpoint: remote.endpoint.clone(),
            region: remote.region.clone(),
            access_key_id: remote.access_key_id.clone(),
            secret_access_key: remote.secret_access_key.clone(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Administrative client for one MinIO instance
pub struct MinioAdminClient {
    http: reqwest::Client,
    base: Url,
    host: String,
    key: SigningKey,
}

impl MinioAdminClient {
    pub fn new(config: MinioAdminConfig) -> Result<Self> {
        let base = Url::parse(&config.endpoint).map_err(|_| ConfigError::InvalidValue {
            key: "endpoint".to_string(),
            value: config.endpoint.clone(),
        })?;
        let host = match (base.host_str(), base.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ConfigError::InvalidValue {
                    key: "endpoint".to_string(),
                    value: config.endpoint,
                }
                .into())
            }
        };

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackupError::Admin(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            http,
            base,
            host,
            key: SigningKey {
                access_key: config.access_key_id,
                secret_key: config.secret_access_key,
                region: config.region,
                service: "s3",
            },
        })
    }

    #[instrument(skip(self, body), fields(host = %self.host, bytes = body.len()))]
    async fn call(&self, method: Method, operation: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let path = format!("{}/{}", ADMIN_PREFIX, operation);
        let mut url = self.base.clone();
        url.set_path(&path);

        let signed = self
            .key
            .sign(method.as_str(), &path, "", &self.host, &body, Utc::now());

        let response = self
            .http
            .request(method, url)
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header("Authorization", &signed.authorization)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    unavailable(&self.host, e)
                } else {
                    BackupError::Admin(format!("{}: {}", operation, e))
                }
            })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackupError::Admin(format!("{}: failed to read body: {}", operation, e)))?;

        if !status.is_success() {
            return Err(BackupError::Admin(format!(
                "{} returned {}: {}",
                operation,
                status,
                String::from_utf8_lossy(&bytes).trim()
            )));
        }

        debug!(operation, response_bytes = bytes.len(), "Admin call completed");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl AdminApi for MinioAdminClient {
    async fn export_iam(&self) -> Result<Vec<u8>> {
        self.call(Method::GET, "export-iam", Vec::new()).await
    }

    async fn export_bucket_metadata(&self) -> Result<Vec<u8>> {
        self.call(Method::GET, "export-bucket-metadata", Vec::new()).await
    }

    async fn export_config(&self) -> Result<Vec<u8>> {
        self.call(Method::GET, "get-config", Vec::new()).await
    }

    async fn import_iam(&self, data: &[u8]) -> Result<()> {
        self.call(Method::PUT, "import-iam", data.to_vec()).await?;
        Ok(())
    }

    async fn import_bucket_metadata(&self, data: &[u8]) -> Result<BucketImportReport> {
        let body = self
            .call(Method::PUT, "import-bucket-metadata", data.to_vec())
            .await?;
        BucketImportReport::from_json(&body)
    }

    async fn import_config(&self, data: &[u8]) -> Result<()> {
        self.call(Method::PUT, "set-config", data.to_vec()).await?;
        Ok(())
    }
}
