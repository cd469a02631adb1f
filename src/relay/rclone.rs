//! rclone process runner
//!
//! Every invocation gets its own config file inside the runner's private
//! directory. Children are killed when the future awaiting them is dropped.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use async_trait::async_trait;
use serde::Deserialize;
use tempfile::{NamedTempFile, TempDir};
use tokio::process::Command;
use tracing::{debug, info, instrument};

use super::{RelayConfig, SyncRunner, SyncUnit};
use crate::{BackupError, Result};

/// Runs the rclone binary against a generated config file
pub struct RcloneRunner {
    binary: PathBuf,
    config: RelayConfig,
    /// Holds the per-invocation configs; removed with the runner
    dir: TempDir,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListEntry {
    name: String,
    #[serde(default)]
    is_dir: bool,
    #[serde(default)]
    is_bucket: bool,
}

/// Bucket names from `lsjson` output at the root of a remote
///
/// Buckets behind an encrypting remote show up as directories, so both
/// flags are accepted.
pub fn parse_bucket_listing(json: &[u8]) -> Result<Vec<String>> {
    let entries: Vec<ListEntry> = serde_json::from_slice(json)?;
    Ok(entries
        .into_iter()
        .filter(|e| e.is_bucket || e.is_dir)
        .map(|e| e.name)
        .collect())
}

fn remote_path(remote: &str, path: &str) -> OsString {
    format!("{}:{}", remote, path).into()
}

fn with_config(command: &str, config: &Path, rest: Vec<OsString>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![command.into(), "--config".into(), config.into()];
    args.extend(rest);
    args
}

fn sync_args(config: &Path, unit: &SyncUnit) -> Vec<OsString> {
    with_config(
        "sync",
        config,
        vec![remote_path(&unit.source, &unit.bucket), remote_path(&unit.dest, &unit.bucket)],
    )
}

fn upload_args(config: &Path, file: &Path, remote: &str, name: &str) -> Vec<OsString> {
    with_config("copyto", config, vec![file.into(), remote_path(remote, name)])
}

fn download_args(config: &Path, remote: &str, name: &str, target: &Path) -> Vec<OsString> {
    with_config("copyto", config, vec![remote_path(remote, name), target.into()])
}

fn lsjson_args(config: &Path, remote: &str) -> Vec<OsString> {
    with_config("lsjson", config, vec![remote_path(remote, "")])
}

impl RcloneRunner {
    pub fn new(binary: impl AsRef<Path>, config: RelayConfig) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("s32s3-relay-").tempdir()?;
        debug!(dir = %dir.path().display(), "Created relay config directory");
        Ok(Self {
            binary: binary.as_ref().to_path_buf(),
            config,
            dir,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Directory the per-invocation config files are written to
    pub fn config_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Write the config for one invocation; the file is removed when dropped
    fn write_config(&self, at: Option<&str>) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("rclone-")
            .suffix(".conf")
            .tempfile_in(self.dir.path())?;
        self.config.render(file.as_file_mut(), at)?;
        file.as_file_mut().flush()?;
        Ok(file)
    }

    fn command(&self, args: &[OsString]) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, args: Vec<OsString>) -> std::io::Result<ExitStatus> {
        info!(args = ?args, "Running rclone");
        self.command(&args).stdout(Stdio::inherit()).status().await
    }

    async fn output(&self, args: Vec<OsString>) -> Result<Vec<u8>> {
        info!(args = ?args, "Running rclone");
        let output = self
            .command(&args)
            .stdout(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.spawn_failed(e))?;

        if !output.status.success() {
            return Err(BackupError::Relay(format!("rclone lsjson exited with {}", output.status)));
        }
        Ok(output.stdout)
    }

    fn spawn_failed(&self, e: std::io::Error) -> BackupError {
        BackupError::Relay(self.spawn_reason(e))
    }

    fn spawn_reason(&self, e: std::io::Error) -> String {
        format!("failed to run {}: {}", self.binary.display(), e)
    }
}

#[async_trait]
impl SyncRunner for RcloneRunner {
    #[instrument(skip(self, unit), fields(bucket = %unit.bucket, source = %unit.source, dest = %unit.dest))]
    async fn sync_bucket(&self, unit: &SyncUnit) -> Result<()> {
        let config = self.write_config(unit.at.as_deref())?;
        let status = self
            .run(sync_args(config.path(), unit))
            .await
            .map_err(|e| BackupError::SyncFailed {
                bucket: unit.bucket.clone(),
                reason: self.spawn_reason(e),
            })?;

        if !status.success() {
            return Err(BackupError::SyncFailed {
                bucket: unit.bucket.clone(),
                reason: format!("rclone sync exited with {}", status),
            });
        }
        info!("rclone sync complete");
        Ok(())
    }

    #[instrument(skip(self, path), fields(file = %path.display()))]
    async fn upload_file(&self, path: &Path, remote: &str, name: &str) -> Result<()> {
        let config = self.write_config(None)?;
        let status = self
            .run(upload_args(config.path(), path, remote, name))
            .await
            .map_err(|e| self.spawn_failed(e))?;

        if !status.success() {
            return Err(BackupError::Relay(format!("rclone copyto exited with {}", status)));
        }
        info!("rclone upload complete");
        Ok(())
    }

    #[instrument(skip(self, into_dir))]
    async fn download_file(
        &self,
        remote: &str,
        name: &str,
        into_dir: &Path,
        at: Option<&str>,
    ) -> Result<PathBuf> {
        let config = self.write_config(at)?;
        let target = into_dir.join(name);
        let status = self
            .run(download_args(config.path(), remote, name, &target))
            .await
            .map_err(|e| self.spawn_failed(e))?;

        if !status.success() {
            return Err(BackupError::Relay(format!("rclone copyto exited with {}", status)));
        }
        info!(path = %target.display(), "rclone download complete");
        Ok(target)
    }

    #[instrument(skip(self))]
    async fn list_buckets(&self, remote: &str, at: Option<&str>) -> Result<Vec<String>> {
        let config = self.write_config(at)?;
        let stdout = self.output(lsjson_args(config.path(), remote)).await?;

        let buckets = parse_bucket_listing(&stdout)?;
        debug!(buckets = ?buckets, "rclone lsjson complete");
        Ok(buckets)
    }
}
