//! Configuration for backup and restore runs
//!
//! Every setting is read from a flat key/value map (normally the process
//! environment). Keys are declared next to the field they populate; nested
//! sections get an explicit `<PREFIX>_<FIELD>` name rather than being
//! discovered at runtime.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Name of the source remote in relay configuration
pub const SOURCE_NAME: &str = "source";
/// Name of the destination remote in relay configuration
pub const DEST_NAME: &str = "dest";
/// Name of the encrypting remote in relay configuration
pub const CRYPT_NAME: &str = "crypt";
/// Default backup-holding bucket on the destination
pub const DEFAULT_BACKUP_BUCKET: &str = "backups";
/// Default relay executable
pub const DEFAULT_RCLONE_BINARY: &str = "rclone";

/// Upper bound on `SYNC_CONCURRENCY`
pub const MAX_CONCURRENCY: usize = 1024;
const MIN_PASSWORD_LEN: usize = 8;

/// Errors raised while loading configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("invalid configuration: {}", join_problems(.0))]
    Invalid(Vec<FieldProblem>),
}

/// A single validation problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldProblem {
    pub section: &'static str,
    pub field: &'static str,
    pub kind: ProblemKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    Missing,
    Invalid,
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ProblemKind::Missing => "missing",
            ProblemKind::Invalid => "invalid",
        };
        write!(f, "{}: {} {}", self.section, what, self.field)
    }
}

fn join_problems(problems: &[FieldProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Connection settings for one S3-compatible endpoint
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Remote name used by the relay (`source` or `dest`)
    pub name: String,
    /// Provider kind, e.g. `Minio` or `mock`
    pub provider: String,
    pub region: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl RemoteConfig {
    const PROVIDER: &'static str = "PROVIDER";
    const REGION: &'static str = "REGION";
    const ENDPOINT: &'static str = "ENDPOINT";
    const ACCESS_KEY_ID: &'static str = "ACCESS_KEY_ID";
    const SECRET_ACCESS_KEY: &'static str = "SECRET_ACCESS_KEY";

    fn from_env(env: &EnvMap<'_>, prefix: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            provider: env.string(prefix, Self::PROVIDER),
            region: env.string(prefix, Self::REGION),
            endpoint: env.string(prefix, Self::ENDPOINT),
            access_key_id: env.string(prefix, Self::ACCESS_KEY_ID),
            secret_access_key: env.string(prefix, Self::SECRET_ACCESS_KEY),
        }
    }

    fn validate(&self, section: &'static str, problems: &mut Vec<FieldProblem>) {
        let checks = [
            ("provider", self.provider.is_empty()),
            ("region", self.region.is_empty()),
            ("endpoint", self.endpoint.is_empty()),
            ("access key id", self.access_key_id.is_empty()),
            ("secret access key", self.secret_access_key.is_empty()),
        ];
        for (field, missing) in checks {
            if missing {
                problems.push(FieldProblem { section, field, kind: ProblemKind::Missing });
            }
        }
    }
}

/// Settings of the encrypting relay remote
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CryptConfig {
    pub name: String,
    /// Plain-text password, obscured when the relay config is rendered
    pub password: String,
    /// Plain-text salt password
    pub password2: String,
}

impl fmt::Debug for CryptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptConfig")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .field("password2", &"<redacted>")
            .finish()
    }
}

impl CryptConfig {
    const PASSWORD: &'static str = "PASSWORD";
    const PASSWORD2: &'static str = "PASSWORD2";

    fn validate(&self, problems: &mut Vec<FieldProblem>) {
        let section = "crypt";
        if self.password.is_empty() {
            problems.push(FieldProblem { section, field: "password", kind: ProblemKind::Missing });
        } else if self.password.len() < MIN_PASSWORD_LEN {
            problems.push(FieldProblem { section, field: "password", kind: ProblemKind::Invalid });
        }

        if self.password2.is_empty() {
            problems.push(FieldProblem { section, field: "password2", kind: ProblemKind::Missing });
        } else if self.password2 == self.password {
            problems.push(FieldProblem { section, field: "password2", kind: ProblemKind::Invalid });
        }
    }
}

/// Complete configuration of a backup or restore run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub source: RemoteConfig,
    pub dest: RemoteConfig,
    pub crypt: CryptConfig,
    /// Backup-holding bucket on the destination
    pub backup_bucket: String,
    /// Non-current version retention; negative disables lifecycle management
    pub expiration_days: i64,
    /// Upper bound on concurrently running bucket syncs
    pub concurrency: usize,
    /// Deadline for a whole run
    pub run_timeout: Option<Duration>,
    pub rclone_binary: PathBuf,
}

impl BackupConfig {
    const SOURCE: &'static str = "SOURCE";
    const DEST: &'static str = "DEST";
    const CRYPT: &'static str = "CRYPT";
    const BACKUP_BUCKET: &'static str = "BACKUP_BUCKET";
    const EXPIRATION_DAYS: &'static str = "EXPIRATION_DAYS";
    const SYNC_CONCURRENCY: &'static str = "SYNC_CONCURRENCY";
    const RUN_TIMEOUT_SECS: &'static str = "RUN_TIMEOUT_SECS";
    const RCLONE_BINARY: &'static str = "RCLONE_BINARY";

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&vars)
    }

    /// Load configuration from a key/value map
    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let env = EnvMap(vars);

        let config = Self {
            source: RemoteConfig::from_env(&env, Self::SOURCE, SOURCE_NAME),
            dest: RemoteConfig::from_env(&env, Self::DEST, DEST_NAME),
            crypt: CryptConfig {
                name: CRYPT_NAME.to_string(),
                password: env.string(Self::CRYPT, CryptConfig::PASSWORD),
                password2: env.string(Self::CRYPT, CryptConfig::PASSWORD2),
            },
            backup_bucket: env
                .get(Self::BACKUP_BUCKET)
                .unwrap_or(DEFAULT_BACKUP_BUCKET)
                .to_string(),
            expiration_days: env.int(Self::EXPIRATION_DAYS)?.unwrap_or(0),
            concurrency: match env.int(Self::SYNC_CONCURRENCY)? {
                Some(n) if n > 0 && n as u64 <= MAX_CONCURRENCY as u64 => n as usize,
                Some(n) => {
                    return Err(ConfigError::InvalidValue {
                        key: Self::SYNC_CONCURRENCY.to_string(),
                        value: n.to_string(),
                    })
                }
                None => num_cpus::get().min(MAX_CONCURRENCY),
            },
            run_timeout: match env.int(Self::RUN_TIMEOUT_SECS)? {
                Some(secs) if secs > 0 => Some(Duration::from_secs(secs as u64)),
                _ => None,
            },
            rclone_binary: PathBuf::from(
                env.get(Self::RCLONE_BINARY).unwrap_or(DEFAULT_RCLONE_BINARY),
            ),
        };

        config.validate()?;
        debug!(
            backup_bucket = %config.backup_bucket,
            expiration_days = config.expiration_days,
            concurrency = config.concurrency,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Check that every required field is present, reporting all problems at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        self.source.validate("source", &mut problems);
        self.dest.validate("dest", &mut problems);
        self.crypt.validate(&mut problems);
        if self.backup_bucket.is_empty() {
            problems.push(FieldProblem {
                section: "backup",
                field: "bucket",
                kind: ProblemKind::Missing,
            });
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

/// Read-only view over raw key/value pairs with trimming and typed parsing
struct EnvMap<'a>(&'a HashMap<String, String>);

impl EnvMap<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, prefix: &str, field: &str) -> String {
        self.get(&env_key(prefix, field)).unwrap_or_default().to_string()
    }

    fn int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        self.get(key)
            .map(|raw| {
                parse_int(raw).ok_or_else(|| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.to_string(),
                })
            })
            .transpose()
    }
}

/// Build the flat key for a nested field, e.g. `SOURCE` + `REGION` -> `SOURCE_REGION`
pub fn env_key(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_ascii_uppercase()
    } else {
        format!("{}_{}", prefix, field).to_ascii_uppercase()
    }
}

/// Parse an integer in decimal, `0x` hex, `0o` octal or `0b` binary form
fn parse_int(raw: &str) -> Option<i64> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };

    let lower = digits.to_ascii_lowercase();
    let (body, radix) = if let Some(hex) = lower.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        (oct, 8)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (bin, 2)
    } else {
        (lower.as_str(), 10)
    };

    // one sign, and only in front of the radix prefix
    if body.starts_with(['+', '-']) {
        return None;
    }
    let value = i64::from_str_radix(body, radix).ok()?;

    Some(if negative { -value } else { value })
}
