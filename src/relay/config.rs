//! Relay configuration rendering
//!
//! One INI section per remote, in the order source, dest, crypt. Each section
//! starts with `type`; fields with empty values are left out.

use std::io::{self, Write};

use super::obscure::obscure;
use crate::config::{BackupConfig, RemoteConfig};
use crate::Result;

const S3_TYPE: &str = "s3";
const CRYPT_TYPE: &str = "crypt";

/// Rendered-once view of the relay configuration for a run
///
/// Passwords are obscured when this is built, so every rendering within a
/// run produces identical output.
#[derive(Clone)]
pub struct RelayConfig {
    source: RemoteConfig,
    dest: RemoteConfig,
    crypt_name: String,
    backup_bucket: String,
    expiration_days: i64,
    password: String,
    password2: String,
}

struct Section<'a> {
    name: &'a str,
    kind: &'static str,
    fields: Vec<(&'static str, &'a str)>,
}

impl Section<'_> {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "[{}]", self.name)?;
        writeln!(w, "  type = {}", self.kind)?;
        for (key, value) in &self.fields {
            if !value.is_empty() {
                writeln!(w, "  {} = {}", key, value)?;
            }
        }
        writeln!(w)
    }
}

impl RelayConfig {
    pub fn new(config: &BackupConfig) -> Result<Self> {
        Ok(Self {
            source: config.source.clone(),
            dest: config.dest.clone(),
            crypt_name: config.crypt.name.clone(),
            backup_bucket: config.backup_bucket.clone(),
            expiration_days: config.expiration_days,
            password: obscure(&config.crypt.password)?,
            password2: obscure(&config.crypt.password2)?,
        })
    }

    pub fn source_name(&self) -> &str {
        &self.source.name
    }

    pub fn dest_name(&self) -> &str {
        &self.dest.name
    }

    /// Name of the encrypting remote
    pub fn crypt_name(&self) -> &str {
        &self.crypt_name
    }

    /// Write the configuration; `at` pins the dest remote to a point in time
    pub fn render<W: Write>(&self, w: &mut W, at: Option<&str>) -> io::Result<()> {
        writeln!(w, "# backup_bucket = {}", self.backup_bucket)?;
        writeln!(w, "# expiration_days = {}", self.expiration_days)?;

        s3_section(&self.source, None).write_to(w)?;
        s3_section(&self.dest, at).write_to(w)?;

        let remote = format!("{}:{}", self.dest.name, self.backup_bucket);
        Section {
            name: &self.crypt_name,
            kind: CRYPT_TYPE,
            fields: vec![
                ("remote", remote.as_str()),
                ("filename_encryption", "standard"),
                ("directory_name_encryption", "true"),
                ("password", self.password.as_str()),
                ("password2", self.password2.as_str()),
                ("filename_encoding", "base32"),
                ("suffix", ".bin"),
            ],
        }
        .write_to(w)
    }

    pub fn to_string_at(&self, at: Option<&str>) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.render(&mut buf, at);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

fn s3_section<'a>(remote: &'a RemoteConfig, at: Option<&'a str>) -> Section<'a> {
    Section {
        name: &remote.name,
        kind: S3_TYPE,
        fields: vec![
            ("provider", remote.provider.as_str()),
            ("access_key_id", remote.access_key_id.as_str()),
            ("secret_access_key", remote.secret_access_key.as_str()),
            ("region", remote.region.as_str()),
            ("endpoint", remote.endpoint.as_str()),
            ("version_at", at.unwrap_or_default()),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::reveal;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config() -> BackupConfig {
        let vars: HashMap<String, String> = [
            ("SOURCE_PROVIDER", "Minio"),
            ("SOURCE_REGION", "us-east-1"),
            ("SOURCE_ENDPOINT", "http://source:9000"),
            ("SOURCE_ACCESS_KEY_ID", "src"),
            ("SOURCE_SECRET_ACCESS_KEY", "srcsecret"),
            ("DEST_PROVIDER", "Minio"),
            ("DEST_REGION", "eu-west-1"),
            ("DEST_ENDPOINT", "http://dest:9000"),
            ("DEST_ACCESS_KEY_ID", "dst"),
            ("DEST_SECRET_ACCESS_KEY", "dstsecret"),
            ("CRYPT_PASSWORD", "password-one"),
            ("CRYPT_PASSWORD2", "password-two"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        BackupConfig::from_env_map(&vars).unwrap()
    }

    #[test]
    fn test_render_sections() {
        let relay = RelayConfig::new(&config()).unwrap();
        let rendered = relay.to_string_at(None);

        let expected = format!(
            "# backup_bucket = backups\n\
             # expiration_days = 0\n\
             [source]\n  type = s3\n  provider = Minio\n  access_key_id = src\n  secret_access_key = srcsecret\n  region = us-east-1\n  endpoint = http://source:9000\n\n\
             [dest]\n  type = s3\n  provider = Minio\n  access_key_id = dst\n  secret_access_key = dstsecret\n  region = eu-west-1\n  endpoint = http://dest:9000\n\n\
             [crypt]\n  type = crypt\n  remote = dest:backups\n  filename_encryption = standard\n  directory_name_encryption = true\n  password = {}\n  password2 = {}\n  filename_encoding = base32\n  suffix = .bin\n\n",
            relay.password, relay.password2
        );
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_render_is_stable_within_a_run() {
        let relay = RelayConfig::new(&config()).unwrap();
        assert_eq!(relay.to_string_at(None), relay.to_string_at(None));
        assert_eq!(reveal(&relay.password).unwrap(), "password-one");
        assert_eq!(reveal(&relay.password2).unwrap(), "password-two");
    }

    #[test]
    fn test_version_at_only_on_dest() {
        let relay = RelayConfig::new(&config()).unwrap();
        let rendered = relay.to_string_at(Some("2024-05-01T12:00:00+02:00"));

        assert_eq!(rendered.matches("version_at").count(), 1);
        let dest = rendered.split("[dest]").nth(1).unwrap();
        let dest = dest.split("[crypt]").next().unwrap();
        assert!(dest.contains("  version_at = 2024-05-01T12:00:00+02:00\n"));
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let mut cfg = config();
        cfg.source.region.clear();
        let relay = RelayConfig::new(&cfg).unwrap();
        let rendered = relay.to_string_at(None);

        let source = rendered.split("[dest]").next().unwrap();
        assert!(!source.contains("region"));
        assert!(source.contains("  type = s3\n"));
    }
}
