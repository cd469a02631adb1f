//! Metadata archive container
//!
//! A gzip-compressed tar holding exactly three opaque blobs exported by a
//! backend's administrative API:
//! - `iam.zip` - identity/access configuration
//! - `buckets.zip` - per-bucket configuration
//! - `config.txt` - service configuration
//!
//! Entries are written in that order; readers accept any order and keep
//! entries with unknown names so newer archives can still be consumed.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tar::{Archive, Builder, Header};

use crate::{BackupError, Result};

/// File name of the archive on the relay and in the run directory
pub const ARCHIVE_FILE_NAME: &str = "metadata.tar.gz";

/// The three logical entries of a metadata archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryKind {
    /// Identity and access configuration
    Iam,
    /// Per-bucket configuration
    Buckets,
    /// Service configuration
    Config,
}

impl EntryKind {
    /// All entries in archive write order
    pub const ALL: [EntryKind; 3] = [EntryKind::Iam, EntryKind::Buckets, EntryKind::Config];

    /// File name of the entry inside the container
    pub fn file_name(self) -> &'static str {
        match self {
            EntryKind::Iam => "iam.zip",
            EntryKind::Buckets => "buckets.zip",
            EntryKind::Config => "config.txt",
        }
    }

    /// Map a container file name back to its entry kind
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.file_name() == name)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryKind::Iam => "iam",
            EntryKind::Buckets => "buckets",
            EntryKind::Config => "config",
        };
        f.write_str(name)
    }
}

/// One named blob in the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Entry kind, or `None` for names this version does not know
    pub fn kind(&self) -> Option<EntryKind> {
        EntryKind::from_file_name(&self.name)
    }
}

/// Ordered container of named binary blobs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataArchive {
    entries: Vec<ArchiveEntry>,
}

impl MetadataArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an archive from the three payloads in write order
    pub fn from_parts(iam: Vec<u8>, buckets: Vec<u8>, config: Vec<u8>) -> Self {
        let mut archive = Self::new();
        archive.push(EntryKind::Iam.file_name(), iam);
        archive.push(EntryKind::Buckets.file_name(), buckets);
        archive.push(EntryKind::Config.file_name(), config);
        archive
    }

    pub fn push(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.entries.push(ArchiveEntry::new(name, data));
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ArchiveEntry> {
        self.entries
    }

    /// Payload of the first entry of the given kind
    pub fn get(&self, kind: EntryKind) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.kind() == Some(kind))
            .map(|e| e.data.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Encode the archive as gzip-compressed tar bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_into(&mut buffer)?;
        Ok(buffer)
    }

    /// Decode an archive from gzip-compressed tar bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read_from(bytes)
    }

    /// Write the archive to `path`, leaving no partial file behind on failure
    pub fn write_to_file(&self, path: &Path) -> Result<PathBuf> {
        let temp_path = path.with_extension("tmp");

        let written = File::create(&temp_path)
            .map_err(BackupError::from)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                self.write_into(&mut writer)?;
                writer.flush()?;
                Ok(())
            });

        match written {
            Ok(()) => {
                fs::rename(&temp_path, path)?;
                Ok(path.to_path_buf())
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    /// Read an archive from a file
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::read_from(BufReader::new(file))
    }

    fn write_into<W: Write>(&self, writer: W) -> Result<()> {
        let encoder = GzEncoder::new(writer, Compression::default());
        let mut builder = Builder::new(encoder);

        for entry in &self.entries {
            let mut header = Header::new_gnu();
            header
                .set_path(&entry.name)
                .map_err(|e| BackupError::Archive(format!("set path '{}': {}", entry.name, e)))?;
            header.set_size(entry.data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_cksum();

            builder
                .append(&header, entry.data.as_slice())
                .map_err(|e| BackupError::Archive(format!("append '{}': {}", entry.name, e)))?;
        }

        let encoder = builder
            .into_inner()
            .map_err(|e| BackupError::Archive(format!("tar finish: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| BackupError::Archive(format!("gzip finish: {}", e)))?;
        Ok(())
    }

    fn read_from<R: Read>(reader: R) -> Result<Self> {
        let mut archive = Archive::new(GzDecoder::new(reader));
        let mut out = Self::new();

        let entries = archive
            .entries()
            .map_err(|e| BackupError::Archive(format!("read entries: {}", e)))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| BackupError::Archive(format!("read entry: {}", e)))?;
            let name = entry
                .path()
                .map_err(|e| BackupError::Archive(format!("entry path: {}", e)))?
                .to_string_lossy()
                .into_owned();

            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| BackupError::Archive(format!("read '{}': {}", name, e)))?;
            out.push(name, data);
        }

        Ok(out)
    }
}
