//! # Plugin Manifest
//!
//! Extracts the display name of a plugin from its archive. Server plugins are
//! shipped as jar (zip) files carrying a `plugin.yml` manifest at the archive
//! root; the `name` field of that manifest is what server commands such as
//! `plugman reload <name>` expect.
//!
//! Absence is not an error: an archive without a manifest, or a manifest
//! without a string `name`, yields `Ok(None)`. Errors are reserved for files
//! that cannot be opened or are not readable archives/manifests at all.

pub mod zip;

use std::path::{Path, PathBuf};
use tracing::debug;

pub use zip::{ZipArchive, ZipEntry};

/// Name of the manifest entry inside plugin archives.
pub const DEFAULT_MANIFEST_ENTRY: &str = "plugin.yml";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to open archive {0}: {1}")]
    Open(PathBuf, std::io::Error),
    #[error("Corrupt archive: {0}")]
    Corrupt(String),
    #[error("Unsupported archive feature: {0}")]
    Unsupported(String),
    #[error("Entry {name} is larger than {limit} bytes")]
    TooLarge { name: String, limit: u64 },
    #[error("Invalid manifest: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Inspects an uploaded archive for plugin metadata.
pub trait MetadataExtractor: Send + Sync {
    /// Returns the plugin's declared name, or `None` when there is none.
    fn plugin_name(&self, archive: &Path) -> Result<Option<String>, ManifestError>;
}

/// Reads the `name` field of a YAML manifest stored inside a zip archive.
#[derive(Debug, Clone)]
pub struct JarManifestReader {
    manifest_entry: String,
}

impl JarManifestReader {
    pub fn new(manifest_entry: impl Into<String>) -> Self {
        Self {
            manifest_entry: manifest_entry.into(),
        }
    }

    pub fn manifest_entry(&self) -> &str {
        &self.manifest_entry
    }
}

impl Default for JarManifestReader {
    fn default() -> Self {
        Self::new(DEFAULT_MANIFEST_ENTRY)
    }
}

impl MetadataExtractor for JarManifestReader {
    fn plugin_name(&self, archive: &Path) -> Result<Option<String>, ManifestError> {
        let data = std::fs::read(archive).map_err(|e| ManifestError::Open(archive.to_path_buf(), e))?;
        let zip = ZipArchive::new(data)?;

        let Some(entry) = zip.find(&self.manifest_entry) else {
            debug!("{} has no {}", archive.display(), self.manifest_entry);
            return Ok(None);
        };

        let manifest = zip.read(entry)?;
        name_from_manifest(&manifest)
    }
}

/// Pulls a string `name` out of a flat YAML document.
pub fn name_from_manifest(manifest: &[u8]) -> Result<Option<String>, ManifestError> {
    let document: serde_yaml::Value = serde_yaml::from_slice(manifest)?;
    Ok(document
        .get("name")
        .and_then(serde_yaml::Value::as_str)
        .map(str::to_string))
}
