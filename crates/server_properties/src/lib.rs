//! # Server Properties
//!
//! Persistence for the flat `key=value` settings file a game server reads at
//! startup (`server.properties`).
//!
//! The format is deliberately simple:
//!
//! * one `key=value` pair per line, split on the first `=`
//! * keys and values are trimmed
//! * blank lines and lines starting with `#` are ignored
//!
//! Writing re-emits every pair as `key=value`. Comments and the original key
//! order are not preserved, so a read/write round trip is lossy with respect
//! to layout but never with respect to the settings themselves.
//!
//! On disk the file is ISO-8859-1, like Java properties files: every byte is
//! one character, so any byte sequence loads and is written back unchanged.
//! Characters above U+00FF are stored as `\uXXXX` escapes.
//!
//! The [`ConfigStore`] trait is the seam the deployment server depends on;
//! [`PropertiesFile`] is the file-backed implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Errors raised while loading or storing a properties file.
#[derive(Debug, thiserror::Error)]
pub enum PropertiesError {
    /// The file exists but could not be read
    #[error("Failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    /// The file could not be created or written
    #[error("Failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
}

/// An in-memory view of a properties file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the textual `key=value` format.
    ///
    /// Lines without an `=` are skipped rather than rejected, matching how
    /// game servers themselves treat malformed lines.
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for line in text.lines() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                entries.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { entries }
    }

    /// Decodes the on-disk ISO-8859-1 form, resolving `\uXXXX` escapes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let text: String = bytes.iter().map(|&b| char::from(b)).collect();
        Self::parse(&unescape_unicode(&text))
    }

    /// Encodes [`render`](Self::render) as ISO-8859-1.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for c in self.render().chars() {
            match u8::try_from(u32::from(c)) {
                Ok(byte) => out.push(byte),
                Err(_) => {
                    let mut units = [0u16; 2];
                    for unit in c.encode_utf16(&mut units) {
                        out.extend_from_slice(format!("\\u{unit:04X}").as_bytes());
                    }
                }
            }
        }
        out
    }

    /// Renders every pair as `key=value\n`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Inserts or overwrites a setting, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Replaces `\uXXXX` escapes with the characters they encode. Malformed
/// escapes and unpaired surrogates are kept as written.
fn unescape_unicode(text: &str) -> String {
    let mut units: Vec<u16> = Vec::new();
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(at) = rest.find("\\u") {
        let hex = rest.get(at + 2..at + 6).filter(|h| h.chars().all(|c| c.is_ascii_hexdigit()));
        let Some(unit) = hex.and_then(|h| u16::from_str_radix(h, 16).ok()) else {
            flush_units(&mut units, &mut out);
            out.push_str(&rest[..at + 2]);
            rest = &rest[at + 2..];
            continue;
        };
        if at > 0 {
            flush_units(&mut units, &mut out);
            out.push_str(&rest[..at]);
        }
        units.push(unit);
        rest = &rest[at + 6..];
    }
    flush_units(&mut units, &mut out);
    out.push_str(rest);
    out
}

fn flush_units(units: &mut Vec<u16>, out: &mut String) {
    for decoded in char::decode_utf16(units.drain(..)) {
        match decoded {
            Ok(c) => out.push(c),
            Err(e) => out.push_str(&format!("\\u{:04X}", e.unpaired_surrogate())),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Persisted key-value settings.
///
/// `load` followed by `store` is a full read-then-rewrite; implementations do
/// not patch individual keys in place.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Reads the whole mapping. A store that does not exist yet reads as empty.
    async fn load(&self) -> Result<Properties, PropertiesError>;

    /// Replaces the persisted mapping with `properties`.
    async fn store(&self, properties: &Properties) -> Result<(), PropertiesError>;
}

/// A [`ConfigStore`] backed by a file on disk.
#[derive(Debug, Clone)]
pub struct PropertiesFile {
    path: PathBuf,
}

impl PropertiesFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for PropertiesFile {
    async fn load(&self) -> Result<Properties, PropertiesError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let properties = Properties::from_bytes(&bytes);
                debug!("Loaded {} setting(s) from {}", properties.len(), self.path.display());
                Ok(properties)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} does not exist yet, starting empty", self.path.display());
                Ok(Properties::new())
            }
            Err(e) => Err(PropertiesError::Read(self.path.clone(), e)),
        }
    }

    async fn store(&self, properties: &Properties) -> Result<(), PropertiesError> {
        tokio::fs::write(&self.path, properties.to_bytes())
            .await
            .map_err(|e| PropertiesError::Write(self.path.clone(), e))?;
        debug!("Wrote {} setting(s) to {}", properties.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let text = "#Minecraft server properties\n\nmotd=A Minecraft Server\n  \nserver-port = 25565\n";
        let props = Properties::parse(text);

        assert_eq!(props.len(), 2);
        assert_eq!(props.get("motd"), Some("A Minecraft Server"));
        assert_eq!(props.get("server-port"), Some("25565"));
    }

    #[test]
    fn test_parse_splits_on_first_equals() {
        let props = Properties::parse("rcon.password=abc=def\nno-separator-here\n");
        assert_eq!(props.get("rcon.password"), Some("abc=def"));
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn test_parse_keeps_empty_values() {
        let props = Properties::parse("level-seed=\n");
        assert_eq!(props.get("level-seed"), Some(""));
    }

    #[tokio::test]
    async fn test_round_trip_preserves_keys_and_values() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = PropertiesFile::new(dir.path().join("server.properties"));

        let original: Properties = [
            ("enable-rcon", "true"),
            ("rcon.port", "25575"),
            ("motd", "hello = world"),
            ("level-seed", ""),
        ]
        .into_iter()
        .collect();

        store.store(&original).await.expect("Failed to store properties");
        let reloaded = store.load().await.expect("Failed to load properties");

        assert_eq!(reloaded, original);
    }

    #[tokio::test]
    async fn test_latin1_bytes_survive_rewrite() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("server.properties");
        tokio::fs::write(&path, b"motd=Caf\xe9 server\n").await.unwrap();

        let store = PropertiesFile::new(&path);
        let mut props = store.load().await.expect("Non-UTF-8 file should load");
        assert_eq!(props.get("motd"), Some("Caf\u{e9} server"));

        props.set("enable-rcon", "true");
        store.store(&props).await.unwrap();

        let bytes = tokio::fs::read(&path).await.unwrap();
        let reloaded = Properties::from_bytes(&bytes);
        assert_eq!(reloaded.get("motd"), Some("Caf\u{e9} server"));
        let motd: &[u8] = b"Caf\xe9";
        assert!(bytes.windows(motd.len()).any(|w| w == motd));
    }

    #[test]
    fn test_wide_characters_are_escaped() {
        let props: Properties = [("motd", "\u{2603} \u{1F600}")].into_iter().collect();
        let bytes = props.to_bytes();

        assert_eq!(bytes, b"motd=\\u2603 \\uD83D\\uDE00\n".to_vec());
        assert_eq!(Properties::from_bytes(&bytes), props);
    }

    #[test]
    fn test_malformed_escapes_are_kept() {
        let props = Properties::from_bytes(b"a=C:\\users\\u12\nb=\\uD800x\n");
        assert_eq!(props.get("a"), Some("C:\\users\\u12"));
        assert_eq!(props.get("b"), Some("\\uD800x"));
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = PropertiesFile::new(dir.path().join("absent.properties"));

        let props = store.load().await.expect("Missing file should read as empty");
        assert!(props.is_empty());
    }

    #[tokio::test]
    async fn test_store_into_missing_directory_fails() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = PropertiesFile::new(dir.path().join("no/such/dir/server.properties"));

        let result = store.store(&Properties::new()).await;
        assert!(matches!(result, Err(PropertiesError::Write(_, _))));
    }

    #[tokio::test]
    async fn test_comments_are_dropped_on_rewrite() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("server.properties");
        tokio::fs::write(&path, "# comment\nmotd=hi\n").await.unwrap();

        let store = PropertiesFile::new(&path);
        let props = store.load().await.unwrap();
        store.store(&props).await.unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(text, "motd=hi\n");
    }
}
