use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::index::DEFAULT_INDEXING_THRESHOLD;

/// How a database file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OpenMode {
    /// Read only; the file must exist
    #[serde(rename = "r")]
    Read,
    /// Create, discarding any existing contents
    #[serde(rename = "w")]
    Write,
    /// Create; fails if the file exists
    #[serde(rename = "x")]
    Create,
    /// Read and write, creating the file if needed
    #[default]
    #[serde(rename = "+")]
    ReadWrite,
}

impl OpenMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenMode::Read => "r",
            OpenMode::Write => "w",
            OpenMode::Create => "x",
            OpenMode::ReadWrite => "+",
        }
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

impl FromStr for OpenMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "r" | "read" => Ok(OpenMode::Read),
            "w" | "write" => Ok(OpenMode::Write),
            "x" | "create" => Ok(OpenMode::Create),
            "+" | "rw" | "readwrite" => Ok(OpenMode::ReadWrite),
            _ => Err(crate::Error::Mode(format!("Unknown open mode: {}", s))),
        }
    }
}

impl std::fmt::Display for OpenMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runtime options of a database handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub mode: OpenMode,
    /// Reuse ids freed by deletions before growing the id space
    pub compact_ids: bool,
    /// Arrays larger than this are indexed analytically when no fancy index is involved
    pub indexing_threshold: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mode: OpenMode::ReadWrite,
            compact_ids: true,
            indexing_threshold: DEFAULT_INDEXING_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RelstoreConfig {
    pub database: Option<String>,
    pub mode: Option<OpenMode>,
    pub compact_ids: Option<bool>,
    pub indexing_threshold: Option<usize>,
}

impl RelstoreConfig {
    /// Options with unset fields taken from the defaults
    pub fn options(&self) -> Options {
        let defaults = Options::default();
        Options {
            mode: self.mode.unwrap_or(defaults.mode),
            compact_ids: self.compact_ids.unwrap_or(defaults.compact_ids),
            indexing_threshold: self.indexing_threshold.unwrap_or(defaults.indexing_threshold),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("relstore.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("relstore.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<RelstoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: RelstoreConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &RelstoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_mode_parse() {
        for mode in [OpenMode::Read, OpenMode::Write, OpenMode::Create, OpenMode::ReadWrite] {
            let parsed: OpenMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
        }
        assert!("q".parse::<OpenMode>().is_err());
        assert!(!OpenMode::Read.is_writable());
    }

    #[test]
    fn test_options_defaults() {
        let options = RelstoreConfig::default().options();
        assert_eq!(options, Options::default());
        assert!(options.compact_ids);
        assert_eq!(options.indexing_threshold, 1000);
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relstore.toml");
        let config = RelstoreConfig {
            database: Some("data/store.db".to_string()),
            mode: Some(OpenMode::Read),
            compact_ids: Some(false),
            indexing_threshold: Some(64),
        };

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.options().indexing_threshold, 64);
        assert_eq!(loaded.database_path(), PathBuf::from("data/store.db"));
    }

    #[test]
    fn test_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_ensure_db_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("store.db");
        ensure_db_dir(&db).unwrap();
        assert!(db.parent().unwrap().exists());
    }
}
