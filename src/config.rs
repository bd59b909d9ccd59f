//! Database settings and the configuration collaborator they are read from.
//!
//! The store never reads files or the environment on its own. Callers hand
//! it a [`ConfigSource`] (any sectioned key/value lookup) or a ready-made
//! [`DbSettings`].

use crate::error::{Result, StoreError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Section holding every database key.
pub const DB_SECTION: &str = "db";

/// Sectioned key/value lookup, e.g. an INI or TOML document.
pub trait ConfigSource {
    fn get(&self, section: &str, key: &str) -> Option<String>;
}

impl ConfigSource for toml::Table {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        let value = self.get(section)?.as_table()?.get(key)?;
        Some(match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

impl ConfigSource for HashMap<(String, String), String> {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.get(&(section.to_string(), key.to_string())).cloned()
    }
}

/// Backend selected by the `db_driver` key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    /// Path-based SQLite database file
    Sqlite,
    /// Shared-cache in-memory SQLite database
    Memory,
    /// Recognized, but no implementation exists
    MySql,
}

impl Driver {
    pub fn parse(token: &str) -> Result<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Driver::Sqlite),
            "memory" => Ok(Driver::Memory),
            "mysql" => Ok(Driver::MySql),
            other => Err(StoreError::UnsupportedBackend {
                driver: other.to_string(),
                reason: "only sqlite and memory are supported".to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Sqlite => "sqlite",
            Driver::Memory => "memory",
            Driver::MySql => "mysql",
        }
    }
}

/// Everything needed to open the store's connection.
#[derive(Debug, Clone, PartialEq)]
pub struct DbSettings {
    pub driver: Driver,
    /// Database file for [`Driver::Sqlite`]; relative paths are resolved
    /// against the working directory at connect time
    pub path: Option<PathBuf>,
    /// Name of the shared in-memory database for [`Driver::Memory`]
    pub memory_name: Option<String>,
    /// Require every insert to report exactly one affected row
    pub verify_inserts: bool,
}

impl DbSettings {
    /// File-backed settings
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            driver: Driver::Sqlite,
            path: Some(path.into()),
            memory_name: None,
            verify_inserts: false,
        }
    }

    /// Named shared in-memory settings
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            driver: Driver::Memory,
            path: None,
            memory_name: Some(name.into()),
            verify_inserts: false,
        }
    }

    pub fn with_verify_inserts(mut self, verify: bool) -> Self {
        self.verify_inserts = verify;
        self
    }

    /// Read the `[db]` section of a configuration collaborator.
    pub fn from_source<S: ConfigSource + ?Sized>(source: &S) -> Result<Self> {
        let driver = source.get(DB_SECTION, "db_driver").ok_or_else(|| {
            StoreError::ConfigurationMissing(format!("[{}] db_driver is not set", DB_SECTION))
        })?;
        let driver = Driver::parse(&driver)?;

        let path = source.get(DB_SECTION, "db_path").map(PathBuf::from);
        if driver == Driver::Sqlite && path.is_none() {
            return Err(StoreError::ConfigurationMissing(format!(
                "[{}] db_path is required for the sqlite driver",
                DB_SECTION
            )));
        }

        let verify_inserts = match source.get(DB_SECTION, "verify_inserts") {
            Some(raw) => raw.trim().parse::<bool>().map_err(|_| {
                StoreError::Validation(format!("verify_inserts must be a boolean, got '{}'", raw))
            })?,
            None => false,
        };

        Ok(Self {
            driver,
            path,
            memory_name: source.get(DB_SECTION, "db_name"),
            verify_inserts,
        })
    }

    /// Parse a TOML document containing a `[db]` table.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: toml::Table = content
            .parse()
            .map_err(|e: toml::de::Error| StoreError::Parse(e.to_string()))?;
        Self::from_source(&table)
    }

    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            StoreError::ConfigurationMissing(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Absolute database path for the file driver
    pub fn resolved_path(&self) -> Result<PathBuf> {
        let path = self.path.as_ref().ok_or_else(|| {
            StoreError::ConfigurationMissing("db_path is not set".to_string())
        })?;
        std::path::absolute(path).map_err(|e| {
            StoreError::Connect(format!("cannot resolve {}: {}", path.display(), e))
        })
    }

    /// SQLite URI of the shared in-memory database
    pub fn memory_uri(&self) -> String {
        match &self.memory_name {
            Some(name) => format!("file:{}?mode=memory&cache=shared", name),
            None => "file::memory:?cache=shared".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(pairs: &[(&str, &str)]) -> HashMap<(String, String), String> {
        pairs
            .iter()
            .map(|(k, v)| ((DB_SECTION.to_string(), k.to_string()), v.to_string()))
            .collect()
    }

    #[test]
    fn test_sqlite_from_source() {
        let settings =
            DbSettings::from_source(&source(&[("db_driver", "sqlite"), ("db_path", "app.db")]))
                .unwrap();
        assert_eq!(settings.driver, Driver::Sqlite);
        assert_eq!(settings.path, Some(PathBuf::from("app.db")));
        assert!(!settings.verify_inserts);
        assert!(settings.resolved_path().unwrap().is_absolute());
    }

    #[test]
    fn test_missing_driver() {
        let err = DbSettings::from_source(&source(&[])).unwrap_err();
        assert!(matches!(err, StoreError::ConfigurationMissing(_)));
    }

    #[test]
    fn test_sqlite_requires_path() {
        let err = DbSettings::from_source(&source(&[("db_driver", "sqlite")])).unwrap_err();
        assert!(matches!(err, StoreError::ConfigurationMissing(_)));
    }

    #[test]
    fn test_unknown_driver() {
        let err = DbSettings::from_source(&source(&[("db_driver", "oracle")])).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedBackend { .. }));
    }

    #[test]
    fn test_toml_document() {
        let settings = DbSettings::from_toml_str(
            r#"
            [db]
            db_driver = "memory"
            db_name = "cache"
            verify_inserts = true
            "#,
        )
        .unwrap();
        assert_eq!(settings.driver, Driver::Memory);
        assert!(settings.verify_inserts);
        assert_eq!(settings.memory_uri(), "file:cache?mode=memory&cache=shared");
    }

    #[test]
    fn test_toml_without_db_section() {
        let err = DbSettings::from_toml_str("[server]\nport = 1").unwrap_err();
        assert!(matches!(err, StoreError::ConfigurationMissing(_)));
    }

    #[test]
    fn test_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[db]\ndb_driver = \"mysql\"").unwrap();
        let settings = DbSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.driver, Driver::MySql);
    }

    #[test]
    fn test_file_and_text_loaders_agree() {
        use std::io::Write;

        let documents = [
            "[db]\ndb_driver = \"oracle\"",
            "[db]\ndb_driver = \"SQLite\"\ndb_path = \"app.db\"",
            "[db]\ndb_driver = \"sqlite\"",
            "[server]\nport = 1",
        ];
        for document in documents {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            write!(file, "{}", document).unwrap();
            let from_file = DbSettings::from_file(file.path());
            let from_text = DbSettings::from_toml_str(document);
            match (from_file, from_text) {
                (Ok(a), Ok(b)) => assert_eq!(a, b),
                (Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string()),
                (a, b) => panic!("loaders disagree on {:?}: {:?} vs {:?}", document, a, b),
            }
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[db]\ndb_driver = \"oracle\"").unwrap();
        assert!(matches!(
            DbSettings::from_file(file.path()),
            Err(StoreError::UnsupportedBackend { ref driver, .. }) if driver == "oracle"
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[db]\ndb_driver = \"sqlite\"").unwrap();
        assert!(matches!(
            DbSettings::from_file(file.path()),
            Err(StoreError::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DbSettings::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, StoreError::ConfigurationMissing(_)));
    }

    #[test]
    fn test_anonymous_memory_uri() {
        let settings = DbSettings::from_source(&source(&[("db_driver", "memory")])).unwrap();
        assert_eq!(settings.memory_uri(), "file::memory:?cache=shared");
    }
}
