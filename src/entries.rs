//! Persisted config entries
//!
//! Each completed setup wizard produces one [`ConfigEntry`]. Entries are kept
//! in a single pretty-printed JSON file and survive restarts; cached rate
//! documents do not.

use crate::error::{Result, UtilityCostsError};
use crate::logging::{StructuredLogger, get_logger};
use crate::rates::ProviderConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One configured polling target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConfigEntry {
    pub entry_id: String,
    pub title: String,
    pub data: ProviderConfig,
    pub created_at: DateTime<Utc>,
}

impl ConfigEntry {
    pub fn new(title: impl Into<String>, data: ProviderConfig) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            title: title.into(),
            data,
            created_at: Utc::now(),
        }
    }

    pub fn unique_id(&self) -> String {
        self.data.unique_id()
    }

    /// Copy with the bearer token masked
    pub fn redacted(&self) -> Self {
        Self {
            data: self.data.redacted(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EntryFile {
    #[serde(default)]
    entries: Vec<ConfigEntry>,
}

/// File-backed list of config entries
pub struct EntryStore {
    file_path: PathBuf,
    entries: Vec<ConfigEntry>,
    logger: StructuredLogger,
}

impl EntryStore {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            entries: Vec::new(),
            logger: get_logger("entries"),
        }
    }

    /// Create a store and load whatever is already on disk
    pub fn open<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let mut store = Self::new(file_path);
        store.load()?;
        Ok(store)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Load entries from disk; a missing file means no entries
    pub fn load(&mut self) -> Result<()> {
        if !self.file_path.exists() {
            self.logger.info(&format!(
                "No entry file at {}, starting empty",
                self.file_path.display()
            ));
            self.entries.clear();
            return Ok(());
        }

        let contents = std::fs::read_to_string(&self.file_path)?;
        let file: EntryFile = if contents.trim().is_empty() {
            EntryFile::default()
        } else {
            serde_json::from_str(&contents)?
        };
        self.entries = file.entries;
        self.logger
            .info(&format!("Loaded {} config entries", self.entries.len()));
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = EntryFile {
            entries: self.entries.clone(),
        };
        let contents = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.file_path, contents)?;
        self.logger.debug("Saved config entries to disk");
        Ok(())
    }

    /// Append and persist; rejects a second entry for the same target
    pub fn add(&mut self, entry: ConfigEntry) -> Result<ConfigEntry> {
        let unique_id = entry.unique_id();
        if self.contains_unique_id(&unique_id) {
            return Err(UtilityCostsError::AlreadyConfigured { unique_id });
        }
        self.entries.push(entry.clone());
        self.save()?;
        self.logger
            .info(&format!("Added entry {} ({})", entry.entry_id, entry.title));
        Ok(entry)
    }

    /// Remove and persist
    pub fn remove(&mut self, entry_id: &str) -> Result<ConfigEntry> {
        let Some(idx) = self.entries.iter().position(|e| e.entry_id == entry_id) else {
            return Err(UtilityCostsError::not_found(format!(
                "Config entry '{}' does not exist",
                entry_id
            )));
        };
        let entry = self.entries.remove(idx);
        self.save()?;
        self.logger.info(&format!("Removed entry {}", entry_id));
        Ok(entry)
    }

    pub fn get(&self, entry_id: &str) -> Option<&ConfigEntry> {
        self.entries.iter().find(|e| e.entry_id == entry_id)
    }

    pub fn list(&self) -> &[ConfigEntry] {
        &self.entries
    }

    pub fn contains_unique_id(&self, unique_id: &str) -> bool {
        self.entries.iter().any(|e| e.unique_id() == unique_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::ProviderType;
    use tempfile::tempdir;

    fn provider(key: &str) -> ProviderConfig {
        ProviderConfig::new("http://api", Some("tok".into()), key, ProviderType::Electric)
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = EntryStore::open(dir.path().join("entries.json")).unwrap();
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_add_persists_and_rejects_duplicates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("entries.json");
        let mut store = EntryStore::new(&path);

        let entry = store
            .add(ConfigEntry::new("Electric Rates (CEMC)", provider("cemc")))
            .unwrap();
        assert!(path.exists());

        let err = store
            .add(ConfigEntry::new("again", provider("cemc")))
            .unwrap_err();
        assert!(matches!(err, UtilityCostsError::AlreadyConfigured { .. }));

        let reloaded = EntryStore::open(&path).unwrap();
        assert_eq!(reloaded.list(), &[entry.clone()]);
        assert!(reloaded.contains_unique_id("electric_cemc_http://api"));
        assert_eq!(reloaded.get(&entry.entry_id), Some(&entry));
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entries.json");
        let mut store = EntryStore::new(&path);
        let entry = store.add(ConfigEntry::new("t", provider("nes"))).unwrap();

        assert!(store.remove("nope").is_err());
        store.remove(&entry.entry_id).unwrap();
        assert!(EntryStore::open(&path).unwrap().list().is_empty());
    }

    #[test]
    fn test_redacted_entry_hides_token() {
        let entry = ConfigEntry::new("t", provider("kub"));
        assert_eq!(entry.redacted().data.token.as_deref(), Some("**REDACTED**"));
        assert_ne!(entry.entry_id, ConfigEntry::new("t", provider("kub")).entry_id);
    }
}
