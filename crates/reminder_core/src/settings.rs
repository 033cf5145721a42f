use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-user record held by the remote settings store.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserNotificationSettings {
    #[serde(default)]
    pub notifications_enabled: bool,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("no settings recorded for this user")]
    NotFound,
    #[error("settings store unavailable: {0}")]
    Unavailable(String),
}

pub trait SettingsStore: Send + Sync {
    fn get_settings(&self, user_id: &str) -> Result<UserNotificationSettings, SettingsError>;
}

#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    records: RwLock<HashMap<String, UserNotificationSettings>>,
    outage: RwLock<Option<String>>,
    reads: RwLock<usize>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user_id: impl Into<String>, notifications_enabled: bool) -> Self {
        self.set(
            user_id,
            UserNotificationSettings {
                notifications_enabled,
            },
        );
        self
    }

    pub fn set(&self, user_id: impl Into<String>, settings: UserNotificationSettings) {
        self.records.write().insert(user_id.into(), settings);
    }

    /// Makes every read fail with [`SettingsError::Unavailable`] until cleared.
    pub fn set_outage(&self, reason: Option<String>) {
        *self.outage.write() = reason;
    }

    pub fn read_count(&self) -> usize {
        *self.reads.read()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get_settings(&self, user_id: &str) -> Result<UserNotificationSettings, SettingsError> {
        *self.reads.write() += 1;
        if let Some(reason) = self.outage.read().clone() {
            return Err(SettingsError::Unavailable(reason));
        }
        self.records
            .read()
            .get(user_id)
            .copied()
            .ok_or(SettingsError::NotFound)
    }
}

/// Reads a JSON object mapping user ids to settings records.
///
/// The file is re-read on every call so edits made by another process are seen
/// by the next session.
#[derive(Debug, Clone)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
}

impl JsonFileSettingsStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn load(&self) -> Result<HashMap<String, UserNotificationSettings>, SettingsError> {
        let raw = fs::read_to_string(&self.path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => {
                SettingsError::Unavailable(format!("{} does not exist", self.path.display()))
            }
            _ => SettingsError::Unavailable(err.to_string()),
        })?;
        serde_json::from_str(&raw).map_err(|err| SettingsError::Unavailable(err.to_string()))
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn get_settings(&self, user_id: &str) -> Result<UserNotificationSettings, SettingsError> {
        self.load()?
            .remove(user_id)
            .ok_or(SettingsError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_store_reports_missing_users() {
        let store = MemorySettingsStore::new().with_user("ada", true);
        assert_eq!(
            store.get_settings("ada"),
            Ok(UserNotificationSettings {
                notifications_enabled: true
            })
        );
        assert_eq!(store.get_settings("bob"), Err(SettingsError::NotFound));
        assert_eq!(store.read_count(), 2);
    }

    #[test]
    fn memory_store_outage_is_unavailable() {
        let store = MemorySettingsStore::new().with_user("ada", true);
        store.set_outage(Some("offline".into()));
        assert_eq!(
            store.get_settings("ada"),
            Err(SettingsError::Unavailable("offline".into()))
        );
    }

    #[test]
    fn json_store_reads_records_by_user() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"ada":{"notifications_enabled":true},"bob":{}}"#,
        )
        .expect("write settings");

        let store = JsonFileSettingsStore::new(&path);
        assert!(store.get_settings("ada").unwrap().notifications_enabled);
        assert!(!store.get_settings("bob").unwrap().notifications_enabled);
        assert_eq!(store.get_settings("eve"), Err(SettingsError::NotFound));
    }

    #[test]
    fn json_store_missing_or_corrupt_file_is_unavailable() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        let store = JsonFileSettingsStore::new(&path);
        assert!(matches!(
            store.get_settings("ada"),
            Err(SettingsError::Unavailable(_))
        ));

        fs::write(&path, "not json").expect("write settings");
        assert!(matches!(
            store.get_settings("ada"),
            Err(SettingsError::Unavailable(_))
        ));
    }
}
