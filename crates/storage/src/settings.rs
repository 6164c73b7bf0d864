use crate::{default_project_dirs, StorageError};
use doc_model::{AnnotationColor, PageRangePolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_SCHEMA_VERSION: u32 = 1;

/// User-tunable behaviour of the annotation overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Quiet period after the last mutation before a collection is written.
    pub debounce_ms: u64,
    /// Upper bound on how long a dirty collection may wait while edits keep coming.
    pub max_debounce_ms: u64,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    /// Consecutive failures after which a key is reported as failed.
    pub max_attempts: u32,
    pub page_range_policy: PageRangePolicy,
    pub default_color: AnnotationColor,
    pub sticky_note_width: f64,
    pub sticky_note_height: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_ms: 400,
            max_debounce_ms: 2_000,
            retry_base_ms: 500,
            retry_max_ms: 30_000,
            max_attempts: 5,
            page_range_policy: PageRangePolicy::Preserve,
            default_color: AnnotationColor::Yellow,
            sticky_note_width: 200.0,
            sticky_note_height: 150.0,
        }
    }
}

impl Settings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_debounce(&self) -> Duration {
        Duration::from_millis(self.max_debounce_ms.max(self.debounce_ms))
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.retry_max_ms.max(self.retry_base_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsEnvelope {
    version: u32,
    settings: Settings,
}

/// Reads and writes `settings.json` in a storage root.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    root: PathBuf,
}

impl SettingsStore {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = default_project_dirs()?;
        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load(&self) -> Result<Settings, StorageError> {
        let path = self.settings_path();
        if !path.exists() {
            log::debug!("no settings at {}, using defaults", path.display());
            return Ok(Settings::default());
        }

        let bytes = fs::read(&path)?;
        let envelope: SettingsEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version != SETTINGS_SCHEMA_VERSION {
            log::warn!(
                "settings schema version {} differs from {}, reading anyway",
                envelope.version,
                SETTINGS_SCHEMA_VERSION
            );
        }

        Ok(envelope.settings)
    }

    /// Like [`SettingsStore::load`], but falls back to defaults on any error.
    pub fn load_or_default(&self) -> Settings {
        self.load().unwrap_or_else(|err| {
            log::warn!("failed to load settings from {}: {err}", self.settings_path().display());
            Settings::default()
        })
    }

    pub fn save(&self, settings: &Settings) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope =
            SettingsEnvelope { version: SETTINGS_SCHEMA_VERSION, settings: settings.clone() };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(self.settings_path(), bytes)?;
        Ok(())
    }

    fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileKeyValueStore;

    #[test]
    fn default_settings_share_the_annotation_root() {
        // No home directory on some CI hosts.
        let (Ok(settings), Ok(annotations)) =
            (SettingsStore::from_default_project(), FileKeyValueStore::from_default_project())
        else {
            return;
        };
        assert_eq!(settings.root(), annotations.root());
    }

    #[test]
    fn settings_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = SettingsStore::with_root(temp.path());

        let settings = Settings {
            debounce_ms: 50,
            page_range_policy: PageRangePolicy::Clamp,
            default_color: AnnotationColor::Blue,
            ..Settings::default()
        };

        store.save(&settings).expect("save should succeed");
        let loaded = store.load().expect("load should succeed");

        assert_eq!(loaded, settings);
    }

    #[test]
    fn load_defaults_when_file_absent() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = SettingsStore::with_root(temp.path());

        assert_eq!(store.load().expect("load should succeed"), Settings::default());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        fs::write(
            temp.path().join("settings.json"),
            r#"{"version":1,"settings":{"page_range_policy":"drop"}}"#,
        )
        .expect("fixture should be written");

        let loaded = SettingsStore::with_root(temp.path()).load().expect("load should succeed");
        assert_eq!(loaded.page_range_policy, PageRangePolicy::Drop);
        assert_eq!(loaded.debounce_ms, Settings::default().debounce_ms);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        fs::write(temp.path().join("settings.json"), b"{not json").expect("fixture");

        let store = SettingsStore::with_root(temp.path());
        assert!(store.load().is_err());
        assert_eq!(store.load_or_default(), Settings::default());
    }

    #[test]
    fn max_debounce_never_undercuts_debounce() {
        let settings = Settings { debounce_ms: 900, max_debounce_ms: 100, ..Settings::default() };
        assert_eq!(settings.max_debounce(), Duration::from_millis(900));
    }
}
