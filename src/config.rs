use crate::settings::Settings;
use eyre::Result;
use serde_json::{Map, Value};
use std::{fs, path::PathBuf};

pub const APP_NAME: &str = "vocab";
const CONFIG_FILE: &str = "configuration.json";
const DATABASE_FILE: &str = "words.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    filepath: PathBuf,
}

impl Config {
    /// Load the configuration from the app data prefix, writing the
    /// defaults on first run.
    pub fn new() -> Result<Self> {
        let prefix = get_app_data_prefix()?;
        Self::load_from(prefix.join(CONFIG_FILE))
    }

    /// Load configuration from a custom path
    pub fn load_from(filepath: PathBuf) -> Result<Self> {
        let settings = if filepath.exists() {
            let config_str = fs::read_to_string(&filepath)?;
            match serde_json::from_str::<Value>(&config_str) {
                Ok(user_config) => user_config
                    .get("Setting")
                    .and_then(Value::as_object)
                    .map(merge_user_settings)
                    .unwrap_or_default(),
                Err(err) => {
                    crate::logging::warn(format!(
                        "Ignoring malformed {}: {}",
                        filepath.display(),
                        err
                    ));
                    Settings::default()
                }
            }
        } else {
            let config = Self {
                settings: Settings::default(),
                filepath: filepath.clone(),
            };
            config.save()?;
            config.settings
        };

        Ok(Self { settings, filepath })
    }

    /// Create a config with custom settings that is never written to the
    /// user's data directory unless saved explicitly.
    pub fn with_settings(settings: Settings, filepath: PathBuf) -> Self {
        Self { settings, filepath }
    }

    /// Database location: the configured path, or `words.db` next to the
    /// configuration file.
    pub fn database_path(&self) -> PathBuf {
        match self.settings.database.as_deref() {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => self
                .filepath
                .parent()
                .map(|dir| dir.join(DATABASE_FILE))
                .unwrap_or_else(|| PathBuf::from(DATABASE_FILE)),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.filepath
            .parent()
            .map(|dir| dir.join(format!("{}.log", APP_NAME)))
            .unwrap_or_else(|| PathBuf::from(format!("{}.log", APP_NAME)))
    }

    /// Save current configuration to file
    pub fn save(&self) -> Result<()> {
        let config_json = serde_json::json!({ "Setting": self.settings });
        let config_str = serde_json::to_string_pretty(&config_json)?;

        if let Some(parent) = self.filepath.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&self.filepath, config_str)?;
        Ok(())
    }
}

/// Apply user values one key at a time so a single bad value only resets
/// that key.
fn merge_user_settings(user: &Map<String, Value>) -> Settings {
    let mut merged = match serde_json::to_value(Settings::default()) {
        Ok(Value::Object(map)) => map,
        _ => return Settings::default(),
    };

    for (key, value) in user {
        if !merged.contains_key(key) {
            crate::logging::debug(format!("Unknown setting '{}'", key));
            continue;
        }
        let mut candidate = merged.clone();
        candidate.insert(key.clone(), value.clone());
        if serde_json::from_value::<Settings>(Value::Object(candidate)).is_ok() {
            merged.insert(key.clone(), value.clone());
        } else {
            crate::logging::warn(format!("Invalid value for setting '{}', using default", key));
        }
    }

    serde_json::from_value(Value::Object(merged)).unwrap_or_default()
}

pub fn get_app_data_prefix() -> Result<PathBuf> {
    if let Some(config_home) = std::env::var_os("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(config_home).join(APP_NAME));
    } else if let Some(home) = std::env::var_os("HOME") {
        let path = PathBuf::from(home.clone()).join(".config").join(APP_NAME);
        if path.exists() {
            return Ok(path);
        } else {
            return Ok(PathBuf::from(home).join(format!(".{}", APP_NAME)));
        }
    } else if let Some(user_profile) = std::env::var_os("USERPROFILE") {
        return Ok(PathBuf::from(user_profile).join(format!(".{}", APP_NAME)));
    }

    Err(eyre::eyre!(
        "Could not determine application data directory"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};
    use tempfile::tempdir;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("lock env mutex")
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = Config::load_from(path.clone()).unwrap();
        assert_eq!(config.settings, Settings::default());
        assert!(path.exists());

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["Setting"]["page_size"], 30);
    }

    #[test]
    fn test_user_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"{"Setting": {"page_size": 12, "tts_enabled": false, "audio_player": "ffplay"}}"#,
        )
        .unwrap();

        let config = Config::load_from(path).unwrap();
        assert_eq!(config.settings.page_size, 12);
        assert!(!config.settings.tts_enabled);
        assert_eq!(config.settings.audio_player, "ffplay");
        assert_eq!(config.settings.tts_retries, 3);
    }

    #[test]
    fn test_bad_value_resets_only_that_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"{"Setting": {"page_size": "many", "tts_language": "de", "bogus": 1}}"#,
        )
        .unwrap();

        let config = Config::load_from(path).unwrap();
        assert_eq!(config.settings.page_size, 30);
        assert_eq!(config.settings.tts_language, "de");
    }

    #[test]
    fn test_malformed_json_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{not json").unwrap();
        let config = Config::load_from(path).unwrap();
        assert_eq!(config.settings, Settings::default());
    }

    #[test]
    fn test_database_path_defaults_next_to_config() {
        let dir = tempdir().unwrap();
        let config = Config::with_settings(Settings::default(), dir.path().join(CONFIG_FILE));
        assert_eq!(config.database_path(), dir.path().join("words.db"));

        let custom = Config::with_settings(
            Settings {
                database: Some("/tmp/other.db".to_string()),
                ..Settings::default()
            },
            dir.path().join(CONFIG_FILE),
        );
        assert_eq!(custom.database_path(), PathBuf::from("/tmp/other.db"));
    }

    #[test]
    fn test_app_data_prefix_prefers_xdg() {
        let _guard = lock_env();
        let dir = tempdir().unwrap();
        let original = env::var_os("XDG_CONFIG_HOME");
        unsafe {
            env::set_var("XDG_CONFIG_HOME", dir.path());
        }
        let prefix = get_app_data_prefix().unwrap();
        unsafe {
            match original {
                Some(value) => env::set_var("XDG_CONFIG_HOME", value),
                None => env::remove_var("XDG_CONFIG_HOME"),
            }
        }
        assert_eq!(prefix, dir.path().join(APP_NAME));
    }
}
