use std::path::Path;
use std::sync::Arc;

use crate::config::{RingAttentionSettings, SettingsError};

/// Static mutex holding the global settings, initialized as `None`.
static GLOBAL_SETTINGS: spin::Mutex<Option<Arc<RingAttentionSettings>>> = spin::Mutex::new(None);

/// File name looked up in the current directory and its parents.
pub const SETTINGS_FILE_NAME: &str = "ring-attention.toml";

/// Process-wide settings used by [`Strategy::Default`](crate::Strategy::Default).
pub struct GlobalSettings;

impl GlobalSettings {
    /// Retrieves the global settings, loading them if not set.
    ///
    /// On first use the settings are read from `ring-attention.toml` in the current
    /// directory or its parents, then overridden from the environment. Defaults are used
    /// when no file is found.
    pub fn get() -> Arc<RingAttentionSettings> {
        let mut state = GLOBAL_SETTINGS.lock();

        match state.as_ref() {
            Some(settings) => settings.clone(),
            None => {
                let settings = Arc::new(Self::from_current_dir().override_from_env());
                *state = Some(settings.clone());
                settings
            }
        }
    }

    /// Sets the global settings.
    ///
    /// Returns an error if the settings have already been set or read.
    pub fn set(settings: RingAttentionSettings) -> Result<(), SettingsError> {
        let mut state = GLOBAL_SETTINGS.lock();
        if state.is_some() {
            return Err(SettingsError::AlreadySet);
        }

        *state = Some(Arc::new(settings));
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn reset() {
        *GLOBAL_SETTINGS.lock() = None;
    }

    fn from_current_dir() -> RingAttentionSettings {
        match std::env::current_dir() {
            Ok(dir) => Self::from_dir_or_parents(&dir),
            Err(err) => {
                log::warn!("Unable to read the current directory, using default settings: {err}");
                RingAttentionSettings::default()
            }
        }
    }

    fn from_dir_or_parents(dir: &Path) -> RingAttentionSettings {
        for dir in dir.ancestors() {
            let path = dir.join(SETTINGS_FILE_NAME);
            if !path.is_file() {
                continue;
            }

            match RingAttentionSettings::from_file_path(&path) {
                Ok(settings) => {
                    log::debug!("Loaded ring attention settings from {}", path.display());
                    return settings;
                }
                Err(err) => log::warn!("Ignoring {}: {err}", path.display()),
            }
        }

        RingAttentionSettings::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn set_then_get_returns_given_settings() {
        GlobalSettings::reset();
        let settings = RingAttentionSettings {
            tile_seq_q: Some(4),
            ..Default::default()
        };

        GlobalSettings::set(settings.clone()).unwrap();

        assert_eq!(*GlobalSettings::get(), settings);
        assert!(matches!(
            GlobalSettings::set(settings),
            Err(SettingsError::AlreadySet)
        ));
        GlobalSettings::reset();
    }

    #[test]
    #[serial]
    fn get_applies_environment_overrides() {
        GlobalSettings::reset();
        // SAFETY: tests touching the environment run serially.
        unsafe { std::env::set_var("RING_ATTENTION_TILE_SEQ_KV", "12") };

        let settings = GlobalSettings::get();

        unsafe { std::env::remove_var("RING_ATTENTION_TILE_SEQ_KV") };
        GlobalSettings::reset();

        assert_eq!(settings.tile_seq_kv, Some(12));
    }

    #[test]
    fn settings_file_is_found_in_parent() {
        let root = std::env::temp_dir().join(format!("ring-attention-{}", std::process::id()));
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(SETTINGS_FILE_NAME), "num_threads = 3\n").unwrap();

        let settings = GlobalSettings::from_dir_or_parents(&nested);
        std::fs::remove_dir_all(&root).unwrap();

        assert_eq!(settings.num_threads, Some(3));
    }
}
