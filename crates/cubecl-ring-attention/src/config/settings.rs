use std::fmt::{Debug, Display};
use std::str::FromStr;
use std::time::Duration;

use crate::components::{FormattedConfigError, InvalidConfigError};

/// Tuning knobs of ring attention that don't change its result.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RingAttentionSettings {
    /// Query rows per tile, overriding the default for the head dimension.
    pub tile_seq_q: Option<usize>,
    /// Key/value columns per tile, overriding the default for the head dimension.
    pub tile_seq_kv: Option<usize>,
    /// Worker threads of a dedicated pool. Uses the global rayon pool when unset.
    pub num_threads: Option<usize>,
    /// How long one send or receive of an exchange may block.
    pub exchange_timeout_ms: u64,
    /// Skip tiles the causal mask fully hides instead of computing them masked.
    pub skip_masked_tiles: bool,
}

impl Default for RingAttentionSettings {
    fn default() -> Self {
        Self {
            tile_seq_q: None,
            tile_seq_kv: None,
            num_threads: None,
            exchange_timeout_ms: 30_000,
            skip_masked_tiles: true,
        }
    }
}

impl RingAttentionSettings {
    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), InvalidConfigError> {
        let positive = [
            ("tile_seq_q", self.tile_seq_q),
            ("tile_seq_kv", self.tile_seq_kv),
            ("num_threads", self.num_threads),
        ];

        for (name, value) in positive {
            if value == Some(0) {
                return Err(FormattedConfigError::new(move || {
                    format!("{name} must be positive when set")
                }));
            }
        }

        if self.exchange_timeout_ms == 0 {
            return Err(FormattedConfigError::new(|| {
                "exchange_timeout_ms must be positive".to_string()
            }));
        }

        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        toml::from_str(content).map_err(SettingsError::Parse)
    }

    pub fn from_file_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(SettingsError::Io)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, SettingsError> {
        toml::to_string_pretty(self).map_err(SettingsError::Serialize)
    }

    /// Overrides fields from environment variables.
    pub fn override_from_env(self) -> Self {
        self.override_with(|name| std::env::var(name).ok())
    }

    /// Overrides fields from the variables returned by `lookup`.
    ///
    /// Values that don't parse are ignored with a warning.
    pub fn override_with<F: Fn(&str) -> Option<String>>(mut self, lookup: F) -> Self {
        if let Some(value) = parse_var(&lookup, "RING_ATTENTION_TILE_SEQ_Q") {
            self.tile_seq_q = Some(value);
        }

        if let Some(value) = parse_var(&lookup, "RING_ATTENTION_TILE_SEQ_KV") {
            self.tile_seq_kv = Some(value);
        }

        if let Some(value) = parse_var(&lookup, "RING_ATTENTION_NUM_THREADS") {
            self.num_threads = Some(value);
        }

        if let Some(value) = parse_var(&lookup, "RING_ATTENTION_EXCHANGE_TIMEOUT_MS") {
            self.exchange_timeout_ms = value;
        }

        if let Some(value) = lookup("RING_ATTENTION_SKIP_MASKED_TILES") {
            match value.as_str() {
                "1" | "true" => self.skip_masked_tiles = true,
                "0" | "false" => self.skip_masked_tiles = false,
                _ => log::warn!("Ignoring RING_ATTENTION_SKIP_MASKED_TILES={value}"),
            }
        }

        self
    }
}

fn parse_var<T: FromStr, F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<T> {
    let value = lookup(name)?;

    match value.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {name}={value}");
            None
        }
    }
}

/// Errors raised while loading or installing settings.
pub enum SettingsError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    /// The global settings were already set or read.
    AlreadySet,
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Debug for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(err) => write!(f, "Unable to read the settings file: {err}"),
            SettingsError::Parse(err) => write!(f, "Unable to parse the settings: {err}"),
            SettingsError::Serialize(err) => {
                write!(f, "Unable to serialize the settings: {err}")
            }
            SettingsError::AlreadySet => {
                write!(f, "Cannot set the global settings multiple times.")
            }
        }
    }
}

impl std::error::Error for SettingsError {}
