//! Settings Persistence
//!
//! Per-user defaults for generation and export:
//! - Atomic file writes (temp file + rename)
//! - Defaults for missing fields and for unreadable files
//! - Version field with a migration hook
//!
//! Storage location: {app_data_dir}/settings.json

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::ai::gateway::GatewayConfig;
use crate::core::ai::prompt::GenerationMode;
use crate::core::ai::providers::ProviderKind;
use crate::core::fs::atomic_write_json_pretty;
use crate::core::script::{is_known_script_type, DEFAULT_SCRIPT_TYPE};
use crate::core::{CoreError, CoreResult};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Advisory lock file name
pub const SETTINGS_LOCK_FILE: &str = "settings.json.lock";

/// Allowed request timeout range, in seconds
pub const TIMEOUT_RANGE_SECS: (u64, u64) = (10, 600);

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub generation: GenerationSettings,

    #[serde(default)]
    pub output: OutputSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            generation: GenerationSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl AppSettings {
    /// Clamps numeric ranges and replaces unknown values with defaults.
    pub fn normalize(&mut self) {
        let (min, max) = TIMEOUT_RANGE_SECS;
        self.generation.timeout_secs = self.generation.timeout_secs.clamp(min, max);

        if !is_known_script_type(&self.generation.script_type) {
            self.generation.script_type = DEFAULT_SCRIPT_TYPE.to_string();
        }

        if self
            .generation
            .default_duration
            .as_deref()
            .is_some_and(|d| d.trim().is_empty())
        {
            self.generation.default_duration = None;
        }

        if self
            .output
            .output_dir
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.output.output_dir = None;
        }
    }

    /// Gateway configuration derived from these settings
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::default()
            .with_timeout_secs(self.generation.timeout_secs)
            .with_strict_validation(self.generation.strict_validation)
    }
}

/// Generation defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    #[serde(default = "default_provider")]
    pub default_provider: ProviderKind,

    #[serde(default)]
    pub mode: GenerationMode,

    #[serde(default = "default_script_type")]
    pub script_type: String,

    /// Free-text duration used when none is given
    #[serde(default)]
    pub default_duration: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Enforce exact scene count and contiguous numbering
    #[serde(default)]
    pub strict_validation: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            mode: GenerationMode::default(),
            script_type: default_script_type(),
            default_duration: None,
            timeout_secs: default_timeout_secs(),
            strict_validation: false,
        }
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::OpenAI
}

fn default_script_type() -> String {
    DEFAULT_SCRIPT_TYPE.to_string()
}

fn default_timeout_secs() -> u64 {
    GatewayConfig::DEFAULT_TIMEOUT_SECS
}

/// Export defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputSettings {
    /// Export directory; the current directory when unset
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

/// Settings manager for loading, saving, and resetting settings
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a manager for `{app_data_dir}/settings.json`
    pub fn new(app_data_dir: &Path) -> Self {
        Self {
            settings_path: app_data_dir.join(SETTINGS_FILE),
        }
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;

        let locked = if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file)
        } else {
            fs2::FileExt::lock_shared(&lock_file)
        };
        locked.map_err(|e| CoreError::SettingsError(format!("Failed to lock settings: {}", e)))?;

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Loads settings, falling back to defaults on a missing or unreadable file
    pub fn load(&self) -> AppSettings {
        let result = self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(AppSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings: AppSettings = serde_json::from_str(&content)?;

            if settings.version < SETTINGS_VERSION {
                info!(
                    "Migrating settings from version {} to {}",
                    settings.version, SETTINGS_VERSION
                );
                settings = self.migrate(settings);
            }

            settings.normalize();
            Ok(settings)
        });

        match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                AppSettings::default()
            }
        }
    }

    /// Normalizes and writes settings atomically, returning what was stored
    pub fn save(&self, settings: &AppSettings) -> CoreResult<AppSettings> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();

            atomic_write_json_pretty(&self.settings_path, &normalized)?;

            info!("Settings saved to {}", self.settings_path.display());
            Ok(normalized)
        })
    }

    /// Deletes the settings file and returns defaults
    pub fn reset(&self) -> CoreResult<AppSettings> {
        self.with_lock(true, || {
            if self.settings_path.exists() {
                fs::remove_file(&self.settings_path)?;
                info!("Settings file deleted");
            }
            Ok(AppSettings::default())
        })
    }

    fn migrate(&self, mut settings: AppSettings) -> AppSettings {
        settings.version = SETTINGS_VERSION;
        settings
    }
}
