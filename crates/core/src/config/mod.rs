//! Configuration for pexrs
//!
//! This module provides the TOML configuration that controls:
//! - Which backend stores subject data
//! - Resolution defaults (undefined permissions, fail-closed, rank)
//! - Cache size, callback expiry, page size and worker count
//! - Context inheritance and rank ladders
//!
//! The file lives at `<base>/configs/permissions.toml` and is created with
//! default values the first time it is loaded.
//!
//! # Example
//!
//! ```toml
//! version = 1
//! default-backend = "default"
//! fail-closed = true
//!
//! [backends.default]
//! type = "file"
//! path = "data/permissions.json"
//!
//! [context-inheritance]
//! "world=nether" = ["world=overworld"]
//!
//! [ladders]
//! staff = ["group:helper", "group:moderator", "group:admin"]
//! ```

mod loader;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pexrs_sdk::{ContextValue, SubjectRef};

use crate::ladders::Ladder;

pub use loader::{configs_dir, core_config_path, resolve_data_path, CONFIG_FILE_NAME};

/// Configuration system errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write config file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML content
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config to TOML
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// `default-backend` names a backend that is not configured
    #[error("Backend '{0}' is not configured")]
    InvalidBackend(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A persistence backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BackendConfig {
    /// JSON file, relative paths resolved from the base directory
    File { path: PathBuf },
    /// Volatile, lost on unload
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Maximum number of memoized resolutions
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 4096 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CallbackConfig {
    /// Seconds a callback token stays valid
    pub ttl_secs: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self { ttl_secs: 600 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PaginationConfig {
    pub page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self { page_size: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WorkerConfig {
    /// Threads serving asynchronous permission checks
    pub threads: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { threads: 2 }
    }
}

/// Permissions configuration.
///
/// Loaded from `<base>/configs/permissions.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PexConfig {
    /// Config version for future migration support
    pub version: u32,

    /// Enable debug logging
    pub debug: bool,

    /// Key into `backends` of the backend to use
    pub default_backend: String,

    /// Answer for permissions no rule decides
    pub undefined_default: bool,

    /// Deny when the backend fails instead of using `undefined-default`
    pub fail_closed: bool,

    /// Rank of subjects with no rank in their closure
    pub default_rank: i32,

    /// Fall back to `default:<type>` and `default:default` subjects
    pub implicit_defaults: bool,

    pub cache: CacheConfig,
    pub callbacks: CallbackConfig,
    pub pagination: PaginationConfig,
    pub workers: WorkerConfig,

    pub backends: BTreeMap<String, BackendConfig>,

    /// `"key=value"` → inherited `"key=value"` list
    pub context_inheritance: BTreeMap<String, Vec<String>>,

    /// Ladder name → `"type:identifier"` ranks, lowest first
    pub ladders: BTreeMap<String, Vec<String>>,
}

impl Default for PexConfig {
    fn default() -> Self {
        let mut backends = BTreeMap::new();
        backends.insert(
            "default".to_string(),
            BackendConfig::File {
                path: PathBuf::from("data/permissions.json"),
            },
        );

        Self {
            version: 1,
            debug: false,
            default_backend: "default".to_string(),
            undefined_default: false,
            fail_closed: true,
            default_rank: 0,
            implicit_defaults: true,
            cache: CacheConfig::default(),
            callbacks: CallbackConfig::default(),
            pagination: PaginationConfig::default(),
            workers: WorkerConfig::default(),
            backends,
            context_inheritance: BTreeMap::new(),
            ladders: BTreeMap::new(),
        }
    }
}

impl PexConfig {
    /// Load config from `<base>/configs`, creating default if missing.
    pub fn load(base: &Path) -> ConfigResult<Self> {
        let path = core_config_path(base);

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            tracing::debug!("Loaded permissions config from {:?}", path);
            Ok(config)
        } else {
            let default = Self::default();
            default.save(base)?;
            tracing::info!("Created default permissions config at {:?}", path);
            Ok(default)
        }
    }

    /// Save config to file.
    pub fn save(&self, base: &Path) -> ConfigResult<()> {
        let path = core_config_path(base);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        tracing::debug!("Saved permissions config to {:?}", path);
        Ok(())
    }

    /// Reload config from file.
    pub fn reload(&mut self, base: &Path) -> ConfigResult<()> {
        let path = core_config_path(base);
        let content = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        *self = config;
        tracing::debug!("Reloaded permissions config from {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.backend().map(|_| ())
    }

    /// The backend named by `default-backend`
    pub fn backend(&self) -> ConfigResult<&BackendConfig> {
        self.backends
            .get(&self.default_backend)
            .ok_or_else(|| ConfigError::InvalidBackend(self.default_backend.clone()))
    }

    pub fn callback_ttl(&self) -> Duration {
        Duration::from_secs(self.callbacks.ttl_secs)
    }

    /// Parsed context inheritance; malformed entries are skipped with a warning
    pub fn inheritance(&self) -> Vec<(ContextValue, Vec<ContextValue>)> {
        let mut parsed = Vec::new();
        for (child, parents) in &self.context_inheritance {
            let Some(child_value) = ContextValue::parse(child) else {
                tracing::warn!("Ignoring malformed context '{}'", child);
                continue;
            };
            let parents = parents
                .iter()
                .filter_map(|p| {
                    let value = ContextValue::parse(p);
                    if value.is_none() {
                        tracing::warn!("Ignoring malformed context '{}' under '{}'", p, child);
                    }
                    value
                })
                .collect();
            parsed.push((child_value, parents));
        }
        parsed
    }

    /// Parsed ladders; malformed ranks are skipped with a warning
    pub fn rank_ladders(&self) -> Vec<Ladder> {
        self.ladders
            .iter()
            .map(|(name, ranks)| {
                let ranks = ranks
                    .iter()
                    .filter_map(|r| {
                        let rank = SubjectRef::parse(r);
                        if rank.is_none() {
                            tracing::warn!("Ignoring malformed rank '{}' on ladder '{}'", r, name);
                        }
                        rank
                    })
                    .collect();
                Ladder::new(name.clone(), ranks)
            })
            .collect()
    }
}
