use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::MentorConfig;

/// Loads the Mentor configuration from disk with env-var overrides.
pub struct ConfigLoader {
    config: Arc<RwLock<MentorConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > MENTOR_CONFIG env >
    /// ~/.mentor/mentor.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("MENTOR_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mentor")
            .join("mentor.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> mentor_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<MentorConfig>(&raw).map_err(|e| {
                mentor_core::MentorError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            MentorConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(mentor_core::MentorError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> MentorConfig {
        self.config.read().clone()
    }

    /// Path the config was loaded from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (MENTOR_ORACLE_MODEL, MENTOR_LOG_LEVEL, …).
    fn apply_env_overrides(mut config: MentorConfig) -> MentorConfig {
        if let Ok(v) = std::env::var("MENTOR_ORACLE_MODEL") {
            config.oracle.model = v;
        }
        if let Ok(v) = std::env::var("MENTOR_ORACLE_BASE_URL") {
            config.oracle.base_url = v;
        }
        if let Ok(v) = std::env::var("MENTOR_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("MENTOR_DB_PATH") {
            config.store.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("MENTOR_MAX_RETRIES") {
            if let Ok(n) = v.parse::<u32>() {
                config.teaching.max_retries = n;
            }
        }
        // API key: config file takes priority, env is the fallback.
        if config.oracle.api_key.is_none() {
            if let Ok(v) = std::env::var("OPENAI_API_KEY") {
                config.oracle.api_key = Some(v);
            }
        }
        config
    }

    /// Write a starter mentor.toml at the given path.
    pub fn write_default(path: &Path) -> mentor_core::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(&MentorConfig::default())
            .map_err(|e| mentor_core::MentorError::Config(e.to_string()))?;
        std::fs::write(path, rendered)?;
        info!(?path, "wrote default configuration");
        Ok(())
    }
}
