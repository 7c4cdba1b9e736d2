//! Configuration management for cascade.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (CASCADE_*)
//! 2. Config file (~/.config/cascade/config.toml)
//! 3. Default values

use anyhow::{Context, Result};
use cascade_router::{ProviderConfig, RouterConfig};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local database settings
    pub database: DatabaseConfig,

    /// LLM / embedding provider. Without one the LLM layer is disabled.
    pub provider: Option<ProviderConfig>,

    /// Use the in-process embedding model for semantic history matching
    pub local_embeddings: bool,

    /// Router tuning
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "cascade", "cascade")
}

fn default_database_path() -> PathBuf {
    if let Some(proj_dirs) = project_dirs() {
        proj_dirs.data_dir().join("cascade.db")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cascade")
            .join("cascade.db")
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
            Self::parse(&content)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.router.validate().context("Invalid router configuration")?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Apply CASCADE_* overrides. `lookup` returns the variable's value if set.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("CASCADE_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }

        let base_url = lookup("CASCADE_LLM_BASE_URL");
        let api_key = lookup("CASCADE_LLM_API_KEY");
        let model = lookup("CASCADE_LLM_MODEL");

        match self.provider.as_mut() {
            Some(ProviderConfig::OpenAi {
                base_url: url,
                api_key: key,
                model: m,
                ..
            }) => {
                if let Some(v) = base_url {
                    *url = v;
                }
                if api_key.is_some() {
                    *key = api_key;
                }
                if let Some(v) = model {
                    *m = v;
                }
            }
            Some(ProviderConfig::Ollama {
                base_url: url,
                model: m,
                ..
            }) => {
                if let Some(v) = base_url {
                    *url = v;
                }
                if let Some(v) = model {
                    *m = v;
                }
            }
            None => {
                if let Some(base_url) = base_url {
                    self.provider = Some(ProviderConfig::OpenAi {
                        base_url,
                        api_key,
                        model: model.unwrap_or_default(),
                        embedding_model: None,
                    });
                }
            }
        }
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = project_dirs() {
            proj_dirs.config_dir().join("config.toml")
        } else {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".cascade")
                .join("config.toml")
        }
    }
}
