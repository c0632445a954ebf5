//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use stampline_core::HttpConfig;
use stampline_stamps::post::allocate::AllocationRules;
use stampline_stamps::{Endpoints, endpoints};

/// Global configuration for stampline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub http: HttpSection,
    pub pipeline: PipelineSection,
    pub endpoints: EndpointsSection,
    pub snapshot: SnapshotSection,
    pub allocation: AllocationSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for fetch output when no `--output` is given
    pub default_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Whole-request timeout in seconds
    pub request_timeout: u64,
    pub max_retries: u32,
}

impl Default for HttpSection {
    fn default() -> Self {
        let http = HttpConfig::default();
        Self {
            request_timeout: http.request_timeout.as_secs(),
            max_retries: http.max_retries,
        }
    }
}

impl HttpSection {
    pub fn to_http_config(self) -> HttpConfig {
        HttpConfig {
            request_timeout: Duration::from_secs(self.request_timeout),
            max_retries: self.max_retries,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub page_size: usize,
    pub max_pages: Option<usize>,
    pub workers: usize,
    pub checkpoint_interval: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let pipeline = stampline_core::PipelineConfig::default();
        Self {
            page_size: pipeline.page_size,
            max_pages: pipeline.max_pages,
            workers: pipeline.workers,
            checkpoint_interval: pipeline.checkpoint_interval,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointsSection {
    #[serde(deserialize_with = "deserialize_env_var")]
    pub openstamp: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub stampchain: String,
    pub actions_limit: usize,
}

impl Default for EndpointsSection {
    fn default() -> Self {
        Self {
            openstamp: endpoints::OPENSTAMP_API.to_string(),
            stampchain: endpoints::STAMPCHAIN_API.to_string(),
            actions_limit: endpoints::DEFAULT_ACTIONS_LIMIT,
        }
    }
}

impl EndpointsSection {
    pub fn to_endpoints(&self) -> Endpoints {
        Endpoints {
            openstamp: self.openstamp.clone(),
            stampchain: self.stampchain.clone(),
            actions_limit: self.actions_limit,
        }
    }
}

/// Balance snapshot persistence rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotSection {
    /// Record field matched against `allow`
    pub allow_field: String,
    /// Accepted values; empty keeps everything
    pub allow: Vec<String>,
    pub quote_all: bool,
}

impl Default for SnapshotSection {
    fn default() -> Self {
        Self {
            allow_field: "tick".to_string(),
            allow: Vec::new(),
            quote_all: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AllocationSection {
    pub assets: Vec<String>,
    pub per_asset: u64,
    pub bonus_asset: Option<String>,
    pub bonus: u64,
}

impl AllocationSection {
    pub fn to_rules(&self) -> AllocationRules {
        AllocationRules {
            assets: self.assets.clone(),
            per_asset: self.per_asset,
            bonus_asset: self.bonus_asset.clone(),
            bonus: self.bonus,
        }
    }
}

/// Deserialize a string that may be an environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    expand_env_var(&s).ok_or_else(|| {
        serde::de::Error::custom(format!("environment variable in '{s}' is not set"))
    })
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./stampline.toml (current directory)
    /// 2. ~/.config/stampline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("stampline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "stampline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
