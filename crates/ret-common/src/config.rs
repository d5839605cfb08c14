//! ---
//! ret_section: "14-licensing-system"
//! ret_subsection: "module"
//! ret_type: "source"
//! ret_scope: "code"
//! ret_description: "Shared configuration, logging, and licensing glue."
//! ret_version: "v0.1.0"
//! ret_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_store_dir() -> PathBuf {
    PathBuf::from("data/license")
}

fn default_trial_days() -> i64 {
    7
}

fn default_key_dir() -> PathBuf {
    PathBuf::from("keys")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("licenses")
}

fn default_issuer_name() -> String {
    "Retenciones Licensing".to_owned()
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(30)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the licensing tools and the product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub license: LicenseConfig,
    #[serde(default)]
    pub issuer: IssuerConfig,
    #[serde(default)]
    pub usage: UsageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and defaults apply.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "RET_CONFIG";

    /// Load configuration, respecting the `RET_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path.
    ///
    /// A path named by `RET_CONFIG` must exist. Otherwise the first existing
    /// candidate wins, and built-in defaults apply when none exists.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path.trim());
                let config = Self::from_file(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_file(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no configuration file found, using defaults"
        );
        Ok(LoadedAppConfig {
            config: AppConfig::default(),
            source: None,
        })
    }

    /// Load and validate a specific configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.license.validate()?;
        self.issuer.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Product-side license settings.
///
/// The trusted issuer key is compiled into the product and cannot be set here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LicenseConfig {
    /// Directory holding `active_license.json` and `trial.json`.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    #[serde(default = "default_trial_days")]
    pub trial_days: i64,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            trial_days: default_trial_days(),
        }
    }
}

impl LicenseConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=30).contains(&self.trial_days) {
            return Err(anyhow!(
                "license.trial_days must be between 1 and 30, got {}",
                self.trial_days
            ));
        }
        Ok(())
    }
}

/// Vendor-side issuance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerConfig {
    #[serde(default = "default_key_dir")]
    pub key_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_issuer_name")]
    pub issuer_name: String,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            key_dir: default_key_dir(),
            output_dir: default_output_dir(),
            issuer_name: default_issuer_name(),
        }
    }
}

impl IssuerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.issuer_name.trim().is_empty() {
            return Err(anyhow!("issuer.issuer_name must not be empty"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// How long a usage count may be reused before recounting.
    #[serde(default = "default_cache_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub cache_ttl: Duration,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            cache_ttl: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}
