use anyhow::{bail, Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::patterns::{CompiledPatterns, PatternLibrary};

pub const VIRUSTOTAL_KEY_ENV: &str = "VIRUSTOTAL_API_KEY";
pub const SAFE_BROWSING_KEY_ENV: &str = "SAFE_BROWSING_API_KEY";

/// One pattern match can at most saturate the content score on its own.
pub const MAX_PATTERN_WEIGHT: u32 = 100;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub external: ExternalConfig,
    #[serde(default)]
    pub web_spam: WebSpamConfig,
    pub logging: Option<LoggingConfig>,
    /// Pattern library to load instead of the built-in Spanish set.
    pub patterns_file: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityConfig {
    #[serde(default = "default_suspicious_threshold")]
    pub suspicious_threshold: u32,
    #[serde(default = "default_malicious_threshold")]
    pub malicious_threshold: u32,
    #[serde(default = "default_max_urls")]
    pub max_urls_per_sms: usize,
    #[serde(default = "default_pattern_weight")]
    pub content_pattern_weight: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExternalConfig {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    pub virustotal_api_key: Option<String>,
    pub safe_browsing_api_key: Option<String>,
    #[serde(default)]
    pub phishtank_enabled: bool,
    pub phishtank_app_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct WebSpamConfig {
    #[serde(default)]
    pub known_numbers: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_version() -> String {
    "1".to_string()
}

fn default_suspicious_threshold() -> u32 {
    70
}

fn default_malicious_threshold() -> u32 {
    90
}

fn default_max_urls() -> usize {
    10
}

fn default_pattern_weight() -> u32 {
    20
}

fn default_timeout_seconds() -> u64 {
    5
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            suspicious_threshold: default_suspicious_threshold(),
            malicious_threshold: default_malicious_threshold(),
            max_urls_per_sms: default_max_urls(),
            content_pattern_weight: default_pattern_weight(),
        }
    }
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            virustotal_api_key: None,
            safe_browsing_api_key: None,
            phishtank_enabled: false,
            phishtank_app_key: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            security: SecurityConfig::default(),
            external: ExternalConfig::default(),
            web_spam: WebSpamConfig::default(),
            logging: Some(LoggingConfig {
                level: "info".to_string(),
            }),
            patterns_file: None,
        }
    }
}

impl ExternalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn virustotal_key(&self) -> Option<&str> {
        non_empty(&self.virustotal_api_key)
    }

    pub fn safe_browsing_key(&self) -> Option<&str> {
        non_empty(&self.safe_browsing_api_key)
    }

    pub fn phishtank_key(&self) -> Option<&str> {
        non_empty(&self.phishtank_app_key)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: Config =
            serde_yaml::from_str(content).context("Failed to parse configuration")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration: {}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid configuration: {}", path))
    }

    pub fn generate_default(path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(&Config::default())?;
        fs::write(path, yaml).with_context(|| format!("Failed to write configuration: {}", path))
    }

    /// API keys from the environment fill in keys the file leaves unset.
    pub fn apply_env_overrides(&mut self) {
        if self.external.virustotal_key().is_none() {
            if let Ok(key) = std::env::var(VIRUSTOTAL_KEY_ENV) {
                self.external.virustotal_api_key = Some(key);
            }
        }
        if self.external.safe_browsing_key().is_none() {
            if let Ok(key) = std::env::var(SAFE_BROWSING_KEY_ENV) {
                self.external.safe_browsing_api_key = Some(key);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let security = &self.security;
        if security.suspicious_threshold > security.malicious_threshold {
            bail!(
                "suspicious_threshold ({}) must not exceed malicious_threshold ({})",
                security.suspicious_threshold,
                security.malicious_threshold
            );
        }
        if security.content_pattern_weight == 0 {
            bail!("content_pattern_weight must be greater than zero");
        }
        if security.content_pattern_weight > MAX_PATTERN_WEIGHT {
            bail!(
                "content_pattern_weight ({}) must not exceed {}",
                security.content_pattern_weight,
                MAX_PATTERN_WEIGHT
            );
        }
        if security.max_urls_per_sms == 0 {
            bail!("max_urls_per_sms must be greater than zero");
        }
        if self.external.timeout_seconds == 0 {
            bail!("external.timeout_seconds must be greater than zero");
        }
        Ok(())
    }

    pub fn load_patterns(&self) -> Result<CompiledPatterns> {
        let library = match &self.patterns_file {
            Some(path) => PatternLibrary::load_from_file(path)?,
            None => PatternLibrary::spain()?,
        };
        log::info!(
            "Loaded pattern library {} ({})",
            library.version,
            library.locale
        );
        library.compile()
    }

    pub fn log_level(&self) -> Option<LevelFilter> {
        self.logging
            .as_ref()
            .and_then(|l| l.level.parse::<LevelFilter>().ok())
    }
}
