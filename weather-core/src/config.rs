use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, str::FromStr};

use crate::schedule::normalize_cron_expr;

pub const DEFAULT_CITIES: [&str; 5] = ["Delhi", "Mumbai", "Bangalore", "Kolkata", "Chennai"];

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [store]
/// path = "/var/lib/weather/store"
/// name = "weather_data"
///
/// [schedule]
/// cities = ["Delhi", "Mumbai"]
/// cron = "0 6 * * *"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub scraper: ScraperConfig,
    pub schedule: ScheduleConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Fjall,
    Memory,
}

/// Where weather documents are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Directory of the embedded store; plays the role of a connection string.
    pub path: Option<PathBuf>,
    /// Keyspace inside the store; plays the role of a database name.
    pub name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            name: "weather_data".to_string(),
        }
    }
}

/// Outbound provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub weather_timeout_secs: u64,
    pub aqi_timeout_secs: u64,
    pub weather_base_url: String,
    pub openaq_base_url: String,
    pub waqi_base_url: String,
    pub waqi_token: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            weather_timeout_secs: 30,
            aqi_timeout_secs: 8,
            weather_base_url: "https://wttr.in".to_string(),
            openaq_base_url: "https://api.openaq.org".to_string(),
            waqi_base_url: "https://api.waqi.info".to_string(),
            waqi_token: "demo".to_string(),
        }
    }
}

/// Daily scrape job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub cities: Vec<String>,
    /// Standard 5-field or 6-field cron expression, evaluated in UTC.
    pub cron: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cities: DEFAULT_CITIES.iter().map(|c| c.to_string()).collect(),
            cron: "0 6 * * *".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load config from disk (or defaults if it doesn't exist yet), then
    /// apply environment overrides and validate.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::load_file()?;
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load only the on-disk file, without environment overrides.
    pub fn load_file() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "weather-scraper", "weather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Store directory, falling back to the platform data directory.
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.data_dir().join("store")),
        }
    }

    /// Overrides fields from environment-style variables.
    ///
    /// `lookup` is injected so callers (and tests) control the source.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("WEATHER_STORE_PATH").filter(|v| !v.trim().is_empty()) {
            self.store.path = Some(PathBuf::from(path.trim()));
        }
        if let Some(name) = lookup("WEATHER_STORE_NAME").filter(|v| !v.trim().is_empty()) {
            self.store.name = name.trim().to_string();
        }
        if let Some(agent) = lookup("SCRAPER_USER_AGENT").filter(|v| !v.trim().is_empty()) {
            self.scraper.user_agent = agent;
        }
        if let Some(cities) = lookup("SCRAPE_CITIES") {
            let parsed = parse_city_list(&cities);
            if !parsed.is_empty() {
                self.schedule.cities = parsed;
            }
        }
        if let Some(bind) = lookup("WEATHER_BIND").filter(|v| !v.trim().is_empty()) {
            self.server.bind = bind.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.scraper.weather_timeout_secs == 0 || self.scraper.aqi_timeout_secs == 0 {
            bail!("Provider timeouts must be greater than zero");
        }

        for (name, url) in [
            ("weather_base_url", &self.scraper.weather_base_url),
            ("openaq_base_url", &self.scraper.openaq_base_url),
            ("waqi_base_url", &self.scraper.waqi_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                bail!("scraper.{name} must be an http or https URL, got '{url}'");
            }
        }

        if self.store.name.trim().is_empty() {
            bail!("store.name cannot be empty");
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            );
        }

        cron::Schedule::from_str(&normalize_cron_expr(&self.schedule.cron))
            .map_err(|e| anyhow!("Invalid schedule.cron '{}': {e}", self.schedule.cron))?;

        Ok(())
    }
}

/// Splits a comma-separated city list, trimming entries and dropping blanks.
pub fn parse_city_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}
