use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{AppError, AppResult};

const CONFIG_PATH_VAR: &str = "CLAIM_UPLOADER_CONFIG";
const ENV_PREFIX: &str = "CLAIM_UPLOADER_";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network_location: PathBuf,
    pub app_url: String,
    pub file_extensions: Vec<String>,
    pub selection_window_days: u32,
    pub quiescence_wait_ms: u64,
    pub control_timeout_ms: u64,
    pub file_chooser_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub browser_executable: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network_location: default_location_for(Platform::current()),
            app_url: "https://app.rivethealth.com/".to_string(),
            file_extensions: vec![".835".to_string(), ".837".to_string()],
            selection_window_days: 7,
            quiescence_wait_ms: 5000,
            control_timeout_ms: 10_000,
            file_chooser_timeout_ms: 10_000,
            navigation_timeout_ms: 30_000,
            browser_executable: None,
        }
    }
}

impl Config {
    pub fn selection_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.selection_window_days))
    }

    pub fn quiescence_wait(&self) -> Duration {
        Duration::from_millis(self.quiescence_wait_ms)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    pub fn file_chooser_timeout(&self) -> Duration {
        Duration::from_millis(self.file_chooser_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }
}

/// Where the archive share is mounted on each platform.
pub fn default_location_for(platform: Platform) -> PathBuf {
    match platform {
        Platform::Windows => PathBuf::from(r"\\suh-msi-app\ARCHIVE1"),
        Platform::MacOs => PathBuf::from("/Volumes/ARCHIVE1"),
        Platform::Linux | Platform::Other => PathBuf::from("/mnt/suh-msi-app/ARCHIVE1"),
    }
}

fn get_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
        return Some(PathBuf::from(path));
    }

    let default_path = dirs::config_dir()?
        .join("Claim Uploader")
        .join("config.json");

    default_path.exists().then_some(default_path)
}

/// Load configuration: defaults, then the optional JSON file, then environment overrides.
pub fn load_config() -> AppResult<Config> {
    let config = match get_config_path() {
        Some(path) => load_config_file(&path)?,
        None => {
            log::debug!("No configuration file found, using defaults");
            Config::default()
        }
    };

    let config = apply_overrides(config, |key| std::env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config_file(path: &Path) -> AppResult<Config> {
    let config_str = fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!(
            "Could not read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let config: Config = serde_json::from_str(&config_str)?;
    log::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Apply `CLAIM_UPLOADER_*` overrides; `lookup` resolves a variable name to its value.
pub fn apply_overrides<F>(mut config: Config, lookup: F) -> AppResult<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

    if let Some(location) = var("NETWORK_LOCATION") {
        config.network_location = PathBuf::from(location);
    }

    if let Some(url) = var("APP_URL") {
        config.app_url = url.trim().to_string();
    }

    if let Some(extensions) = var("FILE_EXTENSIONS") {
        config.file_extensions = extensions
            .split(',')
            .map(str::trim)
            .filter(|ext| !ext.is_empty())
            .map(str::to_string)
            .collect();
    }

    if let Some(days) = var("SELECTION_WINDOW_DAYS") {
        config.selection_window_days = parse_number("selection_window_days", &days)?;
    }

    if let Some(ms) = var("QUIESCENCE_WAIT_MS") {
        config.quiescence_wait_ms = parse_number("quiescence_wait_ms", &ms)?;
    }

    if let Some(ms) = var("CONTROL_TIMEOUT_MS") {
        config.control_timeout_ms = parse_number("control_timeout_ms", &ms)?;
    }

    if let Some(ms) = var("FILE_CHOOSER_TIMEOUT_MS") {
        config.file_chooser_timeout_ms = parse_number("file_chooser_timeout_ms", &ms)?;
    }

    if let Some(ms) = var("NAVIGATION_TIMEOUT_MS") {
        config.navigation_timeout_ms = parse_number("navigation_timeout_ms", &ms)?;
    }

    if let Some(executable) = var("BROWSER_EXECUTABLE") {
        config.browser_executable = Some(PathBuf::from(executable));
    }

    Ok(config)
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> AppResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::validation(field, &format!("'{}' is not a valid number", value)))
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    if config.network_location.as_os_str().is_empty() {
        return Err(AppError::validation("network_location", "Must not be empty"));
    }

    let url_pattern = Regex::new(r"^https?://[^\s/]+").expect("static regex");
    if !url_pattern.is_match(&config.app_url) {
        return Err(AppError::validation("app_url", "Must be an http(s) URL"));
    }

    if config.file_extensions.is_empty() {
        return Err(AppError::validation(
            "file_extensions",
            "At least one extension is required",
        ));
    }

    let extension_pattern = Regex::new(r"^\.[A-Za-z0-9_\-]+$").expect("static regex");
    for extension in &config.file_extensions {
        if !extension_pattern.is_match(extension) {
            return Err(AppError::validation(
                "file_extensions",
                &format!("'{}' must look like '.835'", extension),
            ));
        }
    }

    if config.selection_window_days == 0 || config.selection_window_days > 365 {
        return Err(AppError::validation(
            "selection_window_days",
            "Must be between 1 and 365",
        ));
    }

    if config.quiescence_wait_ms > 10 * 60 * 1000 {
        return Err(AppError::validation(
            "quiescence_wait_ms",
            "Must be 10 minutes or less",
        ));
    }

    for (field, value) in [
        ("control_timeout_ms", config.control_timeout_ms),
        ("file_chooser_timeout_ms", config.file_chooser_timeout_ms),
        ("navigation_timeout_ms", config.navigation_timeout_ms),
    ] {
        if value == 0 {
            return Err(AppError::validation(field, "Must be greater than 0"));
        }
    }

    Ok(())
}
