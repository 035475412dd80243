//! Persisted operator settings and the effective runtime configuration.
//!
//! Precedence is CLI flag > environment > settings file > defaults. The first two are
//! resolved by clap; this module handles the file and the defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_DIR: &str = "autotest-console";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub max_poll_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub recorder_timeout_secs: u64,
    pub git_branch: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".into(),
            poll_interval: Duration::from_millis(2000),
            max_poll_backoff: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            recorder_timeout_secs: 30,
            git_branch: "main".into(),
        }
    }
}

/// Keys accepted by `settings set`.
pub const SETTING_KEYS: &[&str] = &[
    "base_url",
    "poll_interval",
    "max_poll_backoff",
    "request_timeout",
    "recorder_timeout_secs",
    "git_branch",
];

pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(SETTINGS_FILE))
}

impl Settings {
    /// Load settings from `path`, or from the default location when `None`.
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_settings_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };
        if !file_path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("read settings file {}", file_path.display()))?;
        let settings: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("parse settings file {}", file_path.display()))?;
        Ok(settings)
    }

    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let file_path = match path {
            Some(p) => p.to_path_buf(),
            None => default_settings_path().context("no config directory on this platform")?,
        };
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(&file_path, data)
            .with_context(|| format!("write settings file {}", file_path.display()))?;
        Ok(file_path)
    }

    /// Update one setting from its string form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "base_url" => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    anyhow::bail!("base_url must start with http:// or https://");
                }
                self.base_url = value.trim_end_matches('/').to_string();
            }
            "poll_interval" => self.poll_interval = parse_duration(key, value)?,
            "max_poll_backoff" => self.max_poll_backoff = parse_duration(key, value)?,
            "request_timeout" => self.request_timeout = parse_duration(key, value)?,
            "recorder_timeout_secs" => {
                self.recorder_timeout_secs = value
                    .parse()
                    .with_context(|| format!("{key} must be a whole number of seconds"))?;
            }
            "git_branch" => {
                if value.is_empty() {
                    anyhow::bail!("git_branch cannot be empty");
                }
                self.git_branch = value.to_string();
            }
            other => anyhow::bail!(
                "unknown setting '{other}' (expected one of: {})",
                SETTING_KEYS.join(", ")
            ),
        }
        Ok(())
    }
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    let d: Duration = value
        .parse::<humantime::Duration>()
        .with_context(|| format!("{key} must be a duration like 2s or 500ms"))?
        .into();
    if d.is_zero() {
        anyhow::bail!("{key} must be greater than zero");
    }
    Ok(d)
}

/// Effective configuration for one console process.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub base_url: String,
    pub poll_interval: Duration,
    pub max_poll_backoff: Duration,
    pub request_timeout: Duration,
    pub recorder_timeout_secs: u64,
    pub git_branch: String,
    pub user_agent: String,
    pub history_path: Option<PathBuf>,
}

impl ConsoleConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            poll_interval: settings.poll_interval,
            max_poll_backoff: settings.max_poll_backoff.max(settings.poll_interval),
            request_timeout: settings.request_timeout,
            recorder_timeout_secs: settings.recorder_timeout_secs,
            git_branch: settings.git_branch.clone(),
            user_agent: format!("autotest-console/{}", env!("CARGO_PKG_VERSION")),
            history_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(Some(&dir.path().join("nope.json"))).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn save_then_load_keeps_humantime_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut s = Settings::default();
        s.set("poll_interval", "750ms").unwrap();
        s.set("base_url", "https://qa.example.com/").unwrap();
        s.save(Some(&path)).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("750ms"), "{raw}");
        let loaded = Settings::load(Some(&path)).unwrap();
        assert_eq!(loaded.poll_interval, Duration::from_millis(750));
        assert_eq!(loaded.base_url, "https://qa.example.com");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"git_branch":"develop"}"#).unwrap();
        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.git_branch, "develop");
        assert_eq!(s.recorder_timeout_secs, 30);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn set_rejects_bad_input() {
        let mut s = Settings::default();
        assert!(s.set("poll_interval", "0s").is_err());
        assert!(s.set("poll_interval", "soon").is_err());
        assert!(s.set("base_url", "localhost").is_err());
        assert!(s.set("colour", "blue").is_err());
        assert!(s.set("git_branch", " ").is_err());
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn backoff_never_below_interval() {
        let s = Settings {
            poll_interval: Duration::from_secs(5),
            max_poll_backoff: Duration::from_secs(1),
            ..Default::default()
        };
        let cfg = ConsoleConfig::from_settings(&s);
        assert_eq!(cfg.max_poll_backoff, Duration::from_secs(5));
    }
}
